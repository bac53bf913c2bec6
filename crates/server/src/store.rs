//! Persistence: a trait boundary only, per §1's Non-goal on "persistence
//! schema design". `ZoneStore` names the seam a real deployment's
//! Redis/ScyllaDB client plugs into (player save-on-interval per
//! `PlayerSaveIntervalMs`, migration handoff bookkeeping); no concrete
//! backend is implemented or depended on in this workspace.

use meridian_sim::EntityId;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store unreachable: {0}")]
    Unreachable(String),
}

/// Durable state a zone hands off to storage. Fields are intentionally
/// coarse (a blob, not a row schema) — the schema itself is out of scope.
#[derive(Debug, Clone)]
pub struct PlayerRecord {
    pub player_id: u64,
    pub entity: EntityId,
    pub state_blob: Vec<u8>,
}

pub trait ZoneStore {
    fn save_player(&mut self, record: PlayerRecord) -> Result<(), StoreError>;
    fn load_player(&self, player_id: u64) -> Result<Option<PlayerRecord>, StoreError>;
}

/// No-op store: every save succeeds and discards its payload, every load
/// returns `None`. Used by the included binary and by tests that don't
/// exercise persistence, since no concrete backend ships in this
/// workspace.
#[derive(Debug, Default)]
pub struct NullStore;

impl ZoneStore for NullStore {
    fn save_player(&mut self, _record: PlayerRecord) -> Result<(), StoreError> {
        Ok(())
    }

    fn load_player(&self, _player_id: u64) -> Result<Option<PlayerRecord>, StoreError> {
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_store_save_succeeds_and_load_is_always_empty() {
        let mut store = NullStore;
        let record = PlayerRecord {
            player_id: 1,
            entity: EntityId(0),
            state_blob: vec![1, 2, 3],
        };
        assert!(store.save_player(record).is_ok());
        assert!(store.load_player(1).unwrap().is_none());
    }
}
