//! Zone server binary: parses CLI flags, wires up a [`Zone`], and drives
//! it at the fixed 60 Hz cadence spec §5 specifies. No concrete transport
//! ships in this workspace (§1 Non-goal), so the tick loop runs against a
//! [`LoopbackAdapter`] — swapping in a real socket/QUIC implementation of
//! [`NetworkAdapter`] is the only change a production deployment needs.

use std::cell::RefCell;
use std::process::ExitCode;
use std::rc::Rc;
use std::thread;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use clap::Parser;
use meridian_migration::{CrossZoneBus, InMemoryCrossZoneBus};
use meridian_server::{Cli, LoggingMetrics, LoopbackAdapter, NullStore, Zone, ZoneConfig};

/// Cross-zone bus channel depth. Not a spec §6 binding constant (the spec
/// names the mechanism, not a capacity); chosen generously relative to
/// `MAX_ENTITIES_PER_ZONE` since aura traffic is the dominant sender.
const CROSS_ZONE_BUS_CAPACITY: usize = 16_384;

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = ZoneConfig::from(&cli);
    let zone_id = config.zone_id;

    if let Err(error) = config.validate() {
        tracing::error!(zone_id, %error, "invalid configuration, refusing to start");
        return ExitCode::from(error.exit_code() as u8);
    }

    tracing::info!(zone_id, port = cli.port, "starting meridian-server");

    let bus: Rc<RefCell<dyn CrossZoneBus>> = Rc::new(RefCell::new(InMemoryCrossZoneBus::new(CROSS_ZONE_BUS_CAPACITY)));
    let mut zone = Zone::new(config.clone(), LoopbackAdapter::new(), NullStore, LoggingMetrics, bus);

    run_tick_loop(&mut zone, config.tick_rate_hz, config.tick_budget_micros);
    ExitCode::SUCCESS
}

/// Drives `zone.tick` forever at `tick_rate_hz`, sleeping off whatever
/// budget a tick didn't use. `TickScheduler` (owned by `Zone`) is the one
/// that reacts to overruns; this loop only keeps the cadence.
fn run_tick_loop(zone: &mut Zone<LoopbackAdapter, NullStore, LoggingMetrics>, tick_rate_hz: u32, tick_budget_micros: u64) {
    let period = Duration::from_micros(1_000_000 / u64::from(tick_rate_hz));
    let budget = Duration::from_micros(tick_budget_micros);
    loop {
        let started = Instant::now();
        zone.tick(now_ms());
        let elapsed = started.elapsed();
        if elapsed > budget {
            tracing::trace!(tick = zone.tick_number(), ?elapsed, "tick ran over budget, not sleeping");
            continue;
        }
        thread::sleep(period.saturating_sub(elapsed));
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}
