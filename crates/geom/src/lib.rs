//! Deterministic fixed-point scalar and vector math.
//!
//! Every quantity that feeds the simulation's outcome (position, velocity,
//! bounding radii, distances) is represented as [`Fixed`], an `i64` scaled by
//! [`FIXED_SCALE`]. Two hosts executing the same tick with the same inputs
//! produce bit-identical `Fixed` values, because integer arithmetic has no
//! platform-dependent rounding. Floating point is used only for rotation
//! (yaw/pitch trigonometry), never for anything that changes position,
//! velocity, or combat outcome across a tick boundary.

#![deny(unsafe_code)]

use std::fmt;
use std::ops::{Add, AddAssign, Div, Mul, Neg, Sub, SubAssign};

/// Raw units per meter. A `Fixed` of `1000` represents `1.0` meter.
pub const FIXED_SCALE: i64 = 1000;

/// A fixed-point scalar, 1/1000 of a meter per raw unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Fixed(i64);

impl Fixed {
    pub const ZERO: Self = Self(0);
    pub const ONE: Self = Self(FIXED_SCALE);

    /// Build a `Fixed` from a raw 1/1000-meter integer. No rounding occurs;
    /// this is the canonical constructor for anything coming off the wire or
    /// out of another `Fixed` computation.
    #[must_use]
    pub const fn from_raw(raw: i64) -> Self {
        Self(raw)
    }

    /// Raw 1/1000-meter integer value.
    #[must_use]
    pub const fn raw(self) -> i64 {
        self.0
    }

    /// Build a `Fixed` from a float meter value. Used only at the boundary
    /// where floating-point rotation math hands off a direction to the
    /// fixed-point simulation; the result is then pure integer state.
    #[must_use]
    pub fn from_meters_f64(meters: f64) -> Self {
        Self((meters * FIXED_SCALE as f64).round() as i64)
    }

    #[must_use]
    pub fn to_meters_f64(self) -> f64 {
        self.0 as f64 / FIXED_SCALE as f64
    }

    #[must_use]
    pub const fn abs(self) -> Self {
        Self(self.0.abs())
    }

    #[must_use]
    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// Multiply by a dimensionless integer numerator/denominator pair,
    /// truncating toward zero. Used to convert a per-second fixed quantity
    /// (e.g. `MaxSpeed`) into a per-tick quantity (`* 1 / TickRateHz`)
    /// without ever going through floating point.
    #[must_use]
    pub const fn scale_frac(self, numerator: i64, denominator: i64) -> Self {
        Self(self.0 * numerator / denominator)
    }

    /// Multiply two fixed-point quantities (e.g. a unit direction component
    /// by a speed cap). Widens to `i128` so the intermediate product can't
    /// overflow `i64` before the rescale back down by `FIXED_SCALE`.
    #[must_use]
    pub fn mul_fixed(self, other: Self) -> Self {
        let product = i128::from(self.0) * i128::from(other.0) / i128::from(FIXED_SCALE);
        Self(product as i64)
    }

    #[must_use]
    pub const fn clamp(self, min: Self, max: Self) -> Self {
        if self.0 < min.0 {
            min
        } else if self.0 > max.0 {
            max
        } else {
            self
        }
    }

    #[must_use]
    pub const fn min(self, other: Self) -> Self {
        if self.0 < other.0 { self } else { other }
    }

    #[must_use]
    pub const fn max(self, other: Self) -> Self {
        if self.0 > other.0 { self } else { other }
    }
}

impl Add for Fixed {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Self(self.0 + rhs.0)
    }
}

impl Sub for Fixed {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Self(self.0 - rhs.0)
    }
}

impl Neg for Fixed {
    type Output = Self;
    fn neg(self) -> Self {
        Self(-self.0)
    }
}

impl AddAssign for Fixed {
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0;
    }
}

impl SubAssign for Fixed {
    fn sub_assign(&mut self, rhs: Self) {
        self.0 -= rhs.0;
    }
}

impl Mul<i64> for Fixed {
    type Output = Self;
    fn mul(self, rhs: i64) -> Self {
        Self(self.0 * rhs)
    }
}

impl Div<i64> for Fixed {
    type Output = Self;
    fn div(self, rhs: i64) -> Self {
        Self(self.0 / rhs)
    }
}

impl fmt::Display for Fixed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.3}m", self.to_meters_f64())
    }
}

/// Integer square root via Newton's method, exact for non-negative inputs.
/// Deterministic across hosts (no floating point involved).
#[must_use]
pub fn isqrt(value: i64) -> i64 {
    if value <= 0 {
        return 0;
    }
    let mut x = value;
    let mut y = (x + 1) / 2;
    while y < x {
        x = y;
        y = (x + value / x) / 2;
    }
    x
}

/// A 3D fixed-point vector: `x`/`z` are the horizontal (ground) plane, `y` is
/// vertical. Matches the XZ-plane convention used by [`meridian-spatial`]'s
/// grid and the spec's world layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct Vec3Fixed {
    pub x: Fixed,
    pub y: Fixed,
    pub z: Fixed,
}

impl Vec3Fixed {
    pub const ZERO: Self = Self {
        x: Fixed::ZERO,
        y: Fixed::ZERO,
        z: Fixed::ZERO,
    };

    #[must_use]
    pub const fn new(x: Fixed, y: Fixed, z: Fixed) -> Self {
        Self { x, y, z }
    }

    #[must_use]
    pub fn from_meters(x: f64, y: f64, z: f64) -> Self {
        Self {
            x: Fixed::from_meters_f64(x),
            y: Fixed::from_meters_f64(y),
            z: Fixed::from_meters_f64(z),
        }
    }

    /// Component-wise conversion back to float meters, for test assertions
    /// and the boundary where a float-based wire/debug view is built.
    #[must_use]
    pub fn to_meters_f64(self) -> (f64, f64, f64) {
        (self.x.to_meters_f64(), self.y.to_meters_f64(), self.z.to_meters_f64())
    }

    #[must_use]
    pub const fn add(self, rhs: Self) -> Self {
        Self {
            x: Fixed(self.x.0 + rhs.x.0),
            y: Fixed(self.y.0 + rhs.y.0),
            z: Fixed(self.z.0 + rhs.z.0),
        }
    }

    #[must_use]
    pub const fn sub(self, rhs: Self) -> Self {
        Self {
            x: Fixed(self.x.0 - rhs.x.0),
            y: Fixed(self.y.0 - rhs.y.0),
            z: Fixed(self.z.0 - rhs.z.0),
        }
    }

    /// Squared distance in the XZ (ground) plane only. Used everywhere a
    /// radius comparison is needed, to avoid a sqrt.
    #[must_use]
    pub fn distance_sq_xz(self, other: Self) -> i64 {
        let dx = (self.x - other.x).raw();
        let dz = (self.z - other.z).raw();
        dx * dx + dz * dz
    }

    #[must_use]
    pub fn distance_xz(self, other: Self) -> Fixed {
        Fixed::from_raw(isqrt(self.distance_sq_xz(other)))
    }

    /// Full 3D squared distance (used by [`MaxTeleportDistance`] checks,
    /// which are not plane-restricted).
    #[must_use]
    pub fn distance_sq(self, other: Self) -> i64 {
        let dx = (self.x - other.x).raw();
        let dy = (self.y - other.y).raw();
        let dz = (self.z - other.z).raw();
        dx * dx + dy * dy + dz * dz
    }

    #[must_use]
    pub fn distance(self, other: Self) -> Fixed {
        Fixed::from_raw(isqrt(self.distance_sq(other)))
    }

    #[must_use]
    pub fn length_xz(self) -> Fixed {
        Fixed::from_raw(isqrt(self.x.raw() * self.x.raw() + self.z.raw() * self.z.raw()))
    }

    /// Scale a vector so its XZ magnitude does not exceed `max`. Vertical
    /// component is passed through unchanged; movement's vertical axis
    /// (gravity/jump) is never touched by horizontal clamping.
    #[must_use]
    pub fn clamp_length_xz(self, max: Fixed) -> Self {
        let len = self.length_xz();
        if len.raw() <= max.raw() || len.is_zero() {
            return self;
        }
        Self {
            x: Fixed::from_raw(self.x.raw() * max.raw() / len.raw()),
            y: self.y,
            z: Fixed::from_raw(self.z.raw() * max.raw() / len.raw()),
        }
    }
}

impl Add for Vec3Fixed {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Self::add(self, rhs)
    }
}

impl Sub for Vec3Fixed {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Self::sub(self, rhs)
    }
}

/// A float 2D direction used only for yaw-relative rotation math (input bit
/// flags -> world-space direction). Never persisted as simulation state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Dir2 {
    pub x: f64,
    pub z: f64,
}

impl Dir2 {
    #[must_use]
    pub fn from_yaw_relative(forward: f64, strafe: f64, yaw: f64) -> Self {
        let (sin_y, cos_y) = (yaw.sin(), yaw.cos());
        // forward/strafe are in the [-1,1] input plane; rotate into world XZ.
        let x = forward * sin_y + strafe * cos_y;
        let z = forward * cos_y - strafe * sin_y;
        let mag = (x * x + z * z).sqrt();
        if mag < 1e-9 {
            return Self { x: 0.0, z: 0.0 };
        }
        Self {
            x: x / mag.max(1.0),
            z: z / mag.max(1.0),
        }
    }

    #[must_use]
    pub fn to_fixed_unit(self) -> (Fixed, Fixed) {
        (Fixed::from_meters_f64(self.x), Fixed::from_meters_f64(self.z))
    }
}

/// Clamp a yaw value into `[-pi, pi]`.
#[must_use]
pub fn normalize_yaw(yaw: f64) -> f64 {
    let two_pi = std::f64::consts::TAU;
    let mut y = yaw % two_pi;
    if y > std::f64::consts::PI {
        y -= two_pi;
    } else if y < -std::f64::consts::PI {
        y += two_pi;
    }
    y
}

/// Clamp a pitch value into `[-pi/2, pi/2]`.
#[must_use]
pub fn clamp_pitch(pitch: f64) -> f64 {
    pitch.clamp(-std::f64::consts::FRAC_PI_2, std::f64::consts::FRAC_PI_2)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_roundtrips_meters() {
        let f = Fixed::from_meters_f64(5.0);
        assert_eq!(f.raw(), 5000);
        assert_eq!(f.to_meters_f64(), 5.0);
    }

    #[test]
    fn fixed_arithmetic_is_exact() {
        let a = Fixed::from_raw(1500);
        let b = Fixed::from_raw(500);
        assert_eq!((a + b).raw(), 2000);
        assert_eq!((a - b).raw(), 1000);
    }

    #[test]
    fn scale_frac_divides_per_second_to_per_tick() {
        let max_speed = Fixed::from_meters_f64(6.0); // 6 m/s
        let per_tick = max_speed.scale_frac(1, 60);
        assert_eq!(per_tick.raw(), 100); // 0.1 m/tick = 6m/s at 60Hz
    }

    #[test]
    fn mul_fixed_multiplies_a_unit_fraction_by_a_cap() {
        let half = Fixed::from_meters_f64(0.5);
        let cap = Fixed::from_meters_f64(5.0);
        assert_eq!(half.mul_fixed(cap).to_meters_f64(), 2.5);
    }

    #[test]
    fn isqrt_exact_squares() {
        assert_eq!(isqrt(0), 0);
        assert_eq!(isqrt(1), 1);
        assert_eq!(isqrt(25), 5);
        assert_eq!(isqrt(1_000_000), 1000);
    }

    #[test]
    fn isqrt_truncates_non_squares() {
        assert_eq!(isqrt(24), 4);
        assert_eq!(isqrt(26), 5);
    }

    #[test]
    fn distance_xz_ignores_vertical() {
        let a = Vec3Fixed::from_meters(0.0, 100.0, 0.0);
        let b = Vec3Fixed::from_meters(3.0, -50.0, 4.0);
        assert_eq!(a.distance_xz(b).raw(), 5000);
    }

    #[test]
    fn clamp_length_xz_preserves_vertical() {
        let v = Vec3Fixed::new(Fixed::from_meters_f64(3.0), Fixed::from_meters_f64(9.0), Fixed::from_meters_f64(4.0));
        let clamped = v.clamp_length_xz(Fixed::from_meters_f64(2.5));
        assert_eq!(clamped.y, v.y);
        assert!(clamped.length_xz().raw() <= 2500);
    }

    #[test]
    fn clamp_length_xz_noop_when_under_limit() {
        let v = Vec3Fixed::from_meters(1.0, 0.0, 1.0);
        let clamped = v.clamp_length_xz(Fixed::from_meters_f64(10.0));
        assert_eq!(clamped, v);
    }
}
