//! Instrument traits and drivers.
//!
//! The scan core only sees the [`Positioner`] and [`FieldProbe`] traits;
//! the G-code and SCPI drivers behind them are transport plumbing. Device
//! handles are owned values passed into the scan runner, never process-wide
//! singletons, so exclusivity falls out of `&mut self` and ownership.

pub mod mock;
pub mod printer;
pub mod serial;
pub mod teslameter;

use crate::error::AppResult;
use crate::geometry::Coordinate;
use async_trait::async_trait;

/// One field measurement from the probe.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum FieldReading {
    /// Single-axis probe: the field component along the probe axis, in T.
    Scalar(f64),
    /// Three-axis probe: magnitude plus the three components, in T.
    Vector {
        /// Field magnitude.
        magnitude: f64,
        /// X component.
        x: f64,
        /// Y component.
        y: f64,
        /// Z component.
        z: f64,
    },
}

impl FieldReading {
    /// The reading's values in persisted-column order.
    pub fn values(&self) -> Vec<f64> {
        match *self {
            FieldReading::Scalar(b) => vec![b],
            FieldReading::Vector { magnitude, x, y, z } => vec![magnitude, x, y, z],
        }
    }
}

impl std::fmt::Display for FieldReading {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match *self {
            FieldReading::Scalar(b) => write!(f, "B={b:.6} T"),
            FieldReading::Vector { magnitude, x, y, z } => {
                write!(f, "|B|={magnitude:.6} T ({x:.6}, {y:.6}, {z:.6})")
            }
        }
    }
}

/// A motorized stage that can carry the probe to a coordinate.
///
/// All positions are in the logical (magnet) frame; any mounting-dependent
/// axis permutation is the driver's business.
#[async_trait]
pub trait Positioner: Send {
    /// Command a move and return immediately.
    async fn move_to(&mut self, target: Coordinate) -> AppResult<()>;

    /// Command a move and return only once the reported position has
    /// converged on the target within tolerance, or fail with
    /// [`MotionTimeout`](crate::error::MapperError::MotionTimeout).
    async fn move_wait(&mut self, target: Coordinate) -> AppResult<()>;

    /// Report the current position.
    async fn position(&mut self) -> AppResult<Coordinate>;

    /// Run the homing cycle and wait for it to finish.
    async fn home(&mut self) -> AppResult<()>;

    /// Audible completion signal. Drivers without a buzzer may no-op.
    async fn beep(&mut self) -> AppResult<()>;
}

/// A field probe that produces one reading on demand.
#[async_trait]
pub trait FieldProbe: Send {
    /// Number of measurement axes (1 or 3). Decides the persisted columns.
    fn axes(&self) -> usize;

    /// Take one field reading.
    async fn read_field(&mut self) -> AppResult<FieldReading>;

    /// Read the probe temperature in degrees C.
    async fn read_temperature(&mut self) -> AppResult<f64>;
}
