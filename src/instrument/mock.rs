//! Mock instruments for tests and dry runs.
//!
//! Both mocks record every call into a shared [`CallJournal`] so tests can
//! assert the motion-before-measurement ordering, and both can be scripted
//! to fail at a chosen call to exercise halt-and-resume paths.

use crate::error::{AppResult, MapperError};
use crate::geometry::Coordinate;
use crate::instrument::{FieldProbe, FieldReading, Positioner};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// One recorded device interaction.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum DeviceCall {
    /// `move_wait` completed successfully for this target.
    MoveWait(Coordinate),
    /// A field reading was requested.
    ReadField,
}

/// Shared, ordered record of device interactions.
pub type CallJournal = Arc<Mutex<Vec<DeviceCall>>>;

/// Create an empty journal to share between a mock pair.
pub fn call_journal() -> CallJournal {
    Arc::new(Mutex::new(Vec::new()))
}

/// A stage that teleports, with an optional scripted convergence failure.
pub struct MockPositioner {
    position: Coordinate,
    journal: CallJournal,
    /// Fail the Nth `move_wait` call (0-based) with `MotionTimeout`.
    fail_move: Option<usize>,
    moves: usize,
}

impl MockPositioner {
    /// A mock stage starting at the origin.
    pub fn new(journal: CallJournal) -> Self {
        Self {
            position: Coordinate::new(0.0, 0.0, 0.0),
            journal,
            fail_move: None,
            moves: 0,
        }
    }

    /// Script the Nth `move_wait` (0-based) to time out.
    pub fn fail_move_at(mut self, call: usize) -> Self {
        self.fail_move = Some(call);
        self
    }

    /// Start somewhere other than the origin.
    pub fn starting_at(mut self, position: Coordinate) -> Self {
        self.position = position;
        self
    }
}

#[async_trait]
impl Positioner for MockPositioner {
    async fn move_to(&mut self, target: Coordinate) -> AppResult<()> {
        self.position = target;
        Ok(())
    }

    async fn move_wait(&mut self, target: Coordinate) -> AppResult<()> {
        let call = self.moves;
        self.moves += 1;
        if self.fail_move == Some(call) {
            return Err(MapperError::MotionTimeout {
                target,
                elapsed: Duration::from_secs(1),
            });
        }
        self.position = target;
        self.journal.lock().await.push(DeviceCall::MoveWait(target));
        Ok(())
    }

    async fn position(&mut self) -> AppResult<Coordinate> {
        Ok(self.position)
    }

    async fn home(&mut self) -> AppResult<()> {
        self.position = Coordinate::new(0.0, 0.0, 0.0);
        Ok(())
    }

    async fn beep(&mut self) -> AppResult<()> {
        Ok(())
    }
}

/// A probe returning scripted readings, with an optional scripted failure.
pub struct MockProbe {
    journal: CallJournal,
    axes: usize,
    readings: Vec<f64>,
    temperature: f64,
    /// Fail the Nth `read_field` call (0-based).
    fail_read: Option<usize>,
    reads: usize,
}

impl MockProbe {
    /// A single-axis probe cycling through `readings`.
    pub fn new(journal: CallJournal, readings: Vec<f64>) -> Self {
        Self {
            journal,
            axes: 1,
            readings,
            temperature: 21.5,
            fail_read: None,
            reads: 0,
        }
    }

    /// Report a three-axis head instead.
    pub fn three_axis(mut self) -> Self {
        self.axes = 3;
        self
    }

    /// Script the Nth `read_field` (0-based) to fail.
    pub fn fail_read_at(mut self, call: usize) -> Self {
        self.fail_read = Some(call);
        self
    }

    fn next_value(&self) -> f64 {
        if self.readings.is_empty() {
            0.0
        } else {
            self.readings[self.reads % self.readings.len()]
        }
    }
}

#[async_trait]
impl FieldProbe for MockProbe {
    fn axes(&self) -> usize {
        self.axes
    }

    async fn read_field(&mut self) -> AppResult<FieldReading> {
        let call = self.reads;
        let value = self.next_value();
        self.reads += 1;
        if self.fail_read == Some(call) {
            return Err(MapperError::ProbeRead("scripted failure".to_string()));
        }
        self.journal.lock().await.push(DeviceCall::ReadField);
        if self.axes == 1 {
            Ok(FieldReading::Scalar(value))
        } else {
            Ok(FieldReading::Vector {
                magnitude: value,
                x: value / 2.0,
                y: 0.0,
                z: value / 2.0,
            })
        }
    }

    async fn read_temperature(&mut self) -> AppResult<f64> {
        Ok(self.temperature)
    }
}
