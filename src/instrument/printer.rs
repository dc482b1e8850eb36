//! G-code driver for the repurposed 3D printer used as the motion stage.
//!
//! The stage speaks Marlin-style G-code over serial: `G90` absolute mode and
//! `M18 S0` (idle-hold stays on) at connect, `G0` moves, `M114` position
//! reports, `G28` homing fenced by `M400`/`M118`, `M300` beep.
//!
//! `move_wait` does not trust the firmware to block: it commands the move
//! and then polls the reported position until every axis is within the
//! configured tolerance, with a fixed backoff between polls and an explicit
//! overall timeout. A stage that never converges surfaces `MotionTimeout`
//! instead of wedging the scan.

use crate::config::PositionerSettings;
use crate::error::{AppResult, MapperError};
use crate::geometry::Coordinate;
use crate::instrument::serial::SerialConnection;
use crate::instrument::Positioner;
use async_trait::async_trait;
use log::{debug, info, warn};
use std::time::{Duration, Instant};

/// Marker the `M118` echo prints once `M400` has drained the motion queue.
const IDLE_FENCE: &str = "Finished";

/// Signed permutation between the logical (magnet) frame and the machine
/// (printer) frame. One entry per machine axis: which logical axis feeds it
/// and with which sign.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AxisMap {
    machine: [(usize, f64); 3],
}

impl Default for AxisMap {
    /// The original fixture's mounting: machine X = -logical Z,
    /// machine Y = -logical Y, machine Z = +logical X.
    fn default() -> Self {
        Self {
            machine: [(2, -1.0), (1, -1.0), (0, 1.0)],
        }
    }
}

impl AxisMap {
    /// Parse a map like `["-z", "-y", "x"]` (one signed logical axis per
    /// machine axis). Every logical axis must appear exactly once.
    pub fn parse(entries: &[String; 3]) -> AppResult<Self> {
        let mut machine = [(0usize, 0.0f64); 3];
        let mut seen = [false; 3];
        for (i, entry) in entries.iter().enumerate() {
            let entry = entry.trim().to_ascii_lowercase();
            let (sign, axis_name) = match entry.strip_prefix('-') {
                Some(rest) => (-1.0, rest),
                None => (1.0, entry.strip_prefix('+').unwrap_or(&entry)),
            };
            let axis = match axis_name {
                "x" => 0,
                "y" => 1,
                "z" => 2,
                other => {
                    return Err(MapperError::Device(format!(
                        "invalid axis_map entry '{other}' (expected x, y or z)"
                    )))
                }
            };
            if seen[axis] {
                return Err(MapperError::Device(format!(
                    "axis_map uses logical axis '{axis_name}' twice"
                )));
            }
            seen[axis] = true;
            machine[i] = (axis, sign);
        }
        Ok(Self { machine })
    }

    /// Logical coordinate to machine-frame (X, Y, Z).
    pub fn to_machine(&self, p: Coordinate) -> [f64; 3] {
        let logical = [p.x, p.y, p.z];
        let mut out = [0.0; 3];
        for (i, &(axis, sign)) in self.machine.iter().enumerate() {
            out[i] = sign * logical[axis];
        }
        out
    }

    /// Machine-frame (X, Y, Z) back to a logical coordinate. The map is a
    /// signed permutation, so the inverse is its transpose.
    pub fn to_logical(&self, machine: [f64; 3]) -> Coordinate {
        let mut logical = [0.0; 3];
        for (i, &(axis, sign)) in self.machine.iter().enumerate() {
            logical[axis] = sign * machine[i];
        }
        Coordinate::new(logical[0], logical[1], logical[2])
    }
}

/// Parse an `M114` report like
/// `X:12.00 Y:110.00 Z:250.00 E:0.00 Count X:960 ...`.
fn parse_m114(line: &str) -> AppResult<[f64; 3]> {
    let (x, y, z, _rest): (f64, f64, f64, &str) = prse::try_parse!(line, "X:{} Y:{} Z:{} E:{}")
        .map_err(|e| MapperError::Device(format!("unparseable M114 report '{line}': {e}")))?;
    Ok([x, y, z])
}

/// The G-code motion stage.
pub struct GcodePrinter {
    conn: SerialConnection,
    map: AxisMap,
    tolerance: f64,
    poll_interval: Duration,
    move_timeout: Duration,
}

impl GcodePrinter {
    /// Open the port and put the stage into a known state: absolute
    /// positioning, idle motor power-down disabled.
    pub async fn connect(port: &str, settings: &PositionerSettings) -> AppResult<Self> {
        let conn = SerialConnection::open(port, settings.baud_rate, settings.read_timeout)?;
        let printer = Self {
            conn,
            map: AxisMap::parse(&settings.axis_map)?,
            tolerance: settings.tolerance_mm,
            poll_interval: settings.poll_interval,
            move_timeout: settings.move_timeout,
        };
        printer.conn.write_line("G90").await?;
        printer.conn.write_line("M18 S0").await?;
        info!("Connected to motion stage on '{}'", port);
        Ok(printer)
    }

    /// Block until the firmware reports the motion queue drained.
    async fn wait_idle(&self, deadline: Duration) -> AppResult<()> {
        self.conn.clear_input().await?;
        self.conn.write_line("M400").await?;
        self.conn.write_line(&format!("M118 {IDLE_FENCE}")).await?;
        let start = Instant::now();
        loop {
            let remaining = deadline
                .checked_sub(start.elapsed())
                .ok_or_else(|| MapperError::Device("stage did not go idle in time".to_string()))?;
            let line = self.conn.read_line_within(remaining).await?;
            if line.starts_with(IDLE_FENCE) {
                return Ok(());
            }
            debug!("stage chatter while waiting: {}", line);
        }
    }
}

#[async_trait]
impl Positioner for GcodePrinter {
    async fn move_to(&mut self, target: Coordinate) -> AppResult<()> {
        let [x, y, z] = self.map.to_machine(target);
        self.conn
            .write_line(&format!("G0 X{x:.3} Y{y:.3} Z{z:.3}"))
            .await
    }

    async fn move_wait(&mut self, target: Coordinate) -> AppResult<()> {
        self.move_to(target).await?;
        let start = Instant::now();
        loop {
            tokio::time::sleep(self.poll_interval).await;
            let position = self.position().await?;
            if position.axis_distance(&target) <= self.tolerance {
                debug!("arrived at {} (reported {})", target, position);
                return Ok(());
            }
            let elapsed = start.elapsed();
            if elapsed > self.move_timeout {
                warn!(
                    "stage stuck at {} while moving to {} ({:?})",
                    position, target, elapsed
                );
                return Err(MapperError::MotionTimeout { target, elapsed });
            }
        }
    }

    async fn position(&mut self) -> AppResult<Coordinate> {
        self.conn.clear_input().await?;
        let report = self.conn.query("M114").await?;
        Ok(self.map.to_logical(parse_m114(&report)?))
    }

    async fn home(&mut self) -> AppResult<()> {
        info!("Homing stage, this can take a while");
        self.conn.write_line("G28").await?;
        self.wait_idle(self.move_timeout).await
    }

    async fn beep(&mut self) -> AppResult<()> {
        self.conn.write_line("M300 P100").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entries(a: &str, b: &str, c: &str) -> [String; 3] {
        [a.to_string(), b.to_string(), c.to_string()]
    }

    #[test]
    fn test_default_axis_map_matches_fixture() {
        let map = AxisMap::default();
        let machine = map.to_machine(Coordinate::new(1.0, 2.0, 3.0));
        assert_eq!(machine, [-3.0, -2.0, 1.0]);
    }

    #[test]
    fn test_axis_map_round_trip() {
        for entries in [
            entries("-z", "-y", "x"),
            entries("x", "y", "z"),
            entries("y", "-x", "+z"),
        ] {
            let map = AxisMap::parse(&entries).unwrap();
            let p = Coordinate::new(1.5, -2.25, 3.125);
            assert_eq!(map.to_logical(map.to_machine(p)), p);
        }
    }

    #[test]
    fn test_axis_map_rejects_bad_mappings() {
        assert!(AxisMap::parse(&entries("x", "x", "z")).is_err());
        assert!(AxisMap::parse(&entries("x", "y", "w")).is_err());
    }

    #[test]
    fn test_parse_m114_report() {
        let line = "X:12.00 Y:110.00 Z:250.40 E:0.00 Count X:960 Y:8800 Z:100160";
        assert_eq!(parse_m114(line).unwrap(), [12.0, 110.0, 250.4]);
    }

    #[test]
    fn test_parse_m114_rejects_garbage() {
        assert!(parse_m114("ok").is_err());
        assert!(parse_m114("X:abc Y:1 Z:2 E:0").is_err());
    }
}
