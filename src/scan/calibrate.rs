//! Manual center calibration.
//!
//! An operator jogs the stage until the probe sits at the physical
//! reference point (the magnet center), then accepts the position. The
//! accepted coordinate becomes the scan center; nothing else is persisted.

use crate::error::{AppResult, MapperError};
use crate::geometry::Coordinate;
use crate::instrument::Positioner;
use tokio::io::{AsyncBufReadExt, BufReader};

/// One operator command in the jog session.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum JogCommand {
    /// Move one axis by a relative amount, e.g. `x 2.5` or `z -0.1`.
    Jog {
        /// Axis index: 0 = x, 1 = y, 2 = z.
        axis: usize,
        /// Relative distance in mm.
        delta: f64,
    },
    /// Absolute move, e.g. `goto 110 110 250`.
    Goto(Coordinate),
    /// Print the current position.
    Show,
    /// Accept the current position as the center.
    Accept,
}

/// Parse one line of operator input.
pub fn parse_command(line: &str) -> Result<JogCommand, String> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    match tokens.as_slice() {
        ["pos"] => Ok(JogCommand::Show),
        ["done"] => Ok(JogCommand::Accept),
        ["goto", x, y, z] => {
            let parse = |v: &str| {
                v.parse::<f64>()
                    .map_err(|_| format!("'{v}' is not a number"))
            };
            Ok(JogCommand::Goto(Coordinate::new(
                parse(x)?,
                parse(y)?,
                parse(z)?,
            )))
        }
        [axis, delta] => {
            let axis = match *axis {
                "x" => 0,
                "y" => 1,
                "z" => 2,
                other => return Err(format!("unknown axis '{other}' (use x, y or z)")),
            };
            let delta = delta
                .parse::<f64>()
                .map_err(|_| format!("'{delta}' is not a number"))?;
            Ok(JogCommand::Jog { axis, delta })
        }
        _ => Err("commands: <x|y|z> <mm>, goto <x> <y> <z>, pos, done".to_string()),
    }
}

/// Execute one command. Returns the accepted center once the operator is
/// done, `None` otherwise.
pub async fn apply_command<P: Positioner>(
    positioner: &mut P,
    command: JogCommand,
) -> AppResult<Option<Coordinate>> {
    match command {
        JogCommand::Jog { axis, delta } => {
            let mut target = positioner.position().await?;
            match axis {
                0 => target.x += delta,
                1 => target.y += delta,
                _ => target.z += delta,
            }
            positioner.move_wait(target).await?;
            println!("now at {}", positioner.position().await?);
            Ok(None)
        }
        JogCommand::Goto(target) => {
            positioner.move_wait(target).await?;
            println!("now at {}", positioner.position().await?);
            Ok(None)
        }
        JogCommand::Show => {
            println!("at {}", positioner.position().await?);
            Ok(None)
        }
        JogCommand::Accept => {
            let center = positioner.position().await?;
            println!("center set to {}", center);
            Ok(Some(center))
        }
    }
}

/// Interactive jog loop on stdin; returns the accepted center coordinate.
pub async fn interactive_center<P: Positioner>(positioner: &mut P) -> AppResult<Coordinate> {
    println!("Jog the probe to the magnet center.");
    println!("Commands: <x|y|z> <mm> (relative), goto <x> <y> <z>, pos, done");
    println!("at {}", positioner.position().await?);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        match parse_command(&line) {
            Ok(command) => {
                if let Some(center) = apply_command(positioner, command).await? {
                    return Ok(center);
                }
            }
            Err(help) => println!("{help}"),
        }
    }
    Err(MapperError::Device(
        "stdin closed before a center was accepted".to_string(),
    ))
}
