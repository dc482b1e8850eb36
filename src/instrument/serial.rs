//! Line-oriented serial transport shared by both drivers.
//!
//! Wraps the `serialport` crate and provides async I/O by running the
//! blocking port operations on Tokio's blocking executor. Reads collect
//! bytes until the newline delimiter or an overall deadline; the port's own
//! short timeout only paces the loop.

use crate::error::{AppResult, MapperError};
use std::time::Duration;

#[cfg(feature = "instrument_serial")]
use log::debug;
#[cfg(feature = "instrument_serial")]
use serialport::SerialPort;
#[cfg(feature = "instrument_serial")]
use std::sync::Arc;
#[cfg(feature = "instrument_serial")]
use tokio::sync::Mutex;

/// A line-delimited serial connection to one instrument.
#[derive(Clone)]
pub struct SerialConnection {
    port_name: String,
    read_timeout: Duration,
    #[cfg(feature = "instrument_serial")]
    port: Arc<Mutex<Box<dyn SerialPort>>>,
}

#[cfg(feature = "instrument_serial")]
impl SerialConnection {
    /// Open the port. The short internal timeout paces the byte-read loop;
    /// `read_timeout` is the overall per-line deadline.
    pub fn open(port_name: &str, baud_rate: u32, read_timeout: Duration) -> AppResult<Self> {
        let port = serialport::new(port_name, baud_rate)
            .timeout(Duration::from_millis(100))
            .open()
            .map_err(|e| {
                MapperError::Device(format!(
                    "failed to open serial port '{port_name}' at {baud_rate} baud: {e}"
                ))
            })?;
        debug!("Serial port '{}' opened at {} baud", port_name, baud_rate);
        Ok(Self {
            port_name: port_name.to_string(),
            read_timeout,
            port: Arc::new(Mutex::new(port)),
        })
    }

    /// Write one newline-terminated command.
    pub async fn write_line(&self, command: &str) -> AppResult<()> {
        let port = self.port.clone();
        let line = format!("{command}\n");
        let name = self.port_name.clone();
        run_blocking(move || {
            use std::io::Write;
            let mut guard = port.blocking_lock();
            guard
                .write_all(line.as_bytes())
                .and_then(|_| guard.flush())
                .map_err(|e| MapperError::Device(format!("[{name}] serial write failed: {e}")))?;
            debug!("[{}] sent: {}", name, line.trim());
            Ok(())
        })
        .await
    }

    /// Read one line, trimmed, honoring the overall deadline.
    pub async fn read_line(&self) -> AppResult<String> {
        self.read_line_within(self.read_timeout).await
    }

    /// Read one line with an explicit deadline (homing and other long
    /// firmware operations need more than the default).
    pub async fn read_line_within(&self, deadline: Duration) -> AppResult<String> {
        let port = self.port.clone();
        let name = self.port_name.clone();
        run_blocking(move || {
            use std::io::Read;
            let mut guard = port.blocking_lock();
            let mut response = String::new();
            let mut buffer = [0u8; 1];
            let start = std::time::Instant::now();

            loop {
                if start.elapsed() > deadline {
                    return Err(MapperError::Device(format!(
                        "[{name}] serial read timeout after {deadline:?}"
                    )));
                }
                match guard.read(&mut buffer) {
                    Ok(1) => {
                        let ch = buffer[0] as char;
                        if ch == '\n' {
                            break;
                        }
                        response.push(ch);
                    }
                    Ok(_) => {
                        return Err(MapperError::Device(format!(
                            "[{name}] unexpected EOF from serial port"
                        )));
                    }
                    Err(e) if e.kind() == std::io::ErrorKind::TimedOut => continue,
                    Err(e) => {
                        return Err(MapperError::Device(format!(
                            "[{name}] serial read error: {e}"
                        )));
                    }
                }
            }

            let response = response.trim().to_string();
            debug!("[{}] received: {}", name, response);
            Ok(response)
        })
        .await
    }

    /// Write a command and read its one-line response.
    pub async fn query(&self, command: &str) -> AppResult<String> {
        self.write_line(command).await?;
        self.read_line().await
    }

    /// Drop any buffered unread input (stale `ok` chatter, old reports).
    pub async fn clear_input(&self) -> AppResult<()> {
        let port = self.port.clone();
        let name = self.port_name.clone();
        run_blocking(move || {
            let guard = port.blocking_lock();
            guard
                .clear(serialport::ClearBuffer::Input)
                .map_err(|e| MapperError::Device(format!("[{name}] failed to clear input: {e}")))
        })
        .await
    }
}

#[cfg(feature = "instrument_serial")]
async fn run_blocking<T, F>(f: F) -> AppResult<T>
where
    T: Send + 'static,
    F: FnOnce() -> AppResult<T> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|_| MapperError::Device("serial I/O task panicked".to_string()))?
}

#[cfg(not(feature = "instrument_serial"))]
impl SerialConnection {
    /// Serial support is compiled out; opening always fails.
    pub fn open(_port_name: &str, _baud_rate: u32, _read_timeout: Duration) -> AppResult<Self> {
        Err(MapperError::FeatureDisabled("instrument_serial"))
    }

    /// Unreachable without the serial feature.
    pub async fn write_line(&self, _command: &str) -> AppResult<()> {
        Err(MapperError::FeatureDisabled("instrument_serial"))
    }

    /// Unreachable without the serial feature.
    pub async fn read_line(&self) -> AppResult<String> {
        Err(MapperError::FeatureDisabled("instrument_serial"))
    }

    /// Unreachable without the serial feature.
    pub async fn read_line_within(&self, _deadline: Duration) -> AppResult<String> {
        Err(MapperError::FeatureDisabled("instrument_serial"))
    }

    /// Unreachable without the serial feature.
    pub async fn query(&self, _command: &str) -> AppResult<String> {
        Err(MapperError::FeatureDisabled("instrument_serial"))
    }

    /// Unreachable without the serial feature.
    pub async fn clear_input(&self) -> AppResult<()> {
        Err(MapperError::FeatureDisabled("instrument_serial"))
    }
}
