//! SCPI driver for the teslameter field probe.
//!
//! The probe answers SCPI queries over its USB serial port: `*IDN?` for the
//! handshake, `PROBE:AXES?` for the probe head's axis count, `FETCH:DC?` for
//! field readings and `FETCH:TEMPERATURE?` for the probe temperature.
//! Single-axis heads return one value; three-axis heads return
//! `magnitude,x,y,z`.

use crate::config::ProbeSettings;
use crate::error::{AppResult, MapperError};
use crate::instrument::serial::SerialConnection;
use crate::instrument::{FieldProbe, FieldReading};
use async_trait::async_trait;
use log::info;

/// The SCPI teslameter.
pub struct Teslameter {
    conn: SerialConnection,
    axes: usize,
}

impl Teslameter {
    /// Open the port, identify the instrument and query the probe head.
    pub async fn connect(port: &str, settings: &ProbeSettings) -> AppResult<Self> {
        let conn = SerialConnection::open(port, settings.baud_rate, settings.read_timeout)?;
        let idn = conn.query("*IDN?").await?;
        info!("Teslameter on '{}': {}", port, idn);

        let response = conn.query("PROBE:AXES?").await?;
        let axes: usize = response.trim().parse().map_err(|_| {
            MapperError::ProbeRead(format!("unexpected PROBE:AXES? response '{response}'"))
        })?;
        if axes != 1 && axes != 3 {
            return Err(MapperError::ProbeRead(format!(
                "unsupported probe head with {axes} axes"
            )));
        }
        info!("Operating in {}-axis mode", axes);
        Ok(Self { conn, axes })
    }

    fn parse_scalar(response: &str) -> AppResult<f64> {
        let trimmed = response.trim();
        if trimmed.is_empty() {
            return Err(MapperError::ProbeRead("empty response".to_string()));
        }
        trimmed.parse::<f64>().map_err(|_| {
            MapperError::ProbeRead(format!("unparseable field value '{trimmed}'"))
        })
    }

    fn parse_vector(response: &str) -> AppResult<FieldReading> {
        let values: Vec<f64> = response
            .split(',')
            .map(|v| v.trim().parse::<f64>())
            .collect::<Result<_, _>>()
            .map_err(|_| {
                MapperError::ProbeRead(format!("unparseable vector reading '{response}'"))
            })?;
        match values[..] {
            [magnitude, x, y, z] => Ok(FieldReading::Vector { magnitude, x, y, z }),
            _ => Err(MapperError::ProbeRead(format!(
                "expected 4 values (magnitude,x,y,z), got {} in '{response}'",
                values.len()
            ))),
        }
    }
}

#[async_trait]
impl FieldProbe for Teslameter {
    fn axes(&self) -> usize {
        self.axes
    }

    async fn read_field(&mut self) -> AppResult<FieldReading> {
        if self.axes == 1 {
            let response = self
                .conn
                .query("FETCH:DC? X")
                .await
                .map_err(|e| MapperError::ProbeRead(e.to_string()))?;
            Ok(FieldReading::Scalar(Self::parse_scalar(&response)?))
        } else {
            let response = self
                .conn
                .query("FETCH:DC? ALL")
                .await
                .map_err(|e| MapperError::ProbeRead(e.to_string()))?;
            Self::parse_vector(&response)
        }
    }

    async fn read_temperature(&mut self) -> AppResult<f64> {
        let response = self
            .conn
            .query("FETCH:TEMPERATURE?")
            .await
            .map_err(|e| MapperError::ProbeRead(e.to_string()))?;
        Self::parse_scalar(&response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_scalar_reading() {
        assert_eq!(Teslameter::parse_scalar(" 1.2345E-01 ").unwrap(), 0.12345);
        assert!(Teslameter::parse_scalar("").is_err());
        assert!(Teslameter::parse_scalar("OVERLOAD").is_err());
    }

    #[test]
    fn test_parse_vector_reading() {
        let reading = Teslameter::parse_vector("1.5,0.9,-0.8,0.6").unwrap();
        assert_eq!(
            reading,
            FieldReading::Vector {
                magnitude: 1.5,
                x: 0.9,
                y: -0.8,
                z: 0.6
            }
        );
        assert!(Teslameter::parse_vector("1.5,0.9").is_err());
        assert!(Teslameter::parse_vector("a,b,c,d").is_err());
    }
}
