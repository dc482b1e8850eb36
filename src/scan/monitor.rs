//! Time-series variant: field drift at a fixed position.
//!
//! No motion is involved; the probe is read on a wall-clock interval and
//! every row carries its own timestamp and elapsed time. That makes
//! restarts trivial: a resumed run just appends more self-timestamped rows,
//! no index bookkeeping required.

use crate::config::MonitorSettings;
use crate::error::{AppResult, MapperError};
use crate::instrument::FieldProbe;
use crate::storage::CsvSink;
use log::info;
use std::path::Path;
use tokio::time::Instant;

/// Sample the field in place until `duration` has elapsed, appending to
/// `out_path`. Returns the number of rows written by this run.
pub async fn run<F: FieldProbe>(
    probe: &mut F,
    settings: &MonitorSettings,
    out_path: &Path,
) -> AppResult<usize> {
    if settings.interval.is_zero() {
        return Err(MapperError::InvalidMonitor(
            "interval must be positive".to_string(),
        ));
    }

    let mut sink = CsvSink::open_append(out_path, &header(probe.axes()))?;
    let mut ticker = tokio::time::interval(settings.interval);
    let started = Instant::now();
    let mut rows = 0usize;

    info!(
        "Monitoring field for {:?} at {:?} intervals into '{}'",
        settings.duration,
        settings.interval,
        out_path.display()
    );

    while started.elapsed() < settings.duration {
        ticker.tick().await;
        let timestamp = chrono::Utc::now();
        let field = probe.read_field().await?;
        let elapsed = started.elapsed().as_secs_f64();

        let mut row = vec![timestamp.to_rfc3339(), format!("{elapsed:.3}")];
        row.extend(field.values().iter().map(|v| v.to_string()));
        sink.append(&row)?;
        rows += 1;

        if rows % 600 == 0 {
            info!("{} samples so far, latest {}", rows, field);
        }
    }

    info!("Monitoring finished after {} samples", rows);
    Ok(rows)
}

fn header(axes: usize) -> Vec<&'static str> {
    let mut header = vec!["timestamp", "elapsed_s"];
    if axes == 1 {
        header.push("B");
    } else {
        header.extend_from_slice(&["B_mag", "B_x", "B_y", "B_z"]);
    }
    header
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_shape() {
        assert_eq!(header(1), vec!["timestamp", "elapsed_s", "B"]);
        assert_eq!(
            header(3),
            vec!["timestamp", "elapsed_s", "B_mag", "B_x", "B_y", "B_z"]
        );
    }
}
