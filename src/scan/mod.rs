//! The synchronized scan controller.
//!
//! [`Sampler`] owns the one invariant that makes a field map trustworthy:
//! a reading is only ever requested after a confirmed arrival at that exact
//! target. [`ScanRunner`] walks the enumerated sequence, streams every
//! sample to disk immediately, and on any device failure halts with the
//! exact index to restart from. There are no automatic retries: a map with
//! silently skipped or duplicated points is worse than a run that stops.

pub mod calibrate;
pub mod monitor;

use crate::config::ScanSettings;
use crate::error::{AppResult, MapperError};
use crate::geometry::{Coordinate, ScanRegion};
use crate::instrument::{FieldProbe, FieldReading, Positioner};
use crate::storage::{self, CsvSink};
use log::{info, warn};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// One acquired sample: a confirmed position and what the probe saw there.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Sample {
    /// Position in the enumeration sequence.
    pub index: usize,
    /// The commanded (and confirmed) coordinate.
    pub coordinate: Coordinate,
    /// Field reading.
    pub field: FieldReading,
    /// Probe temperature in degrees C.
    pub temperature: f64,
}

/// How a run ended.
#[derive(Debug)]
pub enum ScanOutcome {
    /// Every point in the sequence was measured and persisted.
    Completed {
        /// Total points in the sequence.
        points: usize,
    },
    /// A device failed; samples `start..index` are on disk and the run can
    /// be restarted with `--restart index`.
    Halted {
        /// The exact resumable index (the point that was NOT measured).
        index: usize,
        /// What went wrong there.
        error: MapperError,
    },
}

/// Takes one measurement: move, confirm arrival, settle, read.
pub struct Sampler<'a, P, F> {
    positioner: &'a mut P,
    probe: &'a mut F,
    settle: Duration,
}

impl<'a, P: Positioner, F: FieldProbe> Sampler<'a, P, F> {
    /// Borrow a device pair for sampling.
    pub fn new(positioner: &'a mut P, probe: &'a mut F, settle: Duration) -> Self {
        Self {
            positioner,
            probe,
            settle,
        }
    }

    /// Measure one point. The field is read only after `move_wait` has
    /// confirmed arrival at `coordinate` and the settle dwell has passed;
    /// failures are reported to the caller, never retried here.
    pub async fn sample(&mut self, index: usize, coordinate: Coordinate) -> AppResult<Sample> {
        self.positioner.move_wait(coordinate).await?;
        if !self.settle.is_zero() {
            tokio::time::sleep(self.settle).await;
        }
        let field = self.probe.read_field().await?;
        let temperature = self.probe.read_temperature().await?;
        Ok(Sample {
            index,
            coordinate,
            field,
            temperature,
        })
    }
}

/// Walks a region's coordinate sequence and persists every sample.
pub struct ScanRunner<P, F> {
    positioner: P,
    probe: F,
    settings: ScanSettings,
}

impl<P: Positioner, F: FieldProbe> ScanRunner<P, F> {
    /// Take exclusive ownership of both device handles for the run.
    pub fn new(positioner: P, probe: F, settings: ScanSettings) -> Self {
        Self {
            positioner,
            probe,
            settings,
        }
    }

    /// Access the stage, e.g. for the completion beep.
    pub fn positioner_mut(&mut self) -> &mut P {
        &mut self.positioner
    }

    /// Run the scan from `start_index`, appending to `out_path`.
    ///
    /// The coordinate sequence is regenerated from `region`; resuming
    /// therefore requires the same descriptor that produced the existing
    /// rows. Stale rows at or past `start_index` (from a previously halted
    /// run) are truncated away so the sink keeps exactly one row per index.
    pub async fn run(
        &mut self,
        region: &ScanRegion,
        start_index: usize,
        out_path: &Path,
    ) -> AppResult<ScanOutcome> {
        let points = region.enumerate()?;
        let total = points.len();
        if start_index > total {
            return Err(MapperError::InvalidResumeIndex {
                given: start_index,
                total,
            });
        }

        let existing = storage::data_rows(out_path)?;
        if existing > start_index {
            warn!(
                "'{}' already holds {} rows; dropping rows {}.. before resuming",
                out_path.display(),
                existing,
                start_index
            );
            storage::truncate_rows(out_path, start_index)?;
        } else if existing < start_index {
            return Err(MapperError::OutputSink(format!(
                "'{}' holds {} rows but the restart index is {}; refusing to leave a gap",
                out_path.display(),
                existing,
                start_index
            )));
        }

        let axes = self.probe.axes();
        let mut sink = CsvSink::open_append(out_path, &sample_header(axes))?;
        let mut drift = if self.settings.remeasure_interval > 0 {
            Some(CsvSink::open_append(
                &drift_path(out_path),
                &drift_header(axes),
            )?)
        } else {
            None
        };

        info!(
            "Scanning a {} of {} mm about {} at {} mm spacing: {} points, starting at {}",
            region.shape, region.extent, region.center, region.spacing, total, start_index
        );

        for (i, &coordinate) in points.iter().enumerate().skip(start_index) {
            if let Some(drift_sink) = drift.as_mut() {
                if i % self.settings.remeasure_interval == 0 {
                    if let Err(error) = remeasure_center(
                        &mut self.positioner,
                        &mut self.probe,
                        self.settings.settle,
                        region.center,
                        i,
                        drift_sink,
                    )
                    .await
                    {
                        warn!("center remeasurement before point {} failed: {}", i, error);
                        return Ok(ScanOutcome::Halted { index: i, error });
                    }
                }
            }

            let mut sampler =
                Sampler::new(&mut self.positioner, &mut self.probe, self.settings.settle);
            match sampler.sample(i, coordinate).await {
                Ok(sample) => {
                    sink.append(&sample_row(&sample))?;
                    info!(
                        "measured point {}/{} at {}: {}",
                        i + 1,
                        total,
                        coordinate,
                        sample.field
                    );
                }
                Err(error) => {
                    warn!("halting at point {}: {}", i, error);
                    return Ok(ScanOutcome::Halted { index: i, error });
                }
            }
        }

        if let Some(drift_sink) = drift.as_mut() {
            // A failed closing reference does not invalidate the finished map.
            if let Err(error) = remeasure_center(
                &mut self.positioner,
                &mut self.probe,
                self.settings.settle,
                region.center,
                total,
                drift_sink,
            )
            .await
            {
                warn!("closing center remeasurement failed: {}", error);
            }
        }

        info!("Scan complete: {} points in '{}'", total, out_path.display());
        Ok(ScanOutcome::Completed { points: total })
    }
}

/// Reference reading at the region center, recorded to the drift sink.
///
/// Drift rows live in their own file: interleaving them with the map rows
/// would break the one-row-per-index resume contract.
async fn remeasure_center<P: Positioner, F: FieldProbe>(
    positioner: &mut P,
    probe: &mut F,
    settle: Duration,
    center: Coordinate,
    before_index: usize,
    sink: &mut CsvSink,
) -> AppResult<()> {
    let sample = Sampler::new(positioner, probe, settle)
        .sample(before_index, center)
        .await?;
    sink.append(&drift_row(&sample))?;
    info!("center reference before point {}: {}", before_index, sample.field);
    Ok(())
}

/// Path of the drift sink next to the main output file.
pub fn drift_path(out_path: &Path) -> PathBuf {
    out_path.with_extension("drift.csv")
}

fn field_columns(axes: usize) -> &'static [&'static str] {
    if axes == 1 {
        &["B"]
    } else {
        &["B_mag", "B_x", "B_y", "B_z"]
    }
}

/// Header for the map sink given the probe's axis count.
pub fn sample_header(axes: usize) -> Vec<&'static str> {
    let mut header = vec!["x", "y", "z"];
    header.extend_from_slice(field_columns(axes));
    header.push("T");
    header
}

fn drift_header(axes: usize) -> Vec<&'static str> {
    let mut header = vec!["point_index", "x", "y", "z"];
    header.extend_from_slice(field_columns(axes));
    header.push("T");
    header
}

/// Map row: coordinate components, field value(s), temperature.
pub fn sample_row(sample: &Sample) -> Vec<String> {
    let mut row = vec![
        sample.coordinate.x.to_string(),
        sample.coordinate.y.to_string(),
        sample.coordinate.z.to_string(),
    ];
    row.extend(sample.field.values().iter().map(|v| v.to_string()));
    row.push(sample.temperature.to_string());
    row
}

fn drift_row(sample: &Sample) -> Vec<String> {
    let mut row = vec![sample.index.to_string()];
    row.extend(sample_row(sample));
    row
}
