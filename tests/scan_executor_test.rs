//! Scan executor behavior against the mock device pair: resume, halting,
//! and the motion-before-measurement ordering invariant.

use fieldmapper::config::ScanSettings;
use fieldmapper::error::MapperError;
use fieldmapper::geometry::{Coordinate, ScanRegion, Shape};
use fieldmapper::instrument::mock::{call_journal, DeviceCall, MockPositioner, MockProbe};
use fieldmapper::scan::{drift_path, ScanOutcome, ScanRunner};
use fieldmapper::storage;
use std::path::Path;
use std::time::Duration;

fn fast_settings() -> ScanSettings {
    ScanSettings {
        settle: Duration::ZERO,
        remeasure_interval: 0,
    }
}

/// 27-point cube about the origin.
fn cube_region() -> ScanRegion {
    ScanRegion::new(
        Shape::Cube,
        Coordinate::new(0.0, 0.0, 0.0),
        10.0,
        None,
        5.0,
    )
    .unwrap()
}

/// Parse the coordinate columns back out of the sink.
fn persisted_coordinates(path: &Path) -> Vec<Coordinate> {
    let mut reader = csv::Reader::from_path(path).unwrap();
    reader
        .records()
        .map(|record| {
            let record = record.unwrap();
            Coordinate::new(
                record[0].parse().unwrap(),
                record[1].parse().unwrap(),
                record[2].parse().unwrap(),
            )
        })
        .collect()
}

#[tokio::test]
async fn test_complete_run_persists_every_point_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("map.csv");
    let region = cube_region();
    let points = region.enumerate().unwrap();

    let journal = call_journal();
    let mut runner = ScanRunner::new(
        MockPositioner::new(journal.clone()),
        MockProbe::new(journal.clone(), vec![1.5]),
        fast_settings(),
    );

    let outcome = runner.run(&region, 0, &out).await.unwrap();
    assert!(matches!(outcome, ScanOutcome::Completed { points: 27 }));
    assert_eq!(persisted_coordinates(&out), points);

    // Strict alternation: every reading immediately follows a confirmed
    // arrival at that sample's coordinate.
    let journal = journal.lock().await;
    assert_eq!(journal.len(), 2 * points.len());
    for (k, pair) in journal.chunks(2).enumerate() {
        assert_eq!(pair[0], DeviceCall::MoveWait(points[k]));
        assert_eq!(pair[1], DeviceCall::ReadField);
    }
}

#[tokio::test]
async fn test_motion_failure_halts_at_exact_index() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("map.csv");
    let region = cube_region();

    let journal = call_journal();
    // Convergence fails at the 5th point (0-indexed call 4).
    let mut runner = ScanRunner::new(
        MockPositioner::new(journal.clone()).fail_move_at(4),
        MockProbe::new(journal, vec![1.5]),
        fast_settings(),
    );

    let outcome = runner.run(&region, 0, &out).await.unwrap();
    match outcome {
        ScanOutcome::Halted { index, error } => {
            assert_eq!(index, 4);
            assert!(matches!(error, MapperError::MotionTimeout { .. }));
        }
        other => panic!("expected a halt, got {other:?}"),
    }
    // Exactly the four successful samples are on disk.
    assert_eq!(storage::data_rows(&out).unwrap(), 4);
}

#[tokio::test]
async fn test_probe_failure_halts_too() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("map.csv");
    let region = cube_region();

    let journal = call_journal();
    let mut runner = ScanRunner::new(
        MockPositioner::new(journal.clone()),
        MockProbe::new(journal, vec![1.5]).fail_read_at(7),
        fast_settings(),
    );

    let outcome = runner.run(&region, 0, &out).await.unwrap();
    match outcome {
        ScanOutcome::Halted { index, error } => {
            assert_eq!(index, 7);
            assert!(matches!(error, MapperError::ProbeRead(_)));
        }
        other => panic!("expected a halt, got {other:?}"),
    }
    assert_eq!(storage::data_rows(&out).unwrap(), 7);
}

#[tokio::test]
async fn test_resume_appends_exactly_the_remaining_indices() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("map.csv");
    let region = cube_region();
    let points = region.enumerate().unwrap();

    // First run halts at point 4.
    let journal = call_journal();
    let mut runner = ScanRunner::new(
        MockPositioner::new(journal.clone()).fail_move_at(4),
        MockProbe::new(journal, vec![1.5]),
        fast_settings(),
    );
    let outcome = runner.run(&region, 0, &out).await.unwrap();
    let resume_at = match outcome {
        ScanOutcome::Halted { index, .. } => index,
        other => panic!("expected a halt, got {other:?}"),
    };

    // Second run resumes where the first stopped.
    let journal = call_journal();
    let mut runner = ScanRunner::new(
        MockPositioner::new(journal.clone()),
        MockProbe::new(journal.clone(), vec![1.5]),
        fast_settings(),
    );
    let outcome = runner.run(&region, resume_at, &out).await.unwrap();
    assert!(matches!(outcome, ScanOutcome::Completed { .. }));

    // Row K holds point K for the whole sequence: no gaps, no duplicates.
    assert_eq!(persisted_coordinates(&out), points);

    // The resumed run never touched indices below the restart point.
    let journal = journal.lock().await;
    assert_eq!(
        journal[0],
        DeviceCall::MoveWait(points[resume_at]),
        "resume must start at the halted index"
    );
}

#[tokio::test]
async fn test_resume_truncates_stale_rows_past_restart_index() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("map.csv");
    let region = cube_region();
    let points = region.enumerate().unwrap();

    let journal = call_journal();
    let mut runner = ScanRunner::new(
        MockPositioner::new(journal.clone()),
        MockProbe::new(journal, vec![1.0]),
        fast_settings(),
    );
    runner.run(&region, 0, &out).await.unwrap();
    assert_eq!(storage::data_rows(&out).unwrap(), points.len());

    // Re-measuring from index 20: the 7 stale tail rows must be replaced,
    // not duplicated.
    let journal = call_journal();
    let mut runner = ScanRunner::new(
        MockPositioner::new(journal.clone()),
        MockProbe::new(journal, vec![2.0]),
        fast_settings(),
    );
    runner.run(&region, 20, &out).await.unwrap();

    assert_eq!(persisted_coordinates(&out), points);
    let content = std::fs::read_to_string(&out).unwrap();
    let readings: Vec<&str> = content
        .lines()
        .skip(1)
        .map(|line| line.rsplit(',').nth(1).unwrap())
        .collect();
    assert!(readings[..20].iter().all(|&b| b == "1"));
    assert!(readings[20..].iter().all(|&b| b == "2"));
}

#[tokio::test]
async fn test_restart_index_past_end_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("map.csv");
    let region = cube_region();

    let journal = call_journal();
    let mut runner = ScanRunner::new(
        MockPositioner::new(journal.clone()),
        MockProbe::new(journal, vec![1.5]),
        fast_settings(),
    );
    let result = runner.run(&region, 99, &out).await;
    assert!(matches!(
        result,
        Err(MapperError::InvalidResumeIndex { given: 99, total: 27 })
    ));
}

#[tokio::test]
async fn test_restart_with_missing_prefix_rows_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("map.csv");
    let region = cube_region();

    // Only 4 rows on disk, but the operator asks to resume at 10.
    let journal = call_journal();
    let mut runner = ScanRunner::new(
        MockPositioner::new(journal.clone()).fail_move_at(4),
        MockProbe::new(journal, vec![1.5]),
        fast_settings(),
    );
    runner.run(&region, 0, &out).await.unwrap();

    let journal = call_journal();
    let mut runner = ScanRunner::new(
        MockPositioner::new(journal.clone()),
        MockProbe::new(journal, vec![1.5]),
        fast_settings(),
    );
    let result = runner.run(&region, 10, &out).await;
    assert!(matches!(result, Err(MapperError::OutputSink(_))));
    // The sink was not disturbed.
    assert_eq!(storage::data_rows(&out).unwrap(), 4);
}

#[tokio::test]
async fn test_drift_remeasurement_goes_to_sibling_sink() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("map.csv");
    // 8-point cube, remeasuring every 2 points.
    let region = ScanRegion::new(
        Shape::Cube,
        Coordinate::new(0.0, 0.0, 0.0),
        10.0,
        None,
        10.0,
    )
    .unwrap();

    let journal = call_journal();
    let mut runner = ScanRunner::new(
        MockPositioner::new(journal.clone()),
        MockProbe::new(journal, vec![1.5]),
        ScanSettings {
            settle: Duration::ZERO,
            remeasure_interval: 2,
        },
    );
    let outcome = runner.run(&region, 0, &out).await.unwrap();
    assert!(matches!(outcome, ScanOutcome::Completed { points: 8 }));

    // The map sink keeps one row per index; references live next door.
    assert_eq!(storage::data_rows(&out).unwrap(), 8);
    let drift = drift_path(&out);
    // Before points 0, 2, 4, 6 plus the closing reference.
    assert_eq!(storage::data_rows(&drift).unwrap(), 5);

    let mut reader = csv::Reader::from_path(&drift).unwrap();
    let indices: Vec<String> = reader
        .records()
        .map(|r| r.unwrap()[0].to_string())
        .collect();
    assert_eq!(indices, vec!["0", "2", "4", "6", "8"]);
}

#[tokio::test]
async fn test_three_axis_probe_widens_the_rows() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("map.csv");
    let region = ScanRegion::new(
        Shape::Cube,
        Coordinate::new(0.0, 0.0, 0.0),
        10.0,
        None,
        10.0,
    )
    .unwrap();

    let journal = call_journal();
    let mut runner = ScanRunner::new(
        MockPositioner::new(journal.clone()),
        MockProbe::new(journal, vec![1.5]).three_axis(),
        fast_settings(),
    );
    runner.run(&region, 0, &out).await.unwrap();

    let content = std::fs::read_to_string(&out).unwrap();
    let mut lines = content.lines();
    assert_eq!(lines.next().unwrap(), "x,y,z,B_mag,B_x,B_y,B_z,T");
    assert_eq!(lines.next().unwrap().split(',').count(), 8);
}
