//! Integration tests for the scan orchestrator.
//!
//! Full sessions against the simulated instruments: completion, per-step
//! failures, pause/resume, stop, storage mode selection and start-up errors.

use std::sync::Arc;
use std::time::Duration;

use sweep_daq::config::Settings;
use sweep_daq::data::{AggregateResult, StorageMode};
use sweep_daq::hardware::mock::{AcquireBehavior, MockSpectrumAnalyzer, MockTunableLaser};
use sweep_daq::scan::{ScanConfig, ScanEvent, ScanOrchestrator, ScanState, Severity};
use sweep_daq::DaqError;
use tokio::sync::broadcast::{self, error::TryRecvError};
use tokio::time::{sleep, timeout};

const POINTS: usize = 1001;

fn config(start: f64, stop: f64, step: f64) -> ScanConfig {
    ScanConfig {
        wavelength_start_nm: start,
        wavelength_stop_nm: stop,
        wavelength_step_nm: step,
        dwell_s: 0.001,
        sweep_points: Some(POINTS),
        ..Default::default()
    }
}

fn orchestrator(settings: Settings, analyzer: Arc<MockSpectrumAnalyzer>) -> ScanOrchestrator {
    ScanOrchestrator::new(settings)
        .with_source(Arc::new(MockTunableLaser::new()))
        .with_analyzer(analyzer)
}

/// Everything already queued on the receiver.
fn drain(rx: &mut broadcast::Receiver<ScanEvent>) -> Vec<ScanEvent> {
    let mut events = Vec::new();
    loop {
        match rx.try_recv() {
            Ok(event) => events.push(event),
            Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return events,
            Err(TryRecvError::Lagged(n)) => panic!("listener lagged by {n} events"),
        }
    }
}

fn frame_indices(events: &[ScanEvent]) -> Vec<usize> {
    events
        .iter()
        .filter_map(|e| match e {
            ScanEvent::Frame { step_index, .. } => Some(*step_index),
            _ => None,
        })
        .collect()
}

fn alarms(events: &[ScanEvent]) -> Vec<(Severity, String)> {
    events
        .iter()
        .filter_map(|e| match e {
            ScanEvent::Alarm { message, severity } => Some((*severity, message.clone())),
            _ => None,
        })
        .collect()
}

fn states(events: &[ScanEvent]) -> Vec<ScanState> {
    events
        .iter()
        .filter_map(|e| match e {
            ScanEvent::StateChanged { state } => Some(*state),
            _ => None,
        })
        .collect()
}

async fn wait_for_frames(rx: &mut broadcast::Receiver<ScanEvent>, count: usize) -> Vec<ScanEvent> {
    let mut seen = Vec::new();
    while frame_indices(&seen).len() < count {
        let event = timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for frames")
            .expect("event channel closed");
        seen.push(event);
    }
    seen
}

#[tokio::test]
async fn equal_frames_fill_the_matrix() {
    let analyzer = Arc::new(MockSpectrumAnalyzer::new(POINTS));
    let laser = Arc::new(MockTunableLaser::new());
    let orch = ScanOrchestrator::new(Settings::default())
        .with_source(laser.clone())
        .with_analyzer(analyzer.clone());
    let mut rx = orch.subscribe();

    orch.start(config(1550.0, 1551.0, 0.25)).await.unwrap();
    let report = orch.wait().await.unwrap();
    let events = drain(&mut rx);

    assert_eq!(report.final_state, ScanState::Stopped);
    assert!(report.failure.is_none());
    assert_eq!(report.summary.total_steps, 5);
    assert_eq!(report.summary.successful_steps, 5);
    assert!(!report.summary.interrupted);

    let result = report.result.unwrap();
    assert_eq!(result.mode(), StorageMode::InMemory);
    assert_eq!(result.shape(), (POINTS, 5));
    let matrix = result.into_matrix().unwrap();
    assert_eq!(matrix.wavelengths_nm(), &[1550.0, 1550.25, 1550.5, 1550.75, 1551.0]);

    assert_eq!(frame_indices(&events), vec![0, 1, 2, 3, 4]);
    assert_eq!(
        states(&events),
        vec![
            ScanState::Initializing,
            ScanState::Stepping,
            ScanState::Finalizing,
            ScanState::Stopped
        ]
    );
    assert!(alarms(&events).is_empty());
    assert!(events
        .iter()
        .any(|e| matches!(e, ScanEvent::SessionComplete { .. })));

    let last_percent = events.iter().rev().find_map(|e| match e {
        ScanEvent::Progress { percent, .. } => Some(*percent),
        _ => None,
    });
    assert_eq!(last_percent, Some(100));

    assert_eq!(laser.tune_count(), 5);
    assert_eq!(analyzer.auto_scale_calls(), 1);
    assert_eq!(analyzer.current_settings().await.sweep_points, POINTS);
}

#[tokio::test]
async fn mismatched_frame_is_dropped_with_one_alarm() {
    let analyzer = Arc::new(
        MockSpectrumAnalyzer::new(POINTS)
            .with_script([AcquireBehavior::Normal, AcquireBehavior::Length(998)]),
    );
    let orch = orchestrator(Settings::default(), analyzer);
    let mut rx = orch.subscribe();

    orch.start(config(1550.0, 1550.5, 0.5)).await.unwrap();
    let report = orch.wait().await.unwrap();
    let events = drain(&mut rx);

    assert_eq!(report.result.unwrap().shape(), (POINTS, 1));
    assert_eq!(report.summary.completed_steps, 2);
    assert_eq!(report.summary.successful_steps, 1);
    assert_eq!(report.final_state, ScanState::Stopped);

    let raised = alarms(&events);
    assert_eq!(raised.len(), 1, "{raised:?}");
    assert!(raised[0].1.contains("998"));
}

#[tokio::test]
async fn failed_and_empty_acquisitions_are_skipped() {
    let analyzer = Arc::new(
        MockSpectrumAnalyzer::new(POINTS)
            .with_script([AcquireBehavior::Fail, AcquireBehavior::Empty]),
    );
    let orch = orchestrator(Settings::default(), analyzer);
    let mut rx = orch.subscribe();

    orch.start(config(1550.0, 1551.0, 0.5)).await.unwrap();
    let report = orch.wait().await.unwrap();
    let events = drain(&mut rx);

    assert_eq!(report.summary.completed_steps, 3);
    assert_eq!(report.summary.successful_steps, 1);
    assert_eq!(report.result.unwrap().shape(), (POINTS, 1));
    assert_eq!(frame_indices(&events), vec![2]);

    let skipped: Vec<_> = alarms(&events)
        .into_iter()
        .filter(|(_, m)| m.contains("skipped"))
        .collect();
    assert_eq!(skipped.len(), 2);
}

#[tokio::test]
async fn slow_acquisition_times_out() {
    let mut settings = Settings::default();
    settings.scan.acquire_timeout_ms = 50;
    let analyzer = Arc::new(
        MockSpectrumAnalyzer::new(POINTS)
            .with_script([AcquireBehavior::Delay(Duration::from_millis(500))]),
    );
    let orch = orchestrator(settings, analyzer);
    let mut rx = orch.subscribe();

    orch.start(config(1550.0, 1550.5, 0.5)).await.unwrap();
    let report = orch.wait().await.unwrap();
    let events = drain(&mut rx);

    assert_eq!(report.summary.successful_steps, 1);
    assert!(alarms(&events).iter().any(|(_, m)| m.contains("timed out")));
}

#[tokio::test]
async fn tuning_failure_skips_every_step() {
    let orch = ScanOrchestrator::new(Settings::default())
        .with_source(Arc::new(MockTunableLaser::new().with_failing_tuning()))
        .with_analyzer(Arc::new(MockSpectrumAnalyzer::new(POINTS)));
    let mut rx = orch.subscribe();

    orch.start(config(1550.0, 1551.0, 0.5)).await.unwrap();
    let report = orch.wait().await.unwrap();
    let events = drain(&mut rx);

    assert_eq!(report.final_state, ScanState::Stopped);
    assert_eq!(report.summary.completed_steps, 3);
    assert_eq!(report.summary.successful_steps, 0);
    assert_eq!(report.summary.columns, 0);
    assert_eq!(alarms(&events).len(), 3);
}

#[tokio::test]
async fn peak_power_alarms_follow_thresholds() {
    let analyzer = Arc::new(
        MockSpectrumAnalyzer::new(POINTS)
            .with_script([AcquireBehavior::Peak(-60.0), AcquireBehavior::Peak(12.0)]),
    );
    let orch = orchestrator(Settings::default(), analyzer);
    let mut rx = orch.subscribe();

    orch.start(config(1550.0, 1551.0, 0.5)).await.unwrap();
    let report = orch.wait().await.unwrap();
    let events = drain(&mut rx);

    // alarms never drop data
    assert_eq!(report.summary.successful_steps, 3);

    let raised = alarms(&events);
    assert_eq!(raised.len(), 2, "{raised:?}");
    assert_eq!(raised[0].0, Severity::Warning);
    assert!(raised[0].1.contains("Low power"));
    assert_eq!(raised[1].0, Severity::Critical);
    assert!(raised[1].1.contains("High power"));
}

#[tokio::test]
async fn pause_freezes_and_resume_continues_from_same_step() {
    let analyzer =
        Arc::new(MockSpectrumAnalyzer::new(101).with_acquire_delay(Duration::from_millis(20)));
    let mut settings = Settings::default();
    settings.scan.pause_heartbeat_ms = 30;
    let orch = orchestrator(settings, analyzer.clone());
    let mut rx = orch.subscribe();

    // 21 steps
    orch.start(config(1500.0, 1510.0, 0.5)).await.unwrap();
    let mut seen = wait_for_frames(&mut rx, 3).await;

    orch.pause().await.unwrap();
    let mut state = orch.state_watch();
    timeout(
        Duration::from_secs(2),
        state.wait_for(|s| *s == ScanState::Paused),
    )
    .await
    .unwrap()
    .unwrap();

    seen.extend(drain(&mut rx));
    let frames_at_pause = frame_indices(&seen).len();
    let acquisitions_at_pause = analyzer.acquisitions();

    sleep(Duration::from_millis(200)).await;
    let during = drain(&mut rx);
    assert!(during
        .iter()
        .all(|e| !matches!(e, ScanEvent::Frame { .. } | ScanEvent::Progress { .. })));
    assert!(alarms(&during).iter().any(|(_, m)| m.contains("waiting")));
    assert_eq!(analyzer.acquisitions(), acquisitions_at_pause);
    assert_eq!(orch.state(), ScanState::Paused);

    orch.resume().await.unwrap();
    let report = orch.wait().await.unwrap();
    seen.extend(during);
    seen.extend(drain(&mut rx));

    assert!((3..21).contains(&frames_at_pause));
    assert_eq!(report.summary.successful_steps, 21);
    assert_eq!(frame_indices(&seen), (0..21).collect::<Vec<_>>());
    assert!(states(&seen).contains(&ScanState::Paused));
}

#[tokio::test]
async fn stop_lets_in_flight_step_finish() {
    let analyzer =
        Arc::new(MockSpectrumAnalyzer::new(101).with_acquire_delay(Duration::from_millis(100)));
    let orch = orchestrator(Settings::default(), analyzer.clone());
    let mut rx = orch.subscribe();

    orch.start(config(1500.0, 1510.0, 0.5)).await.unwrap();
    wait_for_frames(&mut rx, 1).await;

    let report = orch.stop_and_wait().await.unwrap();

    assert_eq!(report.final_state, ScanState::Stopped);
    assert!(report.summary.interrupted);
    assert!(report.summary.columns <= 2, "{}", report.summary.columns);
    assert_eq!(report.result.unwrap().shape().1, report.summary.columns);
    assert_eq!(analyzer.auto_scale_calls(), 1);
}

#[tokio::test]
async fn stop_while_paused_ends_without_more_acquisitions() {
    let analyzer =
        Arc::new(MockSpectrumAnalyzer::new(101).with_acquire_delay(Duration::from_millis(20)));
    let orch = orchestrator(Settings::default(), analyzer.clone());
    let mut rx = orch.subscribe();

    orch.start(config(1500.0, 1510.0, 0.5)).await.unwrap();
    wait_for_frames(&mut rx, 1).await;
    orch.pause().await.unwrap();
    let mut state = orch.state_watch();
    timeout(
        Duration::from_secs(2),
        state.wait_for(|s| *s == ScanState::Paused),
    )
    .await
    .unwrap()
    .unwrap();
    let acquisitions = analyzer.acquisitions();

    let report = orch.stop_and_wait().await.unwrap();
    assert_eq!(report.final_state, ScanState::Stopped);
    assert_eq!(analyzer.acquisitions(), acquisitions);
}

#[tokio::test]
async fn large_estimate_streams_to_disk() {
    let dir = tempfile::tempdir().unwrap();
    let mut settings = Settings::default();
    // 3 x 101 x 8 bytes is well above 0.001 MB
    settings.storage.memory_threshold_mb = 0.001;
    settings.storage.stream_dir = dir.path().to_path_buf();

    let analyzer = Arc::new(MockSpectrumAnalyzer::new(101));
    let orch = orchestrator(settings, analyzer);
    let mut rx = orch.subscribe();

    let mut cfg = config(1550.0, 1551.0, 0.5);
    cfg.sweep_points = Some(101);
    orch.start(cfg).await.unwrap();
    let report = orch.wait().await.unwrap();
    let events = drain(&mut rx);

    assert!(events
        .iter()
        .any(|e| matches!(e, ScanEvent::MemoryWarning { estimated_mb, .. } if *estimated_mb > 0.001)));
    assert_eq!(report.summary.storage_mode, StorageMode::Streamed);

    let handle = match report.result.unwrap() {
        AggregateResult::Streamed(handle) => handle,
        other => panic!("expected streamed result, got {other:?}"),
    };
    assert_eq!(handle.shape(), (101, 3));
    assert!(handle.data_path.starts_with(dir.path()));
    assert!(handle.manifest_path.exists());

    let matrix = handle.load_matrix().unwrap();
    assert_eq!(matrix.shape(), (101, 3));
    assert_eq!(matrix.wavelengths_nm(), &[1550.0, 1550.5, 1551.0]);
}

#[tokio::test]
async fn missing_analyzer_fails_before_any_step() {
    let laser = Arc::new(MockTunableLaser::new());
    let orch = ScanOrchestrator::new(Settings::default()).with_source(laser.clone());
    let mut rx = orch.subscribe();

    let err = orch.start(config(1550.0, 1551.0, 0.5)).await.unwrap_err();
    assert!(matches!(err, DaqError::DeviceNotConnected(ref d) if d == "analyzer"));
    assert_eq!(orch.state(), ScanState::Failed);
    assert_eq!(laser.tune_count(), 0);

    let events = drain(&mut rx);
    assert!(events
        .iter()
        .any(|e| matches!(e, ScanEvent::SessionFailed { .. })));
}

#[tokio::test]
async fn unwritable_stream_dir_fails_session() {
    let dir = tempfile::tempdir().unwrap();
    let blocker = dir.path().join("not_a_dir");
    std::fs::write(&blocker, b"x").unwrap();

    let mut settings = Settings::default();
    settings.storage.memory_threshold_mb = 0.0001;
    settings.storage.stream_dir = blocker.join("stream");
    let orch = orchestrator(settings, Arc::new(MockSpectrumAnalyzer::new(101)));

    let err = orch.start(config(1550.0, 1551.0, 0.5)).await.unwrap_err();
    assert!(matches!(err, DaqError::Resource(_)));
    assert_eq!(orch.state(), ScanState::Failed);
}

#[tokio::test]
async fn second_start_while_running_is_rejected() {
    let analyzer =
        Arc::new(MockSpectrumAnalyzer::new(101).with_acquire_delay(Duration::from_millis(50)));
    let orch = orchestrator(Settings::default(), analyzer);

    orch.start(config(1500.0, 1510.0, 0.5)).await.unwrap();
    let err = orch.start(config(1550.0, 1551.0, 0.5)).await.unwrap_err();
    assert!(matches!(err, DaqError::Configuration(_)));

    orch.stop_and_wait().await.unwrap();
}

#[tokio::test]
async fn orchestrator_can_run_consecutive_sessions() {
    let orch = orchestrator(Settings::default(), Arc::new(MockSpectrumAnalyzer::new(101)));

    let first = orch.start(config(1550.0, 1550.5, 0.5)).await.unwrap();
    assert_eq!(orch.wait().await.unwrap().summary.session_id, first);

    let second = orch.start(config(1550.0, 1551.0, 0.5)).await.unwrap();
    let report = orch.wait().await.unwrap();
    assert_ne!(first, second);
    assert_eq!(report.summary.columns, 3);
}

#[tokio::test]
async fn invalid_configs_never_start() {
    let orch = orchestrator(Settings::default(), Arc::new(MockSpectrumAnalyzer::new(101)));

    let inverted = config(1551.0, 1550.0, 0.5);
    assert!(matches!(
        orch.start(inverted).await,
        Err(DaqError::Configuration(_))
    ));

    // mock source tunes 1500-1600 nm
    let out_of_range = config(1450.0, 1460.0, 1.0);
    assert!(matches!(
        orch.start(out_of_range).await,
        Err(DaqError::Configuration(_))
    ));

    assert_eq!(orch.state(), ScanState::Idle);
}

#[tokio::test]
async fn recommended_points_drive_analyzer_setup() {
    let analyzer = Arc::new(MockSpectrumAnalyzer::new(101));
    let orch = orchestrator(Settings::default(), analyzer.clone());

    let mut cfg = config(1550.0, 1550.5, 0.5);
    cfg.sweep_points = None;
    // 1 GHz span at 1 MHz RBW
    orch.start(cfg).await.unwrap();
    let report = orch.wait().await.unwrap();

    assert_eq!(analyzer.current_settings().await.sweep_points, 2001);
    assert_eq!(report.summary.frequency_points, 2001);
}

#[tokio::test]
async fn pending_stop_survives_pause_and_resume() {
    let analyzer =
        Arc::new(MockSpectrumAnalyzer::new(101).with_acquire_delay(Duration::from_millis(100)));
    let orch = orchestrator(Settings::default(), analyzer.clone());

    // 6 steps; the first acquisition is still in flight when the commands land
    orch.start(config(1550.0, 1552.5, 0.5)).await.unwrap();
    sleep(Duration::from_millis(20)).await;
    orch.stop().await;

    assert!(matches!(orch.pause().await, Err(DaqError::InvalidState(_))));
    assert!(matches!(orch.resume().await, Err(DaqError::InvalidState(_))));

    let report = orch.wait().await.unwrap();
    assert_eq!(report.final_state, ScanState::Stopped);
    assert!(report.summary.columns <= 2, "{}", report.summary.columns);
    assert!(analyzer.acquisitions() <= 2);
}

#[tokio::test]
async fn resume_before_pause_is_observed_keeps_stepping() {
    let analyzer =
        Arc::new(MockSpectrumAnalyzer::new(101).with_acquire_delay(Duration::from_millis(50)));
    let orch = orchestrator(Settings::default(), analyzer);

    orch.start(config(1550.0, 1551.0, 0.5)).await.unwrap();
    orch.pause().await.unwrap();
    // a second pause is idempotent
    orch.pause().await.unwrap();
    orch.resume().await.unwrap();

    let report = orch.wait().await.unwrap();
    assert_eq!(report.summary.columns, 3);
}

#[tokio::test]
async fn vanishing_step_is_rejected_at_start() {
    let orch = orchestrator(Settings::default(), Arc::new(MockSpectrumAnalyzer::new(101)));

    let tiny = config(1500.0, 1600.0, 1e-300);
    assert!(matches!(
        orch.start(tiny).await,
        Err(DaqError::Configuration(_))
    ));
    assert_eq!(orch.state(), ScanState::Idle);
}

#[tokio::test]
async fn step_ceiling_comes_from_settings() {
    let mut settings = Settings::default();
    settings.scan.max_steps = 5;
    let orch = orchestrator(settings, Arc::new(MockSpectrumAnalyzer::new(101)));

    // 6 points
    assert!(matches!(
        orch.start(config(1550.0, 1552.5, 0.5)).await,
        Err(DaqError::Configuration(_))
    ));
    // 5 points
    orch.start(config(1550.0, 1552.0, 0.5)).await.unwrap();
    assert_eq!(orch.wait().await.unwrap().summary.columns, 5);
}

#[tokio::test]
async fn eta_follows_refreshed_sweep_time() {
    // start-up reading, then one refresh per step
    let analyzer = Arc::new(
        MockSpectrumAnalyzer::new(101).with_sweep_time_readings([50.0, 50.0, 4000.0]),
    );
    let orch = orchestrator(Settings::default(), analyzer);
    let mut rx = orch.subscribe();

    orch.start(config(1550.0, 1551.5, 0.5)).await.unwrap();
    orch.wait().await.unwrap();

    let etas: Vec<_> = drain(&mut rx)
        .into_iter()
        .filter_map(|e| match e {
            ScanEvent::Progress { eta, .. } => Some(eta),
            _ => None,
        })
        .collect();
    assert_eq!(etas.len(), 4);

    // after step 1: 3 x 51 ms left; after step 2: 2 x 4001 ms left
    let jump = etas[1] - etas[0];
    assert!(jump > chrono::Duration::seconds(7), "{jump}");
}

#[tokio::test]
async fn tuned_wavelength_is_used_when_readback_fails() {
    let laser = Arc::new(
        MockTunableLaser::new()
            .with_failing_readback()
            .with_settle_offset_nm(0.01),
    );
    let orch = ScanOrchestrator::new(Settings::default())
        .with_source(laser)
        .with_analyzer(Arc::new(MockSpectrumAnalyzer::new(101)));

    orch.start(config(1550.0, 1551.0, 0.5)).await.unwrap();
    let report = orch.wait().await.unwrap();
    let matrix = report.result.unwrap().into_matrix().unwrap();

    let expected = [1550.01, 1550.51, 1551.01];
    for (got, want) in matrix.wavelengths_nm().iter().zip(expected) {
        assert!((got - want).abs() < 1e-9, "{got} vs {want}");
    }
}
