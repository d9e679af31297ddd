//! ScanOrchestrator - state machine driving a swept acquisition
//!
//! The orchestrator validates a [`ScanConfig`], prepares the analyzer and the
//! storage backend, then hands the session to a worker task that runs the
//! step → acquire → store loop. Commands from other tasks are plain signals on
//! a watch channel; the worker observes them at the top of every iteration,
//! so an in-flight step always completes.
//!
//! # Usage
//!
//! ```rust,ignore
//! let orchestrator = ScanOrchestrator::new(settings)
//!     .with_source(laser)
//!     .with_analyzer(analyzer);
//!
//! let mut events = orchestrator.subscribe();
//! orchestrator.start(config).await?;
//!
//! while let Ok(event) = events.recv().await {
//!     match event {
//!         ScanEvent::Progress { percent, .. } => println!("{percent}%"),
//!         ScanEvent::SessionComplete { .. } => break,
//!         _ => {}
//!     }
//! }
//! let report = orchestrator.wait().await?;
//! ```

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{broadcast, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::config::{ScanSettings, Settings};
use crate::data::{AggregateResult, DataAggregator, StorageMode};
use crate::error::{AppResult, DaqError};
use crate::hardware::{SpectrumAnalyzer, WavelengthTunable};
use crate::scan::alarm::{AlarmLevel, AlarmMonitor, Severity};
use crate::scan::config::ScanConfig;
use crate::scan::events::ScanEvent;
use crate::scan::frame::SpectrumFrame;
use crate::scan::progress::ProgressReporter;
use crate::scan::sampler::{bounded, SpectrumSampler, StepOutcome};
use crate::scan::session::{ScanSession, ScanState, ScanSummary};
use crate::scan::stepper::WavelengthStepper;

/// Command signal observed by the worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Control {
    Run,
    Pause,
    Stop,
}

/// What the worker hands back when a session ends.
#[derive(Debug)]
pub struct ScanReport {
    /// Summary also carried by `SessionComplete`
    pub summary: ScanSummary,
    /// `Stopped` or `Failed`
    pub final_state: ScanState,
    /// `None` when the dataset could not be closed
    pub result: Option<AggregateResult>,
    /// Reason for a `Failed` session
    pub failure: Option<String>,
}

/// State publication shared by the orchestrator and its worker.
#[derive(Clone)]
struct Publisher {
    state: Arc<watch::Sender<ScanState>>,
    events: broadcast::Sender<ScanEvent>,
}

impl Publisher {
    fn transition(&self, next: ScanState) {
        let prev = self.state.send_replace(next);
        if prev != next {
            debug!(from = %prev, to = %next, "Scan state changed");
            self.emit(ScanEvent::StateChanged { state: next });
        }
    }

    fn emit(&self, event: ScanEvent) {
        // no listeners is fine
        let _ = self.events.send(event);
    }

    fn alarm(&self, severity: Severity, message: impl Into<String>) {
        let message = message.into();
        match severity {
            Severity::Info => info!(alarm = %message),
            Severity::Warning | Severity::Critical => warn!(%severity, alarm = %message),
        }
        self.emit(ScanEvent::alarm(severity, message));
    }

    fn fail(&self, reason: impl Into<String>) {
        let reason = reason.into();
        error!(%reason, "Scan session failed");
        self.transition(ScanState::Failed);
        self.emit(ScanEvent::SessionFailed { reason });
    }
}

/// Drives one swept acquisition at a time.
pub struct ScanOrchestrator {
    source: Option<Arc<dyn WavelengthTunable>>,
    analyzer: Option<Arc<dyn SpectrumAnalyzer>>,
    settings: Settings,
    publisher: Publisher,
    control: watch::Sender<Control>,
    worker: Mutex<Option<JoinHandle<ScanReport>>>,
}

impl ScanOrchestrator {
    /// Idle orchestrator with no instruments attached.
    pub fn new(settings: Settings) -> Self {
        let capacity = settings.application.event_channel_capacity.max(1);
        let (events, _) = broadcast::channel(capacity);
        let (state, _) = watch::channel(ScanState::Idle);
        let (control, _) = watch::channel(Control::Run);

        Self {
            source: None,
            analyzer: None,
            settings,
            publisher: Publisher {
                state: Arc::new(state),
                events,
            },
            control,
            worker: Mutex::new(None),
        }
    }

    /// Attach the swept source
    pub fn with_source(mut self, source: Arc<dyn WavelengthTunable>) -> Self {
        self.source = Some(source);
        self
    }

    /// Attach the spectrum analyzer
    pub fn with_analyzer(mut self, analyzer: Arc<dyn SpectrumAnalyzer>) -> Self {
        self.analyzer = Some(analyzer);
        self
    }

    /// Subscribe to scan events
    pub fn subscribe(&self) -> broadcast::Receiver<ScanEvent> {
        self.publisher.events.subscribe()
    }

    /// Last published lifecycle state
    pub fn state(&self) -> ScanState {
        *self.publisher.state.borrow()
    }

    /// Watch state transitions
    pub fn state_watch(&self) -> watch::Receiver<ScanState> {
        self.publisher.state.subscribe()
    }

    /// Begin a session.
    ///
    /// Returns once the worker is running; the session id is also carried by
    /// the final summary.
    #[instrument(skip(self, config), err)]
    pub async fn start(&self, config: ScanConfig) -> AppResult<Uuid> {
        config.validate()?;

        let mut worker_slot = self.worker.lock().await;
        let current = self.state();
        if !current.can_start() {
            return Err(DaqError::Configuration(format!(
                "Cannot start: scan is {current}"
            )));
        }
        // a finished worker may still be unjoined
        worker_slot.take();

        let (source, analyzer) = match (&self.source, &self.analyzer) {
            (Some(s), Some(a)) => (Arc::clone(s), Arc::clone(a)),
            (source, _) => {
                let missing = if source.is_none() { "source" } else { "analyzer" };
                self.publisher.fail(format!("No {missing} connected"));
                return Err(DaqError::DeviceNotConnected(missing.to_string()));
            }
        };
        config.validate_wavelength_range(source.wavelength_range())?;

        let stepper = WavelengthStepper::with_max_len(
            config.wavelength_start_nm,
            config.wavelength_stop_nm,
            config.wavelength_step_nm,
            self.settings.scan.max_steps,
        )?;

        self.control.send_replace(Control::Run);
        self.publisher.transition(ScanState::Initializing);
        info!(
            start_nm = config.wavelength_start_nm,
            stop_nm = config.wavelength_stop_nm,
            step_nm = config.wavelength_step_nm,
            steps = stepper.len(),
            "Initializing scan"
        );

        let scan = &self.settings.scan;
        let plan = config.plan_sweep_points(analyzer.max_sweep_points());
        if plan.capped {
            self.publisher.alarm(Severity::Warning, plan.message.clone());
        } else {
            debug!(points = plan.points, "{}", plan.message);
        }
        let analyzer_settings = config.analyzer_settings(plan.points);
        if let Err(e) = bounded(
            "configure",
            scan.analyzer_timeout(),
            analyzer.configure(&analyzer_settings),
        )
        .await
        {
            self.publisher.alarm(
                Severity::Warning,
                format!("Analyzer configuration failed, using current settings: {e}"),
            );
        }

        let dwell = config.dwell_or(scan.min_dwell());
        let sweep_time_ms =
            match bounded("sweep_time_ms", scan.analyzer_timeout(), analyzer.sweep_time_ms()).await
            {
                Ok(ms) => ms,
                Err(e) => {
                    self.publisher
                        .alarm(Severity::Info, format!("Sweep time unavailable: {e}"));
                    0.0
                }
            };
        let step_duration = ProgressReporter::step_duration_from(sweep_time_ms, dwell);

        let session = ScanSession::new(stepper.len(), step_duration);
        let mut aggregator = DataAggregator::from_settings(&self.settings.storage)
            .with_stream_stem(format!("scan_{}", session.id.simple()));
        let decision = match aggregator.choose_storage_mode(stepper.len(), plan.points) {
            Ok(decision) => decision,
            Err(e) => {
                self.publisher.fail(format!("Cannot prepare storage: {e}"));
                return Err(e);
            }
        };
        if decision.exceeds_budget() {
            self.publisher.emit(ScanEvent::MemoryWarning {
                estimated_mb: decision.estimated_mb,
                threshold_mb: decision.threshold_mb,
            });
        }

        let session_id = session.id;
        let worker = ScanWorker {
            source,
            analyzer: Arc::clone(&analyzer),
            sampler: SpectrumSampler::new(analyzer, scan.acquire_timeout()),
            stepper,
            aggregator,
            monitor: AlarmMonitor::from_settings(&self.settings.alarm),
            progress: ProgressReporter::new(session.total_steps, step_duration),
            session,
            dwell,
            timing: scan.clone(),
            control: self.control.subscribe(),
            publisher: self.publisher.clone(),
        };

        self.publisher.transition(ScanState::Stepping);
        *worker_slot = Some(tokio::spawn(worker.run()));
        info!(%session_id, mode = %decision.mode, "Scan started");
        Ok(session_id)
    }

    /// Request a pause at the top of the next iteration.
    ///
    /// Refused once a stop is pending; a stop is never overwritten.
    #[instrument(skip(self), err)]
    pub async fn pause(&self) -> AppResult<()> {
        let current = self.state();
        if current != ScanState::Stepping {
            return Err(DaqError::InvalidState(format!("Cannot pause: scan is {current}")));
        }
        let mut pending = Control::Run;
        self.control.send_if_modified(|signal| {
            pending = *signal;
            if *signal == Control::Run {
                *signal = Control::Pause;
                true
            } else {
                false
            }
        });
        match pending {
            Control::Run => {
                info!("Pause requested");
                Ok(())
            }
            Control::Pause => Ok(()),
            Control::Stop => Err(DaqError::InvalidState(
                "Cannot pause: stop already requested".to_string(),
            )),
        }
    }

    /// Cancel a pause, whether or not the worker has observed it yet.
    #[instrument(skip(self), err)]
    pub async fn resume(&self) -> AppResult<()> {
        let current = self.state();
        let resumable_state = matches!(current, ScanState::Paused | ScanState::Stepping);
        let mut pending = Control::Run;
        let resumed = self.control.send_if_modified(|signal| {
            pending = *signal;
            if resumable_state && *signal == Control::Pause {
                *signal = Control::Run;
                true
            } else {
                false
            }
        });
        if resumed {
            info!("Resume requested");
            return Ok(());
        }
        Err(DaqError::InvalidState(match pending {
            Control::Stop => "Cannot resume: stop already requested".to_string(),
            Control::Run | Control::Pause => format!("Cannot resume: scan is {current}"),
        }))
    }

    /// Request the loop to finish after the in-flight step. No-op when no
    /// session is running.
    #[instrument(skip(self))]
    pub async fn stop(&self) {
        let current = self.state();
        if matches!(
            current,
            ScanState::Initializing | ScanState::Stepping | ScanState::Paused
        ) {
            info!(state = %current, "Stop requested");
            self.control.send_replace(Control::Stop);
        } else {
            debug!(state = %current, "Stop ignored, no running session");
        }
    }

    /// Join the current worker.
    pub async fn wait(&self) -> AppResult<ScanReport> {
        let handle = self
            .worker
            .lock()
            .await
            .take()
            .ok_or_else(|| DaqError::InvalidState("No scan session to wait for".to_string()))?;
        Ok(handle.await?)
    }

    /// [`stop`](Self::stop) followed by [`wait`](Self::wait).
    pub async fn stop_and_wait(&self) -> AppResult<ScanReport> {
        self.stop().await;
        self.wait().await
    }
}

impl Drop for ScanOrchestrator {
    fn drop(&mut self) {
        self.control.send_replace(Control::Stop);
    }
}

enum LoopExit {
    Completed,
    Stopped,
    Failed(String),
}

struct ScanWorker {
    source: Arc<dyn WavelengthTunable>,
    analyzer: Arc<dyn SpectrumAnalyzer>,
    sampler: SpectrumSampler,
    stepper: WavelengthStepper,
    aggregator: DataAggregator,
    monitor: AlarmMonitor,
    progress: ProgressReporter,
    session: ScanSession,
    dwell: Duration,
    timing: ScanSettings,
    control: watch::Receiver<Control>,
    publisher: Publisher,
}

impl ScanWorker {
    #[instrument(skip(self), fields(session_id = %self.session.id, steps = self.session.total_steps))]
    async fn run(mut self) -> ScanReport {
        let exit = self.step_loop().await;
        self.finalize(exit).await
    }

    async fn step_loop(&mut self) -> LoopExit {
        for index in 0..self.stepper.len() {
            if !self.await_run_signal().await {
                info!(step = index, "Scan stopped before step");
                return LoopExit::Stopped;
            }

            let Some(target) = self.stepper.get(index) else {
                break;
            };
            self.session.current_step = index;

            if let Err(reason) = self.run_step(index, target).await {
                return LoopExit::Failed(reason);
            }

            if index + 1 < self.stepper.len() && self.dwell_interrupted().await {
                info!(step = index, "Scan stopped during dwell");
                return LoopExit::Stopped;
            }
        }
        LoopExit::Completed
    }

    /// Block while paused. Returns `false` when the loop must stop.
    async fn await_run_signal(&mut self) -> bool {
        let mut paused = false;
        loop {
            let signal = *self.control.borrow_and_update();
            match signal {
                Control::Run => {
                    if paused {
                        info!(step = self.session.current_step, "Scan resumed");
                        self.publisher.transition(ScanState::Stepping);
                    }
                    return true;
                }
                Control::Stop => return false,
                Control::Pause => {
                    if !paused {
                        paused = true;
                        info!(step = self.session.current_step, "Scan paused");
                        self.publisher.transition(ScanState::Paused);
                    }
                    match timeout(self.timing.pause_heartbeat(), self.control.changed()).await {
                        Ok(Ok(())) => {}
                        // orchestrator dropped
                        Ok(Err(_)) => return false,
                        Err(_) => self.publisher.alarm(Severity::Info, "Paused, waiting"),
                    }
                }
            }
        }
    }

    /// Sleep for the dwell unless a stop arrives first.
    async fn dwell_interrupted(&mut self) -> bool {
        let dwell = self.dwell;
        let control = &mut self.control;
        tokio::select! {
            _ = sleep(dwell) => false,
            _ = stop_signalled(control) => true,
        }
    }

    /// One step. Only an unrecoverable storage error is returned.
    async fn run_step(&mut self, index: usize, target: f64) -> Result<(), String> {
        let source_timeout = self.timing.source_timeout();
        let step_no = index + 1;

        let reported = match bounded(
            "set_wavelength",
            source_timeout,
            self.source.set_wavelength(target),
        )
        .await
        {
            Ok(reported) if reported.is_finite() => reported,
            Ok(_) => target,
            Err(e) => {
                self.publisher.alarm(
                    Severity::Warning,
                    format!("Step {step_no}: cannot reach {target:.4} nm, skipped: {e}"),
                );
                self.complete_step(target);
                return Ok(());
            }
        };

        let wavelength_nm =
            match bounded("wavelength", source_timeout, self.source.wavelength()).await {
                Ok(actual) if actual.is_finite() => actual,
                Ok(_) | Err(_) => {
                    debug!(target, reported, "Wavelength readback unavailable, using tuned value");
                    reported
                }
            };

        match self.sampler.sample().await {
            StepOutcome::Skipped { reason } => {
                self.publisher.alarm(
                    Severity::Warning,
                    format!("Step {step_no} at {wavelength_nm:.4} nm skipped: {reason}"),
                );
            }
            StepOutcome::Acquired(frame) => {
                match self.aggregator.append_column(&frame.powers, wavelength_nm) {
                    Ok(()) => {
                        self.session.successful_steps += 1;
                        self.publish_frame(index, wavelength_nm, &frame);
                    }
                    Err(e) if e.is_recoverable() => {
                        self.publisher.alarm(
                            Severity::Warning,
                            format!("Step {step_no} at {wavelength_nm:.4} nm dropped: {e}"),
                        );
                    }
                    Err(e) => {
                        self.complete_step(wavelength_nm);
                        return Err(e.to_string());
                    }
                }
            }
        }

        if self.timing.sweep_time_refresh_steps > 0
            && step_no % self.timing.sweep_time_refresh_steps == 0
        {
            self.refresh_step_duration().await;
        }
        self.complete_step(wavelength_nm);
        Ok(())
    }

    /// Re-read the analyzer sweep time and rebase the ETA on it.
    async fn refresh_step_duration(&mut self) {
        let sweep_time_ms = match bounded(
            "sweep_time_ms",
            self.timing.analyzer_timeout(),
            self.analyzer.sweep_time_ms(),
        )
        .await
        {
            Ok(ms) if ms.is_finite() && ms >= 0.0 => ms,
            Ok(ms) => {
                debug!(ms, "Ignoring invalid sweep time reading");
                return;
            }
            Err(e) => {
                debug!(error = %e, "Sweep time refresh failed");
                return;
            }
        };

        let step_duration = ProgressReporter::step_duration_from(sweep_time_ms, self.dwell);
        if step_duration != self.session.step_duration {
            debug!(
                step_ms = step_duration.as_millis() as u64,
                "Step duration estimate updated"
            );
            self.session.step_duration = step_duration;
            self.progress.set_step_duration(step_duration);
        }
    }

    fn publish_frame(&self, index: usize, wavelength_nm: f64, frame: &SpectrumFrame) {
        self.publisher.emit(ScanEvent::Frame {
            step_index: index,
            wavelength_nm,
            frequencies: frame.frequencies().into(),
            powers: Arc::clone(&frame.powers),
        });

        if let Some(peak) = frame.peak() {
            let level = self.monitor.classify(peak);
            if level != AlarmLevel::Normal {
                if let Some(message) = self.monitor.describe(level, peak, wavelength_nm) {
                    self.publisher.alarm(level.severity(), message);
                }
            }
        }
    }

    fn complete_step(&mut self, wavelength_nm: f64) {
        self.session.completed_steps += 1;
        let completed = self.session.completed_steps;
        self.publisher.emit(ScanEvent::Progress {
            percent: self.progress.percent(completed),
            wavelength_nm,
            completed_steps: completed,
            total_steps: self.session.total_steps,
            eta: self.progress.eta(completed),
        });
    }

    async fn finalize(self, exit: LoopExit) -> ScanReport {
        let ScanWorker {
            analyzer,
            aggregator,
            session,
            timing,
            publisher,
            ..
        } = self;
        publisher.transition(ScanState::Finalizing);

        if let Err(e) = bounded("auto_scale", timing.analyzer_timeout(), analyzer.auto_scale()).await
        {
            publisher.alarm(Severity::Warning, format!("Analyzer auto-scale failed: {e}"));
        }

        let mode = aggregator.mode();
        let frequency_points = aggregator.frequency_points().unwrap_or(0);
        let mut failure = match exit {
            LoopExit::Failed(reason) => Some(reason),
            LoopExit::Completed | LoopExit::Stopped => None,
        };

        let result = match aggregator.finalize() {
            Ok(result) => Some(result),
            Err(e) => {
                failure.get_or_insert_with(|| format!("Cannot close dataset: {e}"));
                None
            }
        };

        let columns = result.as_ref().map_or(0, |r| r.shape().1);
        if result.is_some() && columns != session.successful_steps {
            publisher.alarm(
                Severity::Warning,
                format!(
                    "Dataset holds {columns} columns but {} steps succeeded",
                    session.successful_steps
                ),
            );
        }

        let summary = ScanSummary {
            session_id: session.id,
            started_at: session.started_at,
            finished_at: Utc::now(),
            total_steps: session.total_steps,
            completed_steps: session.completed_steps,
            successful_steps: session.successful_steps,
            columns,
            frequency_points,
            storage_mode: mode.unwrap_or(StorageMode::InMemory),
            interrupted: session.completed_steps < session.total_steps,
        };
        info!(
            completed = summary.completed_steps,
            successful = summary.successful_steps,
            columns,
            step_ms = session.step_duration.as_millis() as u64,
            "Scan finished"
        );
        publisher.emit(ScanEvent::SessionComplete {
            summary: summary.clone(),
        });

        let final_state = match &failure {
            Some(reason) => {
                publisher.fail(reason.clone());
                ScanState::Failed
            }
            None => {
                publisher.transition(ScanState::Stopped);
                ScanState::Stopped
            }
        };

        ScanReport {
            summary,
            final_state,
            result,
            failure,
        }
    }
}

/// Resolves once the control signal reads `Stop` (or its sender is gone).
async fn stop_signalled(control: &mut watch::Receiver<Control>) {
    loop {
        let stop = *control.borrow_and_update() == Control::Stop;
        if stop || control.changed().await.is_err() {
            return;
        }
    }
}
