//! The per-refresh control loop.

use std::collections::VecDeque;
use std::io::Write;

use comptrack_core::{
    buffeting_force, AdditionalForceCycle, Assessment, ForceSet, Frame, InputEvent, InputSampler,
    PointerPort, PositionState, ProbeOutcome, TonePlayer,
};
use comptrack_timing::Clock;
use rand::Rng;
use serde::Serialize;
use tracing::{debug, info};

use crate::assessor::{PerformanceAssessor, PerformanceSignal};
use crate::config::TaskConfig;
use crate::error::ConfigError;
use crate::mitigation::{Factors, Mitigation, MitigationController, MitigationKind, RampFactor};
use crate::recorder::FrameRecorder;
use crate::scheduler::{TaskMode, TrialScheduler};

/// What the collaborator should draw this refresh. The engine never
/// draws; it only decides whether and with what state to ask.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RenderPlan {
    /// Tracking display with the cursor at `position`.
    Tracking { position: f64 },
    /// Probe counter showing seconds elapsed since onset.
    Probe { elapsed: f64 },
    /// Blank frame (screen-clearing pause).
    Blank,
    /// Draw nothing; whatever was last drawn stays up.
    Skip,
}

/// Discrete events surfaced by one refresh tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TickEvent {
    TrialStarted { trial: usize, onset: f64 },
    ProbeStarted { trial: usize },
    TrialEnded { trial: usize, outcome: ProbeOutcome },
    MitigationEnded(MitigationKind),
    SessionComplete,
}

/// Everything one refresh produced.
pub struct RefreshReport {
    pub render: RenderPlan,
    pub events: Vec<TickEvent>,
}

/// A mitigation selection made by experiment policy in response to a
/// performance signal. Durations and pause flags come from the task
/// configuration.
pub enum MitigationRequest {
    Audio { tone: Box<dyn TonePlayer> },
    Pause,
    Ramp { factors: Vec<RampFactor> },
}

/// Policy hook invoked once per raised signal; returning a request
/// activates that mitigation. The default hook ignores every signal.
pub type SignalHook = Box<dyn FnMut(PerformanceSignal, &Assessment) -> Option<MitigationRequest>>;

/// End-of-session aggregate over all probe outcomes.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub trials_completed: usize,
    pub response_rate: f64,
    pub mean_rt: Option<f64>,
    pub min_rt: Option<f64>,
    pub max_rt: Option<f64>,
}

#[derive(Serialize)]
struct SessionExport<'a> {
    frames: &'a [Vec<Frame>],
    assessments: &'a [Assessment],
}

/// Compensatory tracking engine.
///
/// Owns the cursor position, the frame telemetry, the probe schedule,
/// the performance assessor and the mitigation slot; everything is
/// mutated from [`refresh`] on a single thread.
///
/// [`refresh`]: CompTrack::refresh
pub struct CompTrack<C: Clock, P: PointerPort> {
    config: TaskConfig,
    clock: C,
    pointer: P,
    position: PositionState,
    sampler: InputSampler,
    recorder: FrameRecorder,
    scheduler: TrialScheduler,
    assessor: PerformanceAssessor,
    mitigations: MitigationController,
    factors: Factors,
    additional_force: Option<AdditionalForceCycle>,
    itis: VecDeque<f64>,
    outcomes: Vec<ProbeOutcome>,
    on_signal: Option<SignalHook>,
    trial_number: usize,
    probe_announced: bool,
    started: bool,
    complete: bool,
}

impl<C: Clock, P: PointerPort> CompTrack<C, P> {
    /// Validates the configuration and precomputes the ITI sequence.
    /// Infeasible configurations fail here, before any trial runs.
    pub fn new<R: Rng>(
        config: TaskConfig,
        clock: C,
        pointer: P,
        rng: &mut R,
    ) -> Result<Self, ConfigError> {
        let itis: VecDeque<f64> = config.generate_itis(rng)?.into();

        let position = PositionState::new(config.screen_width, config.cursor_diameter);
        let additional_force = config
            .additional_force
            .map(|c| AdditionalForceCycle::build(c.start, c.stop, c.count));
        let factors = Factors {
            max_input_step: config.max_input_step,
            additional_force_gain: 1.0,
        };
        let assessor = PerformanceAssessor::new(
            config.assessment_sample_size,
            config.assessing,
            config.excessive_lapse_threshold,
            config.max_mean_rt,
        );

        Ok(Self {
            config,
            clock,
            pointer,
            position,
            sampler: InputSampler,
            recorder: FrameRecorder::new(),
            scheduler: TrialScheduler::new(),
            assessor,
            mitigations: MitigationController::new(),
            factors,
            additional_force,
            itis,
            outcomes: Vec::new(),
            on_signal: None,
            trial_number: 0,
            probe_announced: false,
            started: false,
            complete: false,
        })
    }

    /// Opens trial 1 and schedules its probe onset.
    pub fn start_session(&mut self) {
        assert!(!self.started, "session already started");
        self.started = true;
        self.trial_number = 1;
        self.recorder.begin_trial();

        let iti = self
            .itis
            .pop_front()
            .expect("validated config yields at least one ITI");
        let onset = self.clock.now() + iti;
        self.scheduler.schedule(onset);
        info!(trial = self.trial_number, onset, "session started");
    }

    /// Drives one refresh tick: mitigation lifecycle, frame telemetry,
    /// force and input integration, probe response/timeout handling,
    /// and the render decision. Called once per display refresh with
    /// the events the platform layer collected since the last tick.
    pub fn refresh(&mut self, events: &[InputEvent]) -> RefreshReport {
        assert!(self.started, "session not started");
        let now = self.clock.now();
        let mut tick_events = Vec::new();

        if let Some(kind) = self.mitigations.update(now, &mut self.factors) {
            tick_events.push(TickEvent::MitigationEnded(kind));
        }

        if self.complete {
            return RefreshReport {
                render: self.render_plan(now),
                events: tick_events,
            };
        }

        // one frame per refresh, seeded with the pre-update position
        let seq = self.recorder.next_seq();
        self.recorder.push(Frame::new(
            self.config.participant_id,
            self.config.block_of(self.trial_number),
            self.trial_number,
            seq,
            now,
            self.position.position(),
        ));

        let buffeting = buffeting_force(now);
        let gain = self.factors.additional_force_gain;
        let additional = self
            .additional_force
            .as_mut()
            .map(|cycle| cycle.next_value() * gain);
        // net carries the buffeting term only; the additional term is
        // recorded and applied but never summed into net
        let net = buffeting;

        // each recorded term integrates independently, absent terms skip
        self.position.integrate(net);
        if let Some(extra) = additional {
            self.position.integrate(extra);
        }
        self.position.integrate(buffeting);

        // input sampling is suppressed entirely while paused
        let user_input = if self.mitigations.is_paused() {
            0.0
        } else {
            self.sampler.sample(
                events,
                self.config.supervise_input,
                self.factors.max_input_step,
                &mut self.pointer,
            )
        };
        self.position.integrate(user_input);

        let position = self.position.position();
        let displacement = self.position.displacement();
        if let Some(frame) = self.recorder.current_frame_mut() {
            frame.forces = ForceSet {
                buffeting,
                additional,
                net,
            };
            frame.user_input = user_input;
            frame.target_position = position;
            frame.displacement = displacement;
        }

        if self.scheduler.mode(now) == Some(TaskMode::ProbeActive) {
            if !self.probe_announced {
                self.probe_announced = true;
                debug!(trial = self.trial_number, "probe onset");
                tick_events.push(TickEvent::ProbeStarted {
                    trial: self.trial_number,
                });
            }

            let elapsed = self.scheduler.probe_elapsed(now).unwrap_or(0.0);
            let responded = events.iter().any(|event| {
                matches!(event, InputEvent::KeyPress { key } if *key == self.config.response_key)
            });

            if responded {
                self.end_trial(ProbeOutcome::Response { rt: elapsed }, now, &mut tick_events);
            } else if elapsed >= self.config.probe_timeout {
                self.end_trial(ProbeOutcome::Lapse, now, &mut tick_events);
            }
        }

        RefreshReport {
            render: self.render_plan(now),
            events: tick_events,
        }
    }

    fn end_trial(&mut self, outcome: ProbeOutcome, now: f64, tick_events: &mut Vec<TickEvent>) {
        info!(trial = self.trial_number, ?outcome, "trial ended");

        if let Some(frame) = self.recorder.current_frame_mut() {
            debug_assert!(frame.outcome.is_none(), "trial outcome written twice");
            frame.outcome = Some(outcome);
        }
        self.outcomes.push(outcome);
        tick_events.push(TickEvent::TrialEnded {
            trial: self.trial_number,
            outcome,
        });

        if let Some((assessment, signals)) = self.assessor.assess(
            &self.outcomes,
            self.config.participant_id,
            self.trial_number,
            self.config.block_of(self.trial_number),
            now,
        ) {
            if let Some(mut hook) = self.on_signal.take() {
                for signal in signals {
                    if let Some(request) = hook(signal, &assessment) {
                        self.activate_mitigation(request);
                    }
                }
                self.on_signal = Some(hook);
            }
        }

        if self.config.reset_position_after_probe {
            self.position.reset_to_center();
        }
        self.scheduler.clear();
        self.probe_announced = false;

        match self.itis.pop_front() {
            Some(iti) => {
                self.trial_number += 1;
                self.recorder.begin_trial();
                let onset = now + iti;
                self.scheduler.schedule(onset);
                tick_events.push(TickEvent::TrialStarted {
                    trial: self.trial_number,
                    onset,
                });
            }
            None => {
                self.complete = true;
                info!("session complete");
                tick_events.push(TickEvent::SessionComplete);
            }
        }
    }

    fn render_plan(&self, now: f64) -> RenderPlan {
        if let Some((clear_screen, retain_targets)) = self.mitigations.pause_flags() {
            // retain-targets wins when both pause flags are set
            if retain_targets {
                return RenderPlan::Skip;
            }
            if clear_screen {
                return RenderPlan::Blank;
            }
        }
        match self.scheduler.probe_elapsed(now) {
            Some(elapsed) => RenderPlan::Probe { elapsed },
            None => RenderPlan::Tracking {
                position: self.position.position(),
            },
        }
    }

    /// Activates the requested mitigation with durations and flags from
    /// the task configuration. Refused while another mitigation runs.
    pub fn activate_mitigation(&mut self, request: MitigationRequest) -> bool {
        let now = self.clock.now();
        let mitigation = match request {
            MitigationRequest::Audio { tone } => {
                Mitigation::audio(tone, self.config.audio_warning_duration, now)
            }
            MitigationRequest::Pause => Mitigation::pause(
                self.config.pause_duration,
                self.config.pausing_clears_screen,
                self.config.pause_retains_targets,
                now,
            ),
            MitigationRequest::Ramp { factors } => {
                Mitigation::ramp(factors, self.config.ramp_duration, now, &self.factors)
            }
        };
        self.mitigations.activate(mitigation)
    }

    /// Installs the policy hook consulted when an assessment raises a
    /// signal.
    pub fn set_signal_hook(&mut self, hook: SignalHook) {
        self.on_signal = Some(hook);
    }

    /// Installs the mitigation onset message callback.
    pub fn set_onset_message(&mut self, callback: Box<dyn FnMut(MitigationKind)>) {
        self.mitigations.set_onset_message(callback);
    }

    /// Remaining seconds until the next probe; exactly 0.0 while a
    /// probe is active. Panics when nothing is scheduled.
    pub fn time_until_next_trial(&self) -> f64 {
        self.scheduler.time_until_next_trial(self.clock.now())
    }

    pub fn scheduler(&self) -> &TrialScheduler {
        &self.scheduler
    }

    pub fn position(&self) -> f64 {
        self.position.position()
    }

    pub fn factors(&self) -> &Factors {
        &self.factors
    }

    pub fn is_mitigating(&self) -> bool {
        self.mitigations.is_active()
    }

    pub fn active_mitigation(&self) -> Option<MitigationKind> {
        self.mitigations.active_kind()
    }

    pub fn trial_number(&self) -> usize {
        self.trial_number
    }

    pub fn is_complete(&self) -> bool {
        self.complete
    }

    pub fn config(&self) -> &TaskConfig {
        &self.config
    }

    pub fn clock_mut(&mut self) -> &mut C {
        &mut self.clock
    }

    /// Frames grouped by trial, in recording order.
    pub fn frames(&self) -> &[Vec<Frame>] {
        self.recorder.trials()
    }

    pub fn assessments(&self) -> &[Assessment] {
        self.assessor.assessments()
    }

    pub fn outcomes(&self) -> &[ProbeOutcome] {
        &self.outcomes
    }

    pub fn summary(&self) -> SessionSummary {
        let rts: Vec<f64> = self.outcomes.iter().filter_map(ProbeOutcome::rt).collect();
        let trials_completed = self.outcomes.len();
        let response_rate = if trials_completed == 0 {
            0.0
        } else {
            rts.len() as f64 / trials_completed as f64
        };
        let mean_rt = if rts.is_empty() {
            None
        } else {
            Some(rts.iter().sum::<f64>() / rts.len() as f64)
        };

        SessionSummary {
            trials_completed,
            response_rate,
            mean_rt,
            min_rt: rts.iter().copied().reduce(f64::min),
            max_rt: rts.iter().copied().reduce(f64::max),
        }
    }

    /// Writes the session's frames (grouped by trial) and assessments
    /// as JSON, in persistence field order.
    pub fn export_json<W: Write>(&self, writer: W) -> serde_json::Result<()> {
        serde_json::to_writer_pretty(
            writer,
            &SessionExport {
                frames: self.recorder.trials(),
                assessments: self.assessor.assessments(),
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use comptrack_core::KeyCode;
    use comptrack_timing::ManualClock;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Default)]
    struct TestPort {
        recenters: usize,
    }

    impl PointerPort for TestPort {
        fn recenter(&mut self) {
            self.recenters += 1;
        }
    }

    struct TestTone {
        log: Rc<RefCell<Vec<&'static str>>>,
    }

    impl TonePlayer for TestTone {
        fn play(&mut self) {
            self.log.borrow_mut().push("play");
        }
        fn stop(&mut self) {
            self.log.borrow_mut().push("stop");
        }
    }

    fn test_config() -> TaskConfig {
        TaskConfig {
            trials_per_block: 2,
            blocks_per_experiment: 2,
            iti_range: (2.0, 3.0),
            probe_timeout: 1.0,
            session_duration: 10.0,
            assessment_sample_size: 2,
            excessive_lapse_threshold: 2,
            ..TaskConfig::default()
        }
    }

    fn engine(config: TaskConfig) -> CompTrack<ManualClock, TestPort> {
        let mut rng = StdRng::seed_from_u64(3);
        let mut engine =
            CompTrack::new(config, ManualClock::new(), TestPort::default(), &mut rng).unwrap();
        engine.start_session();
        engine
    }

    fn motion(dx: f64) -> InputEvent {
        InputEvent::PointerMotion { dx }
    }

    fn space() -> InputEvent {
        InputEvent::KeyPress {
            key: KeyCode::Space,
        }
    }

    /// Advance the clock to the scheduled probe onset.
    fn jump_to_probe(engine: &mut CompTrack<ManualClock, TestPort>) {
        let onset = engine.scheduler().scheduled_onset().unwrap();
        engine.clock_mut().set(onset);
    }

    #[test]
    fn one_frame_per_refresh_with_recorded_forces() {
        let mut engine = engine(test_config());

        engine.clock_mut().set(0.5);
        let report = engine.refresh(&[motion(3.0)]);
        assert!(matches!(report.render, RenderPlan::Tracking { .. }));

        engine.clock_mut().advance(0.016);
        engine.refresh(&[]);

        assert_eq!(engine.frames()[0].len(), 2);
        let frame = &engine.frames()[0][0];
        assert_eq!(frame.trial_number, 1);
        assert_eq!(frame.seq, 0);
        assert_eq!(frame.forces.buffeting, buffeting_force(0.5));
        assert_eq!(frame.forces.net, frame.forces.buffeting);
        assert_eq!(frame.forces.additional, None);
        assert_eq!(frame.user_input, 3.0);
        // net and buffeting both integrate, then the input delta
        let expected = 960.0 + 2.0 * buffeting_force(0.5) + 3.0;
        assert!((frame.target_position - expected).abs() < 1e-12);
        assert!((frame.displacement - (expected - 960.0).abs()).abs() < 1e-12);
    }

    #[test]
    fn probe_response_ends_the_trial_with_its_reaction_time() {
        let mut engine = engine(test_config());

        jump_to_probe(&mut engine);
        let report = engine.refresh(&[]);
        assert!(report
            .events
            .contains(&TickEvent::ProbeStarted { trial: 1 }));
        assert!(matches!(report.render, RenderPlan::Probe { .. }));
        assert_eq!(engine.time_until_next_trial(), 0.0);

        engine.clock_mut().advance(0.31);
        let report = engine.refresh(&[space()]);
        let ended = report.events.iter().find_map(|e| match e {
            TickEvent::TrialEnded { outcome, .. } => Some(*outcome),
            _ => None,
        });
        match ended {
            Some(ProbeOutcome::Response { rt }) => assert!((rt - 0.31).abs() < 1e-12),
            other => panic!("expected a response outcome, got {other:?}"),
        }

        // trial 2 opened and scheduled
        assert_eq!(engine.trial_number(), 2);
        assert!(engine.scheduler().is_scheduled());
        assert!(engine.time_until_next_trial() > 0.0);

        // the outcome landed on the final frame of trial 1, exactly once
        let trial_one = &engine.frames()[0];
        assert!(trial_one.last().unwrap().outcome.is_some());
        assert!(trial_one[..trial_one.len() - 1]
            .iter()
            .all(|f| f.outcome.is_none()));
    }

    #[test]
    fn probe_timeout_records_a_lapse() {
        let mut engine = engine(test_config());

        jump_to_probe(&mut engine);
        engine.refresh(&[]);
        engine.clock_mut().advance(1.0);
        let report = engine.refresh(&[]);

        assert!(report.events.iter().any(|e| matches!(
            e,
            TickEvent::TrialEnded {
                outcome: ProbeOutcome::Lapse,
                ..
            }
        )));
        assert_eq!(engine.outcomes(), &[ProbeOutcome::Lapse]);
    }

    #[test]
    fn position_resets_to_center_after_each_probe() {
        let mut engine = engine(test_config());

        engine.refresh(&[motion(25.0)]);
        assert!(engine.position() != 960.0);

        jump_to_probe(&mut engine);
        engine.refresh(&[space()]);
        assert_eq!(engine.position(), 960.0);
    }

    #[test]
    fn excessive_lapses_invoke_the_policy_hook_and_pause() {
        // pause shorter than the minimum ITI, so expiry cannot land
        // inside the next probe window
        let config = TaskConfig {
            pause_duration: 1.0,
            ..test_config()
        };
        let mut engine = engine(config);

        let signals = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&signals);
        engine.set_signal_hook(Box::new(move |signal, assessment| {
            sink.borrow_mut().push((signal, assessment.lapse_count));
            Some(MitigationRequest::Pause)
        }));

        for _ in 0..2 {
            jump_to_probe(&mut engine);
            engine.refresh(&[]);
            engine.clock_mut().advance(1.0);
            engine.refresh(&[]);
        }

        assert_eq!(
            *signals.borrow(),
            vec![(PerformanceSignal::ExcessiveLapses, 2)]
        );
        assert_eq!(engine.active_mitigation(), Some(MitigationKind::Pause));

        // paused: input is suppressed and the pointer is left alone
        let report = engine.refresh(&[motion(50.0)]);
        assert_eq!(report.render, RenderPlan::Skip);
        assert_eq!(engine.frames().last().unwrap().last().unwrap().user_input, 0.0);

        // pause expires after its configured duration
        engine.clock_mut().advance(1.0);
        let report = engine.refresh(&[]);
        assert!(report
            .events
            .contains(&TickEvent::MitigationEnded(MitigationKind::Pause)));
        assert!(!engine.is_mitigating());
    }

    #[test]
    fn clearing_pause_renders_blank_frames() {
        let config = TaskConfig {
            pausing_clears_screen: true,
            pause_retains_targets: false,
            ..test_config()
        };
        let mut engine = engine(config);

        engine.activate_mitigation(MitigationRequest::Pause);
        let report = engine.refresh(&[]);
        assert_eq!(report.render, RenderPlan::Blank);
    }

    #[test]
    fn audio_mitigation_drives_the_tone_lifecycle() {
        let mut engine = engine(test_config());
        let log = Rc::new(RefCell::new(Vec::new()));

        engine.activate_mitigation(MitigationRequest::Audio {
            tone: Box::new(TestTone {
                log: Rc::clone(&log),
            }),
        });
        assert_eq!(*log.borrow(), vec!["play"]);

        // audio does not suppress rendering or input
        let report = engine.refresh(&[motion(2.0)]);
        assert!(matches!(report.render, RenderPlan::Tracking { .. }));

        engine.clock_mut().advance(2.0);
        engine.refresh(&[]);
        assert_eq!(*log.borrow(), vec!["play", "stop"]);
    }

    #[test]
    fn session_completes_after_the_last_trial() {
        let mut engine = engine(test_config());

        let mut completed = false;
        for _ in 0..4 {
            jump_to_probe(&mut engine);
            engine.refresh(&[]);
            engine.clock_mut().advance(0.2);
            let report = engine.refresh(&[space()]);
            completed = report.events.contains(&TickEvent::SessionComplete);
        }
        assert!(completed);
        assert!(engine.is_complete());
        assert_eq!(engine.outcomes().len(), 4);
        assert_eq!(engine.frames().len(), 4);

        // post-session refreshes record nothing further
        let frames_before: usize = engine.frames().iter().map(Vec::len).sum();
        let report = engine.refresh(&[motion(1.0)]);
        assert!(matches!(report.render, RenderPlan::Tracking { .. }));
        let frames_after: usize = engine.frames().iter().map(Vec::len).sum();
        assert_eq!(frames_before, frames_after);

        let summary = engine.summary();
        assert_eq!(summary.trials_completed, 4);
        assert_eq!(summary.response_rate, 1.0);
        assert!(summary.mean_rt.is_some());
    }

    #[test]
    fn export_writes_frames_and_assessments() {
        let mut engine = engine(test_config());
        jump_to_probe(&mut engine);
        engine.refresh(&[]);
        engine.clock_mut().advance(0.4);
        engine.refresh(&[space()]);

        let mut buffer = Vec::new();
        engine.export_json(&mut buffer).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&buffer).unwrap();
        assert!(value["frames"].is_array());
        assert!(value["assessments"].is_array());
        assert_eq!(value["frames"][0].as_array().unwrap().len(), 2);
    }

    #[test]
    fn infeasible_configuration_fails_before_any_trial() {
        let config = TaskConfig {
            session_duration: 3.0,
            ..test_config()
        };
        let mut rng = StdRng::seed_from_u64(3);
        let result = CompTrack::new(config, ManualClock::new(), TestPort::default(), &mut rng);
        assert!(matches!(result, Err(ConfigError::SessionTooShort { .. })));
    }
}
