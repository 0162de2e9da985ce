use comptrack_core::KeyCode;
use rand::Rng;

use crate::error::ConfigError;

/// Parameters for the additional-force modifier cycle. Absent from
/// [`TaskConfig`] by default; the additional term then contributes
/// nothing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ForceCycleConfig {
    pub start: f64,
    pub stop: f64,
    pub count: usize,
}

impl Default for ForceCycleConfig {
    fn default() -> Self {
        Self {
            start: 0.1,
            stop: 1.4,
            count: 100,
        }
    }
}

/// Which performance checks run after each completed probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AssessmentToggles {
    pub lapses: bool,
    pub mean_rt: bool,
}

impl Default for AssessmentToggles {
    fn default() -> Self {
        Self {
            lapses: true,
            mean_rt: true,
        }
    }
}

/// Full configuration surface consumed by the engine. Owned by the
/// collaborator that constructed it; validated once at setup.
#[derive(Debug, Clone)]
pub struct TaskConfig {
    pub participant_id: u32,
    /// Horizontal screen extent, in pixels.
    pub screen_width: f64,
    pub cursor_diameter: f64,
    /// Inter-trial interval range `[min, max]`, in seconds.
    pub iti_range: (f64, f64),
    /// Probe window after which a missing response is a lapse, seconds.
    pub probe_timeout: f64,
    /// Total session duration budget, seconds.
    pub session_duration: f64,
    pub trials_per_block: usize,
    pub blocks_per_experiment: usize,
    /// Reset the cursor to screen center when a probe ends.
    pub reset_position_after_probe: bool,
    pub supervise_input: bool,
    /// Saturation bound for supervised input, pixels per refresh.
    pub max_input_step: f64,
    /// Key that counts as a probe response.
    pub response_key: KeyCode,
    pub assessment_sample_size: usize,
    pub assessing: AssessmentToggles,
    /// Lapses per assessment window that trigger the lapse signal.
    pub excessive_lapse_threshold: usize,
    /// Mean reaction time, seconds, that triggers the slow-RT signal.
    pub max_mean_rt: f64,
    pub audio_warning_duration: f64,
    pub pause_duration: f64,
    pub pausing_clears_screen: bool,
    pub pause_retains_targets: bool,
    pub ramp_duration: f64,
    pub additional_force: Option<ForceCycleConfig>,
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            participant_id: 1,
            screen_width: 1920.0,
            cursor_diameter: 40.0,
            iti_range: (5.0, 10.0),
            probe_timeout: 1.0,
            session_duration: 750.0,
            trials_per_block: 10,
            blocks_per_experiment: 10,
            reset_position_after_probe: true,
            supervise_input: false,
            max_input_step: 4.0,
            response_key: KeyCode::Space,
            assessment_sample_size: 5,
            assessing: AssessmentToggles::default(),
            excessive_lapse_threshold: 3,
            max_mean_rt: 0.5,
            audio_warning_duration: 2.0,
            pause_duration: 5.0,
            pausing_clears_screen: false,
            pause_retains_targets: true,
            ramp_duration: 30.0,
            additional_force: None,
        }
    }
}

impl TaskConfig {
    pub fn trial_count(&self) -> usize {
        self.trials_per_block * self.blocks_per_experiment
    }

    /// Block number (1-based) a given 1-based trial number falls in.
    pub fn block_of(&self, trial_number: usize) -> usize {
        (trial_number.saturating_sub(1) / self.trials_per_block) + 1
    }

    /// Fails fast on any parameter combination no session could run
    /// with. Called before the first trial; the per-refresh path never
    /// re-validates.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let (iti_min, iti_max) = self.iti_range;

        if self.trial_count() == 0 {
            return Err(ConfigError::Invalid("trial count is zero"));
        }
        if !(iti_min > 0.0 && iti_max >= iti_min) {
            return Err(ConfigError::Invalid("ITI range must satisfy 0 < min <= max"));
        }
        if self.probe_timeout <= 0.0 {
            return Err(ConfigError::Invalid("probe timeout must be positive"));
        }
        if self.session_duration <= 0.0 {
            return Err(ConfigError::Invalid("session duration must be positive"));
        }
        if !(self.cursor_diameter > 0.0 && self.screen_width > self.cursor_diameter) {
            return Err(ConfigError::Invalid("screen must be wider than the cursor"));
        }
        if self.assessment_sample_size == 0 {
            return Err(ConfigError::Invalid("assessment window is empty"));
        }
        if self.supervise_input && self.max_input_step <= 0.0 {
            return Err(ConfigError::Invalid("supervised max step must be positive"));
        }

        let trials = self.trial_count() as f64;
        // a quarter of the probes are assumed to run to timeout
        let required = trials * iti_min + 0.25 * trials * self.probe_timeout;
        if self.session_duration < required {
            return Err(ConfigError::SessionTooShort {
                trials: self.trial_count(),
                required,
                available: self.session_duration,
            });
        }

        Ok(())
    }

    /// Precomputes one inter-trial interval per trial.
    ///
    /// Every interval starts at the range minimum; the session's surplus
    /// time is then handed out one second at a time to randomly chosen
    /// intervals still below the maximum. The result sums to at most the
    /// session duration and every element lies in `[min, max]`.
    pub fn generate_itis<R: Rng>(&self, rng: &mut R) -> Result<Vec<f64>, ConfigError> {
        self.validate()?;

        let trials = self.trial_count();
        let (iti_min, iti_max) = self.iti_range;
        let mut itis = vec![iti_min; trials];

        let mut surplus = self.session_duration - trials as f64 * iti_min;
        let absorbable = trials as f64 * (iti_max - iti_min).floor();
        if surplus > absorbable {
            return Err(ConfigError::SurplusUnabsorbable {
                surplus,
                min: iti_min,
                max: iti_max,
            });
        }

        while surplus >= 1.0 {
            let index = rng.random_range(0..trials);
            if itis[index] + 1.0 <= iti_max {
                itis[index] += 1.0;
                surplus -= 1.0;
            }
        }

        Ok(itis)
    }
}
