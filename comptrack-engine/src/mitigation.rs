//! Time-bounded mitigation behaviors and their controller.

use comptrack_core::TonePlayer;
use tracing::{info, warn};

/// Engine parameters a ramp mitigation may steer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FactorId {
    MaxInputStep,
    AdditionalForceGain,
}

/// Live tunable parameters read by the refresh loop and written by
/// ramp mitigations. Ramped values persist after the ramp expires.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Factors {
    pub max_input_step: f64,
    pub additional_force_gain: f64,
}

impl Factors {
    pub fn get(&self, id: FactorId) -> f64 {
        match id {
            FactorId::MaxInputStep => self.max_input_step,
            FactorId::AdditionalForceGain => self.additional_force_gain,
        }
    }

    pub fn set(&mut self, id: FactorId, value: f64) {
        match id {
            FactorId::MaxInputStep => self.max_input_step = value,
            FactorId::AdditionalForceGain => self.additional_force_gain = value,
        }
    }
}

/// How a ramped factor evolves over the ramp's lifetime.
pub enum FactorChange {
    /// Interpolate linearly from the activation-time snapshot to this
    /// goal; the factor arrives exactly at the goal when the ramp
    /// expires.
    Toward(f64),
    /// Evaluate the supplied function of elapsed seconds.
    With(Box<dyn Fn(f64) -> f64>),
}

pub struct RampFactor {
    pub id: FactorId,
    pub change: FactorChange,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MitigationKind {
    Audio,
    Pause,
    Ramp,
}

/// One time-bounded mitigation. Constructed at activation; the expiry
/// timestamp is absolute and compared against each refresh's sampled
/// time.
pub enum Mitigation {
    Audio {
        tone: Box<dyn TonePlayer>,
        ends_at: f64,
    },
    Pause {
        ends_at: f64,
        clear_screen: bool,
        retain_targets: bool,
    },
    Ramp {
        onset: f64,
        ends_at: f64,
        duration: f64,
        /// Each target paired with its activation-time snapshot.
        targets: Vec<(RampFactor, f64)>,
    },
}

impl Mitigation {
    pub fn audio(tone: Box<dyn TonePlayer>, duration: f64, now: f64) -> Self {
        Mitigation::Audio {
            tone,
            ends_at: now + duration,
        }
    }

    pub fn pause(duration: f64, clear_screen: bool, retain_targets: bool, now: f64) -> Self {
        Mitigation::Pause {
            ends_at: now + duration,
            clear_screen,
            retain_targets,
        }
    }

    pub fn ramp(factors: Vec<RampFactor>, duration: f64, now: f64, current: &Factors) -> Self {
        let targets = factors
            .into_iter()
            .map(|f| {
                let initial = current.get(f.id);
                (f, initial)
            })
            .collect();
        Mitigation::Ramp {
            onset: now,
            ends_at: now + duration,
            duration,
            targets,
        }
    }

    pub fn kind(&self) -> MitigationKind {
        match self {
            Mitigation::Audio { .. } => MitigationKind::Audio,
            Mitigation::Pause { .. } => MitigationKind::Pause,
            Mitigation::Ramp { .. } => MitigationKind::Ramp,
        }
    }

    pub fn ends_at(&self) -> f64 {
        match self {
            Mitigation::Audio { ends_at, .. }
            | Mitigation::Pause { ends_at, .. }
            | Mitigation::Ramp { ends_at, .. } => *ends_at,
        }
    }

    pub fn is_expired(&self, now: f64) -> bool {
        now >= self.ends_at()
    }
}

fn apply_ramp(targets: &[(RampFactor, f64)], elapsed: f64, duration: f64, factors: &mut Factors) {
    let progress = (elapsed / duration).min(1.0);
    for (target, initial) in targets {
        let value = match &target.change {
            FactorChange::Toward(goal) => initial + progress * (goal - initial),
            FactorChange::With(f) => f(elapsed.min(duration)),
        };
        factors.set(target.id, value);
    }
}

/// Holds the at-most-one active mitigation and drives its lifecycle
/// once per refresh.
#[derive(Default)]
pub struct MitigationController {
    active: Option<Mitigation>,
    on_onset: Option<Box<dyn FnMut(MitigationKind)>>,
}

impl MitigationController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs an onset message callback fired once per activation.
    pub fn set_onset_message(&mut self, callback: Box<dyn FnMut(MitigationKind)>) {
        self.on_onset = Some(callback);
    }

    /// Activates a mitigation: fires the onset message, starts tone
    /// playback for Audio, and arms the expiry timer. Refused while
    /// another mitigation is running.
    pub fn activate(&mut self, mut mitigation: Mitigation) -> bool {
        if self.active.is_some() {
            warn!(kind = ?mitigation.kind(), "mitigation refused, another is active");
            return false;
        }

        let kind = mitigation.kind();
        if let Some(callback) = self.on_onset.as_mut() {
            callback(kind);
        }
        if let Mitigation::Audio { tone, .. } = &mut mitigation {
            tone.play();
        }

        info!(?kind, ends_at = mitigation.ends_at(), "mitigation started");
        self.active = Some(mitigation);
        true
    }

    /// Per-refresh lifecycle step. With nothing active this is a no-op.
    ///
    /// Before expiry a Ramp re-interpolates its factor values; Audio and
    /// Pause are passive. The first call at or after expiry stops any
    /// ongoing side effect, settles ramped factors on their final
    /// values, and clears the active slot exactly once. Returns the kind
    /// of the mitigation that expired on this call, if any.
    pub fn update(&mut self, now: f64, factors: &mut Factors) -> Option<MitigationKind> {
        let active = self.active.as_mut()?;

        if !active.is_expired(now) {
            if let Mitigation::Ramp {
                onset,
                duration,
                targets,
                ..
            } = active
            {
                apply_ramp(targets, now - *onset, *duration, factors);
            }
            return None;
        }

        match active {
            Mitigation::Audio { tone, .. } => tone.stop(),
            Mitigation::Ramp {
                duration, targets, ..
            } => apply_ramp(targets, *duration, *duration, factors),
            Mitigation::Pause { .. } => {}
        }

        let kind = active.kind();
        self.clear();
        info!(?kind, "mitigation expired");
        Some(kind)
    }

    /// Empties the active slot. Idempotent: clearing an idle controller
    /// is a no-op, never an error.
    pub fn clear(&mut self) {
        self.active = None;
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    pub fn active_kind(&self) -> Option<MitigationKind> {
        self.active.as_ref().map(Mitigation::kind)
    }

    pub fn is_paused(&self) -> bool {
        matches!(self.active, Some(Mitigation::Pause { .. }))
    }

    /// `(clear_screen, retain_targets)` of the active Pause, if any.
    pub fn pause_flags(&self) -> Option<(bool, bool)> {
        match &self.active {
            Some(Mitigation::Pause {
                clear_screen,
                retain_targets,
                ..
            }) => Some((*clear_screen, *retain_targets)),
            _ => None,
        }
    }
}
