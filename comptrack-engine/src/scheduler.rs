//! Probe onset scheduling.

/// Mode the task is in at a given instant, derived from the single
/// scheduled-onset timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskMode {
    /// Normal force/position tracking; the probe onset lies ahead.
    Tracking,
    /// The vigilance probe replaces the tracking display.
    ProbeActive,
}

/// Holds the absolute onset timestamp of the next vigilance probe.
///
/// There is no countdown state: every query compares the caller's
/// sampled `now` against the stored onset, so variable refresh duration
/// cannot introduce drift.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TrialScheduler {
    next_onset: Option<f64>,
}

impl TrialScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule(&mut self, onset: f64) {
        self.next_onset = Some(onset);
    }

    /// Clears the scheduled onset at trial end.
    pub fn clear(&mut self) {
        self.next_onset = None;
    }

    pub fn is_scheduled(&self) -> bool {
        self.next_onset.is_some()
    }

    pub fn scheduled_onset(&self) -> Option<f64> {
        self.next_onset
    }

    /// Remaining seconds until the probe onset; exactly 0.0 once the
    /// probe is active.
    ///
    /// # Panics
    ///
    /// Panics when no trial is scheduled. Querying between trials is a
    /// programmer error, not a state to silently report a sentinel for.
    pub fn time_until_next_trial(&self, now: f64) -> f64 {
        let onset = self.next_onset.expect("no trial scheduled");
        if now >= onset {
            0.0
        } else {
            onset - now
        }
    }

    pub fn mode(&self, now: f64) -> Option<TaskMode> {
        self.next_onset.map(|onset| {
            if now >= onset {
                TaskMode::ProbeActive
            } else {
                TaskMode::Tracking
            }
        })
    }

    /// Seconds since probe onset, `None` unless the probe is active.
    pub fn probe_elapsed(&self, now: f64) -> Option<f64> {
        match self.next_onset {
            Some(onset) if now >= onset => Some(now - onset),
            _ => None,
        }
    }
}
