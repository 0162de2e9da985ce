//! Sliding-window performance assessment.

use comptrack_core::{Assessment, ProbeOutcome};
use tracing::debug;

use crate::config::AssessmentToggles;

/// Threshold-exceeded signal raised by an assessment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PerformanceSignal {
    ExcessiveLapses,
    ExcessiveMeanRt,
}

/// Evaluates the trailing window of probe outcomes after each trial.
#[derive(Debug, Clone)]
pub struct PerformanceAssessor {
    sample_size: usize,
    assessing: AssessmentToggles,
    excessive_lapse_threshold: usize,
    max_mean_rt: f64,
    assessments: Vec<Assessment>,
}

impl PerformanceAssessor {
    pub fn new(
        sample_size: usize,
        assessing: AssessmentToggles,
        excessive_lapse_threshold: usize,
        max_mean_rt: f64,
    ) -> Self {
        Self {
            sample_size,
            assessing,
            excessive_lapse_threshold,
            max_mean_rt,
            assessments: Vec::new(),
        }
    }

    /// Assesses the trailing `sample_size` trials ending at the trial
    /// just completed. Returns `None` while the history is shorter than
    /// the window; that is a recoverable skip, not an error.
    ///
    /// The mean-RT check only runs when the window holds at least one
    /// qualifying response. An undefined mean never trips the threshold,
    /// whatever the threshold is.
    pub fn assess(
        &mut self,
        history: &[ProbeOutcome],
        participant_id: u32,
        trial_number: usize,
        block_number: usize,
        now: f64,
    ) -> Option<(Assessment, Vec<PerformanceSignal>)> {
        if history.len() < self.sample_size {
            debug!(
                have = history.len(),
                need = self.sample_size,
                "assessment skipped, window not yet full"
            );
            return None;
        }

        let window = &history[history.len() - self.sample_size..];
        let lapse_count = window.iter().filter(|o| o.is_lapse()).count();
        let rts: Vec<f64> = window.iter().filter_map(ProbeOutcome::rt).collect();
        let mean_rt = if rts.is_empty() {
            None
        } else {
            Some(rts.iter().sum::<f64>() / rts.len() as f64)
        };

        let assessment = Assessment {
            participant_id,
            trial_number,
            block_number,
            timestamp: now,
            mean_rt,
            lapse_count,
            samples: self.sample_size,
        };

        let mut signals = Vec::new();
        if self.assessing.lapses && lapse_count >= self.excessive_lapse_threshold {
            signals.push(PerformanceSignal::ExcessiveLapses);
        }
        if self.assessing.mean_rt {
            if let Some(mean) = mean_rt {
                if mean >= self.max_mean_rt {
                    signals.push(PerformanceSignal::ExcessiveMeanRt);
                }
            }
        }

        debug!(trial_number, lapse_count, ?mean_rt, ?signals, "assessment recorded");
        self.assessments.push(assessment.clone());
        Some((assessment, signals))
    }

    pub fn assessments(&self) -> &[Assessment] {
        &self.assessments
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(rt: f64) -> ProbeOutcome {
        ProbeOutcome::Response { rt }
    }

    fn assessor() -> PerformanceAssessor {
        PerformanceAssessor::new(5, AssessmentToggles::default(), 3, 0.5)
    }

    #[test]
    fn short_history_skips_the_cycle() {
        let mut assessor = assessor();
        let history = vec![response(0.3); 4];
        assert!(assessor.assess(&history, 1, 4, 1, 40.0).is_none());
        assert!(assessor.assessments().is_empty());
    }

    #[test]
    fn window_counts_lapses_and_averages_responses() {
        let mut assessor = assessor();
        let history = vec![
            response(0.9), // outside the trailing window
            ProbeOutcome::Lapse,
            response(0.2),
            response(0.4),
            ProbeOutcome::Lapse,
            response(0.3),
        ];
        let (assessment, signals) = assessor.assess(&history, 1, 6, 1, 60.0).unwrap();
        assert_eq!(assessment.lapse_count, 2);
        let mean = assessment.mean_rt.unwrap();
        assert!((mean - 0.3).abs() < 1e-12);
        assert!(signals.is_empty());
        assert_eq!(assessor.assessments().len(), 1);
    }

    #[test]
    fn lapse_threshold_raises_a_signal() {
        let mut assessor = assessor();
        let history = vec![
            ProbeOutcome::Lapse,
            ProbeOutcome::Lapse,
            ProbeOutcome::Lapse,
            response(0.2),
            response(0.2),
        ];
        let (_, signals) = assessor.assess(&history, 1, 5, 1, 50.0).unwrap();
        assert_eq!(signals, vec![PerformanceSignal::ExcessiveLapses]);
    }

    #[test]
    fn undefined_mean_never_fires_even_with_zero_threshold() {
        let mut assessor = PerformanceAssessor::new(5, AssessmentToggles::default(), 3, 0.0);
        let history = vec![ProbeOutcome::Lapse; 5];
        let (assessment, signals) = assessor.assess(&history, 1, 5, 1, 50.0).unwrap();
        assert_eq!(assessment.mean_rt, None);
        // lapse signal fires, the mean-RT signal must not
        assert_eq!(signals, vec![PerformanceSignal::ExcessiveLapses]);
    }

    #[test]
    fn disabled_toggles_suppress_their_signals() {
        let toggles = AssessmentToggles {
            lapses: false,
            mean_rt: false,
        };
        let mut assessor = PerformanceAssessor::new(3, toggles, 1, 0.0);
        let history = vec![ProbeOutcome::Lapse, response(0.9), ProbeOutcome::Lapse];
        let (_, signals) = assessor.assess(&history, 1, 3, 1, 30.0).unwrap();
        assert!(signals.is_empty());
    }
}
