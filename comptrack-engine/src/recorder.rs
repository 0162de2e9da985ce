//! Per-trial frame storage.

use comptrack_core::Frame;

/// Stores one frame per refresh, grouped by trial.
///
/// Trials are allocated explicitly through [`begin_trial`]; pushing a
/// frame with no open trial is a programmer error.
///
/// [`begin_trial`]: FrameRecorder::begin_trial
#[derive(Debug, Clone, Default)]
pub struct FrameRecorder {
    trials: Vec<Vec<Frame>>,
    next_seq: usize,
}

impl FrameRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens the next trial's frame list and returns its 1-based trial
    /// number.
    pub fn begin_trial(&mut self) -> usize {
        self.trials.push(Vec::new());
        self.trials.len()
    }

    /// Session-wide sequence id for the frame about to be recorded.
    pub fn next_seq(&mut self) -> usize {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }

    pub fn push(&mut self, frame: Frame) {
        self.trials
            .last_mut()
            .expect("no trial begun")
            .push(frame);
    }

    pub fn trial_count(&self) -> usize {
        self.trials.len()
    }

    pub fn current_frame(&self) -> Option<&Frame> {
        self.trials.last().and_then(|frames| frames.last())
    }

    pub fn current_frame_mut(&mut self) -> Option<&mut Frame> {
        self.trials.last_mut().and_then(|frames| frames.last_mut())
    }

    /// Frames grouped by trial, in recording order.
    pub fn trials(&self) -> &[Vec<Frame>] {
        &self.trials
    }

    pub fn all_frames(&self) -> impl Iterator<Item = &Frame> {
        self.trials.iter().flatten()
    }
}
