use serde::{Deserialize, Serialize};

/// Outcome of one vigilance probe.
///
/// A lapse is structurally distinct from a fast response; no numeric
/// sentinel is ever compared against a real reaction time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ProbeOutcome {
    /// Qualifying key press, reaction time in seconds from probe onset.
    Response { rt: f64 },
    /// No qualifying response before the probe timeout.
    Lapse,
}

impl ProbeOutcome {
    pub fn rt(&self) -> Option<f64> {
        match self {
            ProbeOutcome::Response { rt } => Some(*rt),
            ProbeOutcome::Lapse => None,
        }
    }

    pub fn is_lapse(&self) -> bool {
        matches!(self, ProbeOutcome::Lapse)
    }
}

/// Force contributions recorded for one refresh.
///
/// `net` mirrors the recorded behavior of the task: it carries the
/// buffeting term only. The additional term, when enabled, is recorded
/// and applied but never summed into `net`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ForceSet {
    pub buffeting: f64,
    pub additional: Option<f64>,
    pub net: f64,
}

/// One telemetry record per display refresh.
///
/// Field order is the persistence order; collaborators writing rows
/// should keep it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Frame {
    pub participant_id: u32,
    pub block_number: usize,
    pub trial_number: usize,
    /// Session-wide refresh sequence id.
    pub seq: usize,
    /// Monotonic seconds at refresh start.
    pub timestamp: f64,
    pub forces: ForceSet,
    /// Net pointer delta applied this refresh.
    pub user_input: f64,
    /// Cursor position once all contributions have been integrated.
    pub target_position: f64,
    /// Absolute distance from screen center, in pixels.
    pub displacement: f64,
    /// Set exactly once, on the trial's final frame.
    pub outcome: Option<ProbeOutcome>,
}

impl Frame {
    /// Column labels matching the serialized field order.
    pub const COLUMNS: [&'static str; 12] = [
        "participant_id",
        "block_number",
        "trial_number",
        "seq",
        "timestamp",
        "buffeting_force",
        "additional_force",
        "net_force",
        "user_input",
        "target_position",
        "displacement",
        "outcome",
    ];

    pub fn new(
        participant_id: u32,
        block_number: usize,
        trial_number: usize,
        seq: usize,
        timestamp: f64,
        position: f64,
    ) -> Self {
        Self {
            participant_id,
            block_number,
            trial_number,
            seq,
            timestamp,
            forces: ForceSet::default(),
            user_input: 0.0,
            // seeded with the pre-update position, overwritten when the
            // refresh finalizes
            target_position: position,
            displacement: 0.0,
            outcome: None,
        }
    }
}

/// One performance evaluation over a trailing trial window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Assessment {
    pub participant_id: u32,
    pub trial_number: usize,
    pub block_number: usize,
    /// Monotonic seconds when the assessment ran.
    pub timestamp: f64,
    /// `None` when the window holds no qualifying response.
    pub mean_rt: Option<f64>,
    pub lapse_count: usize,
    /// Number of trials in the evaluation window.
    pub samples: usize,
}
