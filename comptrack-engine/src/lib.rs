//! Compensatory tracking engine.
//!
//! Each display refresh the engine perturbs a one-dimensional cursor
//! with a deterministic buffeting force, corrects it with live pointer
//! input, and records one telemetry frame. At scheduled intervals the
//! task switches into a reaction-time probe; completed probes feed a
//! sliding-window performance assessor whose threshold signals can
//! activate time-bounded mitigations (audio alert, pause, parameter
//! ramp).

pub mod assessor;
pub mod config;
pub mod engine;
pub mod error;
pub mod mitigation;
pub mod recorder;
pub mod scheduler;

pub use assessor::{PerformanceAssessor, PerformanceSignal};
pub use config::{AssessmentToggles, ForceCycleConfig, TaskConfig};
pub use engine::{
    CompTrack, MitigationRequest, RefreshReport, RenderPlan, SessionSummary, SignalHook, TickEvent,
};
pub use error::ConfigError;
pub use mitigation::{
    FactorChange, FactorId, Factors, Mitigation, MitigationController, MitigationKind, RampFactor,
};
pub use recorder::FrameRecorder;
pub use scheduler::{TaskMode, TrialScheduler};
