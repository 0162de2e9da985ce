pub mod force;
pub mod frame;
pub mod input;
pub mod position;

pub use force::{buffeting_force, AdditionalForceCycle};
pub use frame::{Assessment, ForceSet, Frame, ProbeOutcome};
pub use input::{InputEvent, InputSampler, KeyCode, PointerPort, TonePlayer};
pub use position::PositionState;
