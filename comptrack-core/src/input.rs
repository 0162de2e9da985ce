//! Per-refresh input batches and pointer sampling.

/// Key identity as reported by the platform event layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyCode {
    Space,
    Escape,
    Other(u32),
}

/// Raw events delivered by the platform layer within one refresh.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InputEvent {
    /// Relative horizontal pointer motion, in pixels.
    PointerMotion { dx: f64 },
    KeyPress { key: KeyCode },
}

/// Seam to the platform pointer device.
///
/// Re-centering keeps relative motion sampling unbounded by the screen
/// edges; the call is fire-and-forget and must not block.
pub trait PointerPort {
    fn recenter(&mut self);
}

/// Seam to the platform audio layer. Only the start/stop lifecycle is
/// in scope; decoding and mixing belong to the collaborator.
pub trait TonePlayer {
    fn play(&mut self);
    fn stop(&mut self);
}

/// Reduces a refresh's event batch to a single net pointer delta.
#[derive(Debug, Clone, Copy, Default)]
pub struct InputSampler;

impl InputSampler {
    /// Later motion events overwrite earlier ones within the same
    /// refresh; the net delta is the last motion seen. With `supervise`
    /// set, deltas at or beyond `max_step` in either direction saturate
    /// to the bound. No motion resolves to 0.0.
    ///
    /// The pointer device is re-centered every call, regardless of
    /// activity.
    pub fn sample<P: PointerPort>(
        &self,
        events: &[InputEvent],
        supervise: bool,
        max_step: f64,
        port: &mut P,
    ) -> f64 {
        let mut delta = None;
        for event in events {
            if let InputEvent::PointerMotion { dx } = event {
                delta = Some(if supervise {
                    Self::censor(*dx, max_step)
                } else {
                    *dx
                });
            }
        }

        port.recenter();
        delta.unwrap_or(0.0)
    }

    fn censor(dx: f64, max_step: f64) -> f64 {
        if dx <= -max_step {
            -max_step
        } else if dx >= max_step {
            max_step
        } else {
            dx
        }
    }
}
