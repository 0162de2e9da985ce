//! Deterministic buffeting forces.

/// Buffeting force at `t` seconds of elapsed task time.
///
/// Sum of five sinusoids. The coefficient inside `sin(k * t)` sets the
/// periodicity of that component, not its amplitude; scaling a term
/// would instead change the displacement it contributes per refresh.
pub fn buffeting_force(t: f64) -> f64 {
    t.sin() + (0.3 * t).sin() + (0.5 * t).sin() + (0.7 * t).sin() - (0.9 * t).sin()
}

/// Cyclic sequence of additional-force modifier values.
///
/// The base sequence is the tangent of a geometric ramp from `start` to
/// `stop`. The ramp is then mirrored with negated sign (endpoints
/// trimmed) so that sampling wraps around the cycle boundary without a
/// discontinuity.
#[derive(Debug, Clone)]
pub struct AdditionalForceCycle {
    values: Vec<f64>,
    cursor: usize,
}

impl AdditionalForceCycle {
    pub fn build(start: f64, stop: f64, count: usize) -> Self {
        assert!(count >= 3, "modifier cycle needs at least 3 points");
        assert!(
            start > 0.0 && stop > start,
            "modifier ramp must satisfy 0 < start < stop"
        );

        let ratio = (stop / start).powf(1.0 / (count - 1) as f64);
        let modifiers: Vec<f64> = (0..count)
            .map(|i| (start * ratio.powi(i as i32)).tan())
            .collect();

        let mut values = modifiers.clone();
        values.extend(modifiers[2..].iter().rev().map(|v| -v));

        Self { values, cursor: 0 }
    }

    /// Advances the cycle one step and returns the modifier for this
    /// refresh.
    pub fn next_value(&mut self) -> f64 {
        let v = self.values[self.cursor];
        self.cursor = (self.cursor + 1) % self.values.len();
        v
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }
}
