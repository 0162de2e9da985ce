use thiserror::Error;

/// Setup-time configuration failures. These are raised before any trial
/// runs; nothing in the per-refresh path returns them.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error(
        "session of {available}s cannot fit {trials} trials \
         (needs at least {required}s of ITI plus response budget)"
    )]
    SessionTooShort {
        trials: usize,
        required: f64,
        available: f64,
    },

    #[error("ITI surplus of {surplus}s cannot be absorbed within [{min}s, {max}s] per trial")]
    SurplusUnabsorbable { surplus: f64, min: f64, max: f64 },

    #[error("invalid configuration: {0}")]
    Invalid(&'static str),
}
