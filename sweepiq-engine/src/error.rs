//! Error type shared by the planner and the sweep engine.

use std::io;

/// A specialized Result type for sweep operations
pub type Result<T> = std::result::Result<T, SweepError>;

#[derive(Debug, thiserror::Error)]
pub enum SweepError {
    /// Rejected before any hardware action.
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("capture of {points} samples exceeds the device limit of {limit}")]
    CaptureTooLarge { points: u32, limit: u32 },

    #[error("sweep {0:#010x} is still in flight")]
    Busy(u32),

    /// A data packet arrived without a context field it cannot be read without.
    #[error("missing required context field `{0}`, sweep failed")]
    MissingContext(&'static str),

    #[error("capture produced {got} bins, step needs at least {expected}")]
    ShortCapture { expected: usize, got: usize },

    /// A derived plan quantity is not integral or out of range; the capability
    /// descriptor is inconsistent.
    #[error("plan invariant violated: {0}")]
    PlanInvariant(String),

    #[error("device error: {0}")]
    Device(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("invalid capability descriptor: {0}")]
    Capability(#[from] toml::de::Error),
}

impl SweepError {
    pub fn configuration<S: Into<String>>(msg: S) -> Self {
        SweepError::Configuration(msg.into())
    }

    pub fn invariant<S: Into<String>>(msg: S) -> Self {
        SweepError::PlanInvariant(msg.into())
    }

    pub fn device<S: Into<String>>(msg: S) -> Self {
        SweepError::Device(msg.into())
    }

    /// Errors raised while interpreting received packets.
    pub fn is_protocol(&self) -> bool {
        matches!(
            self,
            SweepError::MissingContext(_) | SweepError::ShortCapture { .. }
        )
    }
}
