use crate::Spectrum;

/// Events sent from the engine to the caller.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// A completed sweep. Repeats once per traversal in continuous mode.
    Spectrum(Spectrum),
    /// The sweep could not be started or was aborted by an error.
    SweepFailed {
        sweep_id: Option<u32>,
        reason: String,
    },
}
