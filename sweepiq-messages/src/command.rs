use crate::{Repeat, SweepRequest};

/// Commands sent from a caller to the engine.
#[derive(Debug)]
pub enum Command {
    /// Plan and start a sweep. Rejected while another sweep is in flight.
    Start {
        request: SweepRequest,
        repeat: Repeat,
    },
    /// Abort the sweep in flight, if any, and flush the device.
    Abort,
    /// Abort any sweep and terminate the engine loop.
    Stop,
}
