use std::ops::AddAssign;
use std::time::Duration;

/// Byte and time accounting of packet handling. Observability only: nothing
/// in the sweep logic branches on these.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepStats {
    pub context_bytes_received: u64,
    pub data_bytes_received: u64,
    /// Bytes worth of bins kept in assembled spectra.
    pub data_bytes_processed: u64,
    /// Data from no sweep this engine knows of.
    pub martian_bytes_discarded: u64,
    /// Data from the superseded sweep, or beyond the end of a finished one.
    pub past_end_bytes_discarded: u64,
    pub fft_time: Duration,
    pub bin_collection_time: Duration,
}

impl AddAssign for SweepStats {
    fn add_assign(&mut self, rhs: Self) {
        self.context_bytes_received += rhs.context_bytes_received;
        self.data_bytes_received += rhs.data_bytes_received;
        self.data_bytes_processed += rhs.data_bytes_processed;
        self.martian_bytes_discarded += rhs.martian_bytes_discarded;
        self.past_end_bytes_discarded += rhs.past_end_bytes_discarded;
        self.fft_time += rhs.fft_time;
        self.bin_collection_time += rhs.bin_collection_time;
    }
}
