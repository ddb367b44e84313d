//! Receiver control surface used by the sweepers.
//!
//! A real receiver implements [`SweepDevice`] over its control link and
//! [`PacketSource`] over its data link. [`crate::sim::SimulatedDevice`] does
//! both in memory.

use sweepiq_messages::DeviceSettings;

use crate::capability::DeviceCapability;
use crate::error::Result;
use crate::packet::Packet;
use crate::plan::CaptureStep;

/// Native sweep list entry. The device tunes from `fstart` in increments of
/// `fstep` while the tuned frequency stays at or below `fstop`, capturing
/// `ppb` packets of `spp` samples at each tuning.
#[derive(Debug, Clone, PartialEq)]
pub struct SweepEntry {
    pub fstart: f64,
    pub fstop: f64,
    pub fstep: f64,
    pub fshift: f64,
    pub decimation: u32,
    /// Samples per packet.
    pub spp: u32,
    /// Packets per block.
    pub ppb: u32,
    pub settings: DeviceSettings,
}

impl SweepEntry {
    /// Encode a capture step. The stop frequency lands half a step past the
    /// last wanted tuning so rounding on the device cannot drop or add one.
    pub fn from_step(
        step: &CaptureStep,
        capability: &DeviceCapability,
        settings: &DeviceSettings,
    ) -> Self {
        let tuning = step.tuning();
        let captures = f64::from(step.captures());
        Self {
            fstart: tuning.center_freq,
            fstop: (tuning.center_freq + (captures - 0.5) * tuning.freq_step)
                .min(capability.max_tunable),
            fstep: tuning.freq_step,
            fshift: tuning.freq_shift,
            decimation: tuning.decimation,
            spp: tuning.sample_count,
            ppb: 1,
            settings: settings.clone(),
        }
    }

    /// Tunings the device performs for this entry.
    pub fn tunings(&self) -> u32 {
        if self.fstop < self.fstart || self.fstep <= 0.0 {
            return 0;
        }
        ((self.fstop - self.fstart) / self.fstep).floor() as u32 + 1
    }
}

/// Sweep-list control of a receiver.
pub trait SweepDevice {
    /// Stop any running capture.
    fn abort(&mut self) -> Result<()>;
    /// Discard data buffered between the device and the host.
    fn flush(&mut self) -> Result<()>;
    fn request_read_perm(&mut self) -> Result<()>;
    fn sweep_clear(&mut self) -> Result<()>;
    fn sweep_add(&mut self, entry: SweepEntry) -> Result<()>;
    /// Passes over the sweep list; 0 repeats until aborted.
    fn sweep_iterations(&mut self, count: u32) -> Result<()>;
    /// Start the sweep list. Every context the device emits for it carries
    /// `sweep_id`.
    fn sweep_start(&mut self, sweep_id: u32) -> Result<()>;
}

/// Blocking reader of decoded packets.
pub trait PacketSource {
    fn read(&mut self) -> Result<Packet>;
}
