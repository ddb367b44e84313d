use crate::Hertz;

/// Whether a streaming sweep stops after one traversal or keeps re-arming.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Repeat {
    #[default]
    Once,
    /// Capture runs until aborted; every completed traversal is delivered.
    Continuous,
}

/// RF gain setting of the receiver front end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RfGain {
    High,
    Medium,
    Low,
    VeryLow,
}

/// Front-end settings merged into every sweep entry pushed to the device.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeviceSettings {
    pub antenna: Option<u8>,
    pub rf_gain: Option<RfGain>,
    pub attenuator: Option<bool>,
}

/// A request for a power spectrum over `[fstart, fstop]`.
#[derive(Debug, Clone, PartialEq)]
pub struct SweepRequest {
    pub fstart: Hertz,
    pub fstop: Hertz,
    /// Requested resolution bandwidth; the delivered RBW may be finer.
    pub rbw: Hertz,
    /// Smallest number of samples per capture.
    pub min_points: u32,
    /// Largest number of samples per capture before decimation kicks in.
    pub max_points: u32,
    pub settings: DeviceSettings,
}

impl SweepRequest {
    pub const DEFAULT_MIN_POINTS: u32 = 128;
    pub const DEFAULT_MAX_POINTS: u32 = 8192;

    pub fn new(fstart: Hertz, fstop: Hertz, rbw: Hertz) -> Self {
        Self {
            fstart,
            fstop,
            rbw,
            min_points: Self::DEFAULT_MIN_POINTS,
            max_points: Self::DEFAULT_MAX_POINTS,
            settings: DeviceSettings::default(),
        }
    }

    pub fn with_points(mut self, min_points: u32, max_points: u32) -> Self {
        self.min_points = min_points;
        self.max_points = max_points;
        self
    }

    pub fn with_settings(mut self, settings: DeviceSettings) -> Self {
        self.settings = settings;
        self
    }
}
