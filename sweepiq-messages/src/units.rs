/// Frequency in Hertz.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default)]
pub struct Hertz(pub f64);

impl std::fmt::Display for Hertz {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let hz = self.0;
        if hz.abs() >= 1e9 {
            write!(f, "{:.6} GHz", hz / 1e9)
        } else if hz.abs() >= 1e6 {
            write!(f, "{:.6} MHz", hz / 1e6)
        } else if hz.abs() >= 1e3 {
            write!(f, "{:.3} kHz", hz / 1e3)
        } else {
            write!(f, "{} Hz", hz)
        }
    }
}

impl Hertz {
    pub const fn khz(khz: f64) -> Self {
        Self(khz * 1e3)
    }

    pub const fn mhz(mhz: f64) -> Self {
        Self(mhz * 1e6)
    }

    pub const fn ghz(ghz: f64) -> Self {
        Self(ghz * 1e9)
    }

    pub const fn as_hz(self) -> f64 {
        self.0
    }
}

impl From<f64> for Hertz {
    fn from(hz: f64) -> Self {
        Self(hz)
    }
}

impl From<Hertz> for f64 {
    fn from(hz: Hertz) -> Self {
        hz.0
    }
}

/// Power level in decibels (dB).
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Decibels(pub f32);

impl std::fmt::Display for Decibels {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.1} dB", self.0)
    }
}

impl Decibels {
    /// Convert decibels to a linear power ratio.
    /// For power: linear = 10^(dB/10)
    pub fn to_linear(self) -> f32 {
        10.0_f32.powf(self.0 / 10.0)
    }

    /// Convert a linear power ratio to decibels.
    /// For power: dB = 10 * log10(linear)
    pub fn from_linear(linear: f32) -> Self {
        Self(10.0 * linear.log10())
    }

    pub const fn as_db(self) -> f32 {
        self.0
    }
}

impl From<f32> for Decibels {
    fn from(db: f32) -> Self {
        Self(db)
    }
}

impl From<Decibels> for f32 {
    fn from(db: Decibels) -> Self {
        db.0
    }
}
