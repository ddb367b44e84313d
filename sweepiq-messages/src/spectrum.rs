use crate::{Decibels, Hertz};

/// An assembled sweep: ordered linear power bins spanning `[fstart, fstop]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Spectrum {
    /// Achieved start frequency, at or below the requested one.
    pub fstart: Hertz,
    /// Achieved stop frequency, at or above the requested one unless the
    /// range was truncated at the device's tuning limit.
    pub fstop: Hertz,
    pub bins: Vec<f32>,
}

impl Spectrum {
    pub fn empty(at: Hertz) -> Self {
        Self {
            fstart: at,
            fstop: at,
            bins: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.bins.is_empty()
    }

    /// Nominal width of one bin.
    pub fn bin_width(&self) -> Option<Hertz> {
        if self.bins.is_empty() {
            return None;
        }
        Some(Hertz((self.fstop.0 - self.fstart.0) / self.bins.len() as f64))
    }

    /// Nominal centre frequency of bin `index`.
    pub fn frequency_of(&self, index: usize) -> Option<Hertz> {
        let width = self.bin_width()?;
        (index < self.bins.len()).then(|| Hertz(self.fstart.0 + (index as f64 + 0.5) * width.0))
    }

    /// Strongest bin as (frequency, level).
    pub fn peak(&self) -> Option<(Hertz, Decibels)> {
        let (index, power) = self
            .bins
            .iter()
            .enumerate()
            .max_by(|(_, a), (_, b)| a.total_cmp(b))?;
        Some((self.frequency_of(index)?, Decibels::from_linear(*power)))
    }
}
