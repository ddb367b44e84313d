use std::fmt;
use std::sync::Arc;

use num_complex::Complex;
use rustfft::{Fft, FftPlanner};

use crate::packet::Context;

/// Turns the samples of one capture into ordered linear power bins,
/// lowest frequency first.
pub trait PowerSpectrum {
    fn power_spectrum(&mut self, samples: &[Complex<f32>], context: &Context) -> Vec<f32>;
}

/// Hann-windowed FFT power estimate.
///
/// Bins are centre-shifted so bin `n/2` holds DC, normalised by the window's
/// coherent gain so a full-scale tone reads 1.0, then scaled by the reference
/// level from the context.
pub struct FftPower {
    fft: Option<Arc<dyn Fft<f32>>>,
    window: Vec<f32>,
    scratch: Vec<Complex<f32>>,
}

impl fmt::Debug for FftPower {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FftPower")
            .field("size", &self.window.len())
            .finish()
    }
}

impl Default for FftPower {
    fn default() -> Self {
        Self::new()
    }
}

impl FftPower {
    pub fn new() -> Self {
        Self {
            fft: None,
            window: Vec::new(),
            scratch: Vec::new(),
        }
    }

    fn prepare(&mut self, size: usize) -> Arc<dyn Fft<f32>> {
        if let Some(fft) = &self.fft {
            if self.window.len() == size {
                return Arc::clone(fft);
            }
        }
        let fft = FftPlanner::new().plan_fft_forward(size);
        self.window = hann(size);
        self.scratch = vec![Complex::new(0.0, 0.0); fft.get_inplace_scratch_len()];
        self.fft = Some(Arc::clone(&fft));
        fft
    }
}

impl PowerSpectrum for FftPower {
    fn power_spectrum(&mut self, samples: &[Complex<f32>], context: &Context) -> Vec<f32> {
        let n = samples.len();
        if n == 0 {
            return Vec::new();
        }
        let fft = self.prepare(n);

        let mut buffer: Vec<Complex<f32>> = samples
            .iter()
            .zip(&self.window)
            .map(|(s, &w)| *s * w)
            .collect();
        fft.process_with_scratch(&mut buffer, &mut self.scratch);

        let gain: f32 = self.window.iter().sum();
        let reference = 10f32.powf(context.reflevel.unwrap_or(0.0) as f32 / 10.0);
        let scale = reference / (gain * gain);
        let mut power: Vec<f32> = buffer.iter().map(|c| c.norm_sqr() * scale).collect();

        // [DC, positive, negative] -> [negative, DC, positive]
        power.rotate_left(n / 2);
        if context.spectral_inversion == Some(true) {
            power.reverse();
        }
        power
    }
}

fn hann(size: usize) -> Vec<f32> {
    if size == 1 {
        return vec![1.0];
    }
    let denom = (size - 1) as f32;
    (0..size)
        .map(|i| 0.5 - 0.5 * (2.0 * std::f32::consts::PI * i as f32 / denom).cos())
        .collect()
}
