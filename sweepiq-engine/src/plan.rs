//! Sweep planning: decompose a requested range into capture steps the device
//! can actually tune, decimate and capture.
//!
//! Only the region at or below the device's centre frequency (the left-hand
//! region) is planned. A range that would need tuning above `max_tunable` is
//! truncated to the captures the device can reach, see [`SweepPlan::is_truncated`].

use log::{debug, warn};

use crate::capability::DeviceCapability;
use crate::error::{Result, SweepError};

/// Hardware-facing tuning parameters of one capture step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tuning {
    /// Centre frequency of the first capture in Hz.
    pub center_freq: f64,
    /// Centre frequency increment between consecutive captures in Hz.
    pub freq_step: f64,
    /// Passband shift, non-zero only with decimation. Opaque to the engine.
    pub freq_shift: f64,
    pub decimation: u32,
    /// Samples per capture.
    pub sample_count: u32,
}

/// Which FFT bins of each capture end up in the assembled spectrum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BinWindow {
    /// Leading bins dropped from every capture (filter skirt).
    pub skip: u32,
    /// Usable bins produced by one capture.
    pub run: u32,
    /// Usable bins dropped from the first capture only.
    pub pass: u32,
    /// Bins kept across all captures of the step.
    pub keep: u32,
}

/// One validated capture configuration plus its bin accounting.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CaptureStep {
    tuning: Tuning,
    bins: BinWindow,
}

impl CaptureStep {
    /// Build a step, rejecting any parameter set the device cannot honour or
    /// whose bin window does not fit inside a capture.
    pub fn new(tuning: Tuning, bins: BinWindow, capability: &DeviceCapability) -> Result<Self> {
        let Tuning {
            center_freq,
            freq_step,
            freq_shift,
            decimation,
            sample_count,
        } = tuning;

        if !(center_freq.is_finite() && freq_step.is_finite() && freq_shift.is_finite()) {
            return Err(SweepError::invariant("step frequencies must be finite"));
        }
        if freq_step <= 0.0 {
            return Err(SweepError::invariant(format!(
                "frequency step {freq_step} must be positive"
            )));
        }
        let resolution = capability.tuning_resolution;
        if !is_multiple_of(center_freq, resolution) {
            return Err(SweepError::invariant(format!(
                "centre frequency {center_freq} is not a multiple of {resolution}"
            )));
        }
        if !is_multiple_of(freq_step, resolution) {
            return Err(SweepError::invariant(format!(
                "frequency step {freq_step} is not a multiple of {resolution}"
            )));
        }
        if !decimation.is_power_of_two() {
            return Err(SweepError::invariant(format!(
                "decimation {decimation} is not a power of two"
            )));
        }
        if decimation > 1
            && (decimation < capability.min_decimation || decimation > capability.max_decimation)
        {
            return Err(SweepError::invariant(format!(
                "decimation {decimation} outside [{}, {}]",
                capability.min_decimation, capability.max_decimation
            )));
        }
        if sample_count == 0 {
            return Err(SweepError::invariant("sample count must be positive"));
        }
        if sample_count > capability.max_capture_size {
            return Err(SweepError::CaptureTooLarge {
                points: sample_count,
                limit: capability.max_capture_size,
            });
        }
        if bins.run == 0 || bins.keep == 0 {
            return Err(SweepError::invariant(format!(
                "bin window {bins:?} keeps no bins"
            )));
        }
        if bins.pass >= bins.run {
            return Err(SweepError::invariant(format!(
                "bins_pass {} must be below bins_run {}",
                bins.pass, bins.run
            )));
        }
        if u64::from(bins.skip) + u64::from(bins.run) > u64::from(sample_count) {
            return Err(SweepError::invariant(format!(
                "bins {}..{} do not fit in a {sample_count}-point capture",
                bins.skip,
                u64::from(bins.skip) + u64::from(bins.run)
            )));
        }

        Ok(Self { tuning, bins })
    }

    pub fn tuning(&self) -> &Tuning {
        &self.tuning
    }

    pub fn bins(&self) -> &BinWindow {
        &self.bins
    }

    /// Captures the device must deliver for this step.
    pub fn captures(&self) -> u32 {
        (self.bins.keep + self.bins.pass).div_ceil(self.bins.run)
    }
}

/// An ordered set of capture steps plus the range they actually cover.
#[derive(Debug, Clone, PartialEq)]
pub struct SweepPlan {
    fstart: f64,
    fstop: f64,
    steps: Vec<CaptureStep>,
    truncated: bool,
}

impl SweepPlan {
    /// A plan that captures nothing; start and stop coincide.
    pub fn empty(at: f64) -> Self {
        Self {
            fstart: at,
            fstop: at,
            steps: Vec::new(),
            truncated: false,
        }
    }

    /// Assemble a plan from steps validated elsewhere, covering `[fstart, fstop]`.
    pub fn from_steps(fstart: f64, fstop: f64, steps: Vec<CaptureStep>) -> Self {
        Self {
            fstart,
            fstop,
            steps,
            truncated: false,
        }
    }

    pub fn fstart(&self) -> f64 {
        self.fstart
    }

    pub fn fstop(&self) -> f64 {
        self.fstop
    }

    pub fn steps(&self) -> &[CaptureStep] {
        &self.steps
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// True when the device's tuning limit cut the range short of the request.
    pub fn is_truncated(&self) -> bool {
        self.truncated
    }

    /// Bins a complete sweep of this plan delivers.
    pub fn total_bins(&self) -> usize {
        self.steps.iter().map(|s| s.bins.keep as usize).sum()
    }
}

/// Plan a sweep of `[fstart, fstop]` at resolution bandwidth `rbw` or finer.
///
/// Pure and deterministic. An empty range after clamping to the tunable band
/// yields an empty plan, not an error.
pub fn plan_sweep(
    capability: &DeviceCapability,
    fstart: f64,
    fstop: f64,
    rbw: f64,
    min_points: u32,
    max_points: u32,
) -> Result<SweepPlan> {
    if !(fstart.is_finite() && fstop.is_finite()) {
        return Err(SweepError::configuration("sweep range must be finite"));
    }
    if !(rbw.is_finite() && rbw > 0.0) {
        return Err(SweepError::configuration(format!(
            "resolution bandwidth {rbw} must be positive"
        )));
    }
    if min_points == 0 || max_points == 0 {
        return Err(SweepError::configuration("point limits must be positive"));
    }

    let usable2 = capability.usable_bw / 2.0;
    let dc_offset2 = capability.dc_offset_bw / 2.0;

    let fstart = fstart.max(capability.min_tunable - usable2);
    let fstop = fstop.min(capability.max_tunable - dc_offset2);
    if fstop <= fstart {
        debug!("range [{fstart}, {fstop}] is outside the tunable band");
        return Ok(SweepPlan::empty(fstart));
    }

    let wanted = (capability.full_bw / rbw).ceil() as u64;
    let mut points = wanted
        .max(u64::from(min_points))
        .checked_next_power_of_two()
        .ok_or_else(|| SweepError::configuration(format!("rbw {rbw} is too fine")))?;

    let mut decimation = 1u64;
    let mut edge_bins = 0u64;
    let ideal_decimation = points.div_ceil(u64::from(max_points)).next_power_of_two();
    let min_decimation = u64::from(capability.min_decimation.max(2));
    let max_decimation = u64::from(capability.max_decimation_pow2());
    if points > u64::from(max_points)
        && ideal_decimation >= min_decimation
        && max_decimation >= min_decimation
    {
        decimation = max_decimation.min(ideal_decimation);
        points /= decimation;
        edge_bins = (points as f64 * (1.0 - capability.decimated_usable) / 2.0).ceil() as u64;
    }

    if points > u64::from(capability.max_capture_size) {
        return Err(SweepError::CaptureTooLarge {
            points: u32::try_from(points).unwrap_or(u32::MAX),
            limit: capability.max_capture_size,
        });
    }

    let bin_size = capability.full_bw / decimation as f64 / points as f64;

    let (left_bin, freq_shift, wasted_left, usable_bins) = if decimation == 1 {
        let left_edge = capability.full_bw / 2.0 - usable2;
        let left_bin = (left_edge / bin_size).ceil();
        let wasted_left = left_bin * bin_size - left_edge;
        let usable_bins = ((usable2 - dc_offset2 - wasted_left) / bin_size).floor();
        (left_bin, 0.0, wasted_left, usable_bins)
    } else {
        let decimated_bw = capability.full_bw / decimation as f64;
        let decimation_edge = edge_bins as f64 * decimated_bw / points as f64;
        let freq_shift = usable2 + decimation_edge - decimated_bw / 2.0;
        let usable_bins = (points.saturating_sub(2 * edge_bins) as f64)
            .min(((usable2 - dc_offset2) / bin_size).floor());
        (edge_bins as f64, freq_shift, 0.0, usable_bins)
    };
    if !(usable_bins >= 1.0) {
        return Err(SweepError::invariant(format!(
            "no usable bins at {points} points, decimation {decimation}"
        )));
    }

    // Tuning resolution is the hard constraint; usable bins follow the step.
    let resolution = capability.tuning_resolution;
    let freq_step = (usable_bins * bin_size / resolution).floor().max(1.0) * resolution;
    let usable_bins = usable_bins
        .min((freq_step / bin_size).round_ties_even())
        .max(1.0);

    let center_freq = ((fstart + usable2 - wasted_left) / resolution).floor() * resolution;
    let region_start = center_freq - usable2 + wasted_left;
    let bins_pass = ((fstart - region_start) / bin_size).floor();
    let achieved_start = region_start + bins_pass * bin_size;

    // Keep every bin up to and including the one containing fstop.
    let span = fstop - region_start;
    let mut full_steps = (span / freq_step).floor();
    let mut right_bins = ((span - full_steps * freq_step) / bin_size).floor() + 1.0;
    if right_bins > usable_bins {
        full_steps += 1.0;
        right_bins = 1.0;
    }

    let max_captures = if center_freq > capability.max_tunable {
        0.0
    } else {
        ((capability.max_tunable - center_freq) / freq_step).floor() + 1.0
    };
    let truncated = full_steps + 1.0 > max_captures;
    let total_bins = if truncated {
        max_captures * usable_bins
    } else {
        full_steps * usable_bins + right_bins
    };

    let bins_keep = total_bins - bins_pass;
    if bins_keep < 1.0 {
        debug!("no tunable capture reaches [{fstart}, {fstop}]");
        return Ok(SweepPlan::empty(achieved_start));
    }
    let last = total_bins - 1.0;
    let achieved_stop = region_start
        + (last / usable_bins).floor() * freq_step
        + (last % usable_bins + 1.0) * bin_size;
    if truncated {
        warn!("sweep truncated at {achieved_stop} Hz, requested stop was {fstop} Hz");
    }

    let tuning = Tuning {
        center_freq,
        freq_step,
        freq_shift,
        decimation: integral("decimation", decimation as f64)?,
        sample_count: integral("points", points as f64)?,
    };
    let bins = BinWindow {
        skip: integral("bins_skip", left_bin)?,
        run: integral("bins_run", usable_bins)?,
        pass: integral("bins_pass", bins_pass)?,
        keep: integral("bins_keep", bins_keep)?,
    };
    let step = CaptureStep::new(tuning, bins, capability)?;
    debug!(
        "planned {} capture(s) of {} points, decimation {}, {} bins",
        step.captures(),
        tuning.sample_count,
        tuning.decimation,
        bins.keep
    );

    Ok(SweepPlan {
        fstart: achieved_start,
        fstop: achieved_stop,
        steps: vec![step],
        truncated,
    })
}

fn integral(name: &str, value: f64) -> Result<u32> {
    if value.is_finite() && value >= 0.0 && value.fract() == 0.0 && value <= f64::from(u32::MAX) {
        Ok(value as u32)
    } else {
        Err(SweepError::invariant(format!(
            "{name} = {value} is not a non-negative integer"
        )))
    }
}

fn is_multiple_of(value: f64, resolution: f64) -> bool {
    let units = (value / resolution).round();
    (units * resolution - value).abs() <= resolution * 1e-9
}
