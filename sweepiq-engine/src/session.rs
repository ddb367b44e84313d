//! Per-sweep packet handling.
//!
//! A [`SweepSession`] owns everything that changes while packets arrive: the
//! merged context, the step position and the bins assembled so far. It knows
//! nothing about the transport, so every transition can be driven directly
//! from tests.

use std::time::Instant;

use log::trace;
use sweepiq_messages::{Hertz, Repeat, Spectrum};

use crate::error::{Result, SweepError};
use crate::fft::PowerSpectrum;
use crate::packet::{Context, Packet};
use crate::plan::SweepPlan;
use crate::stats::SweepStats;

/// Where a sweep stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepState {
    /// No sweep has been started.
    Idle,
    /// Collecting bins for plan step `step`; `received` bins kept so far.
    AwaitingStep { step: usize, received: u32 },
    /// Finished or aborted; further data is past-end.
    Complete,
}

/// Which sweep a data packet belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Current,
    /// Straggler of the sweep just replaced.
    PastEnd,
    /// Matches no sweep this engine issued.
    Martian,
}

/// Classify a data packet by the sweep id of its most recent context.
pub fn classify(packet_sweep_id: Option<u32>, active: u32, previous: Option<u32>) -> Classification {
    match packet_sweep_id {
        Some(id) if id == active => Classification::Current,
        Some(id) if Some(id) == previous => Classification::PastEnd,
        _ => Classification::Martian,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    ContextMerged,
    Dropped(Classification),
    /// Bins were kept; the sweep is not finished yet.
    Collected { kept: u32 },
    /// The last step was filled. In continuous mode the session has already
    /// re-armed for the next traversal.
    Completed(Spectrum),
}

/// Result of feeding one packet: what happened plus the counters it moved.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub outcome: Outcome,
    pub stats: SweepStats,
}

#[derive(Debug)]
pub struct SweepSession {
    plan: SweepPlan,
    sweep_id: u32,
    previous_sweep_id: Option<u32>,
    repeat: Repeat,
    context: Context,
    state: SweepState,
    bins: Vec<f32>,
}

impl SweepSession {
    pub fn new(plan: SweepPlan, sweep_id: u32, previous_sweep_id: Option<u32>, repeat: Repeat) -> Self {
        let state = if plan.is_empty() {
            SweepState::Complete
        } else {
            SweepState::AwaitingStep {
                step: 0,
                received: 0,
            }
        };
        let bins = Vec::with_capacity(plan.total_bins());
        Self {
            plan,
            sweep_id,
            previous_sweep_id,
            repeat,
            context: Default::default(),
            state,
            bins,
        }
    }

    pub fn sweep_id(&self) -> u32 {
        self.sweep_id
    }

    pub fn previous_sweep_id(&self) -> Option<u32> {
        self.previous_sweep_id
    }

    pub fn state(&self) -> SweepState {
        self.state
    }

    pub fn plan(&self) -> &SweepPlan {
        &self.plan
    }

    pub fn repeat(&self) -> Repeat {
        self.repeat
    }

    /// Bins assembled so far for the traversal in progress.
    pub fn bins(&self) -> &[f32] {
        &self.bins
    }

    pub fn is_in_flight(&self) -> bool {
        matches!(self.state, SweepState::AwaitingStep { .. })
    }

    /// Stop expecting data. Packets still in flight become past-end.
    pub fn terminate(&mut self) {
        self.state = SweepState::Complete;
        self.bins.clear();
    }

    pub fn on_packet<F: PowerSpectrum + ?Sized>(
        &mut self,
        packet: &Packet,
        fft: &mut F,
    ) -> Result<Transition> {
        let bytes = packet.byte_len();
        let mut stats = SweepStats::default();

        let data = match packet {
            Packet::Context(context) => {
                self.context.merge(&context.fields);
                stats.context_bytes_received = bytes;
                return Ok(Transition {
                    outcome: Outcome::ContextMerged,
                    stats,
                });
            }
            Packet::Data(data) => data,
        };
        stats.data_bytes_received = bytes;

        let class = classify(self.context.sweep_id, self.sweep_id, self.previous_sweep_id);
        let (step, received) = match (class, self.state) {
            (Classification::Current, SweepState::AwaitingStep { step, received }) => {
                (step, received)
            }
            // more data than was asked for
            (Classification::Current, _) | (Classification::PastEnd, _) => {
                trace!("dropping {bytes} past-end bytes for sweep {:?}", self.context.sweep_id);
                stats.past_end_bytes_discarded = bytes;
                return Ok(Transition {
                    outcome: Outcome::Dropped(Classification::PastEnd),
                    stats,
                });
            }
            (Classification::Martian, _) => {
                trace!("dropping {bytes} martian bytes for sweep {:?}", self.context.sweep_id);
                stats.martian_bytes_discarded = bytes;
                return Ok(Transition {
                    outcome: Outcome::Dropped(Classification::Martian),
                    stats,
                });
            }
        };

        // some receivers never send a reference level
        if self.context.reflevel.is_none() {
            self.context.reflevel = Some(0.0);
        }
        if self.context.rffreq.is_none() {
            return Err(SweepError::MissingContext("rffreq"));
        }

        let fft_start = Instant::now();
        let power = fft.power_spectrum(&data.samples, &self.context);
        let collect_start = Instant::now();
        stats.fft_time = collect_start - fft_start;

        let window = *self.plan.steps()[step].bins();
        let pass_now = if received == 0 { window.pass } else { 0 };
        let take = (window.run - pass_now).min(window.keep - received);
        let start = (window.skip + pass_now) as usize;
        let end = start + take as usize;
        if power.len() < end {
            return Err(SweepError::ShortCapture {
                expected: end,
                got: power.len(),
            });
        }
        self.bins.extend_from_slice(&power[start..end]);
        let received = received + take;

        stats.data_bytes_processed = u64::from(take) * 4;
        stats.bin_collection_time = collect_start.elapsed();

        if received < window.keep {
            self.state = SweepState::AwaitingStep { step, received };
            return Ok(Transition {
                outcome: Outcome::Collected { kept: take },
                stats,
            });
        }

        let next = step + 1;
        if next < self.plan.steps().len() {
            self.state = SweepState::AwaitingStep {
                step: next,
                received: 0,
            };
            return Ok(Transition {
                outcome: Outcome::Collected { kept: take },
                stats,
            });
        }

        let bins = std::mem::replace(&mut self.bins, Vec::with_capacity(self.plan.total_bins()));
        self.state = match self.repeat {
            Repeat::Once => SweepState::Complete,
            Repeat::Continuous => SweepState::AwaitingStep {
                step: 0,
                received: 0,
            },
        };
        Ok(Transition {
            outcome: Outcome::Completed(Spectrum {
                fstart: Hertz(self.plan.fstart()),
                fstop: Hertz(self.plan.fstop()),
                bins,
            }),
            stats,
        })
    }
}
