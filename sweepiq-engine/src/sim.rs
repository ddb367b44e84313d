//! In-memory receiver for tests and demos.
//!
//! [`SimulatedDevice`] accepts sweep-list commands like a real receiver and
//! synthesises a context packet plus I/Q data for every tuning it performs.
//! Its [`SimTransport`] handle hands those packets out in order, either
//! directly or pumped into a channel from a transport thread.

use std::collections::VecDeque;
use std::f64::consts::PI;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use flume::Sender;
use log::{debug, trace};
use num_complex::Complex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use sweepiq_messages::{Decibels, Hertz};

use crate::capability::DeviceCapability;
use crate::device::{PacketSource, SweepDevice, SweepEntry};
use crate::error::{Result, SweepError};
use crate::packet::{Context, Packet};

/// A continuous-wave signal present at the antenna.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tone {
    pub frequency: Hertz,
    /// Peak amplitude relative to full scale.
    pub amplitude: f32,
}

impl Tone {
    /// A tone whose power reads `level` relative to full scale.
    pub fn new(frequency: Hertz, level: Decibels) -> Self {
        Self {
            frequency,
            amplitude: level.to_linear().sqrt(),
        }
    }
}

/// Commands the simulator received, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceCall {
    Abort,
    Flush,
    RequestReadPerm,
    SweepClear,
    SweepAdd(SweepEntry),
    SweepIterations(u32),
    SweepStart(u32),
}

#[derive(Debug)]
struct Run {
    sweep_id: u32,
    /// Remaining passes; `None` repeats forever.
    passes_left: Option<u32>,
    entry: usize,
    tuning: u32,
}

#[derive(Debug)]
struct SimState {
    capability: DeviceCapability,
    tones: Vec<Tone>,
    noise: f32,
    reflevel: Option<f64>,
    rng: StdRng,
    entries: Vec<SweepEntry>,
    iterations: u32,
    run: Option<Run>,
    queue: VecDeque<Packet>,
    calls: Vec<DeviceCall>,
}

impl SimState {
    /// Queue the packets of the next tuning, if a sweep is running.
    fn advance(&mut self) {
        let Some(run) = self.run.as_mut() else {
            return;
        };
        let Some(entry) = self.entries.get(run.entry).cloned() else {
            self.run = None;
            return;
        };
        let sweep_id = run.sweep_id;
        let rffreq = entry.fstart + f64::from(run.tuning) * entry.fstep;

        let mut finished = false;
        run.tuning += 1;
        if run.tuning >= entry.tunings() {
            run.tuning = 0;
            run.entry += 1;
            if run.entry >= self.entries.len() {
                run.entry = 0;
                if let Some(left) = run.passes_left.as_mut() {
                    *left -= 1;
                    finished = *left == 0;
                }
            }
        }
        if finished {
            self.run = None;
        }

        self.queue.push_back(Packet::context(Context {
            sweep_id: Some(sweep_id),
            reflevel: self.reflevel,
            rffreq: Some(rffreq),
            spectral_inversion: Some(false),
        }));
        for _ in 0..entry.ppb {
            let samples = self.synthesize(&entry, rffreq);
            self.queue.push_back(Packet::data(samples));
        }
    }

    fn synthesize(&mut self, entry: &SweepEntry, rffreq: f64) -> Vec<Complex<f32>> {
        let sample_rate = self.capability.full_bw / f64::from(entry.decimation.max(1));
        // the decimated passband sits `fshift` below the reported frequency
        let centre = rffreq - entry.fshift;
        let offsets: Vec<(f64, f32)> = self
            .tones
            .iter()
            .map(|tone| (tone.frequency.as_hz() - centre, tone.amplitude))
            .filter(|(offset, _)| offset.abs() < sample_rate / 2.0)
            .collect();

        (0..entry.spp)
            .map(|n| {
                let mut sample = Complex::new(0.0f32, 0.0);
                for &(offset, amplitude) in &offsets {
                    let phase = 2.0 * PI * offset * f64::from(n) / sample_rate;
                    sample += Complex::new(phase.cos() as f32, phase.sin() as f32) * amplitude;
                }
                if self.noise > 0.0 {
                    sample += Complex::new(
                        self.rng.gen_range(-self.noise..self.noise),
                        self.rng.gen_range(-self.noise..self.noise),
                    );
                }
                sample
            })
            .collect()
    }
}

/// Simulated sweep receiver. Clones share the same device.
#[derive(Debug, Clone)]
pub struct SimulatedDevice {
    state: Arc<Mutex<SimState>>,
}

impl SimulatedDevice {
    pub fn new(capability: DeviceCapability) -> Self {
        Self {
            state: Arc::new(Mutex::new(SimState {
                capability,
                tones: Vec::new(),
                noise: 0.0,
                reflevel: Some(0.0),
                rng: StdRng::seed_from_u64(0),
                entries: Vec::new(),
                iterations: 1,
                run: None,
                queue: VecDeque::new(),
                calls: Vec::new(),
            })),
        }
    }

    pub fn with_tone(self, tone: Tone) -> Self {
        self.lock().tones.push(tone);
        self
    }

    /// Uniform noise of the given peak amplitude on each I/Q component.
    pub fn with_noise(self, amplitude: f32, seed: u64) -> Self {
        {
            let mut state = self.lock();
            state.noise = amplitude;
            state.rng = StdRng::seed_from_u64(seed);
        }
        self
    }

    /// Reference level reported in contexts; `None` leaves it out entirely.
    pub fn with_reflevel(self, reflevel: Option<f64>) -> Self {
        self.lock().reflevel = reflevel;
        self
    }

    pub fn transport(&self) -> SimTransport {
        SimTransport {
            state: Arc::clone(&self.state),
        }
    }

    pub fn calls(&self) -> Vec<DeviceCall> {
        self.lock().calls.clone()
    }

    /// Ids passed to `sweep_start`, oldest first.
    pub fn started_sweeps(&self) -> Vec<u32> {
        self.lock()
            .calls
            .iter()
            .filter_map(|call| match call {
                DeviceCall::SweepStart(id) => Some(*id),
                _ => None,
            })
            .collect()
    }

    pub fn is_running(&self) -> bool {
        self.lock().run.is_some()
    }

    /// Queue an arbitrary packet ahead of anything generated later.
    pub fn inject(&self, packet: Packet) {
        self.lock().queue.push_back(packet);
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl SweepDevice for SimulatedDevice {
    fn abort(&mut self) -> Result<()> {
        let mut state = self.lock();
        state.calls.push(DeviceCall::Abort);
        state.run = None;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        let mut state = self.lock();
        state.calls.push(DeviceCall::Flush);
        state.queue.clear();
        Ok(())
    }

    fn request_read_perm(&mut self) -> Result<()> {
        self.lock().calls.push(DeviceCall::RequestReadPerm);
        Ok(())
    }

    fn sweep_clear(&mut self) -> Result<()> {
        let mut state = self.lock();
        state.calls.push(DeviceCall::SweepClear);
        state.entries.clear();
        Ok(())
    }

    fn sweep_add(&mut self, entry: SweepEntry) -> Result<()> {
        let mut state = self.lock();
        if entry.spp == 0 || entry.spp > state.capability.max_capture_size {
            return Err(SweepError::device(format!(
                "{} samples per packet not supported",
                entry.spp
            )));
        }
        state.calls.push(DeviceCall::SweepAdd(entry.clone()));
        state.entries.push(entry);
        Ok(())
    }

    fn sweep_iterations(&mut self, count: u32) -> Result<()> {
        let mut state = self.lock();
        state.calls.push(DeviceCall::SweepIterations(count));
        state.iterations = count;
        Ok(())
    }

    fn sweep_start(&mut self, sweep_id: u32) -> Result<()> {
        let mut state = self.lock();
        state.calls.push(DeviceCall::SweepStart(sweep_id));
        if state.entries.is_empty() {
            return Err(SweepError::device("sweep list is empty"));
        }
        debug!(
            "simulated sweep {sweep_id:#010x} started: {} entries, {} iteration(s)",
            state.entries.len(),
            state.iterations
        );
        let passes_left = (state.iterations > 0).then_some(state.iterations);
        state.run = Some(Run {
            sweep_id,
            passes_left,
            entry: 0,
            tuning: 0,
        });
        Ok(())
    }
}

/// Data side of a [`SimulatedDevice`].
#[derive(Debug, Clone)]
pub struct SimTransport {
    state: Arc<Mutex<SimState>>,
}

impl SimTransport {
    /// The next packet, or `None` when nothing is queued and no sweep runs.
    pub fn next_packet(&self) -> Option<Packet> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.queue.is_empty() {
            state.advance();
        }
        state.queue.pop_front()
    }

    /// Forward packets into `packet_tx` from a new thread until the receiving
    /// side goes away.
    pub fn spawn_pump(self, packet_tx: Sender<Packet>) -> JoinHandle<()> {
        thread::spawn(move || {
            while !packet_tx.is_disconnected() {
                match self.next_packet() {
                    Some(packet) => {
                        if packet_tx.send(packet).is_err() {
                            break;
                        }
                    }
                    None => thread::sleep(Duration::from_millis(1)),
                }
            }
            trace!("simulated transport closed");
        })
    }
}

impl PacketSource for SimTransport {
    fn read(&mut self) -> Result<Packet> {
        self.next_packet()
            .ok_or_else(|| SweepError::device("simulated receiver is idle, nothing to read"))
    }
}
