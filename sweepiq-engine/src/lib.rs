mod capability;
mod device;
mod error;
mod fft;
mod packet;
mod plan;
mod session;
mod sim;
mod stats;
mod sweeper;

pub use capability::DeviceCapability;
pub use device::{PacketSource, SweepDevice, SweepEntry};
pub use error::{Result, SweepError};
pub use fft::{FftPower, PowerSpectrum};
pub use packet::{Context, ContextPacket, DataPacket, Packet};
pub use plan::{BinWindow, CaptureStep, SweepPlan, Tuning, plan_sweep};
pub use session::{Classification, Outcome, SweepSession, SweepState, Transition, classify};
pub use sim::{DeviceCall, SimTransport, SimulatedDevice, Tone};
pub use stats::SweepStats;
pub use sweeper::{BlockingSweeper, StreamingSweeper};

use std::time::Duration;

use flume::{Receiver, RecvError, RecvTimeoutError, Selector, Sender};
use log::{debug, info, warn};
use sweepiq_messages::{Command, Event};

enum Input {
    Command(std::result::Result<Command, RecvError>),
    Packet(std::result::Result<Packet, RecvError>),
    Idle,
}

/// The sweep engine backend.
/// Owns the device and processes commands and received packets.
pub struct Engine<D> {
    cmd_rx: Receiver<Command>,
    packet_rx: Receiver<Packet>,
    sweeper: StreamingSweeper<D>,
    transport_open: bool,
    should_exit: bool,
}

impl<D: SweepDevice> Engine<D> {
    /// Create a new Engine instance.
    pub fn new(
        cmd_rx: Receiver<Command>,
        packet_rx: Receiver<Packet>,
        event_tx: Sender<Event>,
        device: D,
        capability: DeviceCapability,
    ) -> Self {
        debug!("Constructing a new engine");
        Self {
            cmd_rx,
            packet_rx,
            sweeper: StreamingSweeper::new(device, capability, event_tx),
            transport_open: true,
            should_exit: false,
        }
    }

    /// Run the engine (blocking) until `Command::Stop` or the command
    /// channel closes.
    pub fn run(mut self) -> anyhow::Result<()> {
        while !self.should_exit {
            match self.next_input() {
                Input::Command(msg) => self.handle_command(msg)?,
                Input::Packet(Ok(packet)) => self.sweeper.on_packet(&packet),
                Input::Packet(Err(RecvError::Disconnected)) => {
                    warn!("transport closed");
                    self.transport_open = false;
                    self.sweeper.abort()?;
                }
                Input::Idle => {}
            }
        }
        let stats = self.sweeper.stats();
        info!(
            "engine stopped: {} data bytes received, {} processed, {} martian, {} past end",
            stats.data_bytes_received,
            stats.data_bytes_processed,
            stats.martian_bytes_discarded,
            stats.past_end_bytes_discarded
        );
        Ok(())
    }

    fn next_input(&self) -> Input {
        let timeout = Duration::from_millis(100);
        if !self.transport_open {
            return match self.cmd_rx.recv_timeout(timeout) {
                Ok(cmd) => Input::Command(Ok(cmd)),
                Err(RecvTimeoutError::Disconnected) => {
                    Input::Command(Err(RecvError::Disconnected))
                }
                Err(RecvTimeoutError::Timeout) => Input::Idle,
            };
        }
        Selector::new()
            .recv(&self.cmd_rx, Input::Command)
            .recv(&self.packet_rx, Input::Packet)
            .wait_timeout(timeout)
            .unwrap_or(Input::Idle)
    }

    fn handle_command(
        &mut self,
        msg: std::result::Result<Command, RecvError>,
    ) -> anyhow::Result<()> {
        debug!("Engine received message: {:?}", msg);
        match msg {
            Ok(Command::Start { request, repeat }) => {
                if let Err(err) = self.sweeper.start(&request, repeat) {
                    warn!("sweep rejected: {err}");
                    // rejected requests never get a sweep id
                    let failure = Event::SweepFailed {
                        sweep_id: None,
                        reason: err.to_string(),
                    };
                    if self.sweeper.events().send(failure).is_err() {
                        warn!("event receiver dropped, rejection of {request:?} not delivered");
                    }
                }
            }
            Ok(Command::Abort) => self.sweeper.abort()?,
            Ok(Command::Stop) | Err(RecvError::Disconnected) => {
                self.should_exit = true;
                self.sweeper.abort()?;
            }
        }
        Ok(())
    }
}
