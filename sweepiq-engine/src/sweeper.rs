//! Sweep execution over a [`SweepDevice`].
//!
//! [`BlockingSweeper`] reads packets itself and returns one spectrum per call.
//! [`StreamingSweeper`] is fed packets by the caller's receive loop and
//! delivers spectra and failures as [`Event`]s.

use flume::Sender;
use log::{debug, info, warn};
use sweepiq_messages::{DeviceSettings, Event, Hertz, Repeat, Spectrum, SweepRequest};

use crate::capability::DeviceCapability;
use crate::device::{PacketSource, SweepDevice, SweepEntry};
use crate::error::{Result, SweepError};
use crate::fft::{FftPower, PowerSpectrum};
use crate::packet::Packet;
use crate::plan::{SweepPlan, plan_sweep};
use crate::session::{Outcome, SweepSession, SweepState};
use crate::stats::SweepStats;

enum Started {
    /// Nothing to capture; the hardware was left alone.
    Empty(Spectrum),
    Running,
}

/// State shared by both sweepers: the device, the current session and the
/// sweep id sequence.
struct SweepCore<D> {
    device: D,
    capability: DeviceCapability,
    power: Box<dyn PowerSpectrum>,
    session: Option<SweepSession>,
    next_sweep_id: u32,
    stats: SweepStats,
}

impl<D: SweepDevice> SweepCore<D> {
    fn new(device: D, capability: DeviceCapability) -> Self {
        Self {
            device,
            capability,
            power: Box::new(FftPower::new()),
            session: None,
            // ids from an earlier run of another host may still be in flight
            next_sweep_id: rand::random(),
            stats: SweepStats::default(),
        }
    }

    fn plan(&self, request: &SweepRequest) -> Result<SweepPlan> {
        plan_sweep(
            &self.capability,
            request.fstart.as_hz(),
            request.fstop.as_hz(),
            request.rbw.as_hz(),
            request.min_points,
            request.max_points,
        )
    }

    fn start(&mut self, request: &SweepRequest, repeat: Repeat) -> Result<Started> {
        let plan = self.plan(request)?;
        if plan.is_empty() {
            debug!("nothing to sweep in {}..{}", request.fstart, request.fstop);
            return Ok(Started::Empty(Spectrum::empty(Hertz(plan.fstart()))));
        }

        if let Err(err) = self.program(&plan, &request.settings) {
            self.cancel();
            return Err(err);
        }

        let sweep_id = self.next_sweep_id;
        self.next_sweep_id = sweep_id.wrapping_add(1);
        let previous = self.session.as_ref().map(SweepSession::sweep_id);
        info!(
            "starting sweep {sweep_id:#010x}: {} step(s), {} bins over {}..{}, {repeat:?}",
            plan.steps().len(),
            plan.total_bins(),
            Hertz(plan.fstart()),
            Hertz(plan.fstop())
        );
        self.session = Some(SweepSession::new(plan, sweep_id, previous, repeat));

        let iterations = match repeat {
            Repeat::Once => 1,
            Repeat::Continuous => 0,
        };
        if let Err(err) = self
            .device
            .sweep_iterations(iterations)
            .and_then(|()| self.device.sweep_start(sweep_id))
        {
            self.cancel();
            return Err(err);
        }
        Ok(Started::Running)
    }

    /// Stop whatever the device was doing and load the plan's sweep list.
    fn program(&mut self, plan: &SweepPlan, settings: &DeviceSettings) -> Result<()> {
        self.device.abort()?;
        self.device.flush()?;
        self.device.request_read_perm()?;
        self.device.sweep_clear()?;
        for step in plan.steps() {
            self.device
                .sweep_add(SweepEntry::from_step(step, &self.capability, settings))?;
        }
        Ok(())
    }

    /// Feed one packet; returns the spectrum when a traversal completes.
    fn on_packet(&mut self, packet: &Packet) -> Result<Option<Spectrum>> {
        let Some(session) = self.session.as_mut() else {
            let bytes = packet.byte_len();
            if packet.is_context() {
                self.stats.context_bytes_received += bytes;
            } else {
                self.stats.data_bytes_received += bytes;
                self.stats.martian_bytes_discarded += bytes;
            }
            return Ok(None);
        };

        let transition = match session.on_packet(packet, self.power.as_mut()) {
            Ok(transition) => transition,
            Err(err) => {
                self.cancel();
                return Err(err);
            }
        };
        self.stats += transition.stats;

        let Outcome::Completed(spectrum) = transition.outcome else {
            return Ok(None);
        };
        debug!(
            "sweep {:#010x} complete: {} bins",
            session.sweep_id(),
            spectrum.bins.len()
        );
        if session.repeat() == Repeat::Once {
            // the spectrum is complete; a failed stop only costs cleanup
            if let Err(err) = self.device.abort().and_then(|()| self.device.flush()) {
                warn!("failed to stop device after completed sweep: {err}");
            }
        }
        Ok(Some(spectrum))
    }

    fn is_in_flight(&self) -> bool {
        self.session.as_ref().is_some_and(SweepSession::is_in_flight)
    }

    /// Stop the hardware and forget the sweep in progress. Secondary device
    /// failures are logged, not returned.
    fn cancel(&mut self) {
        if let Some(session) = self.session.as_mut() {
            session.terminate();
        }
        if let Err(err) = self.device.abort().and_then(|()| self.device.flush()) {
            warn!("failed to stop device after cancelled sweep: {err}");
        }
    }

    fn state(&self) -> SweepState {
        self.session
            .as_ref()
            .map_or(SweepState::Idle, SweepSession::state)
    }
}

/// Single-shot sweeps read to completion on the calling thread.
pub struct BlockingSweeper<D, S> {
    core: SweepCore<D>,
    source: S,
}

impl<D: SweepDevice, S: PacketSource> BlockingSweeper<D, S> {
    pub fn new(device: D, source: S, capability: DeviceCapability) -> Self {
        Self {
            core: SweepCore::new(device, capability),
            source,
        }
    }

    /// Replace the FFT power estimator.
    pub fn with_power_spectrum(mut self, power: Box<dyn PowerSpectrum>) -> Self {
        self.core.power = power;
        self
    }

    /// Plan, run and assemble one sweep of `request`.
    pub fn capture(&mut self, request: &SweepRequest) -> Result<Spectrum> {
        if let Started::Empty(spectrum) = self.core.start(request, Repeat::Once)? {
            return Ok(spectrum);
        }
        loop {
            let packet = match self.source.read() {
                Ok(packet) => packet,
                Err(err) => {
                    self.core.cancel();
                    return Err(err);
                }
            };
            if let Some(spectrum) = self.core.on_packet(&packet)? {
                return Ok(spectrum);
            }
        }
    }

    pub fn plan(&self, request: &SweepRequest) -> Result<SweepPlan> {
        self.core.plan(request)
    }

    pub fn stats(&self) -> &SweepStats {
        &self.core.stats
    }

    pub fn reset_stats(&mut self) {
        self.core.stats = SweepStats::default();
    }

    pub fn device(&self) -> &D {
        &self.core.device
    }
}

/// Sweeps driven by packets the caller pushes in; results go out on a
/// channel. At most one sweep is in flight at a time.
pub struct StreamingSweeper<D> {
    core: SweepCore<D>,
    events: Sender<Event>,
}

impl<D: SweepDevice> StreamingSweeper<D> {
    pub fn new(device: D, capability: DeviceCapability, events: Sender<Event>) -> Self {
        Self {
            core: SweepCore::new(device, capability),
            events,
        }
    }

    pub fn with_power_spectrum(mut self, power: Box<dyn PowerSpectrum>) -> Self {
        self.core.power = power;
        self
    }

    /// Start a sweep. Requests rejected before touching the hardware return
    /// an error; an empty plan is delivered right away.
    pub fn start(&mut self, request: &SweepRequest, repeat: Repeat) -> Result<()> {
        if let Some(session) = self.core.session.as_ref().filter(|s| s.is_in_flight()) {
            return Err(SweepError::Busy(session.sweep_id()));
        }
        if let Started::Empty(spectrum) = self.core.start(request, repeat)? {
            self.deliver(Event::Spectrum(spectrum));
        }
        Ok(())
    }

    /// Handle one packet from the transport. Failures end the sweep and are
    /// delivered as [`Event::SweepFailed`].
    pub fn on_packet(&mut self, packet: &Packet) {
        match self.core.on_packet(packet) {
            Ok(Some(spectrum)) => self.deliver(Event::Spectrum(spectrum)),
            Ok(None) => {}
            Err(err) => {
                warn!("sweep failed: {err}");
                let sweep_id = self.core.session.as_ref().map(SweepSession::sweep_id);
                self.deliver(Event::SweepFailed {
                    sweep_id,
                    reason: err.to_string(),
                });
            }
        }
    }

    /// Stop the sweep in flight, if any. Packets still on their way are
    /// discarded as past-end.
    pub fn abort(&mut self) -> Result<()> {
        if !self.core.is_in_flight() {
            return Ok(());
        }
        if let Some(session) = self.core.session.as_mut() {
            info!("aborting sweep {:#010x}", session.sweep_id());
            session.terminate();
        }
        self.core.device.abort()?;
        self.core.device.flush()
    }

    pub fn is_in_flight(&self) -> bool {
        self.core.is_in_flight()
    }

    pub fn state(&self) -> SweepState {
        self.core.state()
    }

    pub fn sweep_id(&self) -> Option<u32> {
        self.core.session.as_ref().map(SweepSession::sweep_id)
    }

    pub fn stats(&self) -> &SweepStats {
        &self.core.stats
    }

    pub fn reset_stats(&mut self) {
        self.core.stats = SweepStats::default();
    }

    pub fn device(&self) -> &D {
        &self.core.device
    }

    pub fn events(&self) -> &Sender<Event> {
        &self.events
    }

    fn deliver(&mut self, event: Event) {
        if self.events.send(event).is_err() {
            warn!("event receiver dropped, abandoning sweep");
            self.core.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::Context;
    use crate::sim::{DeviceCall, SimTransport, SimulatedDevice};

    fn request() -> SweepRequest {
        SweepRequest::new(Hertz::mhz(1000.0), Hertz::mhz(1100.0), Hertz::khz(100.0))
    }

    fn drive(sweeper: &mut StreamingSweeper<SimulatedDevice>, transport: &SimTransport) {
        while let Some(packet) = transport.next_packet() {
            sweeper.on_packet(&packet);
        }
    }

    #[test]
    fn test_blocking_capture_returns_planned_bins() {
        let device = SimulatedDevice::new(DeviceCapability::default());
        let transport = device.transport();
        let mut sweeper = BlockingSweeper::new(device, transport, DeviceCapability::default());

        let expected = sweeper.plan(&request()).unwrap();
        let spectrum = sweeper.capture(&request()).unwrap();

        assert_eq!(spectrum.bins.len(), expected.total_bins());
        assert_eq!(spectrum.fstart, Hertz(expected.fstart()));
        assert_eq!(spectrum.fstop, Hertz(expected.fstop()));
        assert!(!sweeper.device().is_running());
        assert_eq!(sweeper.stats().martian_bytes_discarded, 0);
        assert!(sweeper.stats().data_bytes_processed > 0);
    }

    #[test]
    fn test_start_sequence() {
        let device = SimulatedDevice::new(DeviceCapability::default());
        let transport = device.transport();
        let mut sweeper = BlockingSweeper::new(device, transport, DeviceCapability::default());
        sweeper.capture(&request()).unwrap();

        let calls = sweeper.device().calls();
        assert_eq!(calls[0], DeviceCall::Abort);
        assert_eq!(calls[1], DeviceCall::Flush);
        assert_eq!(calls[2], DeviceCall::RequestReadPerm);
        assert_eq!(calls[3], DeviceCall::SweepClear);
        assert!(matches!(calls[4], DeviceCall::SweepAdd(_)));
        assert_eq!(calls[5], DeviceCall::SweepIterations(1));
        assert!(matches!(calls[6], DeviceCall::SweepStart(_)));
        // completion stops the hardware
        assert_eq!(&calls[7..], &[DeviceCall::Abort, DeviceCall::Flush]);
    }

    #[test]
    fn test_sweep_ids_increment() {
        let device = SimulatedDevice::new(DeviceCapability::default());
        let transport = device.transport();
        let mut sweeper = BlockingSweeper::new(device, transport, DeviceCapability::default());
        sweeper.capture(&request()).unwrap();
        sweeper.capture(&request()).unwrap();

        let ids = sweeper.device().started_sweeps();
        assert_eq!(ids.len(), 2);
        assert_eq!(ids[1], ids[0].wrapping_add(1));
    }

    #[test]
    fn test_empty_plan_leaves_hardware_alone() {
        let device = SimulatedDevice::new(DeviceCapability::default());
        let transport = device.transport();
        let mut sweeper = BlockingSweeper::new(device, transport, DeviceCapability::default());

        let out_of_range = SweepRequest::new(Hertz::ghz(25.0), Hertz::ghz(30.0), Hertz::khz(100.0));
        let spectrum = sweeper.capture(&out_of_range).unwrap();

        assert!(spectrum.is_empty());
        assert_eq!(spectrum.fstart, spectrum.fstop);
        assert!(sweeper.device().calls().is_empty());
    }

    #[test]
    fn test_capture_too_large_rejected_before_hardware() {
        let capability = DeviceCapability {
            max_capture_size: 1024,
            ..DeviceCapability::default()
        };
        let device = SimulatedDevice::new(capability.clone());
        let transport = device.transport();
        let mut sweeper = BlockingSweeper::new(device, transport, capability);

        let err = sweeper.capture(&request()).unwrap_err();
        assert!(matches!(err, SweepError::CaptureTooLarge { limit: 1024, .. }));
        assert!(sweeper.device().calls().is_empty());
    }

    /// Replies to every read with a context lacking `rffreq`, then data,
    /// labelled with whatever sweep the device last started.
    struct NoFrequency {
        device: SimulatedDevice,
        sent_context: bool,
    }

    impl PacketSource for NoFrequency {
        fn read(&mut self) -> Result<Packet> {
            if std::mem::replace(&mut self.sent_context, true) {
                return Ok(Packet::data(vec![Default::default(); 2048]));
            }
            Ok(Packet::context(Context {
                sweep_id: self.device.started_sweeps().last().copied(),
                ..Context::default()
            }))
        }
    }

    #[test]
    fn test_missing_rffreq_fails_blocking_capture() {
        let device = SimulatedDevice::new(DeviceCapability::default());
        let source = NoFrequency {
            device: device.clone(),
            sent_context: false,
        };
        let mut sweeper = BlockingSweeper::new(device, source, DeviceCapability::default());

        let err = sweeper.capture(&request()).unwrap_err();
        assert!(matches!(err, SweepError::MissingContext("rffreq")));
        // the failed sweep was stopped
        assert_eq!(
            sweeper.device().calls().last(),
            Some(&DeviceCall::Flush)
        );
        assert!(!sweeper.device().is_running());
    }

    /// Simulated receiver whose stop commands fail once a sweep has started.
    struct StuckAfterStart {
        inner: SimulatedDevice,
        started: bool,
    }

    impl SweepDevice for StuckAfterStart {
        fn abort(&mut self) -> Result<()> {
            self.inner.abort()?;
            if self.started {
                return Err(SweepError::device("link down"));
            }
            Ok(())
        }

        fn flush(&mut self) -> Result<()> {
            self.inner.flush()
        }

        fn request_read_perm(&mut self) -> Result<()> {
            self.inner.request_read_perm()
        }

        fn sweep_clear(&mut self) -> Result<()> {
            self.inner.sweep_clear()
        }

        fn sweep_add(&mut self, entry: SweepEntry) -> Result<()> {
            self.inner.sweep_add(entry)
        }

        fn sweep_iterations(&mut self, count: u32) -> Result<()> {
            self.inner.sweep_iterations(count)
        }

        fn sweep_start(&mut self, sweep_id: u32) -> Result<()> {
            self.inner.sweep_start(sweep_id)?;
            self.started = true;
            Ok(())
        }
    }

    fn stuck_device() -> (StuckAfterStart, SimTransport) {
        let inner = SimulatedDevice::new(DeviceCapability::default());
        let transport = inner.transport();
        (
            StuckAfterStart {
                inner,
                started: false,
            },
            transport,
        )
    }

    #[test]
    fn test_blocking_result_survives_failed_stop() {
        let (device, transport) = stuck_device();
        let mut sweeper = BlockingSweeper::new(device, transport, DeviceCapability::default());

        let expected = sweeper.plan(&request()).unwrap().total_bins();
        let spectrum = sweeper.capture(&request()).unwrap();
        assert_eq!(spectrum.bins.len(), expected);
    }

    #[test]
    fn test_streaming_result_survives_failed_stop() {
        let (event_tx, event_rx) = flume::unbounded();
        let (device, transport) = stuck_device();
        let mut sweeper = StreamingSweeper::new(device, DeviceCapability::default(), event_tx);
        sweeper.start(&request(), Repeat::Once).unwrap();

        while let Some(packet) = transport.next_packet() {
            sweeper.on_packet(&packet);
        }

        let events: Vec<Event> = event_rx.try_iter().collect();
        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], Event::Spectrum(s) if !s.bins.is_empty()));
    }

    #[test]
    fn test_streaming_once_delivers_single_spectrum() {
        let (event_tx, event_rx) = flume::unbounded();
        let device = SimulatedDevice::new(DeviceCapability::default());
        let transport = device.transport();
        let mut sweeper = StreamingSweeper::new(device, DeviceCapability::default(), event_tx);

        sweeper.start(&request(), Repeat::Once).unwrap();
        assert!(sweeper.is_in_flight());
        drive(&mut sweeper, &transport);

        let events: Vec<Event> = event_rx.try_iter().collect();
        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], Event::Spectrum(s) if !s.bins.is_empty()));
        assert_eq!(sweeper.state(), SweepState::Complete);
    }

    #[test]
    fn test_streaming_busy_while_in_flight() {
        let (event_tx, _event_rx) = flume::unbounded();
        let device = SimulatedDevice::new(DeviceCapability::default());
        let mut sweeper = StreamingSweeper::new(device, DeviceCapability::default(), event_tx);

        sweeper.start(&request(), Repeat::Continuous).unwrap();
        let active = sweeper.sweep_id().unwrap();
        let err = sweeper.start(&request(), Repeat::Once).unwrap_err();
        assert!(matches!(err, SweepError::Busy(id) if id == active));

        sweeper.abort().unwrap();
        assert!(sweeper.start(&request(), Repeat::Once).is_ok());
    }

    #[test]
    fn test_streaming_continuous_until_abort() {
        let (event_tx, event_rx) = flume::unbounded();
        let device = SimulatedDevice::new(DeviceCapability::default());
        let transport = device.transport();
        let mut sweeper = StreamingSweeper::new(device, DeviceCapability::default(), event_tx);
        sweeper.start(&request(), Repeat::Continuous).unwrap();

        let mut spectra = 0;
        while spectra < 3 {
            let packet = transport.next_packet().unwrap();
            sweeper.on_packet(&packet);
            spectra += event_rx.try_iter().count();
        }
        assert!(sweeper.is_in_flight());
        assert!(sweeper.device().is_running());

        sweeper.abort().unwrap();
        assert_eq!(sweeper.state(), SweepState::Complete);
        assert!(transport.next_packet().is_none());
    }

    #[test]
    fn test_stragglers_after_restart_are_past_end() {
        let (event_tx, _event_rx) = flume::unbounded();
        let device = SimulatedDevice::new(DeviceCapability::default());
        let transport = device.transport();
        let mut sweeper = StreamingSweeper::new(device, DeviceCapability::default(), event_tx);

        sweeper.start(&request(), Repeat::Continuous).unwrap();
        // data already handed to the host before the abort
        let stragglers: Vec<Packet> = (0..4).filter_map(|_| transport.next_packet()).collect();
        sweeper.abort().unwrap();
        sweeper.start(&request(), Repeat::Once).unwrap();

        let before = *sweeper.stats();
        for packet in &stragglers {
            sweeper.on_packet(packet);
        }
        let after = *sweeper.stats();
        let data_bytes: u64 = stragglers
            .iter()
            .filter(|p| !p.is_context())
            .map(Packet::byte_len)
            .sum();
        // the first straggler context re-labels the stream with the old id
        assert_eq!(
            after.past_end_bytes_discarded - before.past_end_bytes_discarded,
            data_bytes
        );
        assert_eq!(after.data_bytes_processed, before.data_bytes_processed);
    }

    #[test]
    fn test_streaming_failure_is_delivered() {
        let (event_tx, event_rx) = flume::unbounded();
        let device = SimulatedDevice::new(DeviceCapability::default());
        let mut sweeper = StreamingSweeper::new(device, DeviceCapability::default(), event_tx);
        sweeper.start(&request(), Repeat::Once).unwrap();
        let active = sweeper.sweep_id();

        sweeper.on_packet(&Packet::context(Context {
            sweep_id: active,
            ..Context::default()
        }));
        sweeper.on_packet(&Packet::data(vec![Default::default(); 2048]));

        match event_rx.try_recv().unwrap() {
            Event::SweepFailed { sweep_id, reason } => {
                assert_eq!(sweep_id, active);
                assert!(reason.contains("rffreq"));
            }
            other => panic!("expected a failure, got {other:?}"),
        }
        assert!(!sweeper.is_in_flight());
    }

    #[test]
    fn test_packets_before_any_sweep_are_martian() {
        let (event_tx, _event_rx) = flume::unbounded();
        let device = SimulatedDevice::new(DeviceCapability::default());
        let mut sweeper = StreamingSweeper::new(device, DeviceCapability::default(), event_tx);

        let packet = Packet::data(vec![Default::default(); 64]);
        sweeper.on_packet(&packet);
        assert_eq!(sweeper.stats().martian_bytes_discarded, packet.byte_len());
        assert_eq!(sweeper.state(), SweepState::Idle);
    }
}
