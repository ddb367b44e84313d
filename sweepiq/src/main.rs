mod args;

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::time::Duration;

use anyhow::{Context as _, bail};
use clap::Parser;
use log::{LevelFilter, info};
use sweepiq_engine::{BlockingSweeper, DeviceCapability, Engine, SimulatedDevice};
use sweepiq_messages::{Command, Decibels, Event, Repeat, Spectrum, SweepRequest};

use crate::args::Args;

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let level = args.verbose.log_level_filter();

    env_logger::builder()
        .format(|buf, record| {
            writeln!(
                buf,
                "{:<5} - mod path |{}| - args: |{}|",
                record.level(),
                record.module_path().unwrap_or(""),
                record.args()
            )
        })
        .filter_level(level)
        .filter_module("sweepiq_engine::sim", level.min(LevelFilter::Info))
        .init();

    let capability = match &args.device {
        Some(path) => DeviceCapability::load(path)
            .with_context(|| format!("loading capability descriptor {}", path.display()))?,
        None => DeviceCapability::default(),
    };

    let mut device = SimulatedDevice::new(capability.clone()).with_noise(args.noise, 1);
    for tone in &args.tones {
        device = device.with_tone(*tone);
    }

    let request = args.request();
    let spectrum = if args.sweeps == 1 {
        let mut sweeper = BlockingSweeper::new(device.clone(), device.transport(), capability);
        let spectrum = sweeper.capture(&request)?;
        report(&spectrum);
        spectrum
    } else {
        run_continuous(device, capability, request, args.sweeps)?
    };

    if let Some(path) = &args.output {
        write_csv(path, &spectrum)?;
        info!("wrote {} bins to {}", spectrum.bins.len(), path.display());
    }
    Ok(())
}

/// Sweep continuously on an engine thread until `count` spectra arrive.
fn run_continuous(
    device: SimulatedDevice,
    capability: DeviceCapability,
    request: SweepRequest,
    count: u32,
) -> anyhow::Result<Spectrum> {
    let (cmd_tx, cmd_rx) = flume::unbounded();
    let (event_tx, event_rx) = flume::unbounded();
    let (packet_tx, packet_rx) = flume::bounded(64);

    let transport_handle = device.transport().spawn_pump(packet_tx);
    let engine_handle = std::thread::spawn(move || {
        let engine = Engine::new(cmd_rx, packet_rx, event_tx, device, capability);
        engine.run()
    });

    cmd_tx.send(Command::Start {
        request,
        repeat: Repeat::Continuous,
    })?;

    let mut last = None;
    for _ in 0..count {
        match event_rx.recv_timeout(Duration::from_secs(10)) {
            Ok(Event::Spectrum(spectrum)) => {
                report(&spectrum);
                let done = spectrum.is_empty();
                last = Some(spectrum);
                if done {
                    break;
                }
            }
            Ok(Event::SweepFailed { reason, .. }) => {
                let _ = cmd_tx.send(Command::Stop);
                bail!("sweep failed: {reason}");
            }
            Err(err) => {
                let _ = cmd_tx.send(Command::Stop);
                bail!("no spectrum from engine: {err}");
            }
        }
    }

    cmd_tx.send(Command::Stop)?;
    engine_handle
        .join()
        .map_err(|_| anyhow::anyhow!("Engine thread panicked"))??;
    transport_handle
        .join()
        .map_err(|_| anyhow::anyhow!("Transport thread panicked"))?;

    last.context("engine delivered no spectrum")
}

fn report(spectrum: &Spectrum) {
    match spectrum.peak() {
        Some((frequency, level)) => println!(
            "{} .. {}: {} bins, peak {:.1} dB at {}",
            spectrum.fstart,
            spectrum.fstop,
            spectrum.bins.len(),
            level.as_db(),
            frequency
        ),
        None => println!("{}: nothing to sweep", spectrum.fstart),
    }
}

fn write_csv(path: &Path, spectrum: &Spectrum) -> anyhow::Result<()> {
    let mut out = BufWriter::new(File::create(path)?);
    writeln!(out, "frequency_hz,power_db")?;
    for (index, power) in spectrum.bins.iter().enumerate() {
        if let Some(frequency) = spectrum.frequency_of(index) {
            writeln!(
                out,
                "{:.0},{:.2}",
                frequency.as_hz(),
                Decibels::from_linear(*power).as_db()
            )?;
        }
    }
    out.flush()?;
    Ok(())
}
