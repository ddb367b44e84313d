mod command;
mod event;
mod request;
mod spectrum;
mod units;

pub use command::Command;
pub use event::Event;
pub use request::{DeviceSettings, Repeat, RfGain, SweepRequest};
pub use spectrum::Spectrum;
pub use units::{Decibels, Hertz};
