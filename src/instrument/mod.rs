//! Instrument communication: wire protocol, request/response channel, the link
//! itself, and a simulated instrument for running without hardware.

pub mod channel;
pub mod mock;
pub mod protocol;
pub mod transport;

pub use channel::{ChannelSettings, DynSerial, InstrumentChannel, SerialPortIO};
pub use mock::MockInstrument;
pub use protocol::Command;
