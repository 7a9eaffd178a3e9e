//! Opening the physical link.
//!
//! The protocol layer never touches port settings; this is the one place that
//! turns [`InstrumentConfig`] into a stream.

use super::channel::DynSerial;
use super::mock::MockInstrument;
use crate::config::InstrumentConfig;
use crate::error::{AppResult, DaqError};

/// Open the configured serial port (8N1, no flow control).
#[cfg(feature = "instrument_serial")]
pub async fn open_serial(config: &InstrumentConfig) -> AppResult<DynSerial> {
    use tokio_serial::SerialPortBuilderExt;

    let port_path = config.port.clone();
    let baud_rate = config.baud_rate;

    // Opening can block on some platforms
    let port = tokio::task::spawn_blocking(move || {
        tokio_serial::new(&port_path, baud_rate)
            .data_bits(tokio_serial::DataBits::Eight)
            .parity(tokio_serial::Parity::None)
            .stop_bits(tokio_serial::StopBits::One)
            .flow_control(tokio_serial::FlowControl::None)
            .open_native_async()
    })
    .await
    .map_err(|e| {
        DaqError::transport(
            format!("opening {}", config.port),
            std::io::Error::new(std::io::ErrorKind::Other, e),
        )
    })?
    .map_err(|e| DaqError::transport(format!("opening {}", config.port), e.into()))?;

    tracing::info!(port = %config.port, baud = config.baud_rate, "Serial port opened");
    Ok(Box::new(port))
}

/// Open the configured serial port (8N1, no flow control).
#[cfg(not(feature = "instrument_serial"))]
pub async fn open_serial(_config: &InstrumentConfig) -> AppResult<DynSerial> {
    Err(DaqError::SerialFeatureDisabled)
}

/// Open either the simulated instrument or the real port.
pub async fn open(config: &InstrumentConfig, mock: bool) -> AppResult<DynSerial> {
    if mock {
        tracing::info!("Using simulated instrument");
        Ok(Box::new(MockInstrument::diode().spawn()))
    } else {
        open_serial(config).await
    }
}
