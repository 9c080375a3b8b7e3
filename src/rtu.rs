//! # RTU Framer
//!
//! Owns the serial port on the field side: appends the CRC, performs the
//! half-duplex exchange, and reads the reply with the two-stage timeout the
//! RTU line discipline demands — a generous wait for the first byte, then a
//! per-byte inter-symbol timeout of roughly 3.5 character times derived from
//! the UART configuration. Reception ends when the line goes quiet.

use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::time::timeout;
use tokio_serial::{SerialPort, SerialStream};
use tracing::{debug, trace, warn};

use crate::config::SerialSettings;
use crate::constants::{RS485_TURNAROUND_MS, RTU_RESPONSE_BUFFER_SIZE};
use crate::crc;
use crate::error::{GatewayError, GatewayResult};

/// Inter-symbol timeout: `max(1 ms, ⌈1500·(data+parity+stop)/baud⌉)`.
///
/// Works out to ~3.5 character times for the usual configurations; the start
/// bit is not counted.
pub fn inter_symbol_timeout(baud_rate: u32, data_bits: u8, parity_bits: u8, stop_bits: u8) -> Duration {
    let symbol_bits = (data_bits + parity_bits + stop_bits) as u64;
    let millis = (1500 * symbol_bits).div_ceil(baud_rate as u64);
    Duration::from_millis(millis.max(1))
}

/// Half-duplex RTU port
pub struct RtuPort {
    port: SerialStream,
    first_byte_timeout: Duration,
    inter_symbol: Duration,
}

impl RtuPort {
    /// Open the configured serial port
    pub fn open(settings: &SerialSettings) -> GatewayResult<Self> {
        let data_bits = match settings.data_bits {
            7 => tokio_serial::DataBits::Seven,
            8 => tokio_serial::DataBits::Eight,
            other => {
                return Err(GatewayError::configuration(format!(
                    "Unsupported data bits: {}",
                    other
                )))
            }
        };
        let parity = match settings.parity.to_ascii_lowercase().as_str() {
            "none" => tokio_serial::Parity::None,
            "even" => tokio_serial::Parity::Even,
            "odd" => tokio_serial::Parity::Odd,
            other => {
                return Err(GatewayError::configuration(format!(
                    "Unsupported parity: {}",
                    other
                )))
            }
        };
        let stop_bits = match settings.stop_bits {
            1 => tokio_serial::StopBits::One,
            2 => tokio_serial::StopBits::Two,
            other => {
                return Err(GatewayError::configuration(format!(
                    "Unsupported stop bits: {}",
                    other
                )))
            }
        };

        let builder = tokio_serial::new(&settings.port, settings.baud_rate)
            .data_bits(data_bits)
            .stop_bits(stop_bits)
            .parity(parity);

        let port = SerialStream::open(&builder).map_err(|e| {
            GatewayError::connection(format!(
                "Failed to open serial port {}: {}",
                settings.port, e
            ))
        })?;

        let inter_symbol = inter_symbol_timeout(
            settings.baud_rate,
            settings.data_bits,
            settings.parity_bits(),
            settings.stop_bits,
        );

        debug!(
            port = %settings.port,
            baud = settings.baud_rate,
            inter_symbol_ms = inter_symbol.as_millis() as u64,
            "Serial port opened"
        );

        Ok(Self {
            port,
            first_byte_timeout: Duration::from_millis(settings.first_byte_timeout_ms),
            inter_symbol,
        })
    }

    /// One request/reply exchange with the slave.
    ///
    /// `adu` carries no CRC; it is appended here. The returned frame has its
    /// CRC verified and stripped. One attempt only; the caller decides what a
    /// failure means.
    pub async fn exchange(&mut self, adu: &[u8]) -> GatewayResult<Vec<u8>> {
        let mut frame = adu.to_vec();
        crc::append(&mut frame);

        // Residual bytes from a previous aborted exchange would corrupt
        // positional matching.
        self.port
            .clear(tokio_serial::ClearBuffer::Input)
            .map_err(|e| GatewayError::io(format!("Failed to clear input buffer: {}", e)))?;

        trace!(len = frame.len(), "Transmitting RTU frame");
        self.port.write_all(&frame).await?;
        self.port.flush().await?;

        // Let the RS-485 driver release the bus, then drop whatever the
        // transceiver echoed back during transmit.
        tokio::time::sleep(Duration::from_millis(RS485_TURNAROUND_MS)).await;
        self.port
            .clear(tokio_serial::ClearBuffer::Input)
            .map_err(|e| GatewayError::io(format!("Failed to clear input buffer: {}", e)))?;

        let reply = self.read_frame().await?;

        if !crc::verify(&reply) {
            warn!(len = reply.len(), "RTU reply failed CRC check");
            return Err(GatewayError::frame("CRC check failed"));
        }

        // Strip the trailing CRC; everything else goes back verbatim
        Ok(reply[..reply.len() - 2].to_vec())
    }

    /// Read one frame: first byte within `first_byte_timeout`, then bytes
    /// until the inter-symbol timeout elapses or the buffer fills.
    async fn read_frame(&mut self) -> GatewayResult<Vec<u8>> {
        let mut frame = Vec::new();
        let mut byte = [0u8; 1];

        match timeout(self.first_byte_timeout, self.port.read_exact(&mut byte)).await {
            Ok(Ok(_)) => frame.push(byte[0]),
            Ok(Err(e)) => return Err(GatewayError::io(format!("Serial read error: {}", e))),
            Err(_) => {
                return Err(GatewayError::timeout(
                    "first reply byte",
                    self.first_byte_timeout.as_millis() as u64,
                ))
            }
        }

        while frame.len() < RTU_RESPONSE_BUFFER_SIZE {
            match timeout(self.inter_symbol, self.port.read_exact(&mut byte)).await {
                Ok(Ok(_)) => frame.push(byte[0]),
                Ok(Err(e)) => return Err(GatewayError::io(format!("Serial read error: {}", e))),
                // Line went quiet: end of frame
                Err(_) => break,
            }
        }

        trace!(len = frame.len(), "RTU frame received");
        Ok(frame)
    }
}
