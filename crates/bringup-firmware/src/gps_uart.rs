//! GPS receiver on a UART as a telemetry [`ByteSource`]

use bringup_core::telemetry::ByteSource;
use esp_hal::Blocking;
use esp_hal::uart::Uart;
use log::debug;

/// Receive side of the GPS UART
///
/// Reads never block: once the RX FIFO is empty the ingest tick ends.
pub struct GpsUart<'d> {
    uart: Uart<'d, Blocking>,
}

impl<'d> GpsUart<'d> {
    pub fn new(uart: Uart<'d, Blocking>) -> Self {
        Self { uart }
    }
}

impl ByteSource for GpsUart<'_> {
    fn read_byte(&mut self) -> Option<u8> {
        if !self.uart.read_ready() {
            return None;
        }
        let mut byte = [0u8; 1];
        match self.uart.read(&mut byte) {
            Ok(1) => Some(byte[0]),
            Ok(_) => None,
            Err(e) => {
                debug!("GPS UART read error: {:?}", e);
                None
            }
        }
    }
}
