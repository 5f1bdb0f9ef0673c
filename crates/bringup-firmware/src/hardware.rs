//! Peripheral set-up for the bring-up board
//!
//! Pin numbers follow [`BoardConfig::default`]; esp-hal peripherals are typed
//! per pin, so a change of wiring means a change here as well.
//!
//! [`BoardConfig::default`]: bringup_core::config::BoardConfig

use bringup_core::actuators::Actuator;
use bringup_core::config::BoardConfig;
use embedded_hal_bus::spi::ExclusiveDevice;
use esp_hal::Blocking;
use esp_hal::gpio::{Level, Output, OutputConfig};
use esp_hal::spi::master::{Config as SpiConfig, Spi};
use esp_hal::time::Rate;
use esp_hal::uart::{Config as UartConfig, Uart};
use log::{error, info};

use crate::gps_uart::GpsUart;

/// SPI device driving the SD card
pub type SdSpi = ExclusiveDevice<Spi<'static, Blocking>, Output<'static>, embassy_time::Delay>;

/// Buzzer and relay, driven low until the start-up pulse
pub fn init_actuators(
    buzzer: esp_hal::peripherals::GPIO11<'static>,
    relay: esp_hal::peripherals::GPIO12<'static>,
) -> [Actuator<Output<'static>>; 2] {
    [
        Actuator::new("Buzzer", Output::new(buzzer, Level::Low, OutputConfig::default())),
        Actuator::new("Relay", Output::new(relay, Level::Low, OutputConfig::default())),
    ]
}

/// UART1 wired to the GPS module, 8N1 at the configured baud rate
pub fn init_gps_uart(
    uart1: esp_hal::peripherals::UART1<'static>,
    rx: esp_hal::peripherals::GPIO18<'static>,
    tx: esp_hal::peripherals::GPIO17<'static>,
    board: &BoardConfig,
) -> Option<GpsUart<'static>> {
    match Uart::new(uart1, UartConfig::default().with_baudrate(board.gps_baud)) {
        Ok(uart) => {
            info!("GPS serial started at {} baud", board.gps_baud);
            Some(GpsUart::new(uart.with_rx(rx).with_tx(tx)))
        }
        Err(e) => {
            error!("GPS UART configuration failed: {:?}", e);
            None
        }
    }
}

/// Initialize SPI hardware for the SD card
///
/// The card is clocked at 400 kHz, the rate every card accepts during
/// initialization.
pub fn init_sd_spi(
    spi2: esp_hal::peripherals::SPI2<'static>,
    sck: esp_hal::peripherals::GPIO36<'static>,
    mosi: esp_hal::peripherals::GPIO37<'static>,
    miso: esp_hal::peripherals::GPIO35<'static>,
    cs: esp_hal::peripherals::GPIO4<'static>,
) -> Option<SdSpi> {
    let spi_bus = match Spi::new(spi2, SpiConfig::default().with_frequency(Rate::from_khz(400))) {
        Ok(spi) => spi.with_sck(sck).with_mosi(mosi).with_miso(miso),
        Err(e) => {
            error!("SD card SPI configuration failed: {:?}", e);
            return None;
        }
    };
    let cs = Output::new(cs, Level::High, OutputConfig::default());

    match ExclusiveDevice::new(spi_bus, cs, embassy_time::Delay) {
        Ok(device) => Some(device),
        Err(e) => {
            error!("SD card chip select failed: {:?}", e);
            None
        }
    }
}

/// Wrap the SD card SPI device as an SD card instance
pub fn init_sd_card(spi: SdSpi) -> embedded_sdmmc::SdCard<SdSpi, embassy_time::Delay> {
    embedded_sdmmc::SdCard::new(spi, embassy_time::Delay)
}
