#![no_std]
#![no_main]
#![deny(
    clippy::mem_forget,
    reason = "mem::forget is generally not safe to do with esp_hal types, especially those \
    holding buffers for the duration of a data transfer."
)]
#![deny(clippy::large_stack_frames)]

use embassy_executor::Spawner;
use embassy_time::{Duration, Instant, Timer};
use esp_hal::clock::CpuClock;
use esp_hal::timer::timg::TimerGroup;
use log::{LevelFilter, info, warn};

use bringup_core::actuators::{PulseTiming, pulse_sequence};
use bringup_core::config::{BoardConfig, HarnessConfig};
use bringup_core::harness::SelfTestHarness;
use bringup_core::telemetry::{TelemetryIngestor, log_fix};
use bringup_firmware::hardware;
use bringup_firmware::sd_card::{FixedTimeSource, SdCardStorage};

#[panic_handler]
fn panic(info: &core::panic::PanicInfo) -> ! {
    rtt_target::rprintln!("PANIC: {}", info);
    loop {}
}

extern crate alloc;

// This creates a default app-descriptor required by the esp-idf bootloader.
// For more information see: <https://docs.espressif.com/projects/esp-idf/en/stable/esp32/api-reference/system/app_image_format.html#application-description>
esp_bootloader_esp_idf::esp_app_desc!();

fn uptime_ms() -> u64 {
    Instant::now().as_millis()
}

#[allow(
    clippy::large_stack_frames,
    reason = "it's not unusual to allocate larger buffers etc. in main"
)]
#[esp_rtos::main]
async fn main(_spawner: Spawner) -> ! {
    rtt_target::rtt_init_log!(LevelFilter::Info);

    let config = esp_hal::Config::default().with_cpu_clock(CpuClock::max());
    let peripherals = esp_hal::init(config);

    esp_alloc::heap_allocator!(#[esp_hal::ram(reclaimed)] size: 73744);

    let timg0 = TimerGroup::new(peripherals.TIMG0);
    esp_rtos::start(timg0.timer0);

    let board = BoardConfig::default();
    let harness_config = HarnessConfig::default();

    info!("");
    info!("========================================");
    info!("ESP32-S3 GPS, filesystem and byte-store bring-up");
    info!("========================================");

    // Actuators
    let mut actuators = hardware::init_actuators(peripherals.GPIO11, peripherals.GPIO12);
    let Ok(()) = pulse_sequence(
        &mut actuators,
        &mut embassy_time::Delay,
        PulseTiming::from(&board),
    )
    .await;

    // GPS serial
    let gps = hardware::init_gps_uart(
        peripherals.UART1,
        peripherals.GPIO18,
        peripherals.GPIO17,
        &board,
    );

    // Storage self-test
    match hardware::init_sd_spi(
        peripherals.SPI2,
        peripherals.GPIO36,
        peripherals.GPIO37,
        peripherals.GPIO35,
        peripherals.GPIO4,
    ) {
        Some(spi) => {
            let storage = SdCardStorage::new(hardware::init_sd_card(spi), FixedTimeSource);
            let report = SelfTestHarness::new(&harness_config).run(
                storage.medium(),
                storage.volume(),
                &uptime_ms,
            );
            if !report.all_passed() {
                warn!("Self-test finished with {} failure(s)", report.failed());
            }
        }
        None => warn!("No SD card bus, skipping the storage self-test"),
    }

    // GPS ingest
    let tick = Duration::from_millis(u64::from(board.ingest_tick_ms));
    let mut ingestor = TelemetryIngestor::new();

    let Some(mut gps) = gps else {
        warn!("No GPS serial, idling");
        loop {
            Timer::after(Duration::from_secs(1)).await;
        }
    };

    info!("");
    info!("Waiting for GPS data...");
    loop {
        let now = uptime_ms();
        if let Some(fix) = ingestor.drain(&mut gps, now) {
            log_fix(&fix, now);
        }
        Timer::after(tick).await;
    }
}
