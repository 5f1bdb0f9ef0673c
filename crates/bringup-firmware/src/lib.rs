//! ESP32-S3 firmware-specific modules for bringup-rs
//!
//! This crate contains hardware-specific code that cannot compile on desktop
//! targets: peripheral initialization, the SD card backing for both stores
//! and the GPS UART byte source.

#![no_std]

extern crate alloc;

pub mod gps_uart;
pub mod hardware;
pub mod sd_card;
