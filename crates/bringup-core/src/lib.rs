//! Hardware-independent core library for bringup-rs
//!
//! This crate contains the platform-agnostic logic of the board bring-up
//! firmware: the persistent byte-store, the flat flash filesystem, the
//! self-test harness that exercises both, the NMEA telemetry ingestor and
//! the actuator start-up sequence.
//!
//! It is `#![no_std]` with `extern crate alloc` so it compiles on both
//! embedded targets (ESP32-S3) and desktop hosts (for the simulator and tests).

#![no_std]

extern crate alloc;

pub mod actuators;
pub mod config;
pub mod harness;
pub mod storage;
pub mod telemetry;
