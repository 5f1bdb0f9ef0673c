//! Start-up pulse of the board's digital actuators
//!
//! The buzzer and the relay are each driven high for a fixed time and then
//! released, one after the other, so a person at the bench can hear or see
//! that both outputs are wired up.

use embedded_hal::digital::OutputPin;
use embedded_hal_async::delay::DelayNs;
use log::{error, info};

use crate::config::BoardConfig;

/// How long an output stays high and how long to wait after releasing it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PulseTiming {
    pub high_ms: u32,
    pub gap_ms: u32,
}

impl From<&BoardConfig> for PulseTiming {
    fn from(config: &BoardConfig) -> Self {
        Self {
            high_ms: config.pulse_ms,
            gap_ms: config.pulse_gap_ms,
        }
    }
}

/// A named digital output
pub struct Actuator<P: OutputPin> {
    name: &'static str,
    pin: P,
}

impl<P: OutputPin> Actuator<P> {
    pub fn new(name: &'static str, pin: P) -> Self {
        Self { name, pin }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn into_pin(self) -> P {
        self.pin
    }

    /// Drive high for `timing.high_ms`, drive low, then wait `timing.gap_ms`
    pub async fn pulse<D: DelayNs>(&mut self, delay: &mut D, timing: PulseTiming) -> Result<(), P::Error> {
        self.pin.set_high()?;
        info!("{} ON", self.name);
        delay.delay_ms(timing.high_ms).await;

        self.pin.set_low()?;
        info!("{} OFF", self.name);
        delay.delay_ms(timing.gap_ms).await;
        Ok(())
    }
}

/// Pulse every actuator in order
///
/// Stops at the first output that cannot be driven.
pub async fn pulse_sequence<P, D>(
    actuators: &mut [Actuator<P>],
    delay: &mut D,
    timing: PulseTiming,
) -> Result<(), P::Error>
where
    P: OutputPin,
    D: DelayNs,
{
    for actuator in actuators.iter_mut() {
        if let Err(e) = actuator.pulse(delay, timing).await {
            error!("Failed to drive {}", actuator.name);
            return Err(e);
        }
    }
    Ok(())
}
