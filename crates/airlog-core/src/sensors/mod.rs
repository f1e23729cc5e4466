//! Sensor-fusion readout: readings, accuracy grades and the engine trait
//!
//! The fusion engine turns raw gas/temperature/pressure/humidity samples into
//! calibrated outputs. The core only asks it for a subscription (which outputs,
//! at what cadence), drains ready samples from it once per loop iteration and
//! moves its opaque calibration state in and out of storage.

mod battery;

pub use battery::*;

use embassy_time::{Duration, Instant};
use heapless::Vec;

use crate::error::FusionError;
use crate::storage::calibration::CalibrationBlob;

/// Maximum number of samples a single [`FusionEngine::poll`] may hand back.
pub const MAX_SAMPLES_PER_POLL: usize = 4;

/// Calibration confidence reported by the fusion engine.
///
/// Grades only improve as the engine warms up; 0 means wholly uncalibrated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct Accuracy(u8);

impl Accuracy {
    pub const UNRELIABLE: Self = Self(0);
    pub const LOW: Self = Self(1);
    pub const MEDIUM: Self = Self(2);
    pub const HIGH: Self = Self(3);

    /// Clamp an engine-reported grade into 0..=3.
    pub const fn new(grade: u8) -> Self {
        if grade > 3 { Self(3) } else { Self(grade) }
    }

    pub const fn grade(self) -> u8 {
        self.0
    }

    /// True once the engine has left the uncalibrated state.
    pub const fn is_calibrated(self) -> bool {
        self.0 >= 1
    }
}

/// Latest calibrated readings, overwritten in place on every sample.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SensorReading {
    /// Degrees Celsius
    pub temperature: f32,
    /// Pascal
    pub pressure: f32,
    /// Percent relative humidity
    pub humidity: f32,
    /// Indoor air-quality index (0..500)
    pub iaq: f32,
    /// CO2-equivalent in ppm
    pub co2: f32,
    /// Supply voltage in volts
    pub voltage: f32,
    pub battery_percent: u8,
    pub accuracy: Accuracy,
}

impl SensorReading {
    /// Overwrite the fused outputs with a new sample.
    ///
    /// Voltage and battery percentage are owned by the battery path and left
    /// untouched.
    pub fn apply(&mut self, sample: &FusionSample) {
        self.temperature = sample.temperature;
        self.pressure = sample.pressure;
        self.humidity = sample.humidity;
        self.iaq = sample.iaq;
        self.co2 = sample.co2;
        self.accuracy = sample.accuracy;
    }

    pub fn set_voltage(&mut self, volts: f32) {
        self.voltage = volts;
        self.battery_percent = battery_percentage(volts);
    }
}

/// Monotonic ratchets kept since boot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunningStats {
    /// Highest temperature seen, `None` before the first sample.
    pub max_temperature: Option<f32>,
    pub max_co2: f32,
    pub boot_time: Instant,
}

impl RunningStats {
    pub fn new(boot_time: Instant) -> Self {
        Self {
            max_temperature: None,
            max_co2: 0.0,
            boot_time,
        }
    }

    pub fn update(&mut self, sample: &FusionSample) {
        if self.max_temperature.is_none_or(|max| sample.temperature > max) {
            self.max_temperature = Some(sample.temperature);
        }
        if sample.co2 > self.max_co2 {
            self.max_co2 = sample.co2;
        }
    }

    pub fn uptime(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.boot_time)
    }
}

/// One ready output set from the fusion engine.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FusionSample {
    pub temperature: f32,
    pub pressure: f32,
    pub humidity: f32,
    pub iaq: f32,
    pub co2: f32,
    pub accuracy: Accuracy,
}

/// Virtual outputs the core subscribes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VirtualSensor {
    Iaq,
    Co2Equivalent,
    RawTemperature,
    RawPressure,
    RawHumidity,
}

/// Every output the core consumes; all modes subscribe to the full set.
pub const ALL_OUTPUTS: [VirtualSensor; 5] = [
    VirtualSensor::Iaq,
    VirtualSensor::Co2Equivalent,
    VirtualSensor::RawTemperature,
    VirtualSensor::RawPressure,
    VirtualSensor::RawHumidity,
];

/// Target interval between fusion updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cadence {
    /// 1 Hz
    Continuous,
    /// One sample every 3 seconds
    LowPower,
    /// One sample every 300 seconds
    UltraLowPower,
}

impl Cadence {
    /// Sample rate in Hz as the fusion engine expects it.
    pub const fn rate_hz(self) -> f32 {
        match self {
            Self::Continuous => 1.0,
            Self::LowPower => 0.33333,
            Self::UltraLowPower => 0.003333,
        }
    }

    pub const fn period(self) -> Duration {
        match self {
            Self::Continuous => Duration::from_secs(1),
            Self::LowPower => Duration::from_secs(3),
            Self::UltraLowPower => Duration::from_secs(300),
        }
    }
}

/// Sensor set plus cadence requested from the fusion engine.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Subscription {
    pub outputs: &'static [VirtualSensor],
    pub cadence: Cadence,
}

/// I2C address the fusion engine's sensor answers on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorAddress {
    Primary,
    Secondary,
}

/// The sensor-fusion engine as seen by the core.
pub trait FusionEngine {
    /// Bring the engine up on the given bus address.
    fn begin(&mut self, address: SensorAddress) -> Result<(), FusionError>;

    /// Replace the active subscription. Re-issuing the same request is harmless.
    fn set_subscription(&mut self, subscription: &Subscription) -> Result<(), FusionError>;

    /// Run the engine and return every sample that became ready.
    ///
    /// Must not block; an empty vector means nothing was due.
    fn poll(&mut self) -> Result<Vec<FusionSample, MAX_SAMPLES_PER_POLL>, FusionError>;

    /// Copy the engine's internal calibration state out.
    fn save_state(&mut self, blob: &mut CalibrationBlob) -> Result<(), FusionError>;

    /// Hand a previously saved calibration state back to the engine.
    fn restore_state(&mut self, blob: &CalibrationBlob) -> Result<(), FusionError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(temperature: f32, co2: f32) -> FusionSample {
        FusionSample {
            temperature,
            co2,
            ..Default::default()
        }
    }

    #[test]
    fn test_accuracy_clamps_grade() {
        assert_eq!(Accuracy::new(7), Accuracy::HIGH);
        assert!(!Accuracy::new(0).is_calibrated());
        assert!(Accuracy::new(1).is_calibrated());
    }

    #[test]
    fn test_running_stats_only_ratchet_upwards() {
        let mut stats = RunningStats::new(Instant::from_millis(0));
        stats.update(&sample(24.0, 800.0));
        stats.update(&sample(21.0, 450.0));

        assert_eq!(stats.max_temperature, Some(24.0));
        assert_eq!(stats.max_co2, 800.0);
    }

    #[test]
    fn test_max_temperature_unset_until_first_sample() {
        let mut stats = RunningStats::new(Instant::from_millis(0));
        assert_eq!(stats.max_temperature, None);

        stats.update(&sample(-120.0, 400.0));
        assert_eq!(stats.max_temperature, Some(-120.0));
    }

    #[test]
    fn test_apply_keeps_battery_fields() {
        let mut reading = SensorReading::default();
        reading.set_voltage(4.2);
        reading.apply(&FusionSample {
            iaq: 55.0,
            accuracy: Accuracy::MEDIUM,
            ..Default::default()
        });

        assert_eq!(reading.battery_percent, 100);
        assert_eq!(reading.iaq, 55.0);
        assert_eq!(reading.accuracy, Accuracy::MEDIUM);
    }
}
