//! Platform services the device properties read from.

use chrono::{Datelike, Local, Timelike};

use crate::protocol::MtpDateTime;

/// Battery and clock access.
pub trait Platform {
    /// Battery charge in percent.
    fn battery_level(&self) -> u8;

    /// Current local time.
    fn now(&self) -> MtpDateTime;
}

/// Platform backed by the host clock, with a fixed battery reading.
#[derive(Debug, Clone)]
pub struct SystemPlatform {
    pub battery_level: u8,
}

impl Default for SystemPlatform {
    fn default() -> Self {
        Self { battery_level: 100 }
    }
}

impl Platform for SystemPlatform {
    fn battery_level(&self) -> u8 {
        self.battery_level
    }

    fn now(&self) -> MtpDateTime {
        let now = Local::now();
        MtpDateTime {
            year: now.year().clamp(0, u16::MAX as i32) as u16,
            month: now.month() as u8,
            day: now.day() as u8,
            hour: now.hour() as u8,
            minute: now.minute() as u8,
            second: now.second() as u8,
        }
    }
}

/// Platform returning constant readings.
#[derive(Debug, Clone, Default)]
pub struct FixedPlatform {
    pub battery_level: u8,
    pub time: MtpDateTime,
}

impl Platform for FixedPlatform {
    fn battery_level(&self) -> u8 {
        self.battery_level
    }

    fn now(&self) -> MtpDateTime {
        self.time
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_clock_fields_in_range() {
        let now = SystemPlatform::default().now();
        assert!((1..=12).contains(&now.month));
        assert!((1..=31).contains(&now.day));
        assert!(now.hour < 24);
        assert_eq!(now.format().len(), 15);
    }
}
