/// Bus timing derived from a configured bit rate.
///
/// All values are ticks of the reference timer (see `TIMER_MHZ`). They are
/// computed once when an engine is constructed and never change afterwards.

use crate::error::ConfigError;

/// Reference timer ticks per microsecond (10 ns per tick).
pub const TIMER_MHZ: u32 = 100;

pub const MIN_KBITS_PER_SECOND: u32 = 1;
pub const MAX_KBITS_PER_SECOND: u32 = 400;

// ceil(value * num / den), never zero
fn scaled(value: u32, num: u32, den: u32) -> u32 {
	let v = (u64::from(value) * u64::from(num) + u64::from(den) - 1) / u64::from(den);
	(v as u32).max(1)
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct BusTiming {
	kbits_per_second: u32,
	/// full clock period
	pub bit_time: u32,
	/// SCL high before SDA rises for a STOP
	pub stop_setup: u32,
	/// SCL high before SDA falls for a repeated START; also bus free time
	pub restart_setup: u32,
	/// SDA low before SCL falls for a START
	pub start_hold: u32,
	pub low_period: u32,
	pub high_period: u32,
}

impl BusTiming {
	pub fn new(kbits_per_second: u32) -> Result<Self, ConfigError> {
		if kbits_per_second < MIN_KBITS_PER_SECOND || kbits_per_second > MAX_KBITS_PER_SECOND {
			return Err(ConfigError::SpeedOutOfRange(kbits_per_second));
		}

		let bit_time = (TIMER_MHZ * 1000) / kbits_per_second;
		let low_period = scaled(bit_time, 53, 100);
		let high_period = bit_time.saturating_sub(low_period).max(1);

		Ok(BusTiming {
			kbits_per_second,
			bit_time,
			stop_setup: scaled(bit_time, 2, 5),
			restart_setup: scaled(bit_time, 1, 2),
			start_hold: scaled(bit_time, 2, 5),
			low_period,
			high_period,
		})
	}

	pub fn kbits_per_second(&self) -> u32 {
		self.kbits_per_second
	}

	/// Minimum time between a STOP and the following START.
	pub fn bus_free(&self) -> u32 {
		self.restart_setup
	}

	/// How long SDA must be stable before a (stretched) clock is released.
	pub fn data_setup(&self) -> u32 {
		(self.bit_time / 10).max(1)
	}

	pub fn periods(&self) -> [u32; 5] {
		[self.stop_setup, self.restart_setup, self.start_hold, self.low_period, self.high_period]
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn rejects_out_of_range() {
		assert_eq!(BusTiming::new(0), Err(ConfigError::SpeedOutOfRange(0)));
		assert_eq!(BusTiming::new(401), Err(ConfigError::SpeedOutOfRange(401)));
		assert!(BusTiming::new(1).is_ok());
		assert!(BusTiming::new(400).is_ok());
	}

	#[test]
	fn standard_mode_values() {
		let t = BusTiming::new(100).unwrap();
		assert_eq!(t.bit_time, 1000);
		assert_eq!(t.start_hold, 400);
		assert_eq!(t.restart_setup, 500);
		assert_eq!(t.stop_setup, 400);
		assert_eq!(t.low_period, 530);
		assert_eq!(t.high_period, 470);
	}

	#[test]
	fn fast_mode_meets_minimum_periods() {
		let t = BusTiming::new(400).unwrap();
		assert_eq!(t.bit_time, 250);
		// 1.3us low, 0.6us high/hold/setup at 10ns per tick
		assert!(t.low_period >= 130);
		assert!(t.high_period >= 60);
		assert!(t.start_hold >= 60);
		assert!(t.stop_setup >= 60);
		assert!(t.restart_setup >= 60);
		assert!(t.low_period + t.high_period <= t.bit_time);
	}

	#[test]
	fn all_speeds_positive_and_monotonic() {
		let mut previous: Option<BusTiming> = None;
		for kbps in MIN_KBITS_PER_SECOND..=MAX_KBITS_PER_SECOND {
			let t = BusTiming::new(kbps).unwrap();
			assert_eq!(t, BusTiming::new(kbps).unwrap());
			for p in t.periods().iter() {
				assert!(*p >= 1, "zero period at {} kbit/s", kbps);
			}
			if let Some(prev) = previous {
				assert!(t.bit_time <= prev.bit_time);
				for (now, before) in t.periods().iter().zip(prev.periods().iter()) {
					assert!(now <= before, "period grew at {} kbit/s", kbps);
				}
			}
			previous = Some(t);
		}
	}
}
