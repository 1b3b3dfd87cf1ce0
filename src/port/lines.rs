use super::{
	LineConfig,
	Port,
	Timer,
	Wiring,
	is_after,
};
use crate::error::ConfigError;

/// How long a released line may take to rise during the pull-up check.
pub const PULLUP_TIMEOUT_TICKS: u32 = 10_000;
const PULLUP_DRIVE_TICKS: u32 = 100;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum PullupStatus {
	Present,
	SclMissing,
	SdaMissing,
}

/// Logical SCL/SDA operations mapped onto the physical ports.
///
/// Remembers what is currently driven so every port write carries the
/// complete value (other bits plus both lines on a shared port).
pub struct Lines<P: Port> {
	wiring: Wiring<P>,
	scl: LineConfig,
	sda: LineConfig,
	scl_released: bool,
	sda_released: bool,
}

fn check_line(line: &LineConfig) -> Result<(), ConfigError> {
	if line.bit_position >= 32 {
		return Err(ConfigError::BitPositionOutOfRange(line.bit_position));
	}
	if 0 != line.other_bits_mask & line.mask() {
		return Err(ConfigError::MaskCoversLine(line.other_bits_mask, line.bit_position));
	}
	Ok(())
}

impl<P: Port> Lines<P> {
	/// Validates the line mapping and releases both lines.
	pub fn new(wiring: Wiring<P>, scl: LineConfig, sda: LineConfig) -> Result<Self, ConfigError> {
		check_line(&scl)?;
		check_line(&sda)?;
		if wiring.is_shared() {
			if scl.bit_position == sda.bit_position {
				return Err(ConfigError::SharedBitPosition(scl.bit_position));
			}
			if 0 != scl.other_bits_mask & sda.mask() {
				return Err(ConfigError::MaskCoversLine(scl.other_bits_mask, sda.bit_position));
			}
			if 0 != sda.other_bits_mask & scl.mask() {
				return Err(ConfigError::MaskCoversLine(sda.other_bits_mask, scl.bit_position));
			}
		}

		let mut lines = Lines {
			wiring,
			scl,
			sda,
			scl_released: true,
			sda_released: true,
		};
		lines.write(true, true);
		Ok(lines)
	}

	pub fn into_wiring(mut self) -> Wiring<P> {
		self.release_both();
		self.wiring
	}

	fn scl_value(&self) -> u32 {
		self.scl.other_bits_mask | if self.scl_released { self.scl.mask() } else { 0 }
	}

	fn sda_value(&self) -> u32 {
		self.sda.other_bits_mask | if self.sda_released { self.sda.mask() } else { 0 }
	}

	// push the current state to the ports that changed
	fn write(&mut self, scl_changed: bool, sda_changed: bool) {
		let scl_value = self.scl_value();
		let sda_value = self.sda_value();
		match &mut self.wiring {
			Wiring::Shared(port) => {
				// single write, so the untouched line can't glitch
				port.write(scl_value | sda_value);
			},
			Wiring::Split { scl, sda } => {
				if scl_changed {
					scl.write(scl_value);
				}
				if sda_changed {
					sda.write(sda_value);
				}
			},
		}
	}

	/// Drive both lines in one step (a single port write on a shared port).
	pub fn set(&mut self, scl_high: bool, sda_high: bool) {
		let scl_changed = scl_high != self.scl_released;
		let sda_changed = sda_high != self.sda_released;
		if !scl_changed && !sda_changed {
			return;
		}
		self.scl_released = scl_high;
		self.sda_released = sda_high;
		self.write(scl_changed, sda_changed);
	}

	pub fn drive_scl_low(&mut self) {
		let sda = self.sda_released;
		self.set(false, sda);
	}

	pub fn release_scl(&mut self) {
		let sda = self.sda_released;
		self.set(true, sda);
	}

	pub fn drive_sda_low(&mut self) {
		let scl = self.scl_released;
		self.set(scl, false);
	}

	pub fn release_sda(&mut self) {
		let scl = self.scl_released;
		self.set(scl, true);
	}

	/// release (`true`) or drive low (`false`)
	pub fn set_sda(&mut self, high: bool) {
		let scl = self.scl_released;
		self.set(scl, high);
	}

	pub fn release_both(&mut self) {
		self.set(true, true);
	}

	pub fn scl_released(&self) -> bool {
		self.scl_released
	}

	pub fn sda_released(&self) -> bool {
		self.sda_released
	}

	pub fn sample_scl(&mut self) -> bool {
		let mask = self.scl.mask();
		match &mut self.wiring {
			Wiring::Shared(port) => 0 != port.read() & mask,
			Wiring::Split { scl, .. } => 0 != scl.read() & mask,
		}
	}

	pub fn sample_sda(&mut self) -> bool {
		let mask = self.sda.mask();
		match &mut self.wiring {
			Wiring::Shared(port) => 0 != port.read() & mask,
			Wiring::Split { sda, .. } => 0 != sda.read() & mask,
		}
	}

	/// (SCL, SDA) levels; one port read when shared.
	pub fn sample(&mut self) -> (bool, bool) {
		let (scl_mask, sda_mask) = (self.scl.mask(), self.sda.mask());
		match &mut self.wiring {
			Wiring::Shared(port) => {
				let value = port.read();
				(0 != value & scl_mask, 0 != value & sda_mask)
			},
			Wiring::Split { scl, sda } => {
				let scl = 0 != scl.read() & scl_mask;
				let sda = 0 != sda.read() & sda_mask;
				(scl, sda)
			},
		}
	}

	/// Poll a released SCL until it reads high; returns the tick it was seen
	/// high, or `None` after `timeout` ticks.
	pub fn wait_scl_high<T: Timer>(&mut self, timer: &mut T, timeout: u32) -> Option<u32> {
		let start = timer.now();
		let deadline = start.wrapping_add(timeout);
		loop {
			if self.sample_scl() {
				return Some(timer.now());
			}
			if is_after(timer.now(), deadline) {
				return None;
			}
		}
	}

	fn wait_sda_high<T: Timer>(&mut self, timer: &mut T, timeout: u32) -> bool {
		let deadline = timer.now().wrapping_add(timeout);
		loop {
			if self.sample_sda() {
				return true;
			}
			if is_after(timer.now(), deadline) {
				return false;
			}
		}
	}

	/// Check that both lines return high after being driven low.
	///
	/// SDA is only toggled while SCL is low, so this never puts a START or
	/// STOP condition on the bus.
	pub fn check_pullups<T: Timer>(&mut self, timer: &mut T) -> PullupStatus {
		self.set(false, true);
		timer.delay(PULLUP_DRIVE_TICKS);
		self.set(false, false);
		timer.delay(PULLUP_DRIVE_TICKS);
		self.set(false, true);
		let sda_ok = self.wait_sda_high(timer, PULLUP_TIMEOUT_TICKS);
		self.set(true, true);
		let scl_ok = self.wait_scl_high(timer, PULLUP_TIMEOUT_TICKS).is_some();

		if !scl_ok {
			warn!("SCL did not rise after release, pull-up missing?");
			PullupStatus::SclMissing
		} else if !sda_ok {
			warn!("SDA did not rise after release, pull-up missing?");
			PullupStatus::SdaMissing
		} else {
			PullupStatus::Present
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[derive(Default)]
	struct RecordingPort {
		writes: Vec<u32>,
	}

	impl Port for RecordingPort {
		fn write(&mut self, value: u32) {
			self.writes.push(value);
		}
		fn read(&mut self) -> u32 {
			*self.writes.last().unwrap_or(&!0)
		}
	}

	#[test]
	fn shared_port_updates_both_lines_in_one_write() {
		let scl = LineConfig::bit(1).with_other_bits(0x80);
		let sda = LineConfig::bit(3).with_other_bits(0x40);
		let mut lines = Lines::new(Wiring::Shared(RecordingPort::default()), scl, sda).unwrap();
		lines.set(false, false);
		lines.release_sda();
		lines.release_scl();

		let writes = match lines.into_wiring() {
			Wiring::Shared(port) => port.writes,
			Wiring::Split { .. } => unreachable!(),
		};
		assert_eq!(writes, vec![0xca, 0xc0, 0xc8, 0xca]);
	}

	#[test]
	fn split_ports_only_touch_changed_line() {
		let wiring = Wiring::Split {
			scl: RecordingPort::default(),
			sda: RecordingPort::default(),
		};
		let mut lines = Lines::new(wiring, LineConfig::bit(0).with_other_bits(0xf0), LineConfig::bit(0)).unwrap();
		lines.drive_sda_low();
		lines.drive_scl_low();
		lines.drive_scl_low();
		assert!(!lines.sample_scl());
		assert!(!lines.sample_sda());

		match lines.into_wiring() {
			Wiring::Split { scl, sda } => {
				assert_eq!(scl.writes, vec![0xf1, 0xf0, 0xf1]);
				assert_eq!(sda.writes, vec![0x01, 0x00, 0x01]);
			},
			Wiring::Shared(_) => unreachable!(),
		}
	}

	#[test]
	fn rejects_bad_mapping() {
		let shared = || Wiring::Shared(RecordingPort::default());
		assert_eq!(
			Lines::new(shared(), LineConfig::bit(2), LineConfig::bit(2)).err(),
			Some(ConfigError::SharedBitPosition(2))
		);
		assert_eq!(
			Lines::new(shared(), LineConfig::bit(0).with_other_bits(0x2), LineConfig::bit(1)).err(),
			Some(ConfigError::MaskCoversLine(0x2, 1))
		);
		assert_eq!(
			Lines::new(shared(), LineConfig::bit(32), LineConfig::bit(1)).err(),
			Some(ConfigError::BitPositionOutOfRange(32))
		);
		let split = Wiring::Split {
			scl: RecordingPort::default(),
			sda: RecordingPort::default(),
		};
		assert!(Lines::new(split, LineConfig::bit(0), LineConfig::bit(0)).is_ok());
	}
}
