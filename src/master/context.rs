use super::{
	Master,
	ReadResult,
	TransferOutcome,
	WriteResult,
};
use crate::error::ConfigError;
use crate::port::{
	LineConfig,
	Lines,
	Port,
	PullupStatus,
	Timer,
	Wiring,
};
use crate::timing::BusTiming;

// the address is shifted into the upper 7 bits of the first byte
fn valid_address(device_addr: u8) -> bool {
	if device_addr > 0x7f {
		warn!("refusing transfer to 0x{:02x}: not a 7-bit address", device_addr);
		return false;
	}
	true
}

/// 10ms at the reference timer rate.
pub const DEFAULT_STRETCH_TIMEOUT_TICKS: u32 = 1_000_000;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct MasterConfig {
	pub kbits_per_second: u32,
	pub scl: LineConfig,
	pub sda: LineConfig,
	/// upper bound for a slave holding SCL low
	pub stretch_timeout_ticks: u32,
}

impl Default for MasterConfig {
	fn default() -> Self {
		MasterConfig {
			kbits_per_second: 100,
			scl: LineConfig::bit(0),
			sda: LineConfig::bit(1),
			stretch_timeout_ticks: DEFAULT_STRETCH_TIMEOUT_TICKS,
		}
	}
}

// reasons to abandon a transaction half-way
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum Abort {
	BusBusy,
	ArbitrationLost,
	StretchTimeout,
}

pub struct MasterContext<P: Port, T: Timer> {
	lines: Lines<P>,
	timer: T,
	timing: BusTiming,
	stretch_timeout: u32,
	// previous transaction ended without STOP; we still own the bus
	bus_held: bool,
	// tick of the last SCL falling edge we generated
	fall_time: u32,
}

impl<P: Port, T: Timer> MasterContext<P, T> {
	pub fn new(wiring: Wiring<P>, mut timer: T, config: MasterConfig) -> Result<Self, ConfigError> {
		let timing = BusTiming::new(config.kbits_per_second)?;
		let lines = Lines::new(wiring, config.scl, config.sda)?;
		let fall_time = timer.now();
		debug!("I2C master at {} kbit/s: {:?}", config.kbits_per_second, timing);

		Ok(MasterContext {
			lines,
			timer,
			timing,
			stretch_timeout: config.stretch_timeout_ticks,
			bus_held: false,
			fall_time,
		})
	}

	pub fn timing(&self) -> &BusTiming {
		&self.timing
	}

	pub fn is_bus_held(&self) -> bool {
		self.bus_held
	}

	/// Diagnostic meant to run right after construction; ends a held
	/// transaction first.
	pub fn check_pullups(&mut self) -> PullupStatus {
		if self.bus_held {
			self.send_stop();
		}
		self.lines.check_pullups(&mut self.timer)
	}

	/// Release the lines and hand back the ports and timer. A held bus is
	/// closed with a STOP first.
	pub fn shutdown(mut self) -> (Wiring<P>, T) {
		if self.bus_held {
			self.send_stop();
		}
		debug!("I2C master shut down");
		(self.lines.into_wiring(), self.timer)
	}

	// wait until `ticks` passed since `since`
	fn wait_since(&mut self, since: u32, ticks: u32) {
		let elapsed = self.timer.now().wrapping_sub(since);
		if elapsed < ticks {
			self.timer.delay(ticks - elapsed);
		}
	}

	// release SCL and wait for it to actually rise (the slave may stretch)
	fn release_scl(&mut self) -> Result<u32, Abort> {
		self.lines.release_scl();
		match self.lines.wait_scl_high(&mut self.timer, self.stretch_timeout) {
			Some(rise) => Ok(rise),
			None => Err(Abort::StretchTimeout),
		}
	}

	// one SCL pulse with SDA released (`true`) or driven low; returns SDA as
	// sampled at the end of the high period
	fn clock_bit(&mut self, bit: bool) -> Result<bool, Abort> {
		self.lines.set_sda(bit);
		let fall = self.fall_time;
		let low = self.timing.low_period;
		self.wait_since(fall, low);
		let rise = self.release_scl()?;
		let high = self.timing.high_period;
		self.wait_since(rise, high);
		let sda = self.lines.sample_sda();
		self.lines.drive_scl_low();
		self.fall_time = self.timer.now();
		Ok(sda)
	}

	fn start(&mut self) -> Result<(), Abort> {
		if self.bus_held {
			// repeated START: bring both lines up first
			self.lines.release_sda();
			let fall = self.fall_time;
			let low = self.timing.low_period;
			self.wait_since(fall, low);
			let rise = self.release_scl()?;
			let setup = self.timing.restart_setup;
			self.wait_since(rise, setup);
			if !self.lines.sample_sda() {
				return Err(Abort::ArbitrationLost);
			}
		} else {
			let (scl, sda) = self.lines.sample();
			if !scl || !sda {
				return Err(Abort::BusBusy);
			}
		}

		self.lines.drive_sda_low();
		let hold = self.timing.start_hold;
		self.timer.delay(hold);
		self.lines.drive_scl_low();
		self.fall_time = self.timer.now();
		self.bus_held = true;
		Ok(())
	}

	fn stop(&mut self) -> Result<(), Abort> {
		self.lines.drive_sda_low();
		let fall = self.fall_time;
		let low = self.timing.low_period;
		self.wait_since(fall, low);
		let rise = self.release_scl()?;
		let setup = self.timing.stop_setup;
		self.wait_since(rise, setup);
		self.lines.release_sda();
		self.bus_held = false;
		let free = self.timing.bus_free();
		self.timer.delay(free);
		Ok(())
	}

	// MSB first, then sample the ACK bit
	fn send_byte(&mut self, byte: u8) -> Result<bool, Abort> {
		for bit in (0..8).rev() {
			let high = 0 != byte & (1 << bit);
			let seen = self.clock_bit(high)?;
			if high && !seen {
				return Err(Abort::ArbitrationLost);
			}
		}
		let nack = self.clock_bit(true)?;
		trace!("sent 0x{:02x}: {}", byte, if nack { "NACK" } else { "ACK" });
		Ok(!nack)
	}

	fn receive_byte(&mut self, ack: bool) -> Result<u8, Abort> {
		let mut byte = 0u8;
		for _ in 0..8 {
			let bit = self.clock_bit(true)?;
			byte = (byte << 1) | bit as u8;
		}
		// driving SDA low acknowledges; leaving it released asks the slave to stop
		self.clock_bit(!ack)?;
		trace!("received 0x{:02x}, {}", byte, if ack { "ACK" } else { "NACK" });
		Ok(byte)
	}

	fn finish(&mut self, acked: bool, send_stop: bool) -> TransferOutcome {
		if send_stop {
			if let Err(abort) = self.stop() {
				return self.abandon(abort);
			}
		}
		if acked {
			TransferOutcome::Acked
		} else {
			TransferOutcome::Nacked
		}
	}

	// leave the bus in a safe released state
	fn abandon(&mut self, abort: Abort) -> TransferOutcome {
		self.lines.release_both();
		self.bus_held = false;
		match abort {
			Abort::BusBusy => {
				debug!("bus busy, transaction not started");
				TransferOutcome::NotStarted
			},
			Abort::ArbitrationLost => {
				warn!("arbitration lost, releasing bus");
				TransferOutcome::NotStarted
			},
			Abort::StretchTimeout => {
				warn!("SCL held low for more than {} ticks, abandoning transaction", self.stretch_timeout);
				TransferOutcome::Nacked
			},
		}
	}

	fn write_inner(&mut self, device_addr: u8, buf: &[u8], sent: &mut usize) -> Result<bool, Abort> {
		self.start()?;
		if !self.send_byte(device_addr << 1)? {
			debug!("write: address 0x{:02x} not acknowledged", device_addr);
			return Ok(false);
		}
		for byte in buf {
			if !self.send_byte(*byte)? {
				debug!("write: 0x{:02x} NACKed data byte {}", device_addr, *sent);
				return Ok(false);
			}
			*sent += 1;
		}
		Ok(true)
	}

	fn read_inner(&mut self, device_addr: u8, buf: &mut [u8], received: &mut usize) -> Result<bool, Abort> {
		self.start()?;
		if !self.send_byte((device_addr << 1) | 1)? {
			debug!("read: address 0x{:02x} not acknowledged", device_addr);
			return Ok(false);
		}
		let last = buf.len() - 1;
		for (i, slot) in buf.iter_mut().enumerate() {
			*slot = self.receive_byte(i != last)?;
			*received += 1;
		}
		Ok(true)
	}

	/// Write `buf` to `device_addr`. An address above 0x7f is refused without
	/// bus activity.
	pub fn write(&mut self, device_addr: u8, buf: &[u8], send_stop: bool) -> WriteResult {
		if !valid_address(device_addr) {
			return WriteResult {
				outcome: TransferOutcome::NotStarted,
				bytes_sent: 0,
			};
		}
		let mut bytes_sent = 0;
		let outcome = match self.write_inner(device_addr, buf, &mut bytes_sent) {
			Ok(acked) => self.finish(acked, send_stop),
			Err(abort) => self.abandon(abort),
		};
		debug!("write 0x{:02x}: {:?}, {}/{} bytes", device_addr, outcome, bytes_sent, buf.len());
		WriteResult {
			outcome,
			bytes_sent,
		}
	}

	/// Fill `buf` from `device_addr`; returns the outcome and the number of
	/// bytes clocked in. An empty `buf` or an address above 0x7f is refused
	/// without bus activity.
	pub fn read_into(&mut self, device_addr: u8, buf: &mut [u8], send_stop: bool) -> (TransferOutcome, usize) {
		if !valid_address(device_addr) {
			return (TransferOutcome::NotStarted, 0);
		}
		if buf.is_empty() {
			warn!("refusing zero-length read from 0x{:02x}", device_addr);
			return (TransferOutcome::NotStarted, 0);
		}
		let mut received = 0;
		let outcome = match self.read_inner(device_addr, buf, &mut received) {
			Ok(acked) => self.finish(acked, send_stop),
			Err(abort) => self.abandon(abort),
		};
		debug!("read 0x{:02x}: {:?}, {}/{} bytes", device_addr, outcome, received, buf.len());
		(outcome, received)
	}

	pub fn read(&mut self, device_addr: u8, len: usize, send_stop: bool) -> ReadResult {
		let mut data = vec![0u8; len];
		let (outcome, received) = self.read_into(device_addr, &mut data, send_stop);
		data.truncate(received);
		ReadResult {
			outcome,
			data,
		}
	}

	pub fn send_stop(&mut self) {
		if !self.bus_held {
			debug!("send_stop: bus not held");
			return;
		}
		if let Err(abort) = self.stop() {
			self.abandon(abort);
		}
	}
}

impl<P: Port, T: Timer> Master for MasterContext<P, T> {
	fn write(&mut self, device_addr: u8, buf: &[u8], send_stop: bool) -> WriteResult {
		MasterContext::write(self, device_addr, buf, send_stop)
	}

	fn read(&mut self, device_addr: u8, len: usize, send_stop: bool) -> ReadResult {
		MasterContext::read(self, device_addr, len, send_stop)
	}

	fn send_stop(&mut self) {
		MasterContext::send_stop(self)
	}

	fn is_bus_held(&self) -> bool {
		MasterContext::is_bus_held(self)
	}
}
