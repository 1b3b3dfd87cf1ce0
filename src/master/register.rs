use super::{
	Master,
	TransferOutcome,
};

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum RegisterOpOutcome {
	Success,
	/// address phase NACKed: device missing or busy
	DeviceNack,
	/// the device stopped acknowledging half-way through
	Incomplete,
}

/// Register access on devices with 8- or 16-bit register addresses, built
/// from plain master writes and reads. Multi-byte addresses and values go
/// over the bus most significant byte first.
///
/// Reads send the register address without STOP and read the value after a
/// repeated START, so no other master operation can slip in between.
pub trait RegisterOps: Master {
	fn read_reg_bytes(&mut self, device_addr: u8, reg: &[u8], value: &mut [u8]) -> RegisterOpOutcome {
		let written = self.write(device_addr, reg, false);
		if written.bytes_sent != reg.len() {
			self.send_stop();
			return RegisterOpOutcome::DeviceNack;
		}
		let read = self.read(device_addr, value.len(), true);
		if read.outcome != TransferOutcome::Acked {
			return RegisterOpOutcome::DeviceNack;
		}
		value.copy_from_slice(&read.data);
		RegisterOpOutcome::Success
	}

	fn write_reg_bytes(&mut self, device_addr: u8, data: &[u8]) -> RegisterOpOutcome {
		let written = self.write(device_addr, data, true);
		if written.bytes_sent == 0 {
			RegisterOpOutcome::DeviceNack
		} else if written.bytes_sent < data.len() {
			RegisterOpOutcome::Incomplete
		} else {
			RegisterOpOutcome::Success
		}
	}

	fn read_reg(&mut self, device_addr: u8, reg: u8) -> (u8, RegisterOpOutcome) {
		let mut value = [0u8; 1];
		let outcome = self.read_reg_bytes(device_addr, &[reg], &mut value);
		(value[0], outcome)
	}

	fn write_reg(&mut self, device_addr: u8, reg: u8, data: u8) -> RegisterOpOutcome {
		self.write_reg_bytes(device_addr, &[reg, data])
	}

	fn read_reg8_addr16(&mut self, device_addr: u8, reg: u16) -> (u8, RegisterOpOutcome) {
		let mut value = [0u8; 1];
		let outcome = self.read_reg_bytes(device_addr, &reg.to_be_bytes(), &mut value);
		(value[0], outcome)
	}

	fn write_reg8_addr16(&mut self, device_addr: u8, reg: u16, data: u8) -> RegisterOpOutcome {
		let [hi, lo] = reg.to_be_bytes();
		self.write_reg_bytes(device_addr, &[hi, lo, data])
	}

	fn read_reg16(&mut self, device_addr: u8, reg: u16) -> (u16, RegisterOpOutcome) {
		let mut value = [0u8; 2];
		let outcome = self.read_reg_bytes(device_addr, &reg.to_be_bytes(), &mut value);
		(u16::from_be_bytes(value), outcome)
	}

	fn write_reg16(&mut self, device_addr: u8, reg: u16, data: u16) -> RegisterOpOutcome {
		let [reg_hi, reg_lo] = reg.to_be_bytes();
		let [hi, lo] = data.to_be_bytes();
		self.write_reg_bytes(device_addr, &[reg_hi, reg_lo, hi, lo])
	}

	fn read_reg16_addr8(&mut self, device_addr: u8, reg: u8) -> (u16, RegisterOpOutcome) {
		let mut value = [0u8; 2];
		let outcome = self.read_reg_bytes(device_addr, &[reg], &mut value);
		(u16::from_be_bytes(value), outcome)
	}

	fn write_reg16_addr8(&mut self, device_addr: u8, reg: u8, data: u16) -> RegisterOpOutcome {
		let [hi, lo] = data.to_be_bytes();
		self.write_reg_bytes(device_addr, &[reg, hi, lo])
	}
}

impl<M: Master + ?Sized> RegisterOps for M {}
