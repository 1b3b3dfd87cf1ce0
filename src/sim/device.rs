use std::sync::{
	Arc,
	Mutex,
	PoisonError,
};

use super::{
	Drive,
	Levels,
	Peer,
};

/// Byte sent for reads once the configured data runs out.
pub const FILL_BYTE: u8 = 0xab;

/// Clock stretching applied after every SCL falling edge of a transaction
/// addressed to the device.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Stretch {
	Never,
	Ticks(u64),
	/// hold SCL low for good after the first falling edge
	Forever,
}

/// One addressed transaction as seen by the device.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Transfer {
	pub address: u8,
	pub read: bool,
	/// bytes received (write) or put on the bus (read)
	pub data: Vec<u8>,
}

/// Shared view of the transactions a `SimSlaveDevice` took part in.
#[derive(Clone, Default, Debug)]
pub struct Transfers(Arc<Mutex<Vec<Transfer>>>);

impl Transfers {
	pub fn get(&self) -> Vec<Transfer> {
		self.0.lock().unwrap_or_else(PoisonError::into_inner).clone()
	}

	fn push(&self, transfer: Transfer) {
		self.0.lock().unwrap_or_else(PoisonError::into_inner).push(transfer);
	}

	fn push_byte(&self, byte: u8) {
		let mut transfers = self.0.lock().unwrap_or_else(PoisonError::into_inner);
		if let Some(last) = transfers.last_mut() {
			last.data.push(byte);
		}
	}
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum Phase {
	Idle,
	// not for us, or finished; wait for the next START
	Ignore,
	Receive {
		bits: u8,
		byte: u8,
		address: bool,
	},
	AckOut {
		ack: bool,
		then_transmit: bool,
	},
	Transmit {
		bits: u8,
		byte: u8,
	},
	MasterAck {
		ack: bool,
	},
}

/// Simulated slave device answering a single 7-bit address.
///
/// Written data bytes are acknowledged according to the ACK sequence (ACK
/// once it runs out); reads return the TX data followed by `FILL_BYTE`. Both
/// sequences restart with every address phase.
pub struct SimSlaveDevice {
	address: u8,
	ack_sequence: Vec<bool>,
	ack_index: usize,
	tx_data: Vec<u8>,
	tx_index: usize,
	stretch: Stretch,
	transfers: Transfers,
	phase: Phase,
	prev: Levels,
	drive: Drive,
	stretch_until: Option<u64>,
}

impl SimSlaveDevice {
	pub fn new(address: u8) -> Self {
		SimSlaveDevice {
			address,
			ack_sequence: Vec::new(),
			ack_index: 0,
			tx_data: Vec::new(),
			tx_index: 0,
			stretch: Stretch::Never,
			transfers: Transfers::default(),
			phase: Phase::Idle,
			prev: Levels { scl: true, sda: true },
			drive: Drive::default(),
			stretch_until: None,
		}
	}

	pub fn with_ack_sequence(mut self, acks: Vec<bool>) -> Self {
		self.ack_sequence = acks;
		self
	}

	pub fn with_tx_data(mut self, data: Vec<u8>) -> Self {
		self.tx_data = data;
		self
	}

	pub fn with_stretch(mut self, stretch: Stretch) -> Self {
		self.stretch = stretch;
		self
	}

	/// Handle to the transfer log; take it before attaching the device.
	pub fn transfers(&self) -> Transfers {
		self.transfers.clone()
	}

	fn next_ack(&mut self) -> bool {
		let ack = self.ack_sequence.get(self.ack_index).cloned().unwrap_or(true);
		self.ack_index += 1;
		ack
	}

	fn next_tx(&mut self) -> u8 {
		let byte = self.tx_data.get(self.tx_index).cloned().unwrap_or(FILL_BYTE);
		self.tx_index += 1;
		self.transfers.push_byte(byte);
		byte
	}

	fn start_transmit(&mut self) {
		let byte = self.next_tx();
		self.drive.sda_low = 0 == byte & 0x80;
		self.phase = Phase::Transmit {
			bits: 1,
			byte,
		};
	}

	fn on_rise(&mut self, sda: bool) {
		match &mut self.phase {
			Phase::Receive { bits, byte, .. } if *bits < 8 => {
				*byte = (*byte << 1) | sda as u8;
				*bits += 1;
			},
			Phase::MasterAck { ack } => *ack = !sda,
			_ => (),
		}
	}

	fn on_fall(&mut self, now: u64) {
		match self.phase {
			Phase::Idle | Phase::Ignore => return,
			Phase::Receive { bits, .. } if bits < 8 => (),
			Phase::Receive { byte, address: true, .. } => {
				if byte >> 1 != self.address {
					self.phase = Phase::Ignore;
					return;
				}
				let read = 0 != byte & 1;
				self.transfers.push(Transfer {
					address: self.address,
					read,
					data: Vec::new(),
				});
				self.ack_index = 0;
				self.tx_index = 0;
				self.drive.sda_low = true;
				self.phase = Phase::AckOut {
					ack: true,
					then_transmit: read,
				};
			},
			Phase::Receive { byte, address: false, .. } => {
				self.transfers.push_byte(byte);
				let ack = self.next_ack();
				self.drive.sda_low = ack;
				self.phase = Phase::AckOut {
					ack,
					then_transmit: false,
				};
			},
			Phase::AckOut { ack: false, .. } | Phase::MasterAck { ack: false } => {
				self.drive.sda_low = false;
				self.phase = Phase::Ignore;
			},
			Phase::AckOut { ack: true, then_transmit: true } | Phase::MasterAck { ack: true } => {
				self.start_transmit();
			},
			Phase::AckOut { ack: true, then_transmit: false } => {
				self.drive.sda_low = false;
				self.phase = Phase::Receive {
					bits: 0,
					byte: 0,
					address: false,
				};
			},
			Phase::Transmit { bits, byte } if bits < 8 => {
				self.drive.sda_low = 0 == byte & (0x80 >> bits);
				self.phase = Phase::Transmit {
					bits: bits + 1,
					byte,
				};
			},
			Phase::Transmit { .. } => {
				self.drive.sda_low = false;
				self.phase = Phase::MasterAck { ack: false };
			},
		}

		match self.stretch {
			Stretch::Never => (),
			Stretch::Ticks(ticks) => {
				self.drive.scl_low = true;
				self.stretch_until = Some(now + ticks);
			},
			Stretch::Forever => self.drive.scl_low = true,
		}
	}
}

impl Peer for SimSlaveDevice {
	fn step(&mut self, now: u64, levels: Levels) -> Drive {
		if let Some(until) = self.stretch_until {
			if now >= until {
				self.drive.scl_low = false;
				self.stretch_until = None;
			}
		}

		let prev = self.prev;
		self.prev = levels;
		if prev.scl && levels.scl {
			if prev.sda && !levels.sda {
				self.drive.sda_low = false;
				self.phase = Phase::Receive {
					bits: 0,
					byte: 0,
					address: true,
				};
			} else if !prev.sda && levels.sda {
				self.drive.sda_low = false;
				self.phase = Phase::Idle;
			}
		} else if !prev.scl && levels.scl {
			self.on_rise(levels.sda);
		} else if prev.scl && !levels.scl {
			self.on_fall(now);
		}
		self.drive
	}
}
