use super::{
	Ack,
	ShutdownHandle,
	SlaveHandler,
	SlaveState,
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

/// 250ns, the standard-mode data setup time
pub const DEFAULT_DATA_SETUP_TICKS: u32 = 25;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct SlaveConfig {
	/// 7-bit device address
	pub address: u8,
	pub scl: LineConfig,
	pub sda: LineConfig,
	/// SDA settle time before a stretched SCL is released
	pub data_setup_ticks: u32,
}

impl SlaveConfig {
	pub fn new(address: u8) -> Self {
		SlaveConfig {
			address,
			scl: LineConfig::bit(0),
			sda: LineConfig::bit(1),
			data_setup_ticks: DEFAULT_DATA_SETUP_TICKS,
		}
	}
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum Phase {
	Idle,
	Receive {
		bits: u8,
		byte: u8,
		address: bool,
	},
	// our ACK/NACK is on SDA during this clock
	AckOut {
		ack: bool,
		then_transmit: bool,
	},
	Transmit {
		bits: u8,
		byte: u8,
	},
	// master drives ACK/NACK for the byte we sent
	MasterAck {
		ack: bool,
	},
}

pub struct SlaveContext<P: Port, T: Timer> {
	lines: Lines<P>,
	timer: T,
	address: u8,
	data_setup: u32,
	phase: Phase,
	// we took part in the transaction since the last STOP; a repeated START
	// to another device does not end it
	addressed: bool,
	// last sampled levels
	scl: bool,
	sda: bool,
	shutdown: ShutdownHandle,
	shut_down: bool,
}

impl<P: Port, T: Timer> SlaveContext<P, T> {
	pub fn new(wiring: Wiring<P>, timer: T, config: SlaveConfig) -> Result<Self, ConfigError> {
		if config.address > 0x7f {
			return Err(ConfigError::InvalidAddress(config.address));
		}
		let mut lines = Lines::new(wiring, config.scl, config.sda)?;
		let (scl, sda) = lines.sample();
		debug!("I2C slave at 0x{:02x}", config.address);

		Ok(SlaveContext {
			lines,
			timer,
			address: config.address,
			data_setup: config.data_setup_ticks,
			phase: Phase::Idle,
			addressed: false,
			scl,
			sda,
			shutdown: ShutdownHandle::default(),
			shut_down: false,
		})
	}

	pub fn shutdown_handle(&self) -> ShutdownHandle {
		self.shutdown.clone()
	}

	/// Run only while no transaction is in progress (e.g. right after
	/// construction).
	pub fn check_pullups(&mut self) -> PullupStatus {
		let status = self.lines.check_pullups(&mut self.timer);
		let (scl, sda) = self.lines.sample();
		self.scl = scl;
		self.sda = sda;
		status
	}

	pub fn state(&self) -> SlaveState {
		if self.shut_down {
			return SlaveState::ShuttingDown;
		}
		match self.phase {
			Phase::Idle => SlaveState::Idle,
			Phase::Receive { address: true, .. } => SlaveState::AddressPhase,
			Phase::Receive { address: false, .. } => SlaveState::WriteDataPhase,
			Phase::AckOut { then_transmit: false, .. } => SlaveState::WriteDataPhase,
			Phase::AckOut { then_transmit: true, .. } => SlaveState::ReadDataPhase,
			Phase::Transmit { .. } | Phase::MasterAck { .. } => SlaveState::ReadDataPhase,
		}
	}

	/// Sample the lines once and react to any edge since the last sample.
	///
	/// Must be called often enough to see every SCL level of the remote
	/// master; a caller that polls too slowly misses clock edges.
	pub fn poll<H: SlaveHandler + ?Sized>(&mut self, handler: &mut H) -> SlaveState {
		if self.shut_down {
			return SlaveState::ShuttingDown;
		}

		let (scl, sda) = self.lines.sample();
		let (prev_scl, prev_sda) = (self.scl, self.sda);
		self.scl = scl;
		self.sda = sda;

		if scl && prev_scl && sda != prev_sda {
			// SDA moving while SCL is high: START or STOP
			if sda {
				self.on_stop(handler);
			} else {
				self.on_start();
			}
		} else if scl && !prev_scl {
			self.on_scl_rise(sda);
		} else if !scl && prev_scl {
			self.on_scl_fall(handler);
		}

		let idle = self.phase == Phase::Idle && !self.addressed;
		if idle && (self.shutdown.is_requested() || handler.shutdown_requested()) {
			debug!("I2C slave 0x{:02x} shutting down", self.address);
			self.lines.release_both();
			self.shut_down = true;
			handler.shutdown();
		}

		self.state()
	}

	/// Serve the bus until a shutdown is requested.
	pub fn run<H: SlaveHandler + ?Sized>(&mut self, handler: &mut H) {
		while self.poll(handler) != SlaveState::ShuttingDown {}
	}

	pub fn shutdown(self) -> (Wiring<P>, T) {
		(self.lines.into_wiring(), self.timer)
	}

	fn on_start(&mut self) {
		trace!("slave 0x{:02x}: START", self.address);
		self.lines.release_sda();
		self.phase = Phase::Receive {
			bits: 0,
			byte: 0,
			address: true,
		};
	}

	fn on_stop<H: SlaveHandler + ?Sized>(&mut self, handler: &mut H) {
		trace!("slave 0x{:02x}: STOP", self.address);
		self.lines.release_sda();
		self.phase = Phase::Idle;
		if self.addressed {
			self.addressed = false;
			handler.stop_bit();
		}
	}

	fn on_scl_rise(&mut self, sda: bool) {
		match &mut self.phase {
			Phase::Receive { bits, byte, .. } if *bits < 8 => {
				*byte = (*byte << 1) | sda as u8;
				*bits += 1;
			},
			Phase::MasterAck { ack } => {
				*ack = !sda;
			},
			_ => (),
		}
	}

	// hold SCL low while the application decides
	fn stretch(&mut self) {
		self.lines.drive_scl_low();
	}

	fn end_stretch(&mut self) {
		let setup = self.data_setup;
		self.timer.delay(setup);
		self.lines.release_scl();
	}

	fn drive_ack(&mut self, ack: Ack, then_transmit: bool) {
		self.lines.set_sda(!ack.is_ack());
		self.end_stretch();
		self.phase = Phase::AckOut {
			ack: ack.is_ack(),
			then_transmit,
		};
	}

	fn transmit_next<H: SlaveHandler + ?Sized>(&mut self, handler: &mut H) {
		self.stretch();
		let byte = handler.master_requires_data();
		trace!("slave 0x{:02x}: sending 0x{:02x}", self.address, byte);
		self.lines.set_sda(0 != byte & 0x80);
		self.end_stretch();
		self.phase = Phase::Transmit {
			bits: 1,
			byte,
		};
	}

	fn on_scl_fall<H: SlaveHandler + ?Sized>(&mut self, handler: &mut H) {
		match self.phase {
			Phase::Idle => (),
			Phase::Receive { bits, .. } if bits < 8 => (),
			Phase::Receive { byte, address: true, .. } => {
				let device_addr = byte >> 1;
				let read = 0 != byte & 1;
				if device_addr != self.address {
					trace!("slave 0x{:02x}: ignoring transaction for 0x{:02x}", self.address, device_addr);
					self.phase = Phase::Idle;
					return;
				}
				self.addressed = true;
				self.stretch();
				let ack = if read {
					handler.ack_read_request()
				} else {
					handler.ack_write_request()
				};
				debug!("slave 0x{:02x}: {} request {:?}", self.address, if read { "read" } else { "write" }, ack);
				self.drive_ack(ack, read);
			},
			Phase::Receive { byte, address: false, .. } => {
				self.stretch();
				let ack = handler.master_sent_data(byte);
				trace!("slave 0x{:02x}: received 0x{:02x}, {:?}", self.address, byte, ack);
				self.drive_ack(ack, false);
			},
			Phase::AckOut { ack: false, .. } => {
				self.lines.release_sda();
				self.phase = Phase::Idle;
			},
			Phase::AckOut { ack: true, then_transmit: true } => {
				self.transmit_next(handler);
			},
			Phase::AckOut { ack: true, then_transmit: false } => {
				self.lines.release_sda();
				self.phase = Phase::Receive {
					bits: 0,
					byte: 0,
					address: false,
				};
			},
			Phase::Transmit { bits, byte } if bits < 8 => {
				self.lines.set_sda(0 != byte & (0x80 >> bits));
				self.phase = Phase::Transmit {
					bits: bits + 1,
					byte,
				};
			},
			Phase::Transmit { .. } => {
				// let the master drive its ACK
				self.lines.release_sda();
				self.phase = Phase::MasterAck { ack: false };
			},
			Phase::MasterAck { ack: true } => {
				self.transmit_next(handler);
			},
			Phase::MasterAck { ack: false } => {
				trace!("slave 0x{:02x}: master NACK, read done", self.address);
				self.lines.release_sda();
				self.phase = Phase::Idle;
			},
		}
	}
}
