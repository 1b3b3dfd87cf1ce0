/// I2C bus slave: watches the lines for a remote master and answers on
/// behalf of an application implementing `SlaveHandler`.
///
/// The engine clock-stretches (holds SCL low) while a handler callback runs,
/// so callbacks may take as long as they need; the remote master simply
/// waits.

mod context;

use std::sync::atomic::{
	AtomicBool,
	Ordering,
};
use std::sync::Arc;

pub use self::context::{
	DEFAULT_DATA_SETUP_TICKS,
	SlaveConfig,
	SlaveContext,
};

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Ack {
	Ack,
	Nack,
}

impl Ack {
	pub fn is_ack(self) -> bool {
		self == Ack::Ack
	}
}

impl From<bool> for Ack {
	fn from(v: bool) -> Self {
		if v { Ack::Ack } else { Ack::Nack }
	}
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum SlaveState {
	Idle,
	/// clocking in address and direction
	AddressPhase,
	/// addressed for a master read; we supply data
	ReadDataPhase,
	/// addressed for a master write; we receive data
	WriteDataPhase,
	ShuttingDown,
}

/// Application side of the slave. Every method except the notifications is
/// called with SCL held low.
pub trait SlaveHandler {
	fn ack_read_request(&mut self) -> Ack;

	fn ack_write_request(&mut self) -> Ack;

	/// next byte to send; called for every byte the master ACKs
	fn master_requires_data(&mut self) -> u8;

	/// byte written by the master; the result is sent as its ACK bit
	fn master_sent_data(&mut self, data: u8) -> Ack;

	/// a transaction addressed to us ended with a STOP
	fn stop_bit(&mut self);

	/// polled whenever the bus is idle and no transaction we took part in
	/// is waiting for its STOP
	fn shutdown_requested(&mut self) -> bool {
		false
	}

	/// the engine stopped monitoring the bus
	fn shutdown(&mut self) {}
}

/// Asks a running slave to stop once the bus is idle and its last
/// transaction has seen a STOP.
#[derive(Clone, Debug, Default)]
pub struct ShutdownHandle(Arc<AtomicBool>);

impl ShutdownHandle {
	pub fn request_shutdown(&self) {
		self.0.store(true, Ordering::SeqCst);
	}

	pub fn is_requested(&self) -> bool {
		self.0.load(Ordering::SeqCst)
	}
}
