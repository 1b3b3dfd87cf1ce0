/// I2C bus master: START, address, data and STOP generation on two lines.

mod context;
mod register;

pub use self::context::{
	DEFAULT_STRETCH_TIMEOUT_TICKS,
	MasterConfig,
	MasterContext,
};

pub use self::register::{
	RegisterOpOutcome,
	RegisterOps,
};

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum TransferOutcome {
	/// the last byte was acknowledged
	Acked,
	/// the address or a data byte was not acknowledged (or the bus hung)
	Nacked,
	/// a request was accepted and is in flight
	Started,
	/// the bus could not be claimed, or arbitration was lost
	NotStarted,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct WriteResult {
	pub outcome: TransferOutcome,
	/// bytes acknowledged by the slave; less than requested on early NACK
	pub bytes_sent: usize,
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct ReadResult {
	pub outcome: TransferOutcome,
	/// exactly the bytes that were clocked in
	pub data: Vec<u8>,
}

/// Blocking master operations; `MasterContext` is the bit-banged
/// implementation.
pub trait Master {
	/// Write `buf` to `device_addr`. Without `send_stop` the bus stays
	/// claimed and the next operation starts with a repeated START.
	fn write(&mut self, device_addr: u8, buf: &[u8], send_stop: bool) -> WriteResult;

	fn read(&mut self, device_addr: u8, len: usize, send_stop: bool) -> ReadResult;

	/// End a transaction left open with `send_stop = false`.
	fn send_stop(&mut self);

	/// Whether the last operation left the bus claimed. False after any
	/// fault that released the lines, whatever `send_stop` asked for.
	fn is_bus_held(&self) -> bool;
}

impl<'a, M: ?Sized + Master> Master for &'a mut M {
	fn write(&mut self, device_addr: u8, buf: &[u8], send_stop: bool) -> WriteResult {
		M::write(*self, device_addr, buf, send_stop)
	}
	fn read(&mut self, device_addr: u8, len: usize, send_stop: bool) -> ReadResult {
		M::read(*self, device_addr, len, send_stop)
	}
	fn send_stop(&mut self) {
		M::send_stop(*self)
	}
	fn is_bus_held(&self) -> bool {
		M::is_bus_held(*self)
	}
}
