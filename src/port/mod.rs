/// Physical access to the bus: open-drain ports and a tick timer.
///
/// A port is a (possibly multi-bit) open-drain GPIO port: writing a 0 bit
/// drives that pin low, writing a 1 bit releases it so the external pull-up
/// can take it high. Reading returns the actual pin levels, which can differ
/// from what was written (another device driving low, clock stretching,
/// missing pull-up).
///
/// SCL and SDA either live on two separate ports or share one multi-bit port;
/// see `Wiring`.

mod lines;
mod mapped;
mod std_timer;

pub use self::lines::{
	Lines,
	PullupStatus,
	PULLUP_TIMEOUT_TICKS,
};

pub use self::mapped::{
	Mapped,
	MappedPort,
	open_mapped,
	open_mapped_port,
};

pub use self::std_timer::{
	StdTimer,
	reliable_sleep,
};

pub trait Port {
	fn write(&mut self, value: u32);
	fn read(&mut self) -> u32;
}

impl<'a, P: ?Sized + Port> Port for &'a mut P {
	fn write(&mut self, value: u32) {
		P::write(*self, value)
	}
	fn read(&mut self) -> u32 {
		P::read(*self)
	}
}

/// Free running, wrapping tick counter running at `timing::TIMER_MHZ`.
pub trait Timer {
	fn now(&mut self) -> u32;

	/// Busy-wait until `deadline` has passed (wrap-aware).
	fn wait_until(&mut self, deadline: u32);

	fn delay(&mut self, ticks: u32) {
		let deadline = self.now().wrapping_add(ticks);
		self.wait_until(deadline);
	}
}

impl<'a, T: ?Sized + Timer> Timer for &'a mut T {
	fn now(&mut self) -> u32 {
		T::now(*self)
	}
	fn wait_until(&mut self, deadline: u32) {
		T::wait_until(*self, deadline)
	}
}

/// whether tick `now` is at or after `deadline`, treating the counter as wrapping
pub fn is_after(now: u32, deadline: u32) -> bool {
	(now.wrapping_sub(deadline) as i32) >= 0
}

/// Where a line lives on its port.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub struct LineConfig {
	pub bit_position: u32,
	/// ORed into every value written to the line's port; bits of the I2C
	/// lines themselves must be zero.
	pub other_bits_mask: u32,
}

impl LineConfig {
	pub fn bit(bit_position: u32) -> Self {
		LineConfig {
			bit_position,
			other_bits_mask: 0,
		}
	}

	pub fn with_other_bits(self, other_bits_mask: u32) -> Self {
		LineConfig {
			other_bits_mask,
			..self
		}
	}

	pub(crate) fn mask(&self) -> u32 {
		1u32 << self.bit_position
	}
}

pub enum Wiring<P> {
	Split {
		scl: P,
		sda: P,
	},
	/// both lines on one multi-bit port
	Shared(P),
}

impl<P> Wiring<P> {
	pub fn is_shared(&self) -> bool {
		match self {
			Wiring::Shared(_) => true,
			Wiring::Split { .. } => false,
		}
	}
}
