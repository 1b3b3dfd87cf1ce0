/// Simulated open-drain I2C bus with virtual time.
///
/// The engine side talks to the bus through `SimPort`s and a `SimTimer`; the
/// far side of the bus is one attached `Peer` (a simulated slave device or a
/// scripted master). Time only moves when the engine reads a port or waits on
/// the timer, so simulations are deterministic.

mod decode;
mod device;
mod scripted;

use std::sync::{
	Arc,
	Mutex,
	MutexGuard,
	PoisonError,
};

use crate::port::{
	Port,
	Timer,
	Wiring,
	is_after,
};

pub use self::decode::{
	BusEvent,
	decode,
};

pub use self::device::{
	SimSlaveDevice,
	Stretch,
	Transfer,
	Transfers,
};

pub use self::scripted::{
	ScriptOp,
	ScriptResult,
	ScriptStep,
	SimMaster,
	SimMasterReport,
};

// bound for peer reactions within a single tick
const MAX_SETTLE_STEPS: usize = 64;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Line {
	Scl,
	Sda,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Levels {
	pub scl: bool,
	pub sda: bool,
}

/// What a peer pulls low.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub struct Drive {
	pub scl_low: bool,
	pub sda_low: bool,
}

/// Bus levels from `time` on.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct TraceEntry {
	pub time: u64,
	pub levels: Levels,
}

/// The other side of the simulated bus.
pub trait Peer {
	/// Called after every engine write and every tick with the current wire
	/// levels; returns the lines the peer pulls low. May be called several
	/// times for the same tick, and must then be idempotent for unchanged
	/// levels.
	fn step(&mut self, now: u64, levels: Levels) -> Drive;
}

#[derive(Clone, Copy, Debug)]
struct Wire {
	engine_low: bool,
	peer_low: bool,
	pullup: bool,
	stuck_low: bool,
}

impl Wire {
	fn new() -> Self {
		Wire {
			engine_low: false,
			peer_low: false,
			pullup: true,
			stuck_low: false,
		}
	}

	fn level(&self) -> bool {
		self.pullup && !self.stuck_low && !self.engine_low && !self.peer_low
	}
}

struct BusState {
	scl: Wire,
	sda: Wire,
	time: u64,
	trace: Vec<TraceEntry>,
	port_writes: Vec<Vec<u32>>,
	peer: Option<Box<dyn Peer + Send>>,
}

fn record(trace: &mut Vec<TraceEntry>, time: u64, levels: Levels) {
	if trace.last().map_or(true, |e| e.levels != levels) {
		trace.push(TraceEntry { time, levels });
	}
}

impl BusState {
	fn levels(&self) -> Levels {
		Levels {
			scl: self.scl.level(),
			sda: self.sda.level(),
		}
	}

	fn wire(&mut self, line: Line) -> &mut Wire {
		match line {
			Line::Scl => &mut self.scl,
			Line::Sda => &mut self.sda,
		}
	}

	// let the peer react until its drive is stable
	fn settle(&mut self) {
		let levels = self.levels();
		record(&mut self.trace, self.time, levels);
		let peer = match &mut self.peer {
			Some(peer) => peer,
			None => return,
		};
		for _ in 0..MAX_SETTLE_STEPS {
			let levels = Levels {
				scl: self.scl.level(),
				sda: self.sda.level(),
			};
			let drive = peer.step(self.time, levels);
			if drive.scl_low == self.scl.peer_low && drive.sda_low == self.sda.peer_low {
				return;
			}
			self.scl.peer_low = drive.scl_low;
			self.sda.peer_low = drive.sda_low;
			let levels = Levels {
				scl: self.scl.level(),
				sda: self.sda.level(),
			};
			record(&mut self.trace, self.time, levels);
		}
		warn!("simulated peer did not settle at tick {}", self.time);
	}

	fn tick(&mut self) {
		self.time += 1;
		self.settle();
	}
}

/// Shared handle to one simulated bus; clones refer to the same bus.
#[derive(Clone)]
pub struct SimBus {
	inner: Arc<Mutex<BusState>>,
}

impl Default for SimBus {
	fn default() -> Self {
		SimBus::new()
	}
}

impl SimBus {
	pub fn new() -> Self {
		let state = BusState {
			scl: Wire::new(),
			sda: Wire::new(),
			time: 0,
			trace: vec![TraceEntry {
				time: 0,
				levels: Levels { scl: true, sda: true },
			}],
			port_writes: Vec::new(),
			peer: None,
		};
		SimBus {
			inner: Arc::new(Mutex::new(state)),
		}
	}

	fn state(&self) -> MutexGuard<BusState> {
		// a panicking test thread must not hide the bus from the others
		self.inner.lock().unwrap_or_else(PoisonError::into_inner)
	}

	/// Replace the device on the far side of the bus.
	pub fn attach<Pe: Peer + Send + 'static>(&self, peer: Pe) {
		let mut state = self.state();
		state.peer = Some(Box::new(peer));
		state.settle();
	}

	pub fn detach(&self) {
		let mut state = self.state();
		state.peer = None;
		state.scl.peer_low = false;
		state.sda.peer_low = false;
		state.settle();
	}

	/// A line without pull-up never rises on its own.
	pub fn set_pullup(&self, line: Line, present: bool) {
		let mut state = self.state();
		state.wire(line).pullup = present;
		state.settle();
	}

	/// Short a line to ground (or remove the short).
	pub fn set_stuck_low(&self, line: Line, stuck: bool) {
		let mut state = self.state();
		state.wire(line).stuck_low = stuck;
		state.settle();
	}

	pub fn now(&self) -> u64 {
		self.state().time
	}

	pub fn levels(&self) -> Levels {
		self.state().levels()
	}

	/// Let `ticks` pass without engine activity.
	pub fn advance(&self, ticks: u64) {
		let mut state = self.state();
		for _ in 0..ticks {
			state.tick();
		}
	}

	pub fn trace(&self) -> Vec<TraceEntry> {
		self.state().trace.clone()
	}

	/// Forget the trace, keeping the current levels as its first entry.
	pub fn clear_trace(&self) {
		let mut state = self.state();
		let entry = TraceEntry {
			time: state.time,
			levels: state.levels(),
		};
		state.trace = vec![entry];
	}

	pub fn events(&self) -> Vec<BusEvent> {
		decode(&self.trace())
	}

	/// Every value written to the port with the given id, in order.
	pub fn port_writes(&self, port_id: usize) -> Vec<u32> {
		self.state().port_writes.get(port_id).cloned().unwrap_or_default()
	}

	fn port(&self, scl_bit: Option<u32>, sda_bit: Option<u32>) -> SimPort {
		let mut state = self.state();
		state.port_writes.push(Vec::new());
		SimPort {
			bus: self.clone(),
			id: state.port_writes.len() - 1,
			scl_mask: scl_bit.map_or(0, |bit| 1 << bit),
			sda_mask: sda_bit.map_or(0, |bit| 1 << bit),
		}
	}

	/// Two single-line ports.
	pub fn split_ports(&self, scl_bit: u32, sda_bit: u32) -> Wiring<SimPort> {
		Wiring::Split {
			scl: self.port(Some(scl_bit), None),
			sda: self.port(None, Some(sda_bit)),
		}
	}

	/// One port carrying both lines.
	pub fn shared_port(&self, scl_bit: u32, sda_bit: u32) -> Wiring<SimPort> {
		Wiring::Shared(self.port(Some(scl_bit), Some(sda_bit)))
	}

	pub fn timer(&self) -> SimTimer {
		SimTimer { bus: self.clone() }
	}
}

/// Engine-side port; bits not mapped to a line read back as 1.
pub struct SimPort {
	bus: SimBus,
	id: usize,
	scl_mask: u32,
	sda_mask: u32,
}

impl SimPort {
	pub fn id(&self) -> usize {
		self.id
	}
}

impl Port for SimPort {
	fn write(&mut self, value: u32) {
		let mut state = self.bus.state();
		state.port_writes[self.id].push(value);
		if 0 != self.scl_mask {
			state.scl.engine_low = 0 == value & self.scl_mask;
		}
		if 0 != self.sda_mask {
			state.sda.engine_low = 0 == value & self.sda_mask;
		}
		state.settle();
	}

	/// Sampling takes one tick.
	fn read(&mut self) -> u32 {
		let mut state = self.bus.state();
		state.tick();
		let levels = state.levels();
		let mut value = !0u32;
		if !levels.scl {
			value &= !self.scl_mask;
		}
		if !levels.sda {
			value &= !self.sda_mask;
		}
		value
	}
}

/// Virtual clock of a `SimBus`; waiting advances bus time tick by tick.
#[derive(Clone)]
pub struct SimTimer {
	bus: SimBus,
}

impl Timer for SimTimer {
	fn now(&mut self) -> u32 {
		self.bus.now() as u32
	}

	fn wait_until(&mut self, deadline: u32) {
		let mut state = self.bus.state();
		while !is_after(state.time as u32, deadline) {
			state.tick();
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	// pulls SDA low while SCL is low
	struct Follower;

	impl Peer for Follower {
		fn step(&mut self, _now: u64, levels: Levels) -> Drive {
			Drive {
				scl_low: false,
				sda_low: !levels.scl,
			}
		}
	}

	#[test]
	fn lines_are_wired_and() {
		let bus = SimBus::new();
		let mut port = match bus.shared_port(0, 1) {
			Wiring::Shared(port) => port,
			Wiring::Split { .. } => unreachable!(),
		};
		assert_eq!(port.read() & 3, 3);
		port.write(!1);
		assert_eq!(bus.levels(), Levels { scl: false, sda: true });
		bus.set_stuck_low(Line::Sda, true);
		assert_eq!(port.read() & 3, 0);
		bus.set_stuck_low(Line::Sda, false);
		port.write(!0);
		bus.set_pullup(Line::Scl, false);
		assert_eq!(port.read() & 3, 2);
		assert_eq!(bus.port_writes(port.id()), vec![!1, !0]);
	}

	#[test]
	fn peer_reacts_within_the_same_tick() {
		let bus = SimBus::new();
		bus.attach(Follower);
		let mut port = match bus.shared_port(0, 1) {
			Wiring::Shared(port) => port,
			Wiring::Split { .. } => unreachable!(),
		};
		port.write(!1);
		assert_eq!(bus.levels(), Levels { scl: false, sda: false });
		port.write(!0);
		assert_eq!(bus.levels(), Levels { scl: true, sda: true });
		assert_eq!(bus.now(), 0);
	}

	#[test]
	fn timer_advances_bus_time() {
		let bus = SimBus::new();
		let mut timer = bus.timer();
		timer.delay(250);
		assert_eq!(bus.now(), 250);
		let start = timer.now();
		timer.wait_until(start.wrapping_sub(5));
		assert_eq!(bus.now(), 250);
	}
}
