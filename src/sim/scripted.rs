use std::collections::VecDeque;
use std::sync::{
	Arc,
	Mutex,
	MutexGuard,
	PoisonError,
};

use super::{
	Drive,
	Levels,
	Peer,
};
use crate::error::ConfigError;
use crate::master::TransferOutcome;
use crate::timing::BusTiming;

#[derive(Clone, PartialEq, Eq, Debug)]
pub enum ScriptOp {
	Write(Vec<u8>),
	Read(usize),
}

/// One transaction of a `SimMaster` script.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct ScriptStep {
	pub address: u8,
	pub op: ScriptOp,
	pub send_stop: bool,
}

impl ScriptStep {
	pub fn write(address: u8, data: &[u8], send_stop: bool) -> Self {
		ScriptStep {
			address,
			op: ScriptOp::Write(data.to_vec()),
			send_stop,
		}
	}

	pub fn read(address: u8, len: usize, send_stop: bool) -> Self {
		ScriptStep {
			address,
			op: ScriptOp::Read(len),
			send_stop,
		}
	}
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct ScriptResult {
	pub outcome: TransferOutcome,
	pub bytes_sent: usize,
	pub data: Vec<u8>,
}

#[derive(Default, Debug)]
struct Report {
	results: Vec<ScriptResult>,
	stretches: Vec<u64>,
	done: bool,
}

/// What a `SimMaster` saw; shared with the test while the master runs.
#[derive(Clone, Default, Debug)]
pub struct SimMasterReport(Arc<Mutex<Report>>);

impl SimMasterReport {
	fn lock(&self) -> MutexGuard<Report> {
		self.0.lock().unwrap_or_else(PoisonError::into_inner)
	}

	/// all script steps finished (and a held bus was released)
	pub fn is_done(&self) -> bool {
		self.lock().done
	}

	pub fn results(&self) -> Vec<ScriptResult> {
		self.lock().results.clone()
	}

	/// ticks SCL stayed low after each release that was stretched
	pub fn stretches(&self) -> Vec<u64> {
		self.lock().stretches.clone()
	}

	pub fn max_stretch(&self) -> u64 {
		self.lock().stretches.iter().cloned().max().unwrap_or(0)
	}
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum Sample {
	Ignore,
	Bit,
	Ack,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum Op {
	/// release (`true`) or drive low
	Scl(bool),
	Sda(bool),
	Hold(u32),
	WaitSclHigh,
	Sample(Sample),
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum Plan {
	Begin,
	AfterAddress,
	Write(usize),
	AfterWrite(usize),
	Read(usize),
	AfterRead(usize),
	Finish(TransferOutcome),
	Done,
}

/// Scripted remote master for exercising a slave on the simulated bus.
///
/// Runs its script step by step at the configured speed, waits for SCL to
/// really rise after every release (recording how long a slave stretched the
/// clock) and ends a transaction with STOP after any NACK it receives.
pub struct SimMaster {
	timing: BusTiming,
	script: Vec<ScriptStep>,
	index: usize,
	plan: Plan,
	held: bool,
	queue: VecDeque<Op>,
	hold_until: Option<u64>,
	wait_started: Option<u64>,
	shift: u8,
	last_ack: bool,
	result: ScriptResult,
	drive: Drive,
	report: SimMasterReport,
}

impl SimMaster {
	pub fn new(kbits_per_second: u32, script: Vec<ScriptStep>) -> Result<Self, ConfigError> {
		Ok(SimMaster {
			timing: BusTiming::new(kbits_per_second)?,
			script,
			index: 0,
			plan: Plan::Begin,
			held: false,
			queue: VecDeque::new(),
			hold_until: None,
			wait_started: None,
			shift: 0,
			last_ack: false,
			result: ScriptResult {
				outcome: TransferOutcome::NotStarted,
				bytes_sent: 0,
				data: Vec::new(),
			},
			drive: Drive::default(),
			report: SimMasterReport::default(),
		})
	}

	pub fn report(&self) -> SimMasterReport {
		self.report.clone()
	}

	fn push_start(&mut self) {
		let hold = self.timing.start_hold;
		self.queue.extend(&[Op::Sda(false), Op::Hold(hold), Op::Scl(false)]);
	}

	fn push_repeated_start(&mut self) {
		let low = self.timing.low_period;
		let setup = self.timing.restart_setup;
		self.queue.extend(&[Op::Sda(true), Op::Hold(low), Op::Scl(true), Op::WaitSclHigh, Op::Hold(setup)]);
		self.push_start();
	}

	fn push_stop(&mut self) {
		let low = self.timing.low_period;
		let setup = self.timing.stop_setup;
		let free = self.timing.bus_free();
		self.queue.extend(&[
			Op::Sda(false),
			Op::Hold(low),
			Op::Scl(true),
			Op::WaitSclHigh,
			Op::Hold(setup),
			Op::Sda(true),
			Op::Hold(free),
		]);
	}

	fn push_clock(&mut self, release_sda: bool, sample: Sample) {
		let low = self.timing.low_period;
		let high = self.timing.high_period;
		self.queue.extend(&[
			Op::Sda(release_sda),
			Op::Hold(low),
			Op::Scl(true),
			Op::WaitSclHigh,
			Op::Hold(high),
			Op::Sample(sample),
			Op::Scl(false),
		]);
	}

	fn push_byte(&mut self, byte: u8) {
		for bit in (0..8).rev() {
			self.push_clock(0 != byte & (1 << bit), Sample::Ignore);
		}
		// slave acknowledges
		self.push_clock(true, Sample::Ack);
	}

	fn plan_next(&mut self) {
		let step = match self.script.get(self.index) {
			Some(step) => step.clone(),
			None => {
				if self.held {
					self.push_stop();
					self.held = false;
				} else {
					self.report.lock().done = true;
					self.plan = Plan::Done;
				}
				return;
			},
		};

		self.plan = match self.plan {
			Plan::Begin => {
				self.result = ScriptResult {
					outcome: TransferOutcome::NotStarted,
					bytes_sent: 0,
					data: Vec::new(),
				};
				if self.held {
					self.push_repeated_start();
				} else {
					let free = self.timing.bus_free();
					self.queue.push_back(Op::Hold(free));
					self.push_start();
				}
				let read = match step.op {
					ScriptOp::Read(_) => 1,
					ScriptOp::Write(_) => 0,
				};
				self.push_byte((step.address << 1) | read);
				Plan::AfterAddress
			},
			Plan::AfterAddress if !self.last_ack => Plan::Finish(TransferOutcome::Nacked),
			Plan::AfterAddress => match step.op {
				ScriptOp::Write(_) => Plan::Write(0),
				ScriptOp::Read(_) => Plan::Read(0),
			},
			Plan::Write(i) => match &step.op {
				ScriptOp::Write(data) if i < data.len() => {
					self.push_byte(data[i]);
					Plan::AfterWrite(i)
				},
				_ => Plan::Finish(TransferOutcome::Acked),
			},
			Plan::AfterWrite(i) => {
				if self.last_ack {
					self.result.bytes_sent += 1;
					Plan::Write(i + 1)
				} else {
					Plan::Finish(TransferOutcome::Nacked)
				}
			},
			Plan::Read(i) => match step.op {
				ScriptOp::Read(len) if i < len => {
					self.shift = 0;
					for _ in 0..8 {
						self.push_clock(true, Sample::Bit);
					}
					// NACK the last byte
					self.push_clock(i + 1 == len, Sample::Ignore);
					Plan::AfterRead(i)
				},
				_ => Plan::Finish(TransferOutcome::Acked),
			},
			Plan::AfterRead(i) => {
				let byte = self.shift;
				self.result.data.push(byte);
				Plan::Read(i + 1)
			},
			Plan::Finish(outcome) => {
				self.result.outcome = outcome;
				self.report.lock().results.push(self.result.clone());
				if outcome == TransferOutcome::Nacked || step.send_stop {
					self.push_stop();
					self.held = false;
				} else {
					self.held = true;
				}
				self.index += 1;
				Plan::Begin
			},
			Plan::Done => Plan::Done,
		};
	}
}

impl Peer for SimMaster {
	fn step(&mut self, now: u64, levels: Levels) -> Drive {
		loop {
			let op = match self.queue.front() {
				Some(op) => *op,
				None if self.plan == Plan::Done => break,
				None => {
					self.plan_next();
					continue;
				},
			};
			match op {
				Op::Scl(release) => {
					self.queue.pop_front();
					if self.drive.scl_low == release {
						self.drive.scl_low = !release;
						// let the bus settle before looking at the lines again
						break;
					}
				},
				Op::Sda(release) => {
					self.queue.pop_front();
					if self.drive.sda_low == release {
						self.drive.sda_low = !release;
						break;
					}
				},
				Op::Hold(ticks) => {
					let until = *self.hold_until.get_or_insert(now + ticks as u64);
					if now < until {
						break;
					}
					self.hold_until = None;
					self.queue.pop_front();
				},
				Op::WaitSclHigh => {
					let started = *self.wait_started.get_or_insert(now);
					if !levels.scl {
						break;
					}
					if now > started {
						self.report.lock().stretches.push(now - started);
					}
					self.wait_started = None;
					self.queue.pop_front();
				},
				Op::Sample(sample) => {
					self.queue.pop_front();
					match sample {
						Sample::Ignore => (),
						Sample::Bit => self.shift = (self.shift << 1) | levels.sda as u8,
						Sample::Ack => self.last_ack = !levels.sda,
					}
				},
			}
		}
		self.drive
	}
}
