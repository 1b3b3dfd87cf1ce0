extern crate i2c_bitbang;

use std::collections::VecDeque;

use i2c_bitbang::*;
use i2c_bitbang::sim::{
	ScriptResult,
	ScriptStep,
	SimBus,
	SimMaster,
	SimMasterReport,
	SimPort,
	SimTimer,
};

const ADDRESS: u8 = 0x42;
// generous bound on simulated ticks per test
const TICK_LIMIT: u64 = 2_000_000;

#[derive(Default)]
struct Recorder {
	events: Vec<String>,
	tx: VecDeque<u8>,
	received: Vec<u8>,
	nack_read: bool,
	nack_byte: Option<usize>,
	// (timer, ticks) spent in every master_requires_data call
	delay: Option<(SimTimer, u32)>,
	shutdown_after_stops: Option<usize>,
	stops: usize,
	shutdown_handle: Option<ShutdownHandle>,
}

impl SlaveHandler for Recorder {
	fn ack_read_request(&mut self) -> Ack {
		self.events.push("read?".into());
		Ack::from(!self.nack_read)
	}

	fn ack_write_request(&mut self) -> Ack {
		self.events.push("write?".into());
		if let Some(handle) = &self.shutdown_handle {
			handle.request_shutdown();
		}
		Ack::Ack
	}

	fn master_requires_data(&mut self) -> u8 {
		if let Some((timer, ticks)) = &mut self.delay {
			timer.delay(*ticks);
		}
		let byte = self.tx.pop_front().unwrap_or(0xff);
		self.events.push(format!("tx {:02x}", byte));
		byte
	}

	fn master_sent_data(&mut self, data: u8) -> Ack {
		self.events.push(format!("rx {:02x}", data));
		self.received.push(data);
		Ack::from(self.nack_byte != Some(self.received.len() - 1))
	}

	fn stop_bit(&mut self) {
		self.events.push("stop".into());
		self.stops += 1;
	}

	fn shutdown_requested(&mut self) -> bool {
		self.shutdown_after_stops.map_or(false, |n| self.stops >= n)
	}

	fn shutdown(&mut self) {
		self.events.push("shutdown".into());
	}
}

fn setup(script: Vec<ScriptStep>) -> (SimBus, SimMasterReport, SlaveContext<SimPort, SimTimer>) {
	let bus = SimBus::new();
	let master = SimMaster::new(100, script).unwrap();
	let report = master.report();
	bus.attach(master);
	let config = SlaveConfig {
		scl: LineConfig::bit(0),
		sda: LineConfig::bit(1),
		..SlaveConfig::new(ADDRESS)
	};
	let slave = SlaveContext::new(bus.shared_port(0, 1), bus.timer(), config).unwrap();
	(bus, report, slave)
}

fn serve(bus: &SimBus, report: &SimMasterReport, slave: &mut SlaveContext<SimPort, SimTimer>, handler: &mut Recorder) {
	while !report.is_done() {
		slave.poll(handler);
		assert!(bus.now() < TICK_LIMIT, "simulated master did not finish");
	}
}

fn acked(bytes_sent: usize, data: Vec<u8>) -> ScriptResult {
	ScriptResult {
		outcome: TransferOutcome::Acked,
		bytes_sent,
		data,
	}
}

#[test]
fn write_and_read() {
	let (bus, report, mut slave) = setup(vec![
		ScriptStep::write(ADDRESS, &[0x10, 0x20], true),
		ScriptStep::read(ADDRESS, 2, true),
	]);
	let mut handler = Recorder {
		tx: vec![0xde, 0xad].into(),
		..Recorder::default()
	};
	serve(&bus, &report, &mut slave, &mut handler);

	assert_eq!(report.results(), vec![acked(2, vec![]), acked(0, vec![0xde, 0xad])]);
	assert_eq!(handler.events, vec!["write?", "rx 10", "rx 20", "stop", "read?", "tx de", "tx ad", "stop"]);
	assert_eq!(slave.state(), SlaveState::Idle);
}

#[test]
fn other_address_is_ignored() {
	let (bus, report, mut slave) = setup(vec![
		ScriptStep::write(ADDRESS + 1, &[1, 2], true),
		ScriptStep::read(ADDRESS + 1, 1, true),
	]);
	let mut handler = Recorder::default();
	serve(&bus, &report, &mut slave, &mut handler);

	assert!(report.results().iter().all(|r| r.outcome == TransferOutcome::Nacked));
	assert!(handler.events.is_empty());
	// only the initial release
	assert_eq!(bus.port_writes(0).len(), 1);
}

#[test]
fn handler_nacks_data_byte() {
	let (bus, report, mut slave) = setup(vec![ScriptStep::write(ADDRESS, &[1, 2, 3], true)]);
	let mut handler = Recorder {
		nack_byte: Some(1),
		..Recorder::default()
	};
	serve(&bus, &report, &mut slave, &mut handler);

	let results = report.results();
	let result = &results[0];
	assert_eq!(result.outcome, TransferOutcome::Nacked);
	assert_eq!(result.bytes_sent, 1);
	assert_eq!(handler.received, vec![1, 2]);
	assert_eq!(handler.events.last().map(String::as_str), Some("stop"));
}

#[test]
fn handler_rejects_read() {
	let (bus, report, mut slave) = setup(vec![ScriptStep::read(ADDRESS, 2, true)]);
	let mut handler = Recorder {
		nack_read: true,
		..Recorder::default()
	};
	serve(&bus, &report, &mut slave, &mut handler);

	assert_eq!(report.results()[0].outcome, TransferOutcome::Nacked);
	assert_eq!(handler.events, vec!["read?", "stop"]);
}

#[test]
fn slow_handler_stretches_clock() {
	let (bus, report, mut slave) = setup(vec![ScriptStep::read(ADDRESS, 2, true)]);
	let mut handler = Recorder {
		tx: vec![0x5a, 0xa5].into(),
		delay: Some((bus.timer(), 5_000)),
		..Recorder::default()
	};
	serve(&bus, &report, &mut slave, &mut handler);

	assert_eq!(report.results(), vec![acked(0, vec![0x5a, 0xa5])]);
	let long_stretches = report.stretches().iter().filter(|s| **s >= 4_000).count();
	assert_eq!(long_stretches, 2);
	assert!(report.max_stretch() <= 5_000 + 100);
}

#[test]
fn repeated_start_has_single_stop() {
	let (bus, report, mut slave) = setup(vec![
		ScriptStep::write(ADDRESS, &[0x05], false),
		ScriptStep::read(ADDRESS, 1, true),
	]);
	let mut handler = Recorder {
		tx: vec![0x77].into(),
		..Recorder::default()
	};
	serve(&bus, &report, &mut slave, &mut handler);

	assert_eq!(report.results(), vec![acked(1, vec![]), acked(0, vec![0x77])]);
	assert_eq!(handler.events, vec!["write?", "rx 05", "read?", "tx 77", "stop"]);
}

#[test]
fn repeated_start_to_other_device_still_reports_stop() {
	let (bus, report, mut slave) = setup(vec![
		ScriptStep::write(ADDRESS, &[0x05], false),
		ScriptStep::write(ADDRESS + 1, &[0x06], true),
	]);
	let mut handler = Recorder {
		shutdown_handle: Some(slave.shutdown_handle()),
		..Recorder::default()
	};
	// shutdown is already requested, but has to wait for the STOP
	while slave.poll(&mut handler) != SlaveState::ShuttingDown {
		assert!(bus.now() < TICK_LIMIT);
	}

	let results = report.results();
	assert_eq!(results[0], acked(1, vec![]));
	assert_eq!(results[1].outcome, TransferOutcome::Nacked);
	assert_eq!(handler.events, vec!["write?", "rx 05", "stop", "shutdown"]);
}

#[test]
fn shutdown_waits_for_idle_bus() {
	let (bus, report, mut slave) = setup(vec![ScriptStep::write(ADDRESS, &[1, 2, 3], true)]);
	let mut handler = Recorder {
		shutdown_handle: Some(slave.shutdown_handle()),
		..Recorder::default()
	};
	while slave.poll(&mut handler) != SlaveState::ShuttingDown {
		assert!(bus.now() < TICK_LIMIT);
	}

	assert_eq!(report.results(), vec![acked(3, vec![])]);
	assert_eq!(handler.events, vec!["write?", "rx 01", "rx 02", "rx 03", "stop", "shutdown"]);
	assert_eq!(slave.poll(&mut handler), SlaveState::ShuttingDown);
	assert_eq!(handler.events.len(), 6);
	// the master only has its bus free time left
	bus.advance(1_000);
	assert!(report.is_done());
}

#[test]
fn run_until_handler_asks_to_stop() {
	let (_bus, report, mut slave) = setup(vec![
		ScriptStep::write(ADDRESS, &[9], true),
		ScriptStep::write(ADDRESS, &[8], true),
	]);
	let mut handler = Recorder {
		shutdown_after_stops: Some(2),
		..Recorder::default()
	};
	slave.run(&mut handler);

	assert_eq!(report.results().len(), 2);
	assert_eq!(handler.received, vec![9, 8]);
	assert_eq!(handler.events.last().map(String::as_str), Some("shutdown"));
	let (wiring, _timer) = slave.shutdown();
	assert!(wiring.is_shared());
}

#[test]
fn idle_shutdown_is_immediate() {
	let (_bus, _report, mut slave) = setup(vec![]);
	let mut handler = Recorder::default();
	let handle = slave.shutdown_handle();
	assert_eq!(slave.poll(&mut handler), SlaveState::Idle);
	handle.request_shutdown();
	assert_eq!(slave.poll(&mut handler), SlaveState::ShuttingDown);
	assert_eq!(handler.events, vec!["shutdown"]);
}

#[test]
fn invalid_address_rejected() {
	let bus = SimBus::new();
	let err = SlaveContext::new(bus.shared_port(0, 1), bus.timer(), SlaveConfig {
		scl: LineConfig::bit(0),
		sda: LineConfig::bit(1),
		..SlaveConfig::new(0x80)
	}).err();
	assert_eq!(err, Some(ConfigError::InvalidAddress(0x80)));
}

#[test]
fn default_config_fits_shared_port() {
	let bus = SimBus::new();
	let slave = SlaveContext::new(bus.shared_port(0, 1), bus.timer(), SlaveConfig::new(ADDRESS));
	assert!(slave.is_ok());
}
