extern crate i2c_bitbang;

use std::time::{
	Duration,
	Instant,
};

use i2c_bitbang::*;
use i2c_bitbang::service::{
	Completion,
	MasterService,
	Request,
};
use i2c_bitbang::sim::{
	SimBus,
	SimSlaveDevice,
	Stretch,
	Transfer,
};

#[test]
fn clients_share_simulated_master() {
	let bus = SimBus::new();
	let device = SimSlaveDevice::new(0x20).with_tx_data(vec![0x42]);
	let transfers = device.transfers();
	bus.attach(device);
	let config = MasterConfig {
		scl: LineConfig::bit(0),
		sda: LineConfig::bit(1),
		..MasterConfig::default()
	};
	let master = MasterContext::new(bus.shared_port(0, 1), bus.timer(), config).unwrap();
	let service = MasterService::spawn(master).unwrap();

	let mut a = service.client();
	let mut b = service.client();

	assert_eq!(a.submit(Request::Write { address: 0x20, data: vec![0x01], send_stop: false }), TransferOutcome::Started);
	assert_eq!(a.wait(), Some(Completion::Write(WriteResult { outcome: TransferOutcome::Acked, bytes_sent: 1 })));

	// b has to wait until a finishes its combined transaction
	assert_eq!(b.submit(Request::Write { address: 0x20, data: vec![0x02, 0x03], send_stop: true }), TransferOutcome::Started);
	assert_eq!(a.submit(Request::Read { address: 0x20, len: 1, send_stop: true }), TransferOutcome::Started);
	assert_eq!(a.wait(), Some(Completion::Read(ReadResult { outcome: TransferOutcome::Acked, data: vec![0x42] })));
	assert_eq!(b.wait(), Some(Completion::Write(WriteResult { outcome: TransferOutcome::Acked, bytes_sent: 2 })));

	assert_eq!(transfers.get(), vec![
		Transfer { address: 0x20, read: false, data: vec![0x01] },
		Transfer { address: 0x20, read: true, data: vec![0x42] },
		Transfer { address: 0x20, read: false, data: vec![0x02, 0x03] },
	]);

	let master = service.join().unwrap();
	assert!(!master.is_bus_held());
}

#[test]
fn poll_until_complete() {
	let bus = SimBus::new();
	bus.attach(SimSlaveDevice::new(0x20));
	let config = MasterConfig {
		scl: LineConfig::bit(0),
		sda: LineConfig::bit(1),
		..MasterConfig::default()
	};
	let master = MasterContext::new(bus.shared_port(0, 1), bus.timer(), config).unwrap();
	let service = MasterService::spawn(master).unwrap();
	let mut client = service.client();

	assert_eq!(client.submit(Request::Read { address: 0x21, len: 4, send_stop: true }), TransferOutcome::Started);
	let completion = loop {
		if let Some(completion) = client.poll() {
			break completion;
		}
		std::thread::yield_now();
	};
	assert_eq!(completion, Completion::Read(ReadResult { outcome: TransferOutcome::Nacked, data: vec![] }));
	assert_eq!(client.poll(), None);
	service.join().unwrap();
}

#[test]
fn stretch_timeout_releases_bus_for_other_clients() {
	let bus = SimBus::new();
	bus.attach(SimSlaveDevice::new(0x20).with_stretch(Stretch::Ticks(20_000)));
	let config = MasterConfig {
		scl: LineConfig::bit(0),
		sda: LineConfig::bit(1),
		stretch_timeout_ticks: 5_000,
		..MasterConfig::default()
	};
	let master = MasterContext::new(bus.shared_port(0, 1), bus.timer(), config).unwrap();
	let service = MasterService::spawn(master).unwrap();
	let mut a = service.client();
	let mut b = service.client();

	assert_eq!(a.submit(Request::Write { address: 0x20, data: vec![1], send_stop: false }), TransferOutcome::Started);
	assert_eq!(a.wait(), Some(Completion::Write(WriteResult { outcome: TransferOutcome::Nacked, bytes_sent: 0 })));

	// a gave up the bus with the timeout; b is served right away and finds
	// SCL still held by the device
	assert_eq!(b.submit(Request::Write { address: 0x21, data: vec![2], send_stop: true }), TransferOutcome::Started);
	let deadline = Instant::now() + Duration::from_secs(5);
	let completion = loop {
		if let Some(completion) = b.poll() {
			break completion;
		}
		assert!(Instant::now() < deadline, "request of second client never served");
		std::thread::yield_now();
	};
	assert_eq!(completion, Completion::Write(WriteResult { outcome: TransferOutcome::NotStarted, bytes_sent: 0 }));

	let master = service.join().unwrap();
	assert!(!master.is_bus_held());
}
