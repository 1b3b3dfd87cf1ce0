#[macro_use]
extern crate clap;
#[macro_use]
extern crate failure;
#[macro_use]
extern crate log;

extern crate i2c_bitbang;
use i2c_bitbang::*;

use std::path::Path;
use std::process::exit;

use i2c_bitbang::port::{
	StdTimer,
	open_mapped_port,
};
use i2c_bitbang::sim::{
	SimBus,
	SimSlaveDevice,
};
use i2c_bitbang::timing::TIMER_MHZ;

// decimal, or hex with 0x prefix
fn parse_number(value: &str) -> AResult<u32> {
	let res = if value.starts_with("0x") || value.starts_with("0X") {
		u32::from_str_radix(&value[2..], 16)
	} else {
		value.parse::<u32>()
	};
	res.map_err(|e| {
		let e = failure::Error::from(e);
		let msg = format!("invalid number {:?}: {}", value, e);
		e.context(msg).into()
	})
}

fn get_param(matches: &clap::ArgMatches, name: &str) -> AResult<u32> {
	let param = match matches.value_of(name) {
		Some(p) => p,
		None => bail!("missing parameter {}", name),
	};
	parse_number(param).map_err(|e| {
		let msg = format!("invalid paramater {}", name);
		e.context(msg).into()
	})
}

fn get_param_or(matches: &clap::ArgMatches, name: &str, default: u32) -> AResult<u32> {
	if matches.is_present(name) {
		get_param(matches, name)
	} else {
		Ok(default)
	}
}

fn get_byte(matches: &clap::ArgMatches, name: &str) -> AResult<u8> {
	let value = get_param(matches, name)?;
	ensure!(value <= 0xff, "{} out of range: {}", name, value);
	Ok(value as u8)
}

fn get_bytes(matches: &clap::ArgMatches, name: &str) -> AResult<Vec<u8>> {
	let mut bytes = Vec::new();
	for value in matches.values_of(name).into_iter().flatten() {
		let value = parse_number(value)?;
		ensure!(value <= 0xff, "byte out of range: {}", value);
		bytes.push(value as u8);
	}
	Ok(bytes)
}

fn ticks_to_ns(ticks: u32) -> u32 {
	ticks * 1000 / TIMER_MHZ
}

fn show_timing(sub_m: &clap::ArgMatches) -> AResult<()> {
	let kbps = get_param(sub_m, "KBPS")?;
	let timing = BusTiming::new(kbps)?;

	println!("{} kbit/s ({} MHz timer)", kbps, TIMER_MHZ);
	let rows = [
		("bit time", timing.bit_time),
		("start hold", timing.start_hold),
		("repeated start setup", timing.restart_setup),
		("stop setup", timing.stop_setup),
		("SCL low", timing.low_period),
		("SCL high", timing.high_period),
		("bus free", timing.bus_free()),
		("data setup", timing.data_setup()),
	];
	for (name, ticks) in rows.iter() {
		println!("  {:<22} {:>7} ticks {:>9} ns", name, ticks, ticks_to_ns(*ticks));
	}

	Ok(())
}

fn sim_master(sub_m: &clap::ArgMatches, bus: &SimBus) -> AResult<MasterContext<sim::SimPort, sim::SimTimer>> {
	let config = MasterConfig {
		kbits_per_second: get_param_or(sub_m, "speed", 100)?,
		scl: LineConfig::bit(0),
		sda: LineConfig::bit(1),
		..MasterConfig::default()
	};
	Ok(MasterContext::new(bus.shared_port(0, 1), bus.timer(), config)?)
}

fn print_trace(bus: &SimBus) {
	for event in bus.events() {
		println!("  {:?}", event);
	}
	println!("  ({} ticks)", bus.now());
}

fn sim_write(sub_m: &clap::ArgMatches) -> AResult<()> {
	let address = get_byte(sub_m, "ADDRESS")?;
	let data = get_bytes(sub_m, "DATA")?;

	let bus = SimBus::new();
	let mut device = SimSlaveDevice::new(get_byte_or(sub_m, "device", address)?);
	if sub_m.is_present("nack_at") {
		let nack_at = get_param(sub_m, "nack_at")? as usize;
		let mut acks = vec![true; nack_at];
		acks.push(false);
		device = device.with_ack_sequence(acks);
	}
	let transfers = device.transfers();
	bus.attach(device);

	let mut master = sim_master(sub_m, &bus)?;
	let result = master.write(address, &data, true);
	println!("{:?}, {}/{} bytes sent", result.outcome, result.bytes_sent, data.len());
	print_trace(&bus);
	debug!("device saw {:?}", transfers.get());

	Ok(())
}

fn sim_read(sub_m: &clap::ArgMatches) -> AResult<()> {
	let address = get_byte(sub_m, "ADDRESS")?;
	let len = get_param(sub_m, "LEN")? as usize;

	let bus = SimBus::new();
	let device = SimSlaveDevice::new(get_byte_or(sub_m, "device", address)?)
		.with_tx_data(get_bytes(sub_m, "data")?);
	bus.attach(device);

	let mut master = sim_master(sub_m, &bus)?;
	let result = master.read(address, len, true);
	println!("{:?}: {:02x?}", result.outcome, result.data);
	print_trace(&bus);

	Ok(())
}

fn get_byte_or(matches: &clap::ArgMatches, name: &str, default: u8) -> AResult<u8> {
	if matches.is_present(name) {
		get_byte(matches, name)
	} else {
		Ok(default)
	}
}

fn scan(sub_m: &clap::ArgMatches) -> AResult<()> {
	let path = match sub_m.value_of("MAP") {
		Some(p) => Path::new(p),
		None => bail!("missing parameter MAP"),
	};
	let output_offset = get_param(sub_m, "output")? as usize;
	let input_offset = get_param_or(sub_m, "input", output_offset as u32)? as usize;
	let port = open_mapped_port(path, output_offset, input_offset)?;

	let config = MasterConfig {
		kbits_per_second: get_param_or(sub_m, "speed", 100)?,
		scl: LineConfig::bit(get_param(sub_m, "scl")?),
		sda: LineConfig::bit(get_param(sub_m, "sda")?),
		..MasterConfig::default()
	};
	let mut master = MasterContext::new(Wiring::Shared(port), StdTimer::new(), config)?;

	match master.check_pullups() {
		PullupStatus::Present => (),
		status => {
			eprintln!("Bus not usable: {:?}", status);
			exit(1);
		},
	}

	let mut found = 0;
	for address in 0x08..0x78u8 {
		let result = master.write(address, &[], true);
		match result.outcome {
			TransferOutcome::Acked => {
				println!("0x{:02x}", address);
				found += 1;
			},
			TransferOutcome::Nacked => (),
			outcome => warn!("probing 0x{:02x}: {:?}", address, outcome),
		}
	}
	info!("{} device(s) found", found);
	master.shutdown();

	Ok(())
}

fn main_app() -> AResult<()> {
	let matches = clap_app!(@app (app_from_crate!())
		(@setting SubcommandRequiredElseHelp)
		(global_setting: clap::AppSettings::VersionlessSubcommands)
		(@subcommand timing =>
			(about: "show bus timing for a speed")
			(@arg KBPS: +required "bus speed in kbit/s (1-400)")
		)
		(@subcommand sim_write =>
			(about: "write to a simulated device and show the bus trace")
			(@arg speed: -s --speed +takes_value "bus speed in kbit/s (default 100)")
			(@arg device: -d --device +takes_value "address the simulated device answers (default ADDRESS)")
			(@arg nack_at: -n --("nack-at") +takes_value "data byte index the device NACKs")
			(@arg ADDRESS: +required "7-bit device address")
			(@arg DATA: ... "data bytes")
		)
		(@subcommand sim_read =>
			(about: "read from a simulated device and show the bus trace")
			(@arg speed: -s --speed +takes_value "bus speed in kbit/s (default 100)")
			(@arg device: -d --device +takes_value "address the simulated device answers (default ADDRESS)")
			(@arg data: --data +takes_value ... "bytes the device sends")
			(@arg ADDRESS: +required "7-bit device address")
			(@arg LEN: +required "number of bytes to read")
		)
		(@subcommand scan =>
			(about: "probe all addresses on a memory-mapped GPIO port")
			(@arg speed: -s --speed +takes_value "bus speed in kbit/s (default 100)")
			(@arg output: --out +takes_value +required "output register offset")
			(@arg input: --("in") +takes_value "input register offset (default: output offset)")
			(@arg scl: --scl +takes_value +required "SCL bit")
			(@arg sda: --sda +takes_value +required "SDA bit")
			(@arg MAP: +required "file to map (e.g. PCI resource or /dev/mem window)")
		)
	).get_matches();

	match matches.subcommand() {
		("timing", Some(sub_m)) => {
			show_timing(sub_m)
		},
		("sim_write", Some(sub_m)) => {
			sim_write(sub_m)
		},
		("sim_read", Some(sub_m)) => {
			sim_read(sub_m)
		},
		("scan", Some(sub_m)) => {
			scan(sub_m)
		},
		("", _) => bail!("no subcommand"),
		(cmd, _) => bail!("not implemented subcommand {:?}", cmd),
	}
}

fn main() {
	env_logger::from_env(env_logger::Env::default().default_filter_or("info")).init();

	if let Err(e) = main_app() {
		error!("Error: {}", e);
		exit(1);
	}
}
