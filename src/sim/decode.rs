use super::TraceEntry;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum BusEvent {
	Start,
	/// START without a STOP since the previous one
	RepeatedStart,
	Stop,
	/// eight data bits plus the acknowledge bit that followed
	Byte {
		value: u8,
		ack: bool,
	},
}

/// Turn a level trace into protocol events.
///
/// Bits are taken on SCL rising edges; SDA changes while SCL stays high are
/// START/STOP conditions. Bits before the first START are ignored.
pub fn decode(trace: &[TraceEntry]) -> Vec<BusEvent> {
	let mut events = Vec::new();
	let mut in_transaction = false;
	let mut bits = 0u32;
	let mut value = 0u8;

	for pair in trace.windows(2) {
		let (prev, cur) = (pair[0].levels, pair[1].levels);
		if prev.scl && cur.scl {
			if prev.sda && !cur.sda {
				events.push(if in_transaction { BusEvent::RepeatedStart } else { BusEvent::Start });
				in_transaction = true;
				bits = 0;
				value = 0;
			} else if !prev.sda && cur.sda && in_transaction {
				events.push(BusEvent::Stop);
				in_transaction = false;
			}
		} else if !prev.scl && cur.scl && in_transaction {
			if bits < 8 {
				value = (value << 1) | cur.sda as u8;
				bits += 1;
			} else {
				events.push(BusEvent::Byte { value, ack: !cur.sda });
				bits = 0;
				value = 0;
			}
		}
	}
	events
}
