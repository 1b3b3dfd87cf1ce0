use failure::Fail;

/// Invalid engine configuration; no engine is constructed.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Fail)]
pub enum ConfigError {
	#[fail(display = "bus speed {} kbit/s out of range (1..=400)", _0)]
	SpeedOutOfRange(u32),
	#[fail(display = "bit position {} does not fit a 32-bit port", _0)]
	BitPositionOutOfRange(u32),
	#[fail(display = "SCL and SDA share port bit {}", _0)]
	SharedBitPosition(u32),
	#[fail(display = "other bits mask 0x{:08x} covers I2C line bit {}", _0, _1)]
	MaskCoversLine(u32, u32),
	#[fail(display = "device address 0x{:02x} is not a 7-bit address", _0)]
	InvalidAddress(u8),
}
