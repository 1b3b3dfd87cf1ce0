#[macro_use]
extern crate failure;
#[macro_use]
extern crate log;

macro_rules! with_context {
	(( $fmt:tt $($t:tt)* ), $e:expr) => {{
		use failure::Error;

		match (|| { $e })() {
			Ok(v) => Ok(v),
			Err(e) => {
				let e: Error = e;
				let msg = format!(concat!($fmt, ": {}") $($t)*, e);
				Err(Error::from(e.context(msg)))
			}
		}
	}};

	($msg:expr, $e:expr) => {
		with_context!(("{}", $msg), $e)
	};
}

pub type AResult<T> = Result<T, failure::Error>;

pub mod error;
pub mod timing;
pub mod port;
pub mod master;
pub mod slave;
pub mod service;
pub mod sim;

pub use crate::error::ConfigError;
pub use crate::master::{
	Master,
	MasterConfig,
	MasterContext,
	ReadResult,
	RegisterOpOutcome,
	RegisterOps,
	TransferOutcome,
	WriteResult,
};
pub use crate::port::{
	LineConfig,
	Port,
	PullupStatus,
	Timer,
	Wiring,
};
pub use crate::slave::{
	Ack,
	ShutdownHandle,
	SlaveConfig,
	SlaveContext,
	SlaveHandler,
	SlaveState,
};
pub use crate::timing::BusTiming;
