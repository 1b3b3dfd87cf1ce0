use std::thread;
use std::time::{
	Duration,
	Instant,
};

use super::{
	Timer,
	is_after,
};
use crate::timing::TIMER_MHZ;

// sleeping is too coarse below this; spin for the rest
const SPIN_THRESHOLD: Duration = Duration::from_micros(100);

pub fn reliable_sleep(mut duration: Duration) {
	loop {
		let now = Instant::now();
		thread::sleep(duration);
		let elapsed = now.elapsed();
		if elapsed >= duration {
			return;
		}
		duration -= elapsed;
	}
}

/// `Timer` on top of the monotonic OS clock.
pub struct StdTimer {
	origin: Instant,
}

impl StdTimer {
	pub fn new() -> Self {
		StdTimer {
			origin: Instant::now(),
		}
	}
}

impl Default for StdTimer {
	fn default() -> Self {
		Self::new()
	}
}

impl Timer for StdTimer {
	fn now(&mut self) -> u32 {
		let elapsed = self.origin.elapsed();
		// truncation is the wrap-around of the tick counter
		(elapsed.as_nanos() * u128::from(TIMER_MHZ) / 1000) as u32
	}

	fn wait_until(&mut self, deadline: u32) {
		let remaining = deadline.wrapping_sub(self.now()) as i32;
		if remaining <= 0 {
			return;
		}
		let remaining = Duration::from_nanos(remaining as u64 * 1000 / u64::from(TIMER_MHZ));
		if remaining > SPIN_THRESHOLD {
			reliable_sleep(remaining - SPIN_THRESHOLD);
		}
		while !is_after(self.now(), deadline) {
			std::hint::spin_loop();
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn delay_waits_at_least_requested_ticks() {
		let mut timer = StdTimer::new();
		let start = Instant::now();
		// 2ms
		timer.delay(200_000);
		assert!(start.elapsed() >= Duration::from_micros(1990));
	}

	#[test]
	fn past_deadline_returns_immediately() {
		let mut timer = StdTimer::new();
		timer.delay(1000);
		let past = timer.now().wrapping_sub(500);
		let start = Instant::now();
		timer.wait_until(past);
		assert!(start.elapsed() < Duration::from_millis(100));
	}
}
