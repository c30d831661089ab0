//! SLA clock embedded in every order.
//!
//! The clock starts when payment is confirmed, pauses while the order waits
//! on the client, and stops when the order completes or is cancelled. Time
//! spent paused extends the deadline.

use serde::{Deserialize, Serialize};

/// SLA timestamps and flags for one order. All times are Unix seconds.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SlaTracking {
	/// Target turnaround in hours.
	pub target_hours: u64,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub started_at: Option<u64>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub paused_at: Option<u64>,
	#[serde(default)]
	pub paused_total_secs: u64,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub completed_at: Option<u64>,
	/// Set once the warning notification has been sent.
	#[serde(default)]
	pub warning_sent: bool,
	/// Set once the deadline has passed.
	#[serde(default)]
	pub breached: bool,
}

impl SlaTracking {
	/// Starts the clock. Restarting a running clock is a no-op.
	pub fn start(&mut self, now: u64, target_hours: u64) {
		if self.started_at.is_none() {
			self.started_at = Some(now);
			self.target_hours = target_hours;
		}
	}

	pub fn pause(&mut self, now: u64) {
		if self.is_running() && self.paused_at.is_none() {
			self.paused_at = Some(now);
		}
	}

	pub fn resume(&mut self, now: u64) {
		if let Some(paused_at) = self.paused_at.take() {
			self.paused_total_secs += now.saturating_sub(paused_at);
		}
	}

	/// Stops the clock, folding any open pause into the paused total.
	pub fn stop(&mut self, now: u64) {
		if self.started_at.is_some() && self.completed_at.is_none() {
			self.resume(now);
			self.completed_at = Some(now);
		}
	}

	pub fn is_running(&self) -> bool {
		self.started_at.is_some() && self.completed_at.is_none()
	}

	pub fn is_paused(&self) -> bool {
		self.paused_at.is_some()
	}

	/// Deadline including time spent paused so far.
	pub fn deadline(&self) -> Option<u64> {
		self.started_at
			.map(|start| start + self.target_hours * 3600 + self.paused_total_secs)
	}

	/// Working seconds consumed at `now`, excluding paused time.
	pub fn elapsed_secs(&self, now: u64) -> Option<u64> {
		let start = self.started_at?;
		let end = self.completed_at.or(self.paused_at).unwrap_or(now);
		Some(
			end.saturating_sub(start)
				.saturating_sub(self.paused_total_secs),
		)
	}

	/// Fraction of the target consumed at `now`; above 1.0 means breached.
	pub fn elapsed_ratio(&self, now: u64) -> Option<f64> {
		if self.target_hours == 0 {
			return None;
		}
		let elapsed = self.elapsed_secs(now)?;
		Some(elapsed as f64 / (self.target_hours * 3600) as f64)
	}
}
