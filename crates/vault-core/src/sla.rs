//! SLA clock rules applied on status changes, and the monitor's evaluation.

use vault_types::{OrderStatus, SlaTracking};

/// Adjusts the clock for a status change from `from` to `to`.
///
/// The clock starts on payment, pauses while the client owes information,
/// and stops once the order completes or is cancelled.
pub fn apply_transition(
	sla: &mut SlaTracking,
	from: OrderStatus,
	to: OrderStatus,
	now: u64,
	target_hours: u64,
) {
	if from == OrderStatus::ClientInputRequired && to != OrderStatus::ClientInputRequired {
		sla.resume(now);
	}
	match to {
		OrderStatus::Paid => sla.start(now, target_hours),
		OrderStatus::ClientInputRequired => sla.pause(now),
		OrderStatus::Completed | OrderStatus::Cancelled => sla.stop(now),
		_ => {},
	}
}

/// Alert the monitor should raise for an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlaAlert {
	Warning,
	Breached,
}

/// Decides whether an alert is due. Each alert fires at most once because
/// the corresponding flag is set when it is raised; paused clocks never
/// alert.
pub fn evaluate(sla: &SlaTracking, now: u64, warning_threshold_percent: u8) -> Option<SlaAlert> {
	if !sla.is_running() || sla.is_paused() || sla.breached {
		return None;
	}
	let ratio = sla.elapsed_ratio(now)?;
	if ratio >= 1.0 {
		Some(SlaAlert::Breached)
	} else if !sla.warning_sent && ratio * 100.0 >= f64::from(warning_threshold_percent) {
		Some(SlaAlert::Warning)
	} else {
		None
	}
}

/// Records that `alert` has been raised.
pub fn mark(sla: &mut SlaTracking, alert: SlaAlert) {
	match alert {
		SlaAlert::Warning => sla.warning_sent = true,
		SlaAlert::Breached => {
			sla.warning_sent = true;
			sla.breached = true;
		},
	}
}
