//! Cron schedule helpers used when sizing a watcher's backlog.

use chrono::Utc;
use cron::Schedule;

/// Milliseconds between the next two firings of `cron_schedule`.
///
/// `None` when the expression does not parse or never fires twice.
pub fn get_cron_interval_ms(cron_schedule: &str) -> Option<i64> {
	let schedule: Schedule = cron_schedule.parse().ok()?;
	let mut upcoming = schedule.after(&Utc::now());
	let first = upcoming.next()?;
	let second = upcoming.next()?;
	Some((second - first).num_milliseconds())
}
