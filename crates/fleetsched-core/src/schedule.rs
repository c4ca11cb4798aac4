//! Cron schedule parsing and validation.
//!
//! Expressions carry a seconds field (`sec min hour dom month dow [year]`).
//! Plain 5-field Unix expressions are accepted and run at second 0. Numeric
//! day-of-week values follow Unix numbering where 0 or 7 is Sunday.

use chrono::{DateTime, TimeZone, Utc};
use chrono_tz::Tz;
use cron::Schedule;
use itertools::Itertools;
use std::{collections::BTreeSet, str::FromStr};

use crate::prelude::*;

/// Minimum allowed gap between two successive runs
pub const MIN_INTERVAL_SECS: i64 = 60;

const WEEKDAYS: [&str; 7] = ["SUN", "MON", "TUE", "WED", "THU", "FRI", "SAT"];

/// Expand a 5-field expression to the 6-field form (second 0) and rewrite
/// the day-of-week field from Unix numbering (0 or 7 is Sunday) to names.
fn normalize(expr: &str) -> String {
	let mut fields: Vec<String> = expr.split_whitespace().map(str::to_string).collect();
	if fields.len() == 5 {
		fields.insert(0, "0".into());
	}
	if let Some(dow) = fields.get_mut(5) {
		*dow = weekday_field(dow);
	}
	fields.join(" ")
}

fn weekday_field(field: &str) -> String {
	field.split(',').map(weekday_item).join(",")
}

/// Numeric items are expanded to an explicit list of day names. Anything
/// else is left for the cron parser to accept or reject.
fn weekday_item(item: &str) -> String {
	let (range, step) = match item.split_once('/') {
		Some((range, step)) => (range, Some(step)),
		None => (item, None),
	};
	if step.is_none() && (range == "*" || range == "?") {
		return item.to_string();
	}
	let day = |value: &str| value.parse::<usize>().ok().filter(|day| *day <= 7);
	let bounds = if range == "*" || range == "?" {
		Some((0, 6))
	} else if let Some((first, last)) = range.split_once('-') {
		day(first).zip(day(last)).filter(|(first, last)| first <= last)
	} else {
		day(range).map(|first| if step.is_some() { (first, 6) } else { (first, first) })
	};
	let step = match step.map(str::parse::<usize>) {
		None => Some(1),
		Some(Ok(step)) if step > 0 => Some(step),
		Some(_) => None,
	};
	let (Some((first, last)), Some(step)) = (bounds, step) else {
		return item.to_string();
	};
	(first..=last)
		.step_by(step)
		.map(|day| day % 7)
		.collect::<BTreeSet<_>>()
		.into_iter()
		.filter_map(|day| WEEKDAYS.get(day))
		.join(",")
}

pub fn parse_timezone(timezone: &str) -> ClResult<Tz> {
	timezone
		.parse::<Tz>()
		.map_err(|_| Error::InvalidScheduleConfig(format!("unknown timezone '{}'", timezone)))
}

/// Cron schedule bound to a timezone
#[derive(Debug, Clone)]
pub struct CronSchedule {
	expr: Box<str>,
	schedule: Schedule,
	tz: Tz,
}

impl CronSchedule {
	pub fn parse(expr: &str, timezone: &str) -> ClResult<Self> {
		if expr.trim().is_empty() {
			return Err(Error::InvalidScheduleConfig("empty cron expression".into()));
		}
		let schedule = Schedule::from_str(&normalize(expr)).map_err(|e| {
			Error::InvalidScheduleConfig(format!("invalid cron expression '{}': {}", expr, e))
		})?;
		let tz = parse_timezone(timezone)?;
		Ok(Self { expr: expr.into(), schedule, tz })
	}

	/// Next fire time strictly after `after`
	pub fn next_execution(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
		self.schedule
			.after(&after.with_timezone(&self.tz))
			.next()
			.map(|next| next.with_timezone(&Utc))
	}

	/// Gap between the first two fire times after `now`, in seconds
	pub fn interval_after(&self, now: DateTime<Utc>) -> ClResult<i64> {
		let mut upcoming = self.schedule.after(&now.with_timezone(&self.tz));
		match (upcoming.next(), upcoming.next()) {
			(Some(first), Some(second)) => Ok((second - first).num_seconds()),
			_ => Err(Error::InvalidScheduleConfig(format!(
				"cron expression '{}' does not fire repeatedly",
				self.expr
			))),
		}
	}

	pub fn timezone(&self) -> Tz {
		self.tz
	}

	pub fn to_cron_string(&self) -> String {
		self.expr.to_string()
	}
}

impl PartialEq for CronSchedule {
	fn eq(&self, other: &Self) -> bool {
		self.expr == other.expr && self.tz == other.tz
	}
}

impl Eq for CronSchedule {}

/// Validate cron syntax, timezone and minimum interval as of `now`.
pub fn validate_at(cron: &str, timezone: &str, now: DateTime<Utc>) -> ClResult<CronSchedule> {
	let schedule = CronSchedule::parse(cron, timezone)?;
	let interval = schedule.interval_after(now)?;
	if interval < MIN_INTERVAL_SECS {
		return Err(Error::InvalidScheduleConfig(format!(
			"interval too short: '{}' fires every {}s, minimum is {}s",
			cron, interval, MIN_INTERVAL_SECS
		)));
	}
	Ok(schedule)
}

pub fn validate(cron: &str, timezone: &str) -> ClResult<CronSchedule> {
	validate_at(cron, timezone, Utc::now())
}

/// Next run of `cron` in `timezone` after the given timestamp
pub fn next_run(cron: &str, timezone: &str, after: Timestamp) -> ClResult<Timestamp> {
	let schedule = CronSchedule::parse(cron, timezone)?;
	let after = Utc.timestamp_opt(after.0, 0).single().unwrap_or_else(Utc::now);
	schedule.next_execution(after).map(|next| Timestamp(next.timestamp())).ok_or_else(|| {
		Error::InvalidScheduleConfig(format!("cron expression '{}' has no next run", cron))
	})
}


// vim: ts=4
