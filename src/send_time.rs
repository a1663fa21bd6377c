//! Send-time computation: time-of-day parsing, jitter sampling and the final
//! send instant.

use chrono::{DateTime, Duration, Local, NaiveDateTime, TimeZone};
use rand::Rng;
use regex::Regex;
use std::fmt;
use std::sync::OnceLock;

/// Display format for instants shown to the user, e.g. `5:30:18 AM on Tue, Oct 20`.
pub const DATE_FORMAT: &str = "%-I:%M:%S %p on %a, %b %-d";

/// Upper bound (exclusive) for the maximum random delay in minutes.
pub const MAX_DELAY_MINUTES_LIMIT: u32 = 60;

fn time_regex() -> &'static Regex {
    static TIME_REGEX: OnceLock<Regex> = OnceLock::new();
    TIME_REGEX.get_or_init(|| {
        Regex::new(r"^([01]\d|2[0-3]):?([0-5]\d)$").expect("time-of-day pattern is valid")
    })
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TimeError {
    #[error("Time is not valid: {0:?} (must be 24h time, e.g. 0530 or 1730)")]
    InvalidTime(String),
}

/// A 24-hour time of day, minute resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeOfDay {
    pub hour: u32,
    pub minute: u32,
}

/// Parses `HHMM` (optionally `HH:MM`) in 24-hour time.
pub fn parse_time_of_day(input: &str) -> Result<TimeOfDay, TimeError> {
    let invalid = || TimeError::InvalidTime(input.to_string());
    let caps = time_regex().captures(input.trim()).ok_or_else(invalid)?;
    let hour = caps[1].parse().map_err(|_| invalid())?;
    let minute = caps[2].parse().map_err(|_| invalid())?;
    Ok(TimeOfDay { hour, minute })
}

/// Validates the maximum random delay: must be in `[0, 60)`.
pub fn validate_max_delay_minutes(minutes: u32) -> Result<(), String> {
    if minutes < MAX_DELAY_MINUTES_LIMIT {
        Ok(())
    } else {
        Err("Not a valid delay.".to_string())
    }
}

/// A sampled random delay split into whole minutes and remaining seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JitterDelay {
    pub minutes: u32,
    pub seconds: u32,
}

impl JitterDelay {
    pub fn total_seconds(&self) -> u32 {
        self.minutes * 60 + self.seconds
    }
}

impl fmt::Display for JitterDelay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}m{}s", self.minutes, self.seconds)
    }
}

/// Samples a delay in `[min, max]` minutes (both included).
///
/// Half of the draws use `1 - U` instead of `U` so the upper bound is as
/// reachable as the lower one. The result is truncated to a tenth of a
/// minute, then converted to whole seconds.
pub fn sample_jitter<R: Rng + ?Sized>(rng: &mut R, min: f64, max: f64) -> JitterDelay {
    let flip: f64 = rng.gen();
    let u: f64 = rng.gen();
    let random = if flip < 0.5 {
        (1.0 - u) * (max - min) + min
    } else {
        u * (max - min) + min
    };

    let minutes = (random * 10.0).floor() / 10.0;
    let total_seconds = (minutes * 60.0).round() as i64;
    let whole_minutes = minutes.floor() as i64;
    let seconds = total_seconds - whole_minutes * 60;

    JitterDelay {
        minutes: whole_minutes.max(0) as u32,
        seconds: seconds.clamp(0, 59) as u32,
    }
}

/// The computed send instant and the jitter that produced it.
#[derive(Debug, Clone)]
pub struct SendTime<Tz: TimeZone> {
    pub instant: DateTime<Tz>,
    pub jitter: JitterDelay,
    pub formatted: String,
}

/// Computes the next send instant from the local wall clock.
pub fn compute_send_instant(
    target: &str,
    max_delay_minutes: u32,
) -> Result<SendTime<Local>, TimeError> {
    compute_send_instant_at(
        target,
        max_delay_minutes,
        &Local::now(),
        &mut rand::thread_rng(),
    )
}

/// Computes the send instant relative to `now`.
///
/// The instant is today's `target` plus the sampled jitter, with seconds set
/// to the jitter remainder. If that is not strictly after `now` it moves to
/// the same wall-clock time on the next day.
pub fn compute_send_instant_at<Tz, R>(
    target: &str,
    max_delay_minutes: u32,
    now: &DateTime<Tz>,
    rng: &mut R,
) -> Result<SendTime<Tz>, TimeError>
where
    Tz: TimeZone,
    Tz::Offset: fmt::Display,
    R: Rng + ?Sized,
{
    let time_of_day = parse_time_of_day(target)?;
    let jitter = sample_jitter(rng, 0.0, f64::from(max_delay_minutes));

    let base = now
        .date_naive()
        .and_hms_opt(time_of_day.hour, time_of_day.minute, 0)
        .ok_or_else(|| TimeError::InvalidTime(target.to_string()))?;
    let candidate = base
        + Duration::minutes(i64::from(jitter.minutes))
        + Duration::seconds(i64::from(jitter.seconds));

    let tz = now.timezone();
    let mut instant = resolve_local(&tz, candidate);
    if instant <= *now {
        instant = resolve_local(&tz, candidate + Duration::days(1));
    }

    let formatted = format_instant(&instant);
    Ok(SendTime {
        instant,
        jitter,
        formatted,
    })
}

/// Maps a wall-clock time to an instant, skipping forward over DST gaps.
fn resolve_local<Tz: TimeZone>(tz: &Tz, naive: NaiveDateTime) -> DateTime<Tz> {
    let mut probe = naive;
    loop {
        if let Some(instant) = tz.from_local_datetime(&probe).earliest() {
            return instant;
        }
        probe += Duration::minutes(30);
    }
}

pub fn format_instant<Tz>(instant: &DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: fmt::Display,
{
    instant.format(DATE_FORMAT).to_string()
}

/// The current local time in display format.
pub fn formatted_now() -> String {
    format_instant(&Local::now())
}

#[cfg(test)]
#[path = "tests/send_time_tests.rs"]
mod tests;
