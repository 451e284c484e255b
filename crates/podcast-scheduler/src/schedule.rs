use std::str::FromStr;

use chrono::{DateTime, Datelike, Duration, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use tracing::warn;

use crate::types::Trigger;

/// Compute the next UTC fire time for `trigger` strictly *after* `from`.
///
/// Calendar triggers are evaluated as wall-clock time in `tz`. Returns `None`
/// when the trigger has no future fire time: a cron expression whose years
/// are exhausted or that fails to parse, or a fire time past the end of the
/// representable calendar.
pub fn compute_next_run(trigger: &Trigger, from: DateTime<Utc>, tz: Tz) -> Option<DateTime<Utc>> {
    match trigger {
        Trigger::Interval { every_secs } => {
            let every = Duration::try_seconds(i64::try_from(*every_secs).ok()?)?;
            from.checked_add_signed(every)
        }

        Trigger::Weekly { day, hour, minute } => {
            let local = from.with_timezone(&tz);
            // `day` follows ISO weekday numbering: 0=Monday … 6=Sunday,
            // which matches chrono's `num_days_from_monday`.
            let today_dow = local.weekday().num_days_from_monday() as i64;
            let target_dow = (*day as i64).clamp(0, 6);
            let days_ahead = (target_dow - today_dow).rem_euclid(7);

            // This week's slot may already have passed; next week's never has.
            [days_ahead, days_ahead + 7].into_iter().find_map(|ahead| {
                let date = local.date_naive() + Duration::days(ahead);
                let naive = date.and_hms_opt(*hour as u32, *minute as u32, 0)?;
                let candidate = resolve_local(tz, naive)?;
                (candidate > from).then_some(candidate)
            })
        }

        Trigger::Cron { expression } => match cron::Schedule::from_str(expression) {
            Ok(schedule) => schedule
                .after(&from.with_timezone(&tz))
                .next()
                .map(|dt| dt.with_timezone(&Utc)),
            Err(e) => {
                warn!(%expression, "unparseable cron expression: {e}");
                None
            }
        },
    }
}

/// Next fire time after a run that was due at `scheduled_for` and dispatched
/// at `now`. Fire times that fell behind `now` are skipped, so a slow tick or
/// a long outage never produces a burst of catch-up runs.
pub fn next_run_after(
    trigger: &Trigger,
    scheduled_for: DateTime<Utc>,
    now: DateTime<Utc>,
    tz: Tz,
) -> Option<DateTime<Utc>> {
    match trigger {
        // Stay on the original grid instead of drifting by the tick latency.
        Trigger::Interval { every_secs } => {
            let every_ms = i64::try_from(*every_secs).ok()?.max(1).checked_mul(1000)?;
            let behind_ms = (now - scheduled_for).num_milliseconds().max(0);
            let periods = behind_ms / every_ms + 1;
            let step = Duration::try_milliseconds(periods.checked_mul(every_ms)?)?;
            scheduled_for.checked_add_signed(step)
        }
        _ => compute_next_run(trigger, now.max(scheduled_for), tz),
    }
}

/// Map a local wall-clock time to UTC. Ambiguous times (DST fall-back) take
/// the earlier instant; non-existent ones (spring-forward gap) move one hour on.
fn resolve_local(tz: Tz, naive: NaiveDateTime) -> Option<DateTime<Utc>> {
    tz.from_local_datetime(&naive)
        .earliest()
        .or_else(|| tz.from_local_datetime(&(naive + Duration::hours(1))).earliest())
        .map(|dt| dt.with_timezone(&Utc))
}
