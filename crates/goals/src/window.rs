//! Calendar windows for goal timeframes. All windows are UTC.

use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use engine_core::{Timeframe, Timestamp};

fn midnight(date: NaiveDate) -> Option<Timestamp> {
    Some(date.and_hms_opt(0, 0, 0)?.and_utc().timestamp_millis())
}

/// Start of the window containing `now`; `None` for all-time goals.
pub fn window_start(timeframe: Timeframe, now: Timestamp) -> Option<Timestamp> {
    let date = DateTime::<Utc>::from_timestamp_millis(now)?.date_naive();
    match timeframe {
        Timeframe::AllTime => None,
        Timeframe::Daily => midnight(date),
        Timeframe::Weekly => {
            let offset = i64::from(date.weekday().num_days_from_monday());
            midnight(date - Duration::days(offset))
        }
        Timeframe::Monthly => midnight(date.with_day(1)?),
    }
}
