use busreminder_core::types::weekday_from_number;
use busreminder_core::{DepartureTime, InvalidFavorite, RecurrencePolicy};
use chrono::{DateTime, Datelike, Days, NaiveDate, TimeZone, Utc};
use thiserror::Error;

/// Furthest day offset scanned for day-restricted policies (offsets 0..=14).
pub const HORIZON_DAYS: u64 = 14;

/// "Nothing to schedule": a valid calculator outcome, not a failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NoOccurrence {
    #[error("invalid favorite data: {0}")]
    InvalidFavorite(#[from] InvalidFavorite),

    #[error("recurrence policy is disabled")]
    Disabled,

    #[error("no matching day within {HORIZON_DAYS} days")]
    HorizonExhausted,

    /// The lead-adjusted fire instant is not strictly in the future.
    #[error("too soon to notify: fire time {fire_at} is not after now")]
    TooSoon { fire_at: DateTime<Utc> },
}

/// Compute the next departure instant strictly after `now` for a stored
/// favorite's raw `HH:MM` time and weekday number.
///
/// Invalid input is reported as [`NoOccurrence::InvalidFavorite`]; callers log
/// and skip. The base weekday is validated but does not constrain the result:
/// which days qualify is decided by `policy` alone.
pub fn compute<Tz: TimeZone>(
    departure_time: &str,
    base_weekday: u8,
    policy: &RecurrencePolicy,
    now: &DateTime<Tz>,
) -> Result<DateTime<Tz>, NoOccurrence> {
    let time: DepartureTime = departure_time.parse()?;
    weekday_from_number(base_weekday)
        .ok_or(InvalidFavorite::WeekdayOutOfRange { value: base_weekday })?;
    next_occurrence(time, policy, now)
}

/// Typed core of [`compute`].
///
/// Days are wall-clock days in `now`'s zone. A wall time that does not exist
/// on a given day (DST gap) is treated as a non-matching day; an ambiguous one
/// resolves to its earliest instant. For `AllDays` that means the result can
/// be up to two days out when tomorrow's slot is skipped.
pub fn next_occurrence<Tz: TimeZone>(
    time: DepartureTime,
    policy: &RecurrencePolicy,
    now: &DateTime<Tz>,
) -> Result<DateTime<Tz>, NoOccurrence> {
    let today = now.date_naive();
    let zone = now.timezone();

    match policy {
        RecurrencePolicy::Disabled => Err(NoOccurrence::Disabled),

        RecurrencePolicy::AllDays => {
            // Today if the slot is still ahead, otherwise tomorrow. The day
            // after covers a tomorrow whose slot falls in a DST gap.
            (0..=2)
                .find_map(|offset| {
                    candidate_on(&zone, today.checked_add_days(Days::new(offset))?, time)
                        .filter(|c| c > now)
                })
                .ok_or(NoOccurrence::HorizonExhausted)
        }

        RecurrencePolicy::Weekdays | RecurrencePolicy::SelectedDays { .. } => (0..=HORIZON_DAYS)
            .find_map(|offset| {
                let date = today.checked_add_days(Days::new(offset))?;
                if !policy.allows(date.weekday()) {
                    return None;
                }
                candidate_on(&zone, date, time).filter(|c| c > now)
            })
            .ok_or(NoOccurrence::HorizonExhausted),
    }
}

/// `date` at the departure time, seconds zeroed, in `zone`.
fn candidate_on<Tz: TimeZone>(zone: &Tz, date: NaiveDate, time: DepartureTime) -> Option<DateTime<Tz>> {
    zone.from_local_datetime(&date.and_time(time.as_naive()))
        .earliest()
}

#[cfg(test)]
mod tests {
    use super::*;
    use busreminder_core::DaySet;
    use chrono::{Duration, Timelike, Weekday};

    // 2026-03-02 is a Monday.
    fn at(day: u32, hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, day, hour, minute, 0).unwrap()
    }

    fn time(s: &str) -> DepartureTime {
        s.parse().unwrap()
    }

    fn selected(days: &[Weekday]) -> RecurrencePolicy {
        RecurrencePolicy::SelectedDays {
            days: days.iter().copied().collect(),
        }
    }

    #[test]
    fn all_days_today_when_slot_is_ahead() {
        let now = at(2, 8, 20);
        let next = compute("08:30", 2, &RecurrencePolicy::AllDays, &now).unwrap();
        assert_eq!(next, at(2, 8, 30));
    }

    #[test]
    fn all_days_tomorrow_when_slot_has_passed() {
        let now = at(2, 8, 40);
        let next = compute("08:30", 2, &RecurrencePolicy::AllDays, &now).unwrap();
        assert_eq!(next, at(3, 8, 30));
    }

    #[test]
    fn exact_equality_is_not_after_now() {
        let now = at(2, 8, 30);
        let next = compute("08:30", 2, &RecurrencePolicy::AllDays, &now).unwrap();
        assert_eq!(next, at(3, 8, 30));
    }

    #[test]
    fn seconds_are_zeroed() {
        let now = Utc.with_ymd_and_hms(2026, 3, 2, 8, 20, 45).unwrap();
        let next = compute("08:30", 2, &RecurrencePolicy::AllDays, &now).unwrap();
        assert_eq!(next.second(), 0);
        assert_eq!(next.nanosecond(), 0);
    }

    #[test]
    fn weekdays_skip_the_weekend() {
        // Friday 20:00 → Monday 08:00
        let now = at(6, 20, 0);
        let next = compute("08:00", 6, &RecurrencePolicy::Weekdays, &now).unwrap();
        assert_eq!(next, at(9, 8, 0));
        assert_eq!(next.weekday(), Weekday::Mon);
    }

    #[test]
    fn weekdays_same_day_when_slot_is_ahead() {
        let now = at(4, 6, 0);
        let next = compute("08:00", 4, &RecurrencePolicy::Weekdays, &now).unwrap();
        assert_eq!(next, at(4, 8, 0));
    }

    #[test]
    fn selected_days_picks_next_matching_day() {
        // Wednesday 09:00, {Tue, Thu}, 07:00 → Thursday 07:00
        let now = at(4, 9, 0);
        let policy = selected(&[Weekday::Tue, Weekday::Thu]);
        let next = compute("07:00", 4, &policy, &now).unwrap();
        assert_eq!(next, at(5, 7, 0));
    }

    #[test]
    fn selected_single_day_wraps_a_full_week() {
        let now = at(2, 9, 0);
        let policy = selected(&[Weekday::Mon]);
        let next = compute("08:00", 2, &policy, &now).unwrap();
        assert_eq!(next, at(9, 8, 0));
    }

    #[test]
    fn empty_selection_never_occurs() {
        let policy = RecurrencePolicy::SelectedDays {
            days: DaySet::empty(),
        };
        for hour in 0..24 {
            let now = at(2, hour, 15);
            assert_eq!(
                compute("08:00", 2, &policy, &now),
                Err(NoOccurrence::HorizonExhausted)
            );
        }
    }

    #[test]
    fn disabled_never_occurs() {
        assert_eq!(
            compute("08:00", 2, &RecurrencePolicy::Disabled, &at(2, 7, 0)),
            Err(NoOccurrence::Disabled)
        );
    }

    #[test]
    fn invalid_input_is_no_occurrence() {
        let now = at(2, 7, 0);
        assert!(matches!(
            compute("25:00", 2, &RecurrencePolicy::AllDays, &now),
            Err(NoOccurrence::InvalidFavorite(InvalidFavorite::MalformedTime { .. }))
        ));
        assert!(matches!(
            compute("08:00", 0, &RecurrencePolicy::AllDays, &now),
            Err(NoOccurrence::InvalidFavorite(InvalidFavorite::WeekdayOutOfRange { value: 0 }))
        ));
    }

    #[test]
    fn works_in_a_fixed_offset_zone() {
        let zone = chrono::FixedOffset::east_opt(2 * 3600).unwrap();
        // 22:30 UTC on Monday is 00:30 Tuesday at +02:00.
        let now = at(2, 22, 30).with_timezone(&zone);
        let next = next_occurrence(time("07:00"), &RecurrencePolicy::Weekdays, &now).unwrap();
        assert_eq!(next.weekday(), Weekday::Tue);
        assert_eq!(next.with_timezone(&Utc), at(3, 5, 0));
    }

    /// UTC wall clock, except that 08:00-08:59 on 2026-03-03 does not exist.
    #[derive(Debug, Clone, Copy)]
    struct SpringForward;

    impl TimeZone for SpringForward {
        type Offset = chrono::FixedOffset;

        fn from_offset(_: &Self::Offset) -> Self {
            SpringForward
        }

        fn offset_from_local_date(&self, _: &NaiveDate) -> chrono::LocalResult<Self::Offset> {
            chrono::LocalResult::Single(chrono::FixedOffset::east_opt(0).unwrap())
        }

        fn offset_from_local_datetime(&self, local: &chrono::NaiveDateTime) -> chrono::LocalResult<Self::Offset> {
            let gap_day = NaiveDate::from_ymd_opt(2026, 3, 3).unwrap();
            if local.date() == gap_day && local.hour() == 8 {
                chrono::LocalResult::None
            } else {
                chrono::LocalResult::Single(chrono::FixedOffset::east_opt(0).unwrap())
            }
        }

        fn offset_from_utc_date(&self, _: &NaiveDate) -> Self::Offset {
            chrono::FixedOffset::east_opt(0).unwrap()
        }

        fn offset_from_utc_datetime(&self, _: &chrono::NaiveDateTime) -> Self::Offset {
            chrono::FixedOffset::east_opt(0).unwrap()
        }
    }

    #[test]
    fn all_days_skips_a_tomorrow_lost_to_dst() {
        // Monday 09:00, past today's 08:30; Tuesday 08:30 does not exist.
        let now = at(2, 9, 0).with_timezone(&SpringForward);
        let next = next_occurrence(time("08:30"), &RecurrencePolicy::AllDays, &now).unwrap();
        assert_eq!(next.with_timezone(&Utc), at(4, 8, 30));

        // Outside the gap hour nothing changes.
        let next = next_occurrence(time("09:30"), &RecurrencePolicy::AllDays, &now).unwrap();
        assert_eq!(next.with_timezone(&Utc), at(2, 9, 30));
    }

    /// Sweep `now` across three weeks and check the result bounds of every policy.
    #[test]
    fn results_respect_policy_bounds() {
        let policies = [
            RecurrencePolicy::AllDays,
            RecurrencePolicy::Weekdays,
            selected(&[Weekday::Sun]),
            selected(&[Weekday::Tue, Weekday::Thu, Weekday::Sat]),
        ];
        let start = at(1, 0, 0);
        for step in 0..(21 * 24 * 60 / 97) {
            let now = start + Duration::minutes(97 * step);
            for dep in ["00:00", "06:45", "12:00", "23:59"] {
                for policy in &policies {
                    let next = next_occurrence(time(dep), policy, &now).unwrap();
                    assert!(next > now, "{policy:?} {dep} at {now}");
                    assert!(policy.allows(next.weekday()));
                    assert!(next - now <= Duration::days(HORIZON_DAYS as i64));
                    if *policy == RecurrencePolicy::AllDays {
                        assert!(next - now <= Duration::hours(24));
                    }
                }
            }
        }
    }
}
