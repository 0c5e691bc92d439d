//! Slot time resolution.
//!
//! A slot is a wall-clock time of day with no date. It recurs daily until a
//! call consumes it, so resolving it always means "the next occurrence at or
//! after now" in wall-clock terms. All functions here are pure: "now" is always a parameter.

use chrono::{DateTime, Duration, NaiveDateTime, NaiveTime, Offset, TimeZone, Timelike, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// How long before the slot the join window opens (3 minutes).
pub const JOIN_WINDOW_LEAD_MS: i64 = 180_000;

/// Message shown when the user submits without picking a slot.
pub const EMPTY_SLOT_MESSAGE: &str = "Please select a time slot before submitting.";

/// Slot parse errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SlotParseError {
    #[error("Please select a time slot before submitting.")]
    Empty,

    #[error("Invalid slot time '{0}', expected HH:MM")]
    Malformed(String),
}

/// Wall-clock slot time (hour, minute).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SlotTime(NaiveTime);

impl SlotTime {
    /// Build a slot from hour and minute; `None` if out of range.
    #[must_use]
    pub fn from_hm(hour: u32, minute: u32) -> Option<Self> {
        NaiveTime::from_hms_opt(hour, minute, 0).map(Self)
    }

    #[must_use]
    pub fn hour(&self) -> u32 {
        self.0.hour()
    }

    #[must_use]
    pub fn minute(&self) -> u32 {
        self.0.minute()
    }

    #[must_use]
    pub fn as_naive(&self) -> NaiveTime {
        self.0
    }
}

impl fmt::Display for SlotTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour(), self.minute())
    }
}

impl FromStr for SlotTime {
    type Err = SlotParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(SlotParseError::Empty);
        }

        let malformed = || SlotParseError::Malformed(trimmed.to_string());
        let (h, m) = trimmed.split_once(':').ok_or_else(malformed)?;
        if h.is_empty() || h.len() > 2 || m.len() != 2 {
            return Err(malformed());
        }
        if !h.bytes().chain(m.bytes()).all(|b| b.is_ascii_digit()) {
            return Err(malformed());
        }
        let hour: u32 = h.parse().map_err(|_| malformed())?;
        let minute: u32 = m.parse().map_err(|_| malformed())?;

        Self::from_hm(hour, minute).ok_or_else(malformed)
    }
}

impl Serialize for SlotTime {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for SlotTime {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Resolve `slot` to the next instant at or after `now`, in `now`'s zone.
///
/// The slot is a wall-clock time: today's occurrence is read in the local
/// time of `now`'s zone. It is used when it is not before `now`; otherwise
/// the same wall-clock time on the next calendar day is used. On a day the
/// zone repeats an hour the earlier reading wins; a slot inside a skipped
/// hour moves to the first valid instant after the gap.
pub fn resolve_next_occurrence<Tz: TimeZone>(slot: SlotTime, now: &DateTime<Tz>) -> DateTime<Tz> {
    let tz = now.timezone();
    let offset = Duration::seconds(i64::from(now.offset().fix().local_minus_utc()));
    let date = now.naive_local().date();

    let today = wall_clock_instant(&tz, offset, date.and_time(slot.as_naive()));
    if today >= *now {
        return today;
    }

    match date.succ_opt() {
        Some(next) => wall_clock_instant(&tz, offset, next.and_time(slot.as_naive())),
        None => today + Duration::days(1),
    }
}

/// Longest run of skipped local time searched for the end of a gap.
const MAX_GAP_MINUTES: i64 = 24 * 60;

fn wall_clock_instant<Tz: TimeZone>(
    tz: &Tz,
    fallback_offset: Duration,
    naive: NaiveDateTime,
) -> DateTime<Tz> {
    for shift in 0..=MAX_GAP_MINUTES {
        if let Some(at) = tz
            .from_local_datetime(&(naive + Duration::minutes(shift)))
            .earliest()
        {
            return at;
        }
    }
    Utc.from_utc_datetime(&(naive - fallback_offset))
        .with_timezone(tz)
}

/// Instant the join window opens for a slot starting at `slot_instant`.
///
/// Not clamped: a result in the past means the window is already open.
pub fn join_window_opens_at<Tz: TimeZone>(slot_instant: &DateTime<Tz>) -> DateTime<Tz> {
    slot_instant.clone() - Duration::milliseconds(JOIN_WINDOW_LEAD_MS)
}

/// Countdown in whole seconds until `window_opens_at`, clamped at zero.
///
/// Always recomputed from the two instants so it stays correct across clock
/// drift or suspended tabs.
#[must_use]
pub fn countdown_secs(window_opens_at: DateTime<Utc>, now: DateTime<Utc>) -> u64 {
    let remaining_ms = (window_opens_at - now).num_milliseconds();
    if remaining_ms <= 0 {
        return 0;
    }
    u64::try_from((remaining_ms + 999) / 1000).unwrap_or(0)
}

/// A slot resolved against a concrete "now".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedSlot {
    pub slot: SlotTime,
    pub starts_at: DateTime<Utc>,
    pub window_opens_at: DateTime<Utc>,
}

impl ResolvedSlot {
    /// Resolve `slot` relative to `now` in `now`'s time zone.
    pub fn resolve<Tz: TimeZone>(slot: SlotTime, now: &DateTime<Tz>) -> Self {
        let starts_at = resolve_next_occurrence(slot, now).with_timezone(&Utc);
        Self {
            slot,
            starts_at,
            window_opens_at: join_window_opens_at(&starts_at),
        }
    }

    /// Whether the join window is open at `now`.
    #[must_use]
    pub fn is_open_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.window_opens_at
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use chrono_tz::America::New_York;
    use chrono_tz::Europe::London;
    use chrono_tz::Tz;

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, s).single().unwrap()
    }

    fn slot(s: &str) -> SlotTime {
        s.parse().unwrap()
    }

    #[test]
    fn test_parse_accepts_browser_time_input() {
        assert_eq!(slot("09:00"), SlotTime::from_hm(9, 0).unwrap());
        assert_eq!(slot("9:05"), SlotTime::from_hm(9, 5).unwrap());
        assert_eq!(slot(" 23:59 "), SlotTime::from_hm(23, 59).unwrap());
        assert_eq!(slot("00:00").to_string(), "00:00");
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert_eq!("".parse::<SlotTime>(), Err(SlotParseError::Empty));
        assert_eq!(
            SlotParseError::Empty.to_string(),
            "Please select a time slot before submitting."
        );
        for bad in ["24:00", "12:60", "12", "12:5", "ab:cd", "-1:00", "12:00:00", "+9:00"] {
            assert!(
                matches!(bad.parse::<SlotTime>(), Err(SlotParseError::Malformed(_))),
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn test_serde_uses_hh_mm() {
        let json = serde_json::to_string(&slot("7:30")).unwrap();
        assert_eq!(json, "\"07:30\"");
        let back: SlotTime = serde_json::from_str("\"18:45\"").unwrap();
        assert_eq!(back, slot("18:45"));
        assert!(serde_json::from_str::<SlotTime>("\"25:00\"").is_err());
    }

    #[test]
    fn test_resolve_later_today() {
        let now = utc(2026, 3, 10, 8, 56, 0);
        assert_eq!(resolve_next_occurrence(slot("09:00"), &now), utc(2026, 3, 10, 9, 0, 0));
    }

    #[test]
    fn test_resolve_exactly_now_is_kept() {
        let now = utc(2026, 3, 10, 9, 0, 0);
        assert_eq!(resolve_next_occurrence(slot("09:00"), &now), now);
    }

    #[test]
    fn test_resolve_past_slot_rolls_to_tomorrow() {
        let now = utc(2026, 3, 10, 9, 0, 1);
        assert_eq!(resolve_next_occurrence(slot("09:00"), &now), utc(2026, 3, 11, 9, 0, 0));
    }

    #[test]
    fn test_resolved_instant_within_one_day_of_now() {
        let day = Duration::hours(24);
        let start = utc(2026, 1, 1, 0, 0, 0);
        // Sweep "now" across a day at odd strides and slots across the clock.
        for step in 0..200 {
            let now = start + Duration::seconds(step * 433 + 17);
            for (h, m) in [(0, 0), (3, 15), (9, 0), (12, 30), (23, 59)] {
                let s = SlotTime::from_hm(h, m).unwrap();
                let at = resolve_next_occurrence(s, &now);
                assert!(at >= now, "{s} at {now}: {at} before now");
                assert!(at < now + day, "{s} at {now}: {at} beyond a day");
            }
        }
    }

    /// Local `HH:MM` of `at`, or `None` when `slot` does not exist on that day.
    fn local_reading(slot: SlotTime, at: &DateTime<Tz>) -> Option<String> {
        let naive = at.naive_local().date().and_time(slot.as_naive());
        at.timezone()
            .from_local_datetime(&naive)
            .earliest()
            .map(|_| at.format("%H:%M").to_string())
    }

    #[test]
    fn test_bounds_hold_across_dst_transitions() {
        // A repeated hour makes one calendar day 25 hours long.
        let longest_day = Duration::hours(25);
        // Days around the 2026 US and UK spring-forward and fall-back dates.
        let bases = [
            utc(2026, 3, 7, 0, 0, 0),
            utc(2026, 3, 28, 0, 0, 0),
            utc(2026, 10, 24, 0, 0, 0),
            utc(2026, 10, 31, 0, 0, 0),
        ];
        for base in bases {
            for step in 0..96 {
                let now_utc = base + Duration::minutes(step * 47);
                for (h, m) in [(1, 30), (2, 30), (9, 0), (23, 45)] {
                    let s = SlotTime::from_hm(h, m).unwrap();
                    for zone in [New_York, London] {
                        let now = now_utc.with_timezone(&zone);
                        let at = resolve_next_occurrence(s, &now);
                        assert!(at >= now, "{s} at {now}: {at} before now");
                        assert!(at < now.clone() + longest_day, "{s} at {now}: {at} too far");
                        if let Some(reading) = local_reading(s, &at) {
                            assert_eq!(reading, s.to_string(), "{s} at {now}: {at}");
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn test_window_is_exactly_three_minutes_before_across_dst() {
        // 2026-03-29 01:00 UTC is the UK spring-forward instant.
        let cases = [
            (utc(2026, 3, 28, 23, 0, 0), "01:01"),
            (utc(2026, 3, 29, 0, 30, 0), "02:00"),
            (utc(2026, 10, 25, 0, 30, 0), "01:30"),
        ];
        for (now_utc, s) in cases {
            let now = now_utc.with_timezone(&London);
            let at = resolve_next_occurrence(slot(s), &now);
            let open = join_window_opens_at(&at);
            assert_eq!((at - open).num_milliseconds(), 180_000);
            assert_eq!(
                (at.with_timezone(&Utc) - open.with_timezone(&Utc)).num_milliseconds(),
                JOIN_WINDOW_LEAD_MS
            );
        }
    }

    #[test]
    fn test_slot_keeps_wall_clock_time_on_transition_days() {
        // London is still on GMT at 00:10 UTC on 2026-03-29; BST starts at 01:00 UTC.
        let now = utc(2026, 3, 29, 0, 10, 0).with_timezone(&London);
        let at = resolve_next_occurrence(slot("09:00"), &now);
        assert_eq!(at.format("%H:%M").to_string(), "09:00");
        assert_eq!(at.with_timezone(&Utc), utc(2026, 3, 29, 8, 0, 0));
        assert_eq!(
            join_window_opens_at(&at).format("%H:%M").to_string(),
            "08:57"
        );

        // 01:10 BST on 2026-10-25; GMT resumes at 01:00 UTC.
        let now = utc(2026, 10, 25, 0, 10, 0).with_timezone(&London);
        let at = resolve_next_occurrence(slot("09:00"), &now);
        assert_eq!(at.format("%H:%M").to_string(), "09:00");
        assert_eq!(at.with_timezone(&Utc), utc(2026, 10, 25, 9, 0, 0));

        // 00:30 EST on 2026-03-08; EDT starts at 07:00 UTC.
        let now = utc(2026, 3, 8, 5, 30, 0).with_timezone(&New_York);
        let at = resolve_next_occurrence(slot("09:00"), &now);
        assert_eq!(at.format("%H:%M").to_string(), "09:00");
        assert_eq!(at.with_timezone(&Utc), utc(2026, 3, 8, 13, 0, 0));
    }

    #[test]
    fn test_skipped_slot_moves_to_end_of_gap() {
        // 01:30 does not exist in London on 2026-03-29.
        let now = utc(2026, 3, 29, 0, 10, 0).with_timezone(&London);
        let at = resolve_next_occurrence(slot("01:30"), &now);
        assert_eq!(at.format("%H:%M").to_string(), "02:00");
        assert_eq!(at.with_timezone(&Utc), utc(2026, 3, 29, 1, 0, 0));
    }

    #[test]
    fn test_repeated_slot_uses_earlier_reading() {
        // 01:30 happens twice in London on 2026-10-25; the BST one comes first.
        let now = utc(2026, 10, 25, 0, 10, 0).with_timezone(&London);
        let at = resolve_next_occurrence(slot("01:30"), &now);
        assert_eq!(at.with_timezone(&Utc), utc(2026, 10, 25, 0, 30, 0));
    }

    #[test]
    fn test_rollover_moves_to_next_calendar_day() {
        // 01:30 EDT on 2026-11-01; US clocks fall back at 06:00 UTC the same day.
        let now = utc(2026, 11, 1, 5, 30, 0).with_timezone(&New_York);
        let at = resolve_next_occurrence(slot("01:00"), &now);
        assert_eq!(at.format("%Y-%m-%d %H:%M").to_string(), "2026-11-02 01:00");
        assert_eq!(at.with_timezone(&Utc), utc(2026, 11, 2, 6, 0, 0));
        // The repeated hour makes the wait longer than a day.
        assert_eq!((at - now).num_minutes(), 24 * 60 + 30);
    }

    #[test]
    fn test_countdown_rounds_up_and_clamps() {
        let open = utc(2026, 3, 10, 8, 57, 0);
        assert_eq!(countdown_secs(open, utc(2026, 3, 10, 8, 56, 0)), 60);
        assert_eq!(
            countdown_secs(open, utc(2026, 3, 10, 8, 56, 0) + Duration::milliseconds(1)),
            60
        );
        assert_eq!(
            countdown_secs(open, utc(2026, 3, 10, 8, 56, 59) + Duration::milliseconds(1)),
            1
        );
        assert_eq!(countdown_secs(open, open), 0);
        assert_eq!(countdown_secs(open, utc(2026, 3, 10, 9, 30, 0)), 0);
    }

    #[test]
    fn test_resolved_slot_scenario() {
        let now = utc(2026, 3, 10, 8, 56, 0);
        let resolved = ResolvedSlot::resolve(slot("09:00"), &now);
        assert_eq!(resolved.window_opens_at, utc(2026, 3, 10, 8, 57, 0));
        assert_eq!(countdown_secs(resolved.window_opens_at, now), 60);
        assert!(!resolved.is_open_at(now));
        assert!(resolved.is_open_at(utc(2026, 3, 10, 8, 57, 0)));
    }
}
