use chrono::{NaiveTime, Timelike, Weekday};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::InvalidFavorite;

/// Stable identity of a favorite departure. Also the source of its timer key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FavoriteId(pub String);

impl FavoriteId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FavoriteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for FavoriteId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for FavoriteId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Wall-clock departure time with seconds always zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DepartureTime(NaiveTime);

impl DepartureTime {
    pub fn new(hour: u32, minute: u32) -> Option<Self> {
        NaiveTime::from_hms_opt(hour, minute, 0).map(Self)
    }

    pub fn hour(&self) -> u32 {
        self.0.hour()
    }

    pub fn minute(&self) -> u32 {
        self.0.minute()
    }

    pub fn as_naive(&self) -> NaiveTime {
        self.0
    }
}

impl fmt::Display for DepartureTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour(), self.minute())
    }
}

impl FromStr for DepartureTime {
    type Err = InvalidFavorite;

    /// Parses `HH:MM` (a single-digit hour is tolerated, as timetable feeds emit `7:05`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || InvalidFavorite::MalformedTime {
            value: s.to_string(),
        };
        let (h, m) = s.trim().split_once(':').ok_or_else(malformed)?;
        let digits_ok = |part: &str, max_len: usize| {
            !part.is_empty() && part.len() <= max_len && part.bytes().all(|b| b.is_ascii_digit())
        };
        if !digits_ok(h, 2) || !digits_ok(m, 2) || m.len() != 2 {
            return Err(malformed());
        }
        let hour: u32 = h.parse().map_err(|_| malformed())?;
        let minute: u32 = m.parse().map_err(|_| malformed())?;
        Self::new(hour, minute).ok_or_else(malformed)
    }
}

/// Convert a stored weekday number (1 = Sunday … 7 = Saturday) to a [`Weekday`].
pub fn weekday_from_number(n: u8) -> Option<Weekday> {
    match n {
        1 => Some(Weekday::Sun),
        2 => Some(Weekday::Mon),
        3 => Some(Weekday::Tue),
        4 => Some(Weekday::Wed),
        5 => Some(Weekday::Thu),
        6 => Some(Weekday::Fri),
        7 => Some(Weekday::Sat),
        _ => None,
    }
}

/// Inverse of [`weekday_from_number`].
pub fn weekday_number(day: Weekday) -> u8 {
    day.num_days_from_sunday() as u8 + 1
}

/// A set of weekdays, stored as a 7-bit mask (bit 0 = Monday).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "Vec<Weekday>", into = "Vec<Weekday>")]
pub struct DaySet(u8);

const ALL_DAYS: [Weekday; 7] = [
    Weekday::Mon,
    Weekday::Tue,
    Weekday::Wed,
    Weekday::Thu,
    Weekday::Fri,
    Weekday::Sat,
    Weekday::Sun,
];

impl DaySet {
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Monday through Friday.
    pub const fn working_week() -> Self {
        Self(0b001_1111)
    }

    pub const fn all() -> Self {
        Self(0b111_1111)
    }

    pub fn insert(&mut self, day: Weekday) {
        self.0 |= 1 << day.num_days_from_monday();
    }

    pub fn contains(&self, day: Weekday) -> bool {
        self.0 & (1 << day.num_days_from_monday()) != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn len(&self) -> usize {
        self.0.count_ones() as usize
    }

    /// Days in Monday-first order.
    pub fn iter(&self) -> impl Iterator<Item = Weekday> + '_ {
        ALL_DAYS.iter().copied().filter(|d| self.contains(*d))
    }

    /// Storage form: comma-separated weekday numbers (1 = Sunday … 7 = Saturday).
    pub fn to_numbers(&self) -> String {
        let mut nums: Vec<u8> = self.iter().map(weekday_number).collect();
        nums.sort_unstable();
        nums.iter()
            .map(|n| n.to_string())
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Parse the storage form produced by [`DaySet::to_numbers`].
    pub fn parse_numbers(s: &str) -> Result<Self, String> {
        s.split(',')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(|p| {
                p.parse::<u8>()
                    .ok()
                    .and_then(weekday_from_number)
                    .ok_or_else(|| format!("invalid weekday number: {p}"))
            })
            .collect()
    }
}

impl FromIterator<Weekday> for DaySet {
    fn from_iter<I: IntoIterator<Item = Weekday>>(iter: I) -> Self {
        let mut set = DaySet::empty();
        for day in iter {
            set.insert(day);
        }
        set
    }
}

impl From<Vec<Weekday>> for DaySet {
    fn from(days: Vec<Weekday>) -> Self {
        days.into_iter().collect()
    }
}

impl From<DaySet> for Vec<Weekday> {
    fn from(set: DaySet) -> Self {
        set.iter().collect()
    }
}

impl fmt::Display for DaySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<String> = self.iter().map(|d| d.to_string()).collect();
        write!(f, "{}", names.join(","))
    }
}

/// One departure the user wants reminders for.
///
/// Owned by the favorites store; the engine only reads it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FavoriteDeparture {
    pub id: FavoriteId,
    /// Links to a route for per-route policy lookup.
    pub route_id: String,
    /// Raw `HH:MM` as stored; validated lazily by [`FavoriteDeparture::validate`].
    pub departure_time: String,
    /// 1 = Sunday … 7 = Saturday.
    pub base_weekday: u8,
    pub is_active: bool,
    /// Display-only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub route_name: Option<String>,
    /// Display-only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_name: Option<String>,
}

/// The parsed, schedulable parts of a [`FavoriteDeparture`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidatedDeparture {
    pub time: DepartureTime,
    pub base_weekday: Weekday,
}

impl FavoriteDeparture {
    pub fn new(
        id: impl Into<FavoriteId>,
        route_id: impl Into<String>,
        departure_time: impl Into<String>,
        base_weekday: u8,
    ) -> Self {
        Self {
            id: id.into(),
            route_id: route_id.into(),
            departure_time: departure_time.into(),
            base_weekday,
            is_active: true,
            route_name: None,
            stop_name: None,
        }
    }

    /// Check every field the scheduler depends on.
    pub fn validate(&self) -> Result<ValidatedDeparture, InvalidFavorite> {
        if self.id.as_str().trim().is_empty() {
            return Err(InvalidFavorite::BlankId);
        }
        if self.route_id.trim().is_empty() {
            return Err(InvalidFavorite::BlankRoute {
                favorite_id: self.id.to_string(),
            });
        }
        let time: DepartureTime = self.departure_time.parse()?;
        let base_weekday = weekday_from_number(self.base_weekday).ok_or(
            InvalidFavorite::WeekdayOutOfRange {
                value: self.base_weekday,
            },
        )?;
        Ok(ValidatedDeparture { time, base_weekday })
    }

    /// Route label for display, falling back to the route id.
    pub fn route_label(&self) -> &str {
        self.route_name.as_deref().unwrap_or(&self.route_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_departure_time() {
        let t: DepartureTime = "08:30".parse().unwrap();
        assert_eq!((t.hour(), t.minute()), (8, 30));
        assert_eq!(t.to_string(), "08:30");
        assert_eq!("7:05".parse::<DepartureTime>().unwrap().to_string(), "07:05");
    }

    #[test]
    fn reject_malformed_times() {
        for bad in ["", "24:00", "12:60", "1230", "12:5", "ab:cd", "-1:30", "12:30:00"] {
            assert!(bad.parse::<DepartureTime>().is_err(), "{bad} should be rejected");
        }
    }

    #[test]
    fn weekday_numbers_start_on_sunday() {
        assert_eq!(weekday_from_number(1), Some(Weekday::Sun));
        assert_eq!(weekday_from_number(2), Some(Weekday::Mon));
        assert_eq!(weekday_from_number(7), Some(Weekday::Sat));
        assert_eq!(weekday_from_number(0), None);
        assert_eq!(weekday_from_number(8), None);
        for n in 1..=7 {
            assert_eq!(weekday_number(weekday_from_number(n).unwrap()), n);
        }
    }

    #[test]
    fn day_set_storage_form() {
        let set: DaySet = [Weekday::Thu, Weekday::Tue].into_iter().collect();
        assert_eq!(set.to_numbers(), "3,5");
        assert_eq!(DaySet::parse_numbers("3,5").unwrap(), set);
        assert_eq!(DaySet::parse_numbers("").unwrap(), DaySet::empty());
        assert!(DaySet::parse_numbers("0,9").is_err());
    }

    #[test]
    fn working_week_excludes_weekend() {
        let w = DaySet::working_week();
        assert_eq!(w.len(), 5);
        assert!(w.contains(Weekday::Fri));
        assert!(!w.contains(Weekday::Sat));
        assert!(!w.contains(Weekday::Sun));
    }

    #[test]
    fn validate_reports_first_problem() {
        let mut fav = FavoriteDeparture::new("f1", "r1", "08:30", 2);
        assert_eq!(fav.validate().unwrap().base_weekday, Weekday::Mon);

        fav.base_weekday = 9;
        assert!(matches!(
            fav.validate(),
            Err(InvalidFavorite::WeekdayOutOfRange { value: 9 })
        ));

        fav.departure_time = "8h30".to_string();
        assert!(matches!(fav.validate(), Err(InvalidFavorite::MalformedTime { .. })));

        fav.route_id = "  ".to_string();
        assert!(matches!(fav.validate(), Err(InvalidFavorite::BlankRoute { .. })));

        fav.id = FavoriteId::from("");
        assert!(matches!(fav.validate(), Err(InvalidFavorite::BlankId)));
    }
}
