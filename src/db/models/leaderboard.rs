use core::fmt;
use std::str::FromStr;

use chrono::{Datelike, Days, NaiveDate};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LeaderboardId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimePeriod {
    Day,
    Week,
    Month,
    Custom,
}

#[inline]
const fn default_active() -> bool {
    true
}

/// A configured board shown in the display rotation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Leaderboard {
    pub id: LeaderboardId,
    pub name: String,
    pub time_period: TimePeriod,
    #[serde(default)]
    pub custom_start_date: Option<NaiveDate>,
    #[serde(default)]
    pub custom_end_date: Option<NaiveDate>,
    #[serde(default)]
    pub group_id: Option<u64>,
    #[serde(default)]
    pub display_order: i64,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

/// Inclusive range of calendar dates that leads are queried over
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DateRange {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

impl DateRange {
    pub fn new(start_date: NaiveDate, end_date: NaiveDate) -> Self {
        Self {
            start_date,
            end_date,
        }
    }

    /// Range used when a board does not pin its own dates: start of the current month, pulled
    /// back one week, up to today.
    pub fn fallback(today: NaiveDate) -> Self {
        let start = month_start(today)
            .checked_sub_days(Days::new(7))
            .unwrap_or(today);

        Self::new(start, today)
    }

    /// Resolves the query range for `board` as of `today`.
    ///
    /// Weeks start on Sunday. A custom board missing either date falls back to
    /// [`DateRange::fallback`].
    pub fn for_leaderboard(board: &Leaderboard, today: NaiveDate) -> Self {
        match board.time_period {
            TimePeriod::Day => Self::new(today, today),
            TimePeriod::Week => {
                let since_sunday = today.weekday().num_days_from_sunday() as u64;
                let start = today
                    .checked_sub_days(Days::new(since_sunday))
                    .unwrap_or(today);

                Self::new(start, today)
            }
            TimePeriod::Month => Self::new(month_start(today), today),
            TimePeriod::Custom => match (board.custom_start_date, board.custom_end_date) {
                (Some(start), Some(end)) => Self::new(start, end),
                _ => Self::fallback(today),
            },
        }
    }
}

fn month_start(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}

impl fmt::Display for LeaderboardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for LeaderboardId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse::<u64>().map(LeaderboardId)
    }
}

impl fmt::Display for TimePeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let period = match self {
            TimePeriod::Day => "day",
            TimePeriod::Week => "week",
            TimePeriod::Month => "month",
            TimePeriod::Custom => "custom",
        };

        write!(f, "{period}")
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn board(period: TimePeriod) -> Leaderboard {
        Leaderboard {
            id: LeaderboardId(1),
            name: String::from("floor"),
            time_period: period,
            custom_start_date: None,
            custom_end_date: None,
            group_id: None,
            display_order: 0,
            is_active: true,
        }
    }

    #[test]
    fn test_day_and_month_ranges() {
        // wednesday
        let today = date(2025, 3, 12);

        let day = DateRange::for_leaderboard(&board(TimePeriod::Day), today);
        assert_eq!(day, DateRange::new(today, today));

        let month = DateRange::for_leaderboard(&board(TimePeriod::Month), today);
        assert_eq!(month, DateRange::new(date(2025, 3, 1), today));
    }

    #[test]
    fn test_week_starts_on_sunday() {
        let wednesday = date(2025, 3, 12);
        let week = DateRange::for_leaderboard(&board(TimePeriod::Week), wednesday);
        assert_eq!(week.start_date, date(2025, 3, 9));

        let sunday = date(2025, 3, 9);
        let week = DateRange::for_leaderboard(&board(TimePeriod::Week), sunday);
        assert_eq!(week, DateRange::new(sunday, sunday));
    }

    #[test]
    fn test_custom_range_and_fallback() {
        let today = date(2025, 3, 12);
        let mut custom = board(TimePeriod::Custom);
        custom.custom_start_date = Some(date(2025, 1, 1));
        custom.custom_end_date = Some(date(2025, 1, 31));

        assert_eq!(
            DateRange::for_leaderboard(&custom, today),
            DateRange::new(date(2025, 1, 1), date(2025, 1, 31))
        );

        custom.custom_end_date = None;
        assert_eq!(
            DateRange::for_leaderboard(&custom, today),
            DateRange::new(date(2025, 2, 22), today)
        );
    }

    #[test]
    fn test_leaderboard_defaults() {
        let board: Leaderboard =
            serde_json::from_str(r#"{"id":3,"name":"team a","timePeriod":"week"}"#).unwrap();

        assert!(board.is_active);
        assert_eq!(board.display_order, 0);
        assert_eq!(board.time_period, TimePeriod::Week);
    }
}
