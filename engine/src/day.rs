//! Days of the school week.

use crate::{error::Result, Error};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A day of the week, in canonical timetable order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Day {
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
    Saturday,
    Sunday,
}

impl Day {
    /// The canonical day set, in order.
    pub const ALL: [Day; 7] = [
        Day::Monday,
        Day::Tuesday,
        Day::Wednesday,
        Day::Thursday,
        Day::Friday,
        Day::Saturday,
        Day::Sunday,
    ];

    /// Full English name.
    pub fn name(self) -> &'static str {
        match self {
            Day::Monday => "Monday",
            Day::Tuesday => "Tuesday",
            Day::Wednesday => "Wednesday",
            Day::Thursday => "Thursday",
            Day::Friday => "Friday",
            Day::Saturday => "Saturday",
            Day::Sunday => "Sunday",
        }
    }

    /// Normalize a free-form day token ("mon", "TUE", "Wednesdays").
    ///
    /// Matching is a case-insensitive prefix match against the canonical set:
    /// the token is a prefix of a day name, or starts with the day's
    /// three-letter abbreviation. The first day in canonical order wins, so
    /// "t" resolves to Tuesday and "s" to Saturday.
    pub fn normalize(token: &str) -> Option<Day> {
        let token = token.trim().to_lowercase();
        if token.is_empty() {
            return None;
        }

        Day::ALL.into_iter().find(|day| {
            let name = day.name().to_lowercase();
            name.starts_with(&token) || token.starts_with(&name[..3])
        })
    }

    /// Like [`Day::normalize`] but reports unknown tokens as an error.
    pub fn parse(token: &str) -> Result<Day> {
        Day::normalize(token).ok_or_else(|| Error::UnknownDay(token.to_string()))
    }
}

impl fmt::Display for Day {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
