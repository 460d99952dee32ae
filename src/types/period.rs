use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

use crate::error::HaircutError;

const SPANISH_MONTHS: [&str; 12] = [
    "enero",
    "febrero",
    "marzo",
    "abril",
    "mayo",
    "junio",
    "julio",
    "agosto",
    "septiembre",
    "octubre",
    "noviembre",
    "diciembre",
];

/// A calendar year-month. Ordering is chronological.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Period {
    year: i32,
    month: u32,
}

impl Period {
    pub fn new(year: i32, month: u32) -> Option<Self> {
        (1..=12).contains(&month).then_some(Self { year, month })
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    pub fn spanish_month(&self) -> &'static str {
        SPANISH_MONTHS[(self.month - 1) as usize]
    }

    /// Build a period from a Spanish month name as it appears in publisher URLs.
    pub fn from_spanish(month: &str, year: i32) -> Option<Self> {
        let month = month.trim().to_lowercase();
        let month = if month == "setiembre" { "septiembre" } else { month.as_str() };
        SPANISH_MONTHS
            .iter()
            .position(|m| *m == month)
            .and_then(|idx| Self::new(year, idx as u32 + 1))
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for Period {
    type Err = HaircutError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || HaircutError::InvalidPeriod(s.to_string());
        let (y, m) = s.trim().split_once('-').ok_or_else(invalid)?;
        if y.len() != 4 || m.is_empty() || m.len() > 2 {
            return Err(invalid());
        }
        let year: i32 = y.parse().map_err(|_| invalid())?;
        let month: u32 = m.parse().map_err(|_| invalid())?;
        Period::new(year, month).ok_or_else(invalid)
    }
}

impl TryFrom<String> for Period {
    type Error = HaircutError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Period> for String {
    fn from(p: Period) -> Self {
        p.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_and_formats() {
        let p: Period = "2024-02".parse().unwrap();
        assert_eq!((p.year(), p.month()), (2024, 2));
        assert_eq!(p.to_string(), "2024-02");
        assert_eq!("2023-9".parse::<Period>().unwrap().to_string(), "2023-09");
    }

    #[test]
    fn rejects_bad_input() {
        for bad in ["2024-13", "2024-00", "24-01", "2024/01", "enero", ""] {
            assert!(bad.parse::<Period>().is_err(), "{bad}");
        }
    }

    #[test]
    fn orders_chronologically() {
        let mut ps: Vec<Period> = ["2024-01", "2023-11", "2024-02", "2023-12"]
            .iter()
            .map(|s| s.parse().unwrap())
            .collect();
        ps.sort();
        let out: Vec<String> = ps.iter().map(|p| p.to_string()).collect();
        assert_eq!(out, ["2023-11", "2023-12", "2024-01", "2024-02"]);
    }

    #[test]
    fn spanish_month_names() {
        let p = Period::from_spanish("Enero", 2026).unwrap();
        assert_eq!(p.to_string(), "2026-01");
        assert_eq!(p.spanish_month(), "enero");
        assert_eq!(Period::from_spanish("setiembre", 2020).unwrap().month(), 9);
        assert!(Period::from_spanish("january", 2020).is_none());
    }

    #[test]
    fn serde_uses_display_form() {
        let p = Period::new(2023, 12).unwrap();
        assert_eq!(serde_json::to_string(&p).unwrap(), "\"2023-12\"");
        let back: Period = serde_json::from_str("\"2023-12\"").unwrap();
        assert_eq!(back, p);
    }
}
