use std::sync::OnceLock;

use chrono::{NaiveDate, NaiveDateTime};
use regex::Regex;

/// Characters of the phone string compared by the phone stage.
pub const PHONE_KEY_LEN: usize = 6;

const ISO_DATE: &str = "%Y-%m-%d";
const DAY_FIRST: &str = "%d.%m.%Y";

const DATETIME_FORMATS: [&str; 3] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"];

fn digits() -> &'static Regex {
    static DIGITS: OnceLock<Regex> = OnceLock::new();
    DIGITS.get_or_init(|| Regex::new("[0-9]+").expect("literal regex"))
}

/// Numeric token of a mixed-format identifier: the first run of digits, or
/// an empty string when there is none. Leading zeros are kept.
pub fn extract_numeric_id(raw: &str) -> String {
    digits()
        .find(raw)
        .map(|m| m.as_str().to_string())
        .unwrap_or_default()
}

/// Last six characters of the phone's string form (the whole string when shorter).
/// Blank phones have no key.
pub fn phone_key(raw: &str) -> Option<String> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    let count = s.chars().count();
    Some(s.chars().skip(count.saturating_sub(PHONE_KEY_LEN)).collect())
}

fn parse_iso_like(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s, ISO_DATE).ok().or_else(|| {
        DATETIME_FORMATS
            .iter()
            .find_map(|f| NaiveDateTime::parse_from_str(s, f).ok())
            .map(|dt| dt.date())
    })
}

/// Birth date as stored in the roster: ISO date or date-time (typed date
/// cells arrive in that form), `dd.mm.yyyy`, `yyyy/mm/dd` or `mm/dd/yyyy`.
pub fn parse_roster_date(raw: &str) -> Option<NaiveDate> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    parse_iso_like(s)
        .or_else(|| NaiveDate::parse_from_str(s, DAY_FIRST).ok())
        .or_else(|| NaiveDate::parse_from_str(s, "%Y/%m/%d").ok())
        .or_else(|| NaiveDate::parse_from_str(s, "%m/%d/%Y").ok())
}

/// Birth date as typed into the registration form: day first (`dd.mm.yyyy`).
/// ISO values are accepted too since date-typed cells are read in that form.
pub fn parse_day_first_date(raw: &str) -> Option<NaiveDate> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    NaiveDate::parse_from_str(s, DAY_FIRST)
        .ok()
        .or_else(|| parse_iso_like(s))
}

pub fn to_iso(date: NaiveDate) -> String {
    date.format(ISO_DATE).to_string()
}
