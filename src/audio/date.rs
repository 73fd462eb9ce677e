//! Timestamps as written by taggers.
//!
//! Accepted shapes, from most to least precise: `YYYY-MM-DDTHH:MM:SS`,
//! `YYYY-MM-DDTHH:MM`, `YYYY-MM-DDTHH`, `YYYY-MM-DD`, `YYYY-MM` and `YYYY`.
//! Missing components default to the start of the period.

use chrono::{NaiveDate, NaiveDateTime};

fn parse_component(s: &str, width: usize) -> Option<u32> {
    if s.len() != width || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}

pub fn parse_tag_date(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();
    let (date_part, time_part) = match value.split_once('T') {
        Some((date, time)) => (date, Some(time)),
        None => (value, None),
    };

    let mut date_fields = date_part.split('-');
    let year = parse_component(date_fields.next()?, 4)? as i32;
    let month = date_fields.next().map(|m| parse_component(m, 2)).unwrap_or(Some(1))?;
    let day = date_fields.next().map(|d| parse_component(d, 2)).unwrap_or(Some(1))?;
    if date_fields.next().is_some() {
        return None;
    }
    // a time is only meaningful on a full date
    if time_part.is_some() && date_part.len() != 10 {
        return None;
    }

    let (hour, minute, second) = match time_part {
        None => (0, 0, 0),
        Some(time) => {
            let mut time_fields = time.split(':');
            let hour = parse_component(time_fields.next()?, 2)?;
            let minute = time_fields.next().map(|m| parse_component(m, 2)).unwrap_or(Some(0))?;
            let second = time_fields.next().map(|s| parse_component(s, 2)).unwrap_or(Some(0))?;
            if time_fields.next().is_some() {
                return None;
            }
            (hour, minute, second)
        }
    };

    NaiveDate::from_ymd_opt(year, month, day)?.and_hms_opt(hour, minute, second)
}
