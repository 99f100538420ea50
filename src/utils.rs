use crate::error::{AssistantError, Result};
use chrono::{Datelike, Months, NaiveDate};

pub fn first_day_of_month(year: i32, month: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month.clamp(1, 12), 1).unwrap_or(NaiveDate::MIN)
}

pub fn last_day_of_month(year: i32, month: u32) -> NaiveDate {
    first_day_of_month(year, month)
        .checked_add_months(Months::new(1))
        .and_then(|next| next.pred_opt())
        .unwrap_or(NaiveDate::MAX)
}

pub fn month_start(date: NaiveDate) -> NaiveDate {
    first_day_of_month(date.year(), date.month())
}

pub fn month_end(date: NaiveDate) -> NaiveDate {
    last_day_of_month(date.year(), date.month())
}

/// First day of the month `offset` months away from `date`'s month.
pub fn shift_month_start(date: NaiveDate, offset: i32) -> NaiveDate {
    let start = month_start(date);
    let shifted = if offset >= 0 {
        start.checked_add_months(Months::new(offset as u32))
    } else {
        start.checked_sub_months(Months::new(offset.unsigned_abs()))
    };
    shifted.unwrap_or(start)
}

/// Same calendar day `years` years away, clamped to the month's last day
/// (Feb 29 becomes Feb 28 in non-leap years).
pub fn shift_years(date: NaiveDate, years: i32) -> NaiveDate {
    let year = date.year() + years;
    let last = last_day_of_month(year, date.month());
    NaiveDate::from_ymd_opt(year, date.month(), date.day().min(last.day())).unwrap_or(last)
}

pub fn months_between(start: NaiveDate, end: NaiveDate) -> i32 {
    let year_diff = end.year() - start.year();
    let month_diff = end.month() as i32 - start.month() as i32;
    year_diff * 12 + month_diff
}

/// `YYYY-MM` key for the month containing `date`.
pub fn month_key(date: NaiveDate) -> String {
    format!("{:04}-{:02}", date.year(), date.month())
}

/// Contiguous month keys from `start`'s month through `end`'s month.
pub fn month_keys_between(start: NaiveDate, end: NaiveDate) -> Vec<String> {
    let count = months_between(start, end);
    if count < 0 {
        return Vec::new();
    }
    (0..=count)
        .map(|offset| month_key(shift_month_start(start, offset)))
        .collect()
}

/// Parses a period string in the format "YYYY-MM" or "YYYY-MM:YYYY-MM"
/// Returns (start_date, end_date)
pub fn parse_period_string(period: &str) -> Result<(NaiveDate, NaiveDate)> {
    let parts: Vec<&str> = period.split(':').collect();

    let parse_month = |raw: &str, label: &str| -> Result<NaiveDate> {
        NaiveDate::parse_from_str(&format!("{}-01", raw.trim()), "%Y-%m-%d").map_err(|_| {
            AssistantError::DateError(format!(
                "Invalid {} in period: {}. Expected YYYY-MM",
                label, raw
            ))
        })
    };

    match parts.as_slice() {
        [single] => {
            let start = parse_month(single, "month")?;
            Ok((start, month_end(start)))
        }
        [from, to] => {
            let start = parse_month(from, "start month")?;
            let end = month_end(parse_month(to, "end month")?);
            if end < start {
                return Err(AssistantError::DateError(format!(
                    "Period {} ends before it starts",
                    period
                )));
            }
            Ok((start, end))
        }
        _ => Err(AssistantError::DateError(format!(
            "Invalid period format: {}. Expected 'YYYY-MM' or 'YYYY-MM:YYYY-MM'",
            period
        ))),
    }
}
