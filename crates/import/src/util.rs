use chrono::NaiveDate;
use kontoauszug_core::Money;
use rust_decimal::Decimal;
use std::str::FromStr;

use crate::csv::DecimalStyle;

/// Parses a bank-export amount such as `1.234,56`, `-45,00`, `45,00-`,
/// `(75.25)` or `150,00 EUR`. Returns `None` for anything that is not a number.
pub(crate) fn parse_amount(raw: &str, style: DecimalStyle) -> Option<Money> {
    let mut s = raw.trim().trim_matches('"').trim().to_string();
    let mut negative = false;

    if s.starts_with('(') && s.ends_with(')') && s.len() >= 2 {
        negative = true;
        s = s[1..s.len() - 1].to_string();
    }

    s.retain(|c| !c.is_whitespace() && c != '€' && c != '$' && c != '\'');
    for code in ["EUR", "eur"] {
        if let Some(rest) = s.strip_suffix(code) {
            s = rest.to_string();
        }
        if let Some(rest) = s.strip_prefix(code) {
            s = rest.to_string();
        }
    }

    if let Some(rest) = s.strip_suffix('-') {
        negative = !negative;
        s = rest.to_string();
    } else if let Some(rest) = s.strip_suffix('+') {
        s = rest.to_string();
    }
    if let Some(rest) = s.strip_prefix('-') {
        negative = !negative;
        s = rest.to_string();
    } else if let Some(rest) = s.strip_prefix('+') {
        s = rest.to_string();
    }

    if s.is_empty() || !s.chars().all(|c| c.is_ascii_digit() || c == '.' || c == ',') {
        return None;
    }

    let decimal_sep = match style {
        DecimalStyle::Comma => ',',
        DecimalStyle::Point => '.',
        DecimalStyle::Auto => match (s.rfind(','), s.rfind('.')) {
            (Some(c), Some(p)) => {
                if c > p {
                    ','
                } else {
                    '.'
                }
            }
            (Some(_), None) => ',',
            _ => '.',
        },
    };
    let thousands_sep = if decimal_sep == ',' { '.' } else { ',' };

    let normalized: String = s
        .chars()
        .filter(|c| *c != thousands_sep)
        .map(|c| if c == decimal_sep { '.' } else { c })
        .collect();

    let dec = Decimal::from_str(&normalized).ok()?;
    let money = Money::from_decimal(dec);
    Some(if negative { -money } else { money })
}

/// Tries `preferred` first, then the date layouts German bank exports use.
pub(crate) fn parse_date(raw: &str, preferred: Option<&str>) -> Option<NaiveDate> {
    let s = raw.trim().trim_matches('"').trim();
    if s.is_empty() {
        return None;
    }

    if let Some(fmt) = preferred.filter(|f| !f.is_empty()) {
        if let Ok(date) = NaiveDate::parse_from_str(s, fmt) {
            return Some(date);
        }
    }

    // `%Y` happily accepts two digits, so the layouts are keyed on length.
    let candidates: &[&str] = match s.len() {
        10 => &["%Y-%m-%d", "%d.%m.%Y", "%d/%m/%Y", "%Y/%m/%d"],
        8 => &["%d.%m.%y", "%d/%m/%y"],
        _ => &[],
    };
    for fmt in candidates {
        if let Ok(date) = NaiveDate::parse_from_str(s, fmt) {
            return Some(date);
        }
    }

    if s.len() == 8 && s.chars().all(|c| c.is_ascii_digit()) {
        let y: i32 = s[0..4].parse().ok()?;
        let m: u32 = s[4..6].parse().ok()?;
        let d: u32 = s[6..8].parse().ok()?;
        return NaiveDate::from_ymd_opt(y, m, d);
    }

    // ISO timestamps: keep the calendar date, drop the time.
    if s.len() > 10 && s.is_char_boundary(10) {
        if let Ok(date) = NaiveDate::parse_from_str(&s[..10], "%Y-%m-%d") {
            return Some(date);
        }
    }

    None
}

/// Trimmed, non-empty owned copy.
pub(crate) fn non_empty(s: &str) -> Option<String> {
    let s = s.trim();
    if s.is_empty() {
        None
    } else {
        Some(s.to_string())
    }
}
