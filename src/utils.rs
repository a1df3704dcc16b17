use chrono::{Days, NaiveDate};

/// Day 0 of the spreadsheet serial calendar. Serial 1 maps to 1899-12-31,
/// which keeps post-1900 dates aligned with what spreadsheet tools emit.
fn serial_epoch() -> NaiveDate {
    NaiveDate::from_ymd_opt(1899, 12, 30).unwrap()
}

/// Converts a spreadsheet serial number to a date. Fractional day parts
/// (time of day) are discarded. Out-of-range serials return None.
pub fn serial_to_date(serial: f64) -> Option<NaiveDate> {
    if !serial.is_finite() || serial < 1.0 || serial > 200_000.0 {
        return None;
    }
    serial_epoch().checked_add_days(Days::new(serial.trunc() as u64))
}

/// Parses a cell that may hold a date as either a serial number or
/// day-first text. Month-first forms are never attempted: 05/01/2026 is
/// the 5th of January.
pub fn parse_flexible_date(text: &str) -> Option<NaiveDate> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(serial) = trimmed.parse::<f64>() {
        return serial_to_date(serial);
    }

    for format in ["%d/%m/%Y", "%d-%m-%Y", "%d.%m.%Y", "%Y-%m-%d", "%d/%m/%y"] {
        if let Ok(date) = NaiveDate::parse_from_str(trimmed, format) {
            return Some(date);
        }
    }

    None
}

/// Parses a monetary cell, tolerating thousands separators, a leading
/// currency symbol, and surrounding whitespace.
pub fn parse_amount(text: &str) -> Option<f64> {
    let cleaned: String = text
        .trim()
        .trim_start_matches('$')
        .chars()
        .filter(|c| *c != ',' && !c.is_whitespace())
        .collect();

    if cleaned.is_empty() {
        return None;
    }

    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// True when the text has the basic local@domain shape: exactly one '@',
/// non-empty local part, and a dotted domain with no whitespace.
pub fn is_valid_email(text: &str) -> bool {
    let trimmed = text.trim();
    if trimmed.contains(char::is_whitespace) {
        return false;
    }

    let mut parts = trimmed.splitn(2, '@');
    let local = parts.next().unwrap_or("");
    let domain = parts.next().unwrap_or("");

    !local.is_empty()
        && !domain.is_empty()
        && !domain.contains('@')
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
}
