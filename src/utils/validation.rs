use chrono::{NaiveDate, NaiveTime};
use regex::Regex;

pub fn validate_phone(phone: &str) -> bool {
    let re = Regex::new(r"^[6-9]\d{9}$").unwrap();
    re.is_match(phone)
}

pub fn validate_ifsc(ifsc: &str) -> bool {
    let re = Regex::new(r"^[A-Z]{4}0[A-Z0-9]{6}$").unwrap();
    re.is_match(ifsc)
}

/// Parses a 24h `HH:MM` clock time.
pub fn parse_time(value: &str) -> Option<NaiveTime> {
    let re = Regex::new(r"^([01]\d|2[0-3]):[0-5]\d$").unwrap();
    if !re.is_match(value) {
        return None;
    }
    NaiveTime::parse_from_str(value, "%H:%M").ok()
}

/// Parses a calendar date in `YYYY-MM-DD` form.
pub fn parse_date(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d").ok()
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phone_numbers() {
        assert!(validate_phone("9876543210"));
        assert!(!validate_phone("1234567890"));
        assert!(!validate_phone("98765"));
    }

    #[test]
    fn ifsc_codes() {
        assert!(validate_ifsc("HDFC0001234"));
        assert!(!validate_ifsc("HDFC1001234"));
        assert!(!validate_ifsc("hdfc0001234"));
    }

    #[test]
    fn clock_times() {
        assert_eq!(parse_time("09:30"), NaiveTime::from_hms_opt(9, 30, 0));
        assert_eq!(parse_time("23:59"), NaiveTime::from_hms_opt(23, 59, 0));
        assert_eq!(parse_time("24:00"), None);
        assert_eq!(parse_time("9:30"), None);
        assert_eq!(parse_time("09:30:00"), None);
    }

    #[test]
    fn dates() {
        assert_eq!(parse_date("2026-03-01"), NaiveDate::from_ymd_opt(2026, 3, 1));
        assert_eq!(parse_date("2026-02-30"), None);
        assert_eq!(parse_date("01/03/2026"), None);
    }

    #[test]
    fn emails_are_normalized() {
        assert_eq!(normalize_email("  Asha@Example.IN "), "asha@example.in");
    }
}
