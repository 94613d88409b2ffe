use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;

static ZIP_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[0-9]{5}(-[0-9]{4})?$").unwrap());

pub fn validate_zip_code(zip: &str) -> bool {
    ZIP_REGEX.is_match(zip)
}

pub fn validate_due_day(day: i32) -> bool {
    (1..=31).contains(&day)
}

/// Single-day terms are allowed; only an inverted range is rejected.
pub fn validate_date_range(start: NaiveDate, end: NaiveDate) -> bool {
    start <= end
}

pub fn sanitize_string(input: &str) -> String {
    input.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_zip_code() {
        assert!(validate_zip_code("94103"));
        assert!(validate_zip_code("94103-1234"));
        assert!(!validate_zip_code("9410"));
        assert!(!validate_zip_code("94103-12"));
    }

    #[test]
    fn test_validate_due_day() {
        assert!(validate_due_day(1));
        assert!(validate_due_day(31));
        assert!(!validate_due_day(0));
        assert!(!validate_due_day(32));
    }

    #[test]
    fn test_validate_date_range() {
        let start = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
        let end = NaiveDate::from_ymd_opt(2024, 6, 30).unwrap();
        assert!(validate_date_range(start, end));
        // Equal start and end is a valid single-day term
        assert!(validate_date_range(start, start));
        assert!(!validate_date_range(end, start));
    }

    #[test]
    fn test_sanitize_string() {
        assert_eq!(sanitize_string("  hello  "), "hello");
    }
}
