//! Input validation for the intake flow

use once_cell::sync::Lazy;
use regex::Regex;

/// local-part@domain.tld with no whitespace and a single `@`
static EMAIL_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email pattern is valid")
});

/// Spreadsheet extensions accepted for relay
pub const ALLOWED_EXTENSIONS: [&str; 3] = [".csv", ".xls", ".xlsx"];

/// Whether the (trimmed) input looks like an email address
pub fn is_valid_email(input: &str) -> bool {
    EMAIL_PATTERN.is_match(input.trim())
}

/// Case-insensitive suffix match against [`ALLOWED_EXTENSIONS`]
pub fn is_allowed_spreadsheet(file_name: &str) -> bool {
    let lowered = file_name.to_lowercase();
    ALLOWED_EXTENSIONS.iter().any(|ext| lowered.ends_with(ext))
}

/// MIME type for a spreadsheet attachment
pub fn spreadsheet_content_type(file_name: &str) -> &'static str {
    let lowered = file_name.to_lowercase();
    if lowered.ends_with(".csv") {
        "text/csv"
    } else if lowered.ends_with(".xlsx") {
        "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"
    } else if lowered.ends_with(".xls") {
        "application/vnd.ms-excel"
    } else {
        "application/octet-stream"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_emails() {
        assert!(is_valid_email("user@example.com"));
        assert!(is_valid_email("  first.last+tag@mail.example.org \n"));
    }

    #[test]
    fn test_invalid_emails() {
        assert!(!is_valid_email("not-an-email"));
        assert!(!is_valid_email("user@localhost"));
        assert!(!is_valid_email("user name@example.com"));
        assert!(!is_valid_email("user@@example.com"));
        assert!(!is_valid_email("@example.com"));
        assert!(!is_valid_email(""));
    }

    #[test]
    fn test_allowed_spreadsheets() {
        assert!(is_allowed_spreadsheet("report.csv"));
        assert!(is_allowed_spreadsheet("REPORT.XLSX"));
        assert!(is_allowed_spreadsheet("legacy.Xls"));
        assert!(!is_allowed_spreadsheet("notes.txt"));
        assert!(!is_allowed_spreadsheet("archive.csv.zip"));
        assert!(!is_allowed_spreadsheet("csv"));
    }

    #[test]
    fn test_content_types() {
        assert_eq!(spreadsheet_content_type("a.csv"), "text/csv");
        assert_eq!(spreadsheet_content_type("a.XLS"), "application/vnd.ms-excel");
        assert_eq!(
            spreadsheet_content_type("a.xlsx"),
            "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"
        );
    }
}
