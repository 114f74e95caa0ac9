//! Report file naming: `<product>_<label>_<date>.pdf`.
//!
//! ```
//! use chatlytics_export::export::report_filename;
//!
//! let date = chrono::NaiveDate::from_ymd_opt(2024, 3, 9).unwrap();
//! assert_eq!(report_filename("Chatlytics", "Zoë & co", date), "Chatlytics_Zo____co_2024-03-09.pdf");
//! ```

use chrono::NaiveDate;

/// Replace every character outside `[A-Za-z0-9]` with `_`.
pub fn sanitize_label(label: &str) -> String {
    label
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

/// `<product>_<sanitized label>_<YYYY-MM-DD>.pdf`
///
/// Stable within a day: exporting the same label twice on one date yields
/// the same name and the later file replaces the earlier one.
pub fn report_filename(product: &str, label: &str, date: NaiveDate) -> String {
    format!(
        "{}_{}_{}.pdf",
        product,
        sanitize_label(label),
        date.format("%Y-%m-%d")
    )
}

/// Today's date in UTC.
pub fn today() -> NaiveDate {
    chrono::Utc::now().date_naive()
}
