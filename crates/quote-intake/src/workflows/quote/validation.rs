//! Field validators and the picker rules applied before a value reaches the record.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::OnceLock;

use chrono::{Datelike, Duration, Months, NaiveDate};
use regex::Regex;
use serde::Serialize;

use super::domain::{CoverageDetails, LeadRecord, PolicyDocument, WizardStep};

pub const MAX_DOCUMENT_BYTES: u64 = 5 * 1024 * 1024;
pub const ALLOWED_DOCUMENT_TYPES: [&str; 4] =
    ["image/jpeg", "image/png", "image/webp", "application/pdf"];
pub const START_WINDOW_DAYS: i64 = 30;

/// Keys of the per-session error map. `Submit` carries gateway failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Field {
    InsuranceType,
    StartDate,
    FullName,
    Email,
    Phone,
    PropertyAddress,
    VehicleCount,
    File,
    Submit,
}

pub type FieldErrors = BTreeMap<Field, String>;

fn email_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email pattern"))
}

fn phone_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[0-9\s\-+()]{10,}$").expect("phone pattern"))
}

pub fn is_valid_email(value: &str) -> bool {
    email_pattern().is_match(value)
}

/// Loose check: after dropping whitespace, at least ten characters drawn from
/// digits and `-+()`. Separators count toward the ten.
pub fn is_valid_phone(value: &str) -> bool {
    let compact: String = value.chars().filter(|c| !c.is_whitespace()).collect();
    phone_pattern().is_match(&compact)
}

/// Reformat a phone field on every keystroke: `DDD`, `(DDD) DDD`, `(DDD) DDD-DDDD`.
pub fn format_phone_as_typed(value: &str) -> String {
    let digits: String = value.chars().filter(char::is_ascii_digit).collect();
    match digits.len() {
        0..=3 => digits,
        4..=6 => format!("({}) {}", &digits[..3], &digits[3..]),
        len => format!(
            "({}) {}-{}",
            &digits[..3],
            &digits[3..6],
            &digits[6..len.min(10)]
        ),
    }
}

/// Run the gate for a single step. Earlier steps are not re-checked.
pub fn validate_step(step: WizardStep, record: &LeadRecord) -> FieldErrors {
    let mut errors = FieldErrors::new();

    match step {
        WizardStep::InsuranceType => {
            if record.coverage.is_none() {
                errors.insert(Field::InsuranceType, "Please select an insurance type".into());
            }
        }
        WizardStep::StartDate => {
            if record.start_date.is_none() {
                errors.insert(Field::StartDate, "Please select a start date".into());
            }
        }
        WizardStep::ContactInfo => {
            if record.full_name.trim().is_empty() {
                errors.insert(Field::FullName, "Full name is required".into());
            }

            if record.email.trim().is_empty() {
                errors.insert(Field::Email, "Email is required".into());
            } else if !is_valid_email(&record.email) {
                errors.insert(Field::Email, "Please enter a valid email".into());
            }

            if record.phone.trim().is_empty() {
                errors.insert(Field::Phone, "Phone number is required".into());
            } else if !is_valid_phone(&record.phone) {
                errors.insert(Field::Phone, "Please enter a valid phone number".into());
            }

            match &record.coverage {
                Some(CoverageDetails::Home { property_address })
                    if property_address.trim().is_empty() =>
                {
                    errors.insert(Field::PropertyAddress, "Property address is required".into());
                }
                Some(CoverageDetails::Auto {
                    vehicle_count: None,
                }) => {
                    errors.insert(Field::VehicleCount, "Number of vehicles is required".into());
                }
                _ => {}
            }
        }
        WizardStep::Documents => {
            if record.document.is_none() {
                errors.insert(Field::File, "Please upload your declarations page".into());
            }
        }
    }

    errors
}

/// Why the document picker refused a file.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DocumentRejection {
    #[error("Invalid file type. Please upload JPG, PNG, WebP, or PDF files.")]
    UnsupportedType { content_type: String },
    #[error("File size exceeds {} limit.", format_file_size(MAX_DOCUMENT_BYTES))]
    TooLarge { size: u64 },
}

pub fn validate_document(document: &PolicyDocument) -> Result<(), DocumentRejection> {
    if !ALLOWED_DOCUMENT_TYPES.contains(&document.content_type.as_str()) {
        return Err(DocumentRejection::UnsupportedType {
            content_type: document.content_type.clone(),
        });
    }

    if document.size() > MAX_DOCUMENT_BYTES {
        return Err(DocumentRejection::TooLarge {
            size: document.size(),
        });
    }

    Ok(())
}

/// Human readable size with up to two decimals: "0 Bytes", "1.5 KB", "5 MB".
pub fn format_file_size(bytes: u64) -> String {
    if bytes == 0 {
        return "0 Bytes".to_string();
    }

    const UNITS: [&str; 3] = ["Bytes", "KB", "MB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }

    let rounded = (value * 100.0).round() / 100.0;
    let mut text = format!("{rounded:.2}");
    while text.ends_with('0') {
        text.pop();
    }
    if text.ends_with('.') {
        text.pop();
    }
    format!("{text} {}", UNITS[unit])
}

/// Range a coverage start date may be picked from: today through today + 30 days.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StartDateWindow {
    pub earliest: NaiveDate,
    pub latest: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QuickSelection {
    pub label: &'static str,
    pub date: NaiveDate,
}

impl fmt::Display for StartDateWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} and {}", self.earliest, self.latest)
    }
}

impl StartDateWindow {
    pub fn for_today(today: NaiveDate) -> Self {
        Self {
            earliest: today,
            latest: today + Duration::days(START_WINDOW_DAYS),
        }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.earliest && date <= self.latest
    }

    /// Shortcut dates offered next to the picker.
    pub fn quick_selections(&self) -> Vec<QuickSelection> {
        let today = self.earliest;
        let next_month = today
            .checked_add_months(Months::new(1))
            .unwrap_or_else(|| today + Duration::days(i64::from(days_in_month(today))));

        vec![
            QuickSelection {
                label: "Today",
                date: today,
            },
            QuickSelection {
                label: "Next Week",
                date: today + Duration::days(7),
            },
            QuickSelection {
                label: "Next Month",
                date: next_month,
            },
        ]
    }
}

fn days_in_month(date: NaiveDate) -> u32 {
    let (year, month) = if date.month() == 12 {
        (date.year() + 1, 1)
    } else {
        (date.year(), date.month() + 1)
    };
    NaiveDate::from_ymd_opt(year, month, 1)
        .and_then(|first| first.pred_opt())
        .map_or(30, |last| last.day())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflows::quote::domain::{InsuranceType, LeadPatch, VehicleCount};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    #[test]
    fn email_shapes() {
        assert!(is_valid_email("a@b.co"));
        assert!(is_valid_email("jane.doe+quotes@mail.example.com"));
        assert!(!is_valid_email("a@@b"));
        assert!(!is_valid_email("ab.com"));
        assert!(!is_valid_email("jane doe@x.com"));
        assert!(!is_valid_email("jane@x"));
    }

    #[test]
    fn phone_counts_characters_not_digits() {
        assert!(is_valid_phone("(123) 456-7890"));
        assert!(is_valid_phone("123 456 7890"));
        assert!(!is_valid_phone("12345"));
        // nine digits plus separators still pass
        assert!(is_valid_phone("(123) 456-789"));
        assert!(!is_valid_phone("555-CALL-NOW"));
    }

    #[test]
    fn phone_formatting_as_typed() {
        assert_eq!(format_phone_as_typed("1234567890"), "(123) 456-7890");
        assert_eq!(format_phone_as_typed("123"), "123");
        assert_eq!(format_phone_as_typed(""), "");
        assert_eq!(format_phone_as_typed("12345"), "(123) 45");
        assert_eq!(format_phone_as_typed("(123) 456"), "(123) 456");
        assert_eq!(format_phone_as_typed("1234567"), "(123) 456-7");
        assert_eq!(format_phone_as_typed("123456789012"), "(123) 456-7890");
    }

    #[test]
    fn step_one_requires_insurance_type() {
        let errors = validate_step(WizardStep::InsuranceType, &LeadRecord::default());
        assert_eq!(
            errors.get(&Field::InsuranceType).map(String::as_str),
            Some("Please select an insurance type")
        );
    }

    #[test]
    fn step_three_checks_conditional_fields() {
        let mut record = LeadRecord::default();
        record.apply(LeadPatch::contact("Jane Doe", "jane@x.com", "(555) 123-4567"));
        record.apply(LeadPatch::insurance_type(InsuranceType::Home));
        let errors = validate_step(WizardStep::ContactInfo, &record);
        assert_eq!(errors.len(), 1);
        assert!(errors.contains_key(&Field::PropertyAddress));

        record.apply(LeadPatch::insurance_type(InsuranceType::Auto));
        let errors = validate_step(WizardStep::ContactInfo, &record);
        assert_eq!(errors.keys().collect::<Vec<_>>(), vec![&Field::VehicleCount]);

        record.apply(LeadPatch::vehicle_count(VehicleCount::One));
        assert!(validate_step(WizardStep::ContactInfo, &record).is_empty());

        record.apply(LeadPatch::insurance_type(InsuranceType::Commercial));
        assert!(validate_step(WizardStep::ContactInfo, &record).is_empty());
    }

    #[test]
    fn step_three_distinguishes_missing_from_malformed() {
        let mut record = LeadRecord::default();
        record.apply(LeadPatch::contact("   ", "", "12345"));
        let errors = validate_step(WizardStep::ContactInfo, &record);
        assert_eq!(errors[&Field::FullName], "Full name is required");
        assert_eq!(errors[&Field::Email], "Email is required");
        assert_eq!(errors[&Field::Phone], "Please enter a valid phone number");

        record.apply(LeadPatch::contact("Jane", "jane@", "   "));
        let errors = validate_step(WizardStep::ContactInfo, &record);
        assert_eq!(errors[&Field::Email], "Please enter a valid email");
        assert_eq!(errors[&Field::Phone], "Phone number is required");
    }

    #[test]
    fn document_rules() {
        let pdf = PolicyDocument::new("dec.pdf", "application/pdf", vec![0; 1024]);
        assert!(validate_document(&pdf).is_ok());

        let gif = PolicyDocument::new("dec.gif", "image/gif", vec![0; 10]);
        let rejection = validate_document(&gif).expect_err("gif refused");
        assert_eq!(
            rejection.to_string(),
            "Invalid file type. Please upload JPG, PNG, WebP, or PDF files."
        );

        let exact = PolicyDocument::new("dec.png", "image/png", vec![0; MAX_DOCUMENT_BYTES as usize]);
        assert!(validate_document(&exact).is_ok());

        let large = PolicyDocument::new(
            "dec.png",
            "image/png",
            vec![0; MAX_DOCUMENT_BYTES as usize + 1],
        );
        let rejection = validate_document(&large).expect_err("oversized refused");
        assert_eq!(rejection.to_string(), "File size exceeds 5 MB limit.");
    }

    #[test]
    fn file_sizes_render_compactly() {
        assert_eq!(format_file_size(0), "0 Bytes");
        assert_eq!(format_file_size(512), "512 Bytes");
        assert_eq!(format_file_size(1536), "1.5 KB");
        assert_eq!(format_file_size(2 * 1024 * 1024), "2 MB");
    }

    #[test]
    fn start_window_spans_thirty_days() {
        let window = StartDateWindow::for_today(date(2025, 1, 31));
        assert!(window.contains(date(2025, 1, 31)));
        assert!(window.contains(date(2025, 3, 2)));
        assert!(!window.contains(date(2025, 3, 3)));
        assert!(!window.contains(date(2025, 1, 30)));

        let picks = window.quick_selections();
        assert_eq!(picks[0].date, date(2025, 1, 31));
        assert_eq!(picks[1].date, date(2025, 2, 7));
        assert_eq!(picks[2].label, "Next Month");
        assert_eq!(picks[2].date, date(2025, 2, 28));
    }
}
