use chrono::NaiveDate;
use serde_json::json;

use super::Rule;
use crate::model::{Flag, ParsedFields};

pub struct BatchMissing;

impl Rule for BatchMissing {
    fn code(&self) -> &'static str {
        "BATCH_MISSING"
    }

    fn evaluate(&self, fields: &ParsedFields) -> Option<Flag> {
        fields
            .batch_lot
            .is_none()
            .then(|| Flag::new(self.code(), 3, "Batch/Lot number not found"))
    }
}

pub struct ReportDateMissing;

impl Rule for ReportDateMissing {
    fn code(&self) -> &'static str {
        "REPORT_DATE_MISSING"
    }

    fn evaluate(&self, fields: &ParsedFields) -> Option<Flag> {
        fields
            .report_date
            .is_none()
            .then(|| Flag::new(self.code(), 2, "Report date not found"))
    }
}

pub struct LabMissing;

impl Rule for LabMissing {
    fn code(&self) -> &'static str {
        "LAB_MISSING"
    }

    fn evaluate(&self, fields: &ParsedFields) -> Option<Flag> {
        fields
            .lab_name
            .is_none()
            .then(|| Flag::new(self.code(), 2, "Lab name not found"))
    }
}

pub struct IngredientMissing;

impl Rule for IngredientMissing {
    fn code(&self) -> &'static str {
        "INGREDIENT_MISSING"
    }

    fn evaluate(&self, fields: &ParsedFields) -> Option<Flag> {
        fields
            .ingredient
            .is_none()
            .then(|| Flag::new(self.code(), 1, "Ingredient name not found"))
    }
}

const YEAR_FIRST: &[&str] = &["%Y-%m-%d", "%Y/%m/%d"];
const FULL_YEAR_LAST: &[&str] = &["%m/%d/%Y", "%m-%d-%Y", "%d/%m/%Y", "%d-%m-%Y"];
const SHORT_YEAR_LAST: &[&str] = &["%m/%d/%y", "%m-%d-%y", "%d/%m/%y", "%d-%m-%y"];

/// Parses a captured report date. Month-first is preferred over day-first
/// when both read as a valid date. The year must have two or four digits.
pub fn parse_report_date(value: &str) -> Option<NaiveDate> {
    let parts: Vec<&str> = value.split(['/', '-']).collect();
    let [first, _, last] = parts.as_slice() else {
        return None;
    };
    let formats = match (first.len(), last.len()) {
        (4, _) => YEAR_FIRST,
        (_, 4) => FULL_YEAR_LAST,
        (_, 2) => SHORT_YEAR_LAST,
        _ => return None,
    };
    formats
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(value, fmt).ok())
}

/// A report date was captured but names no real calendar day (`2024-13-45`).
pub struct ReportDateUnparseable;

impl Rule for ReportDateUnparseable {
    fn code(&self) -> &'static str {
        "REPORT_DATE_UNPARSEABLE"
    }

    fn evaluate(&self, fields: &ParsedFields) -> Option<Flag> {
        let value = fields.report_date.as_deref()?;
        if parse_report_date(value).is_some() {
            return None;
        }
        Some(
            Flag::new(self.code(), 2, "Report date is not a valid calendar date")
                .with_details(json!({ "value": value })),
        )
    }
}

/// The lab name matches none of the configured labs (case-insensitive
/// substring match).
pub struct LabNotRecognized {
    known: Vec<String>,
}

impl LabNotRecognized {
    pub fn new(known_labs: &[String]) -> Self {
        Self {
            known: known_labs
                .iter()
                .map(|lab| lab.trim().to_lowercase())
                .filter(|lab| !lab.is_empty())
                .collect(),
        }
    }
}

impl Rule for LabNotRecognized {
    fn code(&self) -> &'static str {
        "LAB_NOT_RECOGNIZED"
    }

    fn evaluate(&self, fields: &ParsedFields) -> Option<Flag> {
        let lab = fields.lab_name.as_deref()?;
        let normalized = lab.to_lowercase();
        if self.known.iter().any(|known| normalized.contains(known.as_str())) {
            return None;
        }
        Some(
            Flag::new(self.code(), 1, "Lab is not on the recognized list")
                .with_details(json!({ "lab": lab })),
        )
    }
}
