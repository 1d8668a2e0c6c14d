//! Labelled-field extraction from COA text.
//!
//! Each field is looked up independently. A field may have several patterns;
//! they are tried in order and the first match wins. Captured values are
//! trimmed and empty captures count as absent.

use regex::{Regex, RegexBuilder};

use crate::model::ParsedFields;

const INGREDIENT_PATTERNS: &[&str] = &[r"Ingredient\s*:\s*(.+)"];
const BATCH_LOT_PATTERNS: &[&str] = &[r"(?:Batch|Lot)\s*#?\s*:\s*([A-Z0-9\-]+)"];
const LAB_NAME_PATTERNS: &[&str] = &[r"Laboratory\s*:\s*(.+)", r"Lab Name\s*:\s*(.+)"];
const REPORT_DATE_PATTERNS: &[&str] = &[
    r"(?:Report|Issued)\s*Date\s*:\s*(\d{4}[/-]\d{1,2}[/-]\d{1,2}|\d{1,2}[/-]\d{1,2}[/-]\d{2,4})",
];

pub struct FieldExtractor {
    ingredient: Vec<Regex>,
    batch_lot: Vec<Regex>,
    lab_name: Vec<Regex>,
    report_date: Vec<Regex>,
}

fn compile(patterns: &[&str]) -> Vec<Regex> {
    patterns
        .iter()
        .filter_map(|p| {
            RegexBuilder::new(p)
                .case_insensitive(true)
                .build()
                .map_err(|e| tracing::error!(pattern = *p, error = %e, "Invalid field pattern"))
                .ok()
        })
        .collect()
}

fn first_match(patterns: &[Regex], text: &str) -> Option<String> {
    patterns.iter().find_map(|regex| {
        regex
            .captures(text)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().trim().to_string())
            .filter(|value| !value.is_empty())
    })
}

impl FieldExtractor {
    pub fn new() -> Self {
        Self {
            ingredient: compile(INGREDIENT_PATTERNS),
            batch_lot: compile(BATCH_LOT_PATTERNS),
            lab_name: compile(LAB_NAME_PATTERNS),
            report_date: compile(REPORT_DATE_PATTERNS),
        }
    }

    pub fn extract(&self, text: &str) -> ParsedFields {
        ParsedFields {
            ingredient: first_match(&self.ingredient, text),
            batch_lot: first_match(&self.batch_lot, text),
            lab_name: first_match(&self.lab_name, text),
            report_date: first_match(&self.report_date, text),
        }
    }
}

impl Default for FieldExtractor {
    fn default() -> Self {
        Self::new()
    }
}
