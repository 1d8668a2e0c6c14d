//! Validation rules over extracted fields.
//!
//! Each rule inspects the parsed fields on its own and emits at most one
//! flag. The rule set evaluates them in a fixed order, which is also the
//! order flags are stored and displayed in.

pub mod builtin;

use crate::model::{Flag, ParsedFields};

pub use builtin::{
    BatchMissing, IngredientMissing, LabMissing, LabNotRecognized, ReportDateMissing,
    ReportDateUnparseable,
};

/// A single validation check.
pub trait Rule: Send + Sync {
    /// Stable flag code emitted by this rule.
    fn code(&self) -> &'static str;

    fn evaluate(&self, fields: &ParsedFields) -> Option<Flag>;
}

pub struct RuleSet {
    rules: Vec<Box<dyn Rule>>,
}

impl RuleSet {
    pub fn new(rules: Vec<Box<dyn Rule>>) -> Self {
        Self { rules }
    }

    /// The standard COA rules. `known_labs` enables the lab allow-list check
    /// when non-empty.
    pub fn standard(known_labs: &[String]) -> Self {
        let mut rules: Vec<Box<dyn Rule>> = vec![
            Box::new(BatchMissing),
            Box::new(ReportDateMissing),
            Box::new(LabMissing),
            Box::new(IngredientMissing),
            Box::new(ReportDateUnparseable),
        ];
        if !known_labs.is_empty() {
            rules.push(Box::new(LabNotRecognized::new(known_labs)));
        }
        Self { rules }
    }

    pub fn evaluate(&self, fields: &ParsedFields) -> Vec<Flag> {
        self.rules
            .iter()
            .filter_map(|rule| rule.evaluate(fields))
            .collect()
    }

    pub fn codes(&self) -> Vec<&'static str> {
        self.rules.iter().map(|r| r.code()).collect()
    }
}
