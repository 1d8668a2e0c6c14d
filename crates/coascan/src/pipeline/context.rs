use crate::model::{Flag, ParsedFields, Submission};

use super::error::PipelineWarning;

/// State threaded through the parse steps.
pub struct ParseContext {
    // Input
    pub submission_id: String,

    // Step 1 result, Some after fetch
    pub submission: Option<Submission>,

    // Step 2 result
    pub bytes: Vec<u8>,

    // Step 3 result: empty when nothing usable could be extracted
    pub text: String,

    // Step 4 result
    pub fields: ParsedFields,

    // Step 5 result
    pub flags: Vec<Flag>,

    // Step 6 result
    pub trust_score: u8,

    // Non-fatal warnings
    pub warnings: Vec<PipelineWarning>,
}

impl ParseContext {
    pub fn new(submission_id: &str) -> Self {
        Self {
            submission_id: submission_id.to_string(),
            submission: None,
            bytes: Vec::new(),
            text: String::new(),
            fields: ParsedFields::default(),
            flags: Vec::new(),
            trust_score: 0,
            warnings: Vec::new(),
        }
    }

    pub fn into_outcome(self) -> ParseOutcome {
        ParseOutcome {
            submission_id: self.submission_id,
            fields: self.fields,
            flags: self.flags,
            trust_score: self.trust_score,
            warnings: self.warnings,
        }
    }
}

/// What a successful parse persisted.
#[derive(Debug, Clone)]
pub struct ParseOutcome {
    pub submission_id: String,
    pub fields: ParsedFields,
    pub flags: Vec<Flag>,
    pub trust_score: u8,
    pub warnings: Vec<PipelineWarning>,
}
