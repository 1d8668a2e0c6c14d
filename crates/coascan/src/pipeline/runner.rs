use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, info_span, warn};

use crate::db::{result_repo, submission_repo, Database};
use crate::extract::{is_usable_text, ExtractorRegistry};
use crate::fields::FieldExtractor;
use crate::model::SubmissionStatus;
use crate::rules::RuleSet;
use crate::sanitize;
use crate::scoring;
use crate::storage::BlobStore;

use super::config::PipelineConfig;
use super::context::{ParseContext, ParseOutcome};
use super::error::{ParseError, PipelineWarning};
use super::SubmissionParser;

pub struct Parser {
    db: Database,
    store: Arc<dyn BlobStore>,
    extractors: ExtractorRegistry,
    fields: FieldExtractor,
    rules: RuleSet,
}

impl Parser {
    /// Builds every step component from config.
    pub fn from_config(config: &PipelineConfig, db: Database, store: Arc<dyn BlobStore>) -> Self {
        Self {
            db,
            store,
            extractors: ExtractorRegistry::new(),
            fields: FieldExtractor::new(),
            rules: RuleSet::standard(&config.known_labs),
        }
    }

    /// Constructor with an explicit rule set.
    pub fn with_rules(db: Database, store: Arc<dyn BlobStore>, rules: RuleSet) -> Self {
        Self {
            db,
            store,
            extractors: ExtractorRegistry::new(),
            fields: FieldExtractor::new(),
            rules,
        }
    }

    /// Runs every step for one submission. Steps run strictly in order and
    /// the submission is only marked done by the final persist step.
    pub fn run(&self, mut ctx: ParseContext) -> Result<ParseOutcome, ParseError> {
        let _parse_span = info_span!("parse", submission_id = %ctx.submission_id).entered();

        // Step 1: Fetch submission
        {
            let _step = info_span!("fetch_submission").entered();
            self.step_fetch(&mut ctx)?;
        }

        // Step 2: Download raw document
        {
            let _step = info_span!("download").entered();
            self.step_download(&mut ctx)?;
        }

        // Step 3: Extract text
        {
            let _step = info_span!("extract_text").entered();
            self.step_extract_text(&mut ctx);
        }

        // Step 4: Extract fields
        {
            let _step = info_span!("extract_fields").entered();
            ctx.fields = self.fields.extract(&ctx.text);
        }

        // Step 5: Evaluate rules
        {
            let _step = info_span!("evaluate_rules").entered();
            ctx.flags = self.rules.evaluate(&ctx.fields);
            debug!(flags = ctx.flags.len(), "Rules evaluated");
        }

        // Step 6: Score
        ctx.trust_score = scoring::trust_score(&ctx.flags);

        // Step 7: Persist
        {
            let _step = info_span!("persist").entered();
            result_repo::save_result(
                &self.db,
                &ctx.submission_id,
                &ctx.fields,
                &ctx.flags,
                ctx.trust_score,
                Utc::now(),
            )?;
        }

        info!(
            trust_score = ctx.trust_score,
            flags = ctx.flags.len(),
            warnings = ctx.warnings.len(),
            "Submission parsed"
        );
        Ok(ctx.into_outcome())
    }

    fn step_fetch(&self, ctx: &mut ParseContext) -> Result<(), ParseError> {
        let submission = submission_repo::find_by_id(&self.db, &ctx.submission_id)?
            .ok_or_else(|| ParseError::NotFound(ctx.submission_id.clone()))?;
        if submission.status == SubmissionStatus::Failed {
            return Err(ParseError::SubmissionFailed(ctx.submission_id.clone()));
        }
        ctx.submission = Some(submission);
        Ok(())
    }

    fn step_download(&self, ctx: &mut ParseContext) -> Result<(), ParseError> {
        let Some(submission) = ctx.submission.as_ref() else {
            return Err(ParseError::NotFound(ctx.submission_id.clone()));
        };
        debug!(file = %sanitize::redact_key(&submission.file_path), "Downloading document");
        ctx.bytes = self
            .store
            .get(&submission.file_path)
            .map_err(ParseError::DownloadFailed)?;
        Ok(())
    }

    /// Never fails: unreadable documents leave the text empty so the rules
    /// flag every field as missing.
    fn step_extract_text(&self, ctx: &mut ParseContext) {
        let (mime, key) = match ctx.submission.as_ref() {
            Some(s) => (s.file_mime.as_str(), s.file_path.as_str()),
            None => ("", ""),
        };

        match self.extractors.extract(&ctx.bytes, mime, key) {
            Ok(text) if is_usable_text(&text) => ctx.text = text,
            Ok(_) => {
                warn!("Extracted text is empty or unreadable");
                ctx.warnings.push(PipelineWarning::UnusableText);
                ctx.text.clear();
            }
            Err(e) => {
                warn!(error = %e, "Text extraction failed");
                ctx.warnings.push(PipelineWarning::ExtractionFailed {
                    reason: e.to_string(),
                });
                ctx.text.clear();
            }
        }
    }
}

impl SubmissionParser for Parser {
    fn parse(&self, submission_id: &str) -> Result<ParseOutcome, ParseError> {
        self.run(ParseContext::new(submission_id))
    }
}
