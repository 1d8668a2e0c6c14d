pub mod config;
pub mod db;
pub mod dispatch;
pub mod error;
pub mod extract;
pub mod fields;
pub mod intake;
pub mod logging;
pub mod lookup;
pub mod model;
pub mod pipeline;
pub mod rules;
pub mod sanitize;
pub mod scoring;
pub mod secrets;
pub mod storage;

pub use config::{load_config, load_default_config, CoaConfig};
pub use db::{Database, DatabaseError};
pub use dispatch::{DispatchError, Dispatcher, DispatcherSettings, DrainSummary};
pub use error::{CoaError, ConfigError, ExtractError, Result, StorageError};
pub use extract::{DocumentFormat, ExtractorRegistry};
pub use fields::FieldExtractor;
pub use intake::{Intake, IntakeError, Registration};
pub use lookup::{LookupResult, ResultLookup};
pub use model::{Flag, Job, JobStatus, ParsedFields, Submission, SubmissionStatus};
pub use pipeline::{ParseError, ParseOutcome, Parser, PipelineConfig, SubmissionParser};
pub use rules::RuleSet;
pub use secrets::{generate_public_token, resolve_secret, SecretError, SecretRef};
pub use storage::{BlobStore, FsBlobStore, UploadTarget};
