//! Isolated environment for pipeline integration tests.

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;

use secrecy::SecretString;
use tempfile::TempDir;

use coascan::db::submission_repo;
use coascan::{
    Database, Dispatcher, DispatcherSettings, FsBlobStore, Intake, Parser, PipelineConfig,
    Registration, ResultLookup, Submission,
};

pub const BUCKET: &str = "coa_uploads";
pub const UPLOAD_KEY: &str = "test-upload-key";

pub struct TestHarness {
    temp_dir: TempDir,
    pub db_path: PathBuf,
    pub db: Database,
    pub store: Arc<FsBlobStore>,
    pub intake: Intake,
    pub parser: Arc<Parser>,
    pub lookup: ResultLookup,
}

impl TestHarness {
    pub fn new() -> Self {
        Self::with_pipeline_config(PipelineConfig::default())
    }

    pub fn with_pipeline_config(config: PipelineConfig) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let db_path = temp_dir.path().join("data").join("coascan.db");
        let db = Database::open(&db_path).expect("Failed to open database");
        let store = Arc::new(FsBlobStore::new(
            temp_dir.path().join("blobs"),
            BUCKET,
            "http://localhost:8080",
            SecretString::from(UPLOAD_KEY.to_string()),
        ));
        let intake = Intake::new(db.clone(), store.clone());
        let parser = Arc::new(Parser::from_config(&config, db.clone(), store.clone()));
        let lookup = ResultLookup::new(db.clone());

        Self {
            temp_dir,
            db_path,
            db,
            store,
            intake,
            parser,
            lookup,
        }
    }

    /// Second, independent connection to the same database file.
    pub fn open_second_handle(&self) -> Database {
        Database::open(&self.db_path).expect("Failed to open second handle")
    }

    pub fn dispatcher(&self, settings: DispatcherSettings) -> Dispatcher {
        Dispatcher::new(self.db.clone(), self.parser.clone(), settings)
    }

    /// Registers an upload and writes the bytes where the upload target
    /// points, as a client would.
    pub fn upload(&self, filename: &str, mime: &str, bytes: &[u8]) -> Registration {
        let reg = self
            .intake
            .register(filename, Some(mime))
            .expect("register failed");
        let key = self.submission(&reg.submission_id).file_path;
        coascan::BlobStore::put(self.store.as_ref(), &key, bytes).expect("upload failed");
        reg
    }

    /// Registers, uploads and submits in one go.
    pub fn upload_and_submit(&self, filename: &str, mime: &str, bytes: &[u8]) -> Registration {
        let reg = self.upload(filename, mime, bytes);
        self.intake
            .submit(&reg.submission_id)
            .expect("submit failed");
        reg
    }

    /// Registers and submits without uploading anything, so every parse
    /// attempt fails at download.
    pub fn submit_without_upload(&self, filename: &str) -> Registration {
        let reg = self
            .intake
            .register(filename, None)
            .expect("register failed");
        self.intake
            .submit(&reg.submission_id)
            .expect("submit failed");
        reg
    }

    pub fn submission(&self, id: &str) -> Submission {
        submission_repo::find_by_id(&self.db, id)
            .expect("query failed")
            .expect("submission missing")
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}
