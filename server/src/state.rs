use std::sync::Arc;

use secrecy::{ExposeSecret, SecretString};

use coascan::{
    CoaConfig, CoaError, Database, Dispatcher, DispatcherSettings, FsBlobStore, Intake, Parser,
    PipelineConfig, ResultLookup,
};

/// Shared handler state. Cloned per request.
#[derive(Clone)]
pub struct AppState {
    pub intake: Arc<Intake>,
    pub dispatcher: Arc<Dispatcher>,
    pub parser: Arc<Parser>,
    pub lookup: Arc<ResultLookup>,
    pub store: Arc<FsBlobStore>,
    pub worker_secret: Arc<SecretString>,
    pub upload_key: Arc<SecretString>,
}

impl AppState {
    /// Opens the database, resolves both shared secrets and wires every
    /// component from `config`.
    pub fn from_config(config: &CoaConfig) -> Result<Self, CoaError> {
        let db_path = config.database_path().ok_or_else(|| {
            coascan::ConfigError::Validation {
                message: "no databasePath configured and no home directory".to_string(),
            }
        })?;
        let storage_root = config.storage_root().ok_or_else(|| {
            coascan::ConfigError::Validation {
                message: "no storageRoot configured and no home directory".to_string(),
            }
        })?;

        let worker_secret = config.worker_secret.resolve()?;
        let upload_key = config.upload_key.resolve()?;
        let db = Database::open(&db_path)?;

        Ok(Self::new(
            db,
            FsBlobStore::new(
                storage_root,
                &config.bucket,
                &config.public_base_url,
                SecretString::from(upload_key.expose_secret().to_string()),
            ),
            config,
            worker_secret,
            upload_key,
        ))
    }

    pub fn new(
        db: Database,
        store: FsBlobStore,
        config: &CoaConfig,
        worker_secret: SecretString,
        upload_key: SecretString,
    ) -> Self {
        let store = Arc::new(store);
        let parser = Arc::new(Parser::from_config(
            &PipelineConfig::from_config(config),
            db.clone(),
            store.clone(),
        ));
        let dispatcher = Dispatcher::new(
            db.clone(),
            parser.clone(),
            DispatcherSettings::from_config(config),
        );

        Self {
            intake: Arc::new(Intake::new(db.clone(), store.clone())),
            dispatcher: Arc::new(dispatcher),
            parser,
            lookup: Arc::new(ResultLookup::new(db)),
            store,
            worker_secret: Arc::new(worker_secret),
            upload_key: Arc::new(upload_key),
        }
    }
}
