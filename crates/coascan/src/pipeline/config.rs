use crate::config::CoaConfig;

/// Settings the parser needs from the service configuration.
#[derive(Debug, Clone, Default)]
pub struct PipelineConfig {
    pub known_labs: Vec<String>,
}

impl PipelineConfig {
    pub fn from_config(config: &CoaConfig) -> Self {
        Self {
            known_labs: config.known_labs.clone(),
        }
    }
}
