use serde::Deserialize;

use crate::BatchError;

fn default_chunk_size() -> usize {
    10
}

/// Step configuration supplied at assembly time, typically from a JSON file.
///
/// ```
/// use spring_batch_core::core::settings::StepSettings;
///
/// let settings = StepSettings::from_json(r#"{ "chunk_size": 100, "skip_limit": 5 }"#).unwrap();
/// assert_eq!(settings.chunk_size, 100);
/// assert_eq!(settings.skip_limit, Some(5));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StepSettings {
    /// Commit interval.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Number of failed items tolerated; `None` escalates the first failure.
    #[serde(default)]
    pub skip_limit: Option<usize>,
}

impl Default for StepSettings {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            skip_limit: None,
        }
    }
}

impl StepSettings {
    pub fn from_json(json: &str) -> Result<Self, BatchError> {
        let settings: StepSettings = serde_json::from_str(json)
            .map_err(|error| BatchError::InvalidArgument(format!("invalid step settings: {}", error)))?;

        if settings.chunk_size == 0 {
            return Err(BatchError::InvalidArgument(
                "chunk_size must be greater than zero".to_string(),
            ));
        }
        Ok(settings)
    }
}
