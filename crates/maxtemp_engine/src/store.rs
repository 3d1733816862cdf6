use maxtemp_core::{Dataset, SchemaError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    /// The backend could not be read or written.
    #[error("{target} unavailable: {message}")]
    Unavailable { target: String, message: String },
    /// The backend answered with something that is not a table.
    #[error("{target} returned malformed data: {message}")]
    Malformed { target: String, message: String },
    /// The stored table violates the dataset layout.
    #[error("{target} holds an invalid table: {source}")]
    InvalidLayout {
        target: String,
        #[source]
        source: SchemaError,
    },
}

/// Full-state storage for the dataset: `load` everything, `save` everything.
#[async_trait::async_trait]
pub trait DatasetStore: Send + Sync {
    /// Reads the persisted dataset, or an empty one if nothing was stored yet.
    async fn load(&self) -> Result<Dataset, StoreError>;

    /// Replaces the persisted dataset with `dataset`.
    async fn save(&self, dataset: &Dataset) -> Result<(), StoreError>;

    /// Where this store keeps its data, for logs.
    fn describe(&self) -> String;
}
