use thiserror::Error;

use crate::app::{BuildError, GraphError};
use crate::config::ConfigError;
use crate::impls::SnapshotError;

/// Everything that stops a run before (or around) task execution.
///
/// Task-level failures are not errors here; they end up in the `RunReport`.
#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    Build(#[from] BuildError),

    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
}
