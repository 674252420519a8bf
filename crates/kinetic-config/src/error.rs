//! Errors raised while loading or persisting movement tuning.

use std::path::PathBuf;

/// Why a `config.ron` could not be used.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid RON for [`Config`](crate::Config).
    #[error("malformed tuning in {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: ron::error::SpannedError,
    },

    #[error("cannot encode tuning as RON: {0}")]
    Encode(#[source] ron::Error),

    /// A value parsed but would break the simulation or the link.
    #[error("{field} {reason}")]
    OutOfRange {
        field: &'static str,
        reason: &'static str,
    },
}

impl ConfigError {
    pub(crate) fn out_of_range(field: &'static str, reason: &'static str) -> Self {
        Self::OutOfRange { field, reason }
    }
}
