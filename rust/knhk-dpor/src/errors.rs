//! Error taxonomy (§7), grounded in `knhk-byzantine::errors::ByzantineError`'s
//! shape: one variant per failure mode plus small classification helpers.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, EngineError>;

#[derive(Error, Debug)]
pub enum EngineError {
    /// A driver invariant was violated (§3 Invariants). Unreachable in a
    /// correct implementation; fatal when it happens.
    #[error("invariant violated: {detail}")]
    Invariant { detail: String },

    /// The `invariant` replay queue expected `(earlier, later)` to fire and
    /// at least one id never did. Recoverable; routed through
    /// [`crate::config::DivergencePolicy`].
    #[error("replay divergence: expected ids {expected:?} did not all fire")]
    ReplayDivergence { expected: Vec<u64> },

    #[error("unknown external event: {kind}")]
    UnknownExternalEvent { kind: String },

    #[error("unknown actor: {name}")]
    UnknownActor { name: String },

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("config parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("runtime error: {0}")]
    Runtime(String),
}

impl EngineError {
    /// Fatal errors halt the search; everything else is recoverable.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            EngineError::Invariant { .. } | EngineError::UnknownExternalEvent { .. }
        )
    }

    pub fn is_recoverable(&self) -> bool {
        !self.is_fatal()
    }
}

#[derive(Error, Debug)]
pub enum MinimizerError {
    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("oracle produced no trace for the original externals")]
    OriginalNotReproduced,
}
