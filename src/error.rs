use thiserror::Error;

/// Where an engine-reported failure happened relative to statement acceptance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnginePhase {
    /// The engine rejected the statement before running it (parse, bind, plan).
    Prepare,
    /// The engine accepted the statement and failed while running it.
    Execute,
}

impl std::fmt::Display for EnginePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EnginePhase::Prepare => f.write_str("prepare"),
            EnginePhase::Execute => f.write_str("execute"),
        }
    }
}

#[derive(Debug, Error)]
pub enum BridgeError {
    #[cfg(feature = "sqlite")]
    #[error(transparent)]
    SqliteError(#[from] rusqlite::Error),

    #[error("{0} was closed")]
    Closed(&'static str),

    #[error("Statement has a pending batch; run it with execute_batch or clear it first")]
    PendingBatch,

    #[error("Usage error: {0}")]
    Usage(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Engine error during {phase}: {message}")]
    Engine { phase: EnginePhase, message: String },

    #[error("Batch entry {index} failed: {source}")]
    Batch {
        index: usize,
        #[source]
        source: Box<BridgeError>,
    },

    #[error("Execution aborted: {0}")]
    Aborted(String),

    #[error("Conversion error: {0}")]
    Conversion(String),

    #[error("Connection error: {0}")]
    ConnectionError(String),
}

impl BridgeError {
    pub(crate) fn execute(message: impl Into<String>) -> Self {
        BridgeError::Engine {
            phase: EnginePhase::Execute,
            message: message.into(),
        }
    }

    /// True when the error reports access to an already closed handle.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        matches!(self, BridgeError::Closed(_))
    }

    /// True when a concurrent cancel or close aborted the call, including a batch entry that
    /// was aborted.
    #[must_use]
    pub fn is_aborted(&self) -> bool {
        match self {
            BridgeError::Aborted(_) => true,
            BridgeError::Batch { source, .. } => source.is_aborted(),
            _ => false,
        }
    }

    /// True for locally detected misuse that never reached the engine.
    #[must_use]
    pub fn is_usage(&self) -> bool {
        matches!(
            self,
            BridgeError::Closed(_)
                | BridgeError::PendingBatch
                | BridgeError::Usage(_)
                | BridgeError::Config(_)
        )
    }

    /// Index of the failing entry when this error came out of `execute_batch`.
    #[must_use]
    pub fn batch_index(&self) -> Option<usize> {
        if let BridgeError::Batch { index, .. } = self {
            Some(*index)
        } else {
            None
        }
    }

    /// Engine phase, if the engine produced this error.
    #[must_use]
    pub fn engine_phase(&self) -> Option<EnginePhase> {
        match self {
            BridgeError::Engine { phase, .. } => Some(*phase),
            BridgeError::Batch { source, .. } => source.engine_phase(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_error_keeps_engine_message_and_index() {
        let err = BridgeError::Batch {
            index: 2,
            source: Box::new(BridgeError::execute("UNIQUE constraint failed: t.id")),
        };
        assert_eq!(err.batch_index(), Some(2));
        assert_eq!(err.engine_phase(), Some(EnginePhase::Execute));
        let text = err.to_string();
        assert!(text.contains("Batch entry 2 failed"));
        assert!(text.contains("UNIQUE constraint failed: t.id"));
        assert!(!err.is_usage());
    }

    #[test]
    fn aborted_is_distinct_from_engine_failure() {
        assert!(BridgeError::Aborted("interrupted".into()).is_aborted());
        assert!(!BridgeError::execute("boom").is_aborted());
        assert!(BridgeError::Closed("Statement").is_closed());
        assert!(BridgeError::PendingBatch.is_usage());
    }
}
