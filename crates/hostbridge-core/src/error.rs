use thiserror::Error;

use crate::registry::HandlerId;

pub type BridgeResult<T> = Result<T, BridgeError>;

/// Bridge-wide error.
///
/// Nothing here is fatal to the process: the worst outcome of any variant is a
/// dropped event or a logged handler failure.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// The host calling context could not be obtained or attached.
    #[error("host bridge unavailable: {0}")]
    BridgeUnavailable(String),

    /// Targeted dispatch found no registered handler with this id.
    #[error("no registered handler {0}")]
    HandlerLookupMiss(HandlerId),

    #[error("handler [{handler}] failed: {source}")]
    HandlerDispatch {
        handler: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("handler [{handler}] panicked: {message}")]
    HandlerPanicked { handler: String, message: String },

    #[error("lifecycle misuse: {0}")]
    LifecycleMisuse(String),

    #[error("host call `{method}` failed: {reason}")]
    HostCall { method: String, reason: String },

    #[error("failed to spawn engine thread: {0}")]
    ThreadSpawn(#[from] std::io::Error),

    #[error("config error: {0}")]
    Config(String),
}

impl BridgeError {
    /// True for conditions that are dropped without a warning.
    #[inline]
    pub fn is_silent(&self) -> bool {
        matches!(self, BridgeError::HandlerLookupMiss(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::HandlerRegistry;
    use std::sync::Arc;

    struct Nop;

    impl crate::registry::EventHandler for Nop {
        fn dispatch(&self, _event: &crate::event::Event) -> anyhow::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn only_lookup_miss_is_silent() {
        let id = HandlerRegistry::new().register(Arc::new(Nop));
        assert!(BridgeError::HandlerLookupMiss(id).is_silent());
        assert!(!BridgeError::LifecycleMisuse("x".into()).is_silent());
        assert!(!BridgeError::HandlerPanicked {
            handler: "h".into(),
            message: "boom".into()
        }
        .is_silent());
    }
}
