use miette::{Diagnostic, LabeledSpan, NamedSource};

#[macro_export]
macro_rules! backtrace {
    ($trace:expr) => {
        if cfg!(debug_assertions) {
            let printer = color_backtrace::BacktracePrinter::new()
                .lib_verbosity(color_backtrace::Verbosity::Full);
            let str = printer.format_trace_to_string(&$trace).unwrap();
            Some(format!("{}", str))
        } else {
            None
        }
    };
}

/// Errors surfaced by spec parsing, graph analysis and instantiation.
///
/// `LockUnavailable` is never returned from a public API; it is an
/// internal signal the concurrency controller always catches. It still
/// lives on this enum (rather than a private sibling type) because
/// compiled containers need to name it too, the same way compiled code
/// in the reference implementation needs `LockUnavailableError`.
#[derive(thiserror::Error, Diagnostic, Debug)]
pub enum WiringError {
    #[error("malformed spec key `{key}`: {reason}")]
    #[diagnostic(code(wireframe::error::malformed_key))]
    MalformedKey {
        #[source_code]
        src: NamedSource<String>,
        #[label(collection)]
        span: Vec<LabeledSpan>,
        reason: String,
        key: String,
    },

    #[error("`{name}` references unknown entry `{placeholder}`")]
    #[diagnostic(code(wireframe::error::unknown_placeholder))]
    UnknownPlaceholder { name: String, placeholder: String },

    #[error("circular wiring detected: {}", path.join(" -> "))]
    #[diagnostic(code(wireframe::error::circular_wiring))]
    CircularWiring { path: Vec<String> },

    #[error("partial construction of `{name}` failed: {reason}")]
    #[diagnostic(code(wireframe::error::partial_construction))]
    PartialConstruction {
        name: String,
        reason: String,
        #[source]
        cause: Option<Box<WiringError>>,
    },

    /// Internal-only: per-entry lock was busy, caller should fall back
    /// to global mode. Never returned to a library caller.
    #[error("lock for `{name}` is unavailable")]
    #[diagnostic(code(wireframe::error::lock_unavailable))]
    LockUnavailable { name: String },

    #[error("failed to instantiate `{name}`")]
    #[diagnostic(code(wireframe::error::wiring))]
    Wiring {
        name: String,
        #[source]
        cause: Box<dyn std::error::Error + Send + Sync>,
        #[help]
        backtrace: Option<String>,
    },

    #[error("no entry named `{name}`")]
    #[diagnostic(code(wireframe::error::unknown_attribute))]
    UnknownAttribute { name: String },
}

impl WiringError {
    pub fn wiring(
        name: impl Into<String>,
        cause: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        let trace = backtrace::Backtrace::new();
        WiringError::Wiring {
            name: name.into(),
            cause: Box::new(cause),
            backtrace: backtrace!(trace),
        }
    }
}
