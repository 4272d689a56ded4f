//! Engine shell error types (§4.1, §7).

use detjs_core::{ErrorKind, ManifestError};

/// Top-level error type for the engine crate. Distinct from
/// `ErrorKind`, which is the stable discriminant carried in an
/// `EvalOutcome::Err` — `EngineError` is the Rust-side failure a
/// `Runtime` method itself can return (init failures, internal
/// invariant violations), not a per-`eval` JS outcome.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The embedded engine raised an error compiling or running script
    /// (syntax error, thrown exception escaping a context we expected
    /// to be infallible, engine-internal failure).
    #[error("js engine error: {0}")]
    Js(#[from] anyhow::Error),

    /// `init_deterministic`'s manifest hash check failed (§4.1
    /// "Manifest pinning", S8). The runtime is left unusable.
    #[error("manifest hash mismatch: expected {expected}, computed {computed}")]
    ManifestHashMismatch { expected: String, computed: String },

    /// The manifest itself failed validation (§4.4) before a hash was
    /// even computed.
    #[error("manifest validation error: {0}")]
    Manifest(#[from] ManifestError),

    /// A method was called before `init_deterministic`, or after a
    /// prior `init_deterministic` failed (§4.1 "Lifecycles").
    #[error("runtime not initialized")]
    NotInitialized,

    /// A method was called after `free`.
    #[error("runtime already freed")]
    AlreadyFreed,

    /// An invariant the dispatcher or codec is supposed to guarantee
    /// did not hold. Never expected; surfaced rather than silenced
    /// (§7 "Internal").
    #[error("internal invariant violation: {0}")]
    Internal(String),
}

impl EngineError {
    /// The `error.kind` this failure would carry if surfaced through
    /// `EvalOutcome` rather than returned directly from a `Runtime`
    /// method (used by `init_deterministic`, which synthesizes a
    /// top-level `Err` outcome on its first subsequent operation per
    /// §7 "ManifestError").
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::Js(_) => ErrorKind::JsError,
            EngineError::ManifestHashMismatch { .. } | EngineError::Manifest(_) => {
                ErrorKind::ManifestError
            }
            EngineError::NotInitialized | EngineError::AlreadyFreed | EngineError::Internal(_) => {
                ErrorKind::Internal
            }
        }
    }
}
