//! The host-side function contract — the mirror of the engine's
//! `Host.v1.<path>` closures.
//!
//! An implementor gets exactly one entry point, keyed by `fn_id`, rather
//! than a fixed set of named methods: the manifest — not this trait —
//! is what enumerates the capability surface, so adding a function never
//! requires touching the trait. Gas, argument-shape, and envelope-shape
//! checking all happen in `HostDispatcher` before and after this is
//! called; implementors only need to produce a result.

use detjs_core::{Dv, HostResponseEnvelope};

/// Implemented once per embedding (a "document store" demo host, a test
/// double, …) and handed to a `HostDispatcher` at runtime construction.
///
/// A panic inside `call` is caught by the dispatcher and turned into
/// `HostError{HOST_TRANSPORT}` — implementors do not need to guard
/// against unwinding themselves.
pub trait HostHandlers {
    /// Handle one call to `fn_id` with already arity/type-checked
    /// arguments. Returning `HostResponseEnvelope::Err` is how a handler
    /// reports an ordinary, catchable failure (a declared error code);
    /// it should not panic for that.
    fn call(&mut self, fn_id: u32, args: &[Dv]) -> HostResponseEnvelope;
}

/// A `HostHandlers` that answers every call with `HOST_TRANSPORT`,
/// useful as a placeholder before real capabilities are wired up and in
/// tests that only exercise the manifest/gas/tape machinery.
#[derive(Debug, Default)]
pub struct NullHandlers;

impl HostHandlers for NullHandlers {
    fn call(&mut self, _fn_id: u32, _args: &[Dv]) -> HostResponseEnvelope {
        HostResponseEnvelope::Err {
            code: detjs_core::RESERVED_CODE_HOST_TRANSPORT.to_string(),
            tag: Some("host/transport".to_string()),
            details: None,
            units: 0,
        }
    }
}
