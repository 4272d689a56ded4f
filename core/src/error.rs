//! The stable error taxonomy shared by every layer of the runtime (§7).
//!
//! `ErrorKind` is the discriminant the result surfacer (C6, in
//! `detjs-engine`) attaches to every failed evaluation. It lives here,
//! not in the engine crate, because the dispatcher (`detjs-host`) and
//! the manifest validator both need to name these kinds without
//! depending on the engine.

use core::fmt;

/// Stable discriminant for `error.kind` (§6 tape JSON, §7 taxonomy).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Uncatchable by JS; terminates the program with message `out of gas`.
    OutOfGas,
    /// Catchable; carries `{code, tag, details?}`.
    HostError,
    /// Init-time failure; the runtime is left unusable.
    ManifestError,
    /// Ordinary `TypeError`/`RangeError`/`SyntaxError` from user code or
    /// the determinism stubs.
    JsError,
    /// DV decoder failure while processing the final result.
    DecodeError,
    /// Internal name for what the host sees as `HOST_ENVELOPE_INVALID`.
    EnvelopeError,
    /// Invariant violation in the dispatcher or codec; never expected.
    Internal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::OutOfGas => "OutOfGas",
            ErrorKind::HostError => "HostError",
            ErrorKind::ManifestError => "ManifestError",
            ErrorKind::JsError => "JsError",
            ErrorKind::DecodeError => "DecodeError",
            ErrorKind::EnvelopeError => "EnvelopeError",
            ErrorKind::Internal => "Internal",
        };
        write!(f, "{s}")
    }
}

/// The two host-call error codes the manifest itself may never declare
/// (§3 manifest invariants, §4.5).
pub const RESERVED_CODE_HOST_TRANSPORT: &str = "HOST_TRANSPORT";
pub const RESERVED_CODE_HOST_ENVELOPE_INVALID: &str = "HOST_ENVELOPE_INVALID";
/// Synthesized by the dispatcher itself when an argument or request
/// exceeds a declared limit without ever reaching the handler (§4.5 step 2/3).
pub const SYNTHETIC_CODE_LIMIT_EXCEEDED: &str = "LIMIT_EXCEEDED";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_matches_json_tape_naming() {
        assert_eq!(ErrorKind::OutOfGas.to_string(), "OutOfGas");
        assert_eq!(ErrorKind::HostError.to_string(), "HostError");
        assert_eq!(ErrorKind::Internal.to_string(), "Internal");
    }
}
