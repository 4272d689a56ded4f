//! `detjs-core` — the Deterministic Value codec, ABI manifest, gas
//! accounting, and shared error taxonomy for the DETJS runtime.
//!
//! Nothing here knows about a JS engine or a syscall boundary; those
//! live in `detjs-host` (the engine-agnostic dispatcher half) and
//! `detjs-engine` (the concrete engine shell). This crate is the part
//! both of them, and any embedder, can share without depending on a JS
//! runtime at all.

pub mod dv;
pub mod error;
pub mod gas;
pub mod manifest;
pub mod types;

pub use dv::{decode, encode, Dv, DvError, DvLimits, DvResult};
pub use error::{
    ErrorKind, RESERVED_CODE_HOST_ENVELOPE_INVALID, RESERVED_CODE_HOST_TRANSPORT,
    SYNTHETIC_CODE_LIMIT_EXCEEDED,
};
pub use gas::{GasAccountant, GasOverflow, GasTrace, OutOfGas, UNLIMITED};
pub use manifest::{ArgType, Effect, ErrorCodeEntry, FunctionEntry, GasParams, Limits, Manifest, ManifestError};
pub use types::{
    raw_error_line, raw_result_line, sha256_bytes, tape_hash_hex, ErrorInfo, EvalOutcome,
    HostResponseEnvelope, HostTapeRecord, Input, Program,
};
