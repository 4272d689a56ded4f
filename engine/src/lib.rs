//! `detjs-engine` — the rquickjs-backed engine shell (C4) for the DETJS
//! runtime: determinism profile installation, gas-hook wiring, the
//! `Host.v1` bridge into a `HostDispatcher`, and the eval loop.
//!
//! The primary entry point is [`new_runtime`], which returns a
//! `(Runtime, Context)` pair per the data model's lifecycle rules —
//! `Runtime` owns the embedded engine's heap, `Context` owns the
//! per-evaluation gas/tape/trace state and must be initialized with
//! `Context::init_deterministic` before `Context::eval` can run.

mod config;
mod determinism;
mod error;
mod gas_hooks;
mod host_bridge;
mod runtime;
mod shims;
mod surfacer;
mod value;

pub use config::EngineConfig;
pub use error::EngineError;
pub use runtime::{new_runtime, Context, Runtime};

pub use detjs_core::{
    decode, encode, Dv, DvLimits, ErrorInfo, ErrorKind, EvalOutcome, GasTrace, HostTapeRecord,
    Input, Manifest, Program,
};
pub use detjs_host::{HostHandlers, NullHandlers};
