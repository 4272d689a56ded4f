//! `detjs-host` — the engine-agnostic half of the host-call dispatcher
//! (C5): argument/response validation against the manifest, the
//! two-phase gas charge, the reentrancy guard, and the bounded audit
//! tape. Nothing here depends on a JS engine; `detjs-engine` supplies
//! the JS-specific glue (coercing JS values to `Dv`, installing
//! `Host.v1.<path>` closures, translating a `DispatchOutcome` into a JS
//! return value or exception).

pub mod dispatch;
pub mod error;
pub mod tape;
pub mod traits;

pub use dispatch::{DispatchOutcome, HostDispatcher};
pub use error::SynthesizedError;
pub use tape::TapeBuffer;
pub use traits::{HostHandlers, NullHandlers};
