//! Convenience constructors for the `HostResponseEnvelope::Err` values
//! the dispatcher synthesizes itself, without ever calling into
//! `HostHandlers` (§4.5 steps 2/3/6).

use detjs_core::{
    HostResponseEnvelope, RESERVED_CODE_HOST_ENVELOPE_INVALID, RESERVED_CODE_HOST_TRANSPORT,
    SYNTHETIC_CODE_LIMIT_EXCEEDED,
};

pub struct SynthesizedError;

impl SynthesizedError {
    /// A declared `string` argument exceeded its `arg_utf8_max`, or the
    /// whole request exceeded `max_request_bytes`. The handler is never
    /// called (§4.5 steps 2/3, S7).
    pub fn limit_exceeded() -> HostResponseEnvelope {
        HostResponseEnvelope::Err {
            code: SYNTHETIC_CODE_LIMIT_EXCEEDED.to_string(),
            tag: Some("host/limit_exceeded".to_string()),
            details: None,
            units: 0,
        }
    }

    /// Reentrancy violation, or a panic caught while running the
    /// handler (§4.5 step 5, §5 "Fault isolation").
    pub fn transport() -> HostResponseEnvelope {
        HostResponseEnvelope::Err {
            code: RESERVED_CODE_HOST_TRANSPORT.to_string(),
            tag: Some("host/transport".to_string()),
            details: None,
            units: 0,
        }
    }

    /// The handler's response did not decode/validate against the
    /// manifest (wrong shape, unknown error code, `units` over the
    /// limit, response too large) (§4.5 step 6).
    pub fn envelope_invalid() -> HostResponseEnvelope {
        HostResponseEnvelope::Err {
            code: RESERVED_CODE_HOST_ENVELOPE_INVALID.to_string(),
            tag: Some("host/envelope_invalid".to_string()),
            details: None,
            units: 0,
        }
    }
}
