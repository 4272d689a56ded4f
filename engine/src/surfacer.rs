//! The result surfacer (C6, §4.6): maps one evaluation's outcome to the
//! stable `EvalOutcome` tagged union plus the raw grammar line goldens
//! pin against.

use rquickjs::Ctx;

use detjs_core::{
    encode, raw_error_line, raw_result_line, Dv, DvLimits, ErrorInfo, ErrorKind, EvalOutcome,
    GasTrace, HostTapeRecord,
};

use crate::error::EngineError;

/// Build the `Ok` outcome from a DV-encodable completion value.
pub fn ok(
    dv: Dv,
    limits: &DvLimits,
    gas_used: u64,
    gas_remaining: u64,
    tape: Option<Vec<HostTapeRecord>>,
    trace: Option<GasTrace>,
) -> Result<EvalOutcome, EngineError> {
    let bytes = encode(&dv, limits).map_err(|e| EngineError::Internal(e.to_string()))?;
    let hex = hex_lower(&bytes);
    // `decode(encode(v)) == v` (§4.3 round-trip law); re-decoding here
    // would be redundant work the caller never observes, so `bytes` is
    // trusted directly for the raw line rather than round-tripped again.
    let raw = raw_result_line(&hex, gas_remaining, gas_used);
    Ok(EvalOutcome::Ok {
        value: dv,
        raw,
        gas_used,
        gas_remaining,
        tape,
        trace,
    })
}

/// Build an `Err` outcome from a classified JS-side failure (ordinary
/// exception, thrown `HostError`, or a non-DV-encodable completion
/// value).
pub fn err(
    info: ErrorInfo,
    message: String,
    gas_used: u64,
    gas_remaining: u64,
    tape: Option<Vec<HostTapeRecord>>,
    trace: Option<GasTrace>,
) -> EvalOutcome {
    let raw = raw_error_line(&message, gas_remaining, gas_used);
    EvalOutcome::Err {
        error: info,
        message,
        raw,
        gas_used,
        gas_remaining,
        tape,
        trace,
    }
}

/// Shorthand for an ordinary `JsError` outcome (non-DV-encodable
/// completion value, or a plain thrown exception not recognized as a
/// `HostError`).
pub fn js_error(
    message: String,
    gas_used: u64,
    gas_remaining: u64,
    tape: Option<Vec<HostTapeRecord>>,
    trace: Option<GasTrace>,
) -> EvalOutcome {
    err(
        ErrorInfo {
            kind: ErrorKind::JsError,
            code: None,
            tag: None,
        },
        message,
        gas_used,
        gas_remaining,
        tape,
        trace,
    )
}

/// The fixed-message uncatchable `OutOfGas` outcome (§4.2, §7).
pub fn out_of_gas(
    gas_used: u64,
    gas_remaining: u64,
    tape: Option<Vec<HostTapeRecord>>,
    trace: Option<GasTrace>,
) -> EvalOutcome {
    err(
        ErrorInfo {
            kind: ErrorKind::OutOfGas,
            code: None,
            tag: None,
        },
        "out of gas".to_string(),
        gas_used,
        gas_remaining,
        tape,
        trace,
    )
}

/// Inspect whatever value JS threw and classify it: a `HostError`
/// object (shape `{name: "HostError", code, tag?, details?}`, §4.5 step
/// 9) surfaces with `ErrorKind::HostError` and the carried code/tag;
/// everything else surfaces as `ErrorKind::JsError` with a best-effort
/// message.
pub fn classify_thrown(ctx: &Ctx<'_>, thrown: &rquickjs::Value<'_>) -> (ErrorInfo, String) {
    if let Some(obj) = thrown.as_object() {
        let name: Option<String> = obj.get("name").ok();
        if name.as_deref() == Some("HostError") {
            let code: Option<String> = obj.get("code").ok();
            let tag: Option<String> = obj.get("tag").ok();
            let message = format!(
                "HostError: {}",
                code.clone().unwrap_or_else(|| "UNKNOWN".to_string())
            );
            return (
                ErrorInfo {
                    kind: ErrorKind::HostError,
                    code,
                    tag,
                },
                message,
            );
        }
        if let Ok(message) = obj.get::<_, String>("message") {
            let _ = ctx;
            return (
                ErrorInfo {
                    kind: ErrorKind::JsError,
                    code: None,
                    tag: None,
                },
                message,
            );
        }
    }
    if let Some(s) = thrown.as_string() {
        let message = s.to_string().unwrap_or_default();
        return (
            ErrorInfo {
                kind: ErrorKind::JsError,
                code: None,
                tag: None,
            },
            message,
        );
    }
    (
        ErrorInfo {
            kind: ErrorKind::JsError,
            code: None,
            tag: None,
        },
        "uncaught exception".to_string(),
    )
}

fn hex_lower(bytes: &[u8]) -> String {
    let mut s = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        s.push_str(&format!("{b:02x}"));
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;
    use detjs_core::DvLimits;

    #[test]
    fn ok_outcome_builds_raw_line() {
        let outcome = ok(Dv::Int(3), &DvLimits::default(), 132, 22, None, None).unwrap();
        match outcome {
            EvalOutcome::Ok { raw, gas_used, gas_remaining, .. } => {
                assert_eq!(gas_used, 132);
                assert_eq!(gas_remaining, 22);
                assert!(raw.starts_with("RESULT "));
                assert!(raw.ends_with("GAS remaining=22 used=132"));
            }
            _ => panic!("expected Ok"),
        }
    }

    #[test]
    fn out_of_gas_outcome_has_fixed_message() {
        let outcome = out_of_gas(147, 0, None, None);
        match outcome {
            EvalOutcome::Err { error, message, .. } => {
                assert_eq!(error.kind, ErrorKind::OutOfGas);
                assert_eq!(message, "out of gas");
            }
            _ => panic!("expected Err"),
        }
    }
}
