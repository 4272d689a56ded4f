//! The engine-agnostic half of the host dispatcher (§4.5): argument and
//! response validation, the two-phase gas charge, the reentrancy guard,
//! and the audit tape. Everything JS-specific — coercing a JS value
//! into a `Dv` in the first place, installing the frozen `Host.v1.<path>`
//! closure, throwing the right kind of JS exception — is the engine
//! shell's job; this module only ever sees `Dv`s.

use std::panic::{catch_unwind, AssertUnwindSafe};

use detjs_core::{
    decode, encode, sha256_bytes, ArgType, Dv, DvLimits, FunctionEntry, GasAccountant,
    HostResponseEnvelope, HostTapeRecord, OutOfGas,
};

use crate::error::SynthesizedError;
use crate::tape::TapeBuffer;
use crate::traits::HostHandlers;

/// What the dispatcher decided, handed back to the engine shell to
/// surface as a JS return value or a JS exception.
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    /// `ok` decoded and validated; this is the value `Host.v1.<path>()`
    /// returns to JS.
    Ok(Dv),
    /// A catchable `HostError` — either produced by the handler or
    /// synthesized by the dispatcher itself.
    HostError {
        code: String,
        tag: Option<String>,
        details: Option<Dv>,
    },
    /// Argument arity/type did not match the manifest's `arg_schema`;
    /// the engine shell surfaces this as a JS `TypeError` (§4.5 step 1).
    ArgumentError(String),
    /// Uncatchable; the engine shell unwinds `eval` without letting it
    /// cross a JS `try`/`catch` (§4.2, §4.5 step 4/7).
    OutOfGas,
    /// A gas computation itself overflowed `u64`; catchable, surfaced
    /// as `TypeError: host_call gas overflow` (§4.2 "Overflow").
    GasOverflow,
}

/// Owns the tape, the reentrancy flag, and the injected `HostHandlers`
/// for one runtime (§4.5, §5 "Shared resources": "the dispatcher owns
/// the tape buffer and a single reentrancy flag").
pub struct HostDispatcher<H: HostHandlers> {
    handlers: H,
    tape: TapeBuffer,
    reentrant: bool,
    dv_limits: DvLimits,
}

impl<H: HostHandlers> HostDispatcher<H> {
    pub fn new(handlers: H, tape_capacity: usize) -> Self {
        Self {
            handlers,
            tape: TapeBuffer::new(tape_capacity),
            reentrant: false,
            dv_limits: DvLimits::default(),
        }
    }

    pub fn tape(&self) -> &TapeBuffer {
        &self.tape
    }

    pub fn handlers_mut(&mut self) -> &mut H {
        &mut self.handlers
    }

    /// Replace the tape with a fresh, empty one of the given capacity
    /// (`detjs-engine`'s `Context::enable_host_tape`). `0` disables the
    /// tape entirely.
    pub fn set_tape_capacity(&mut self, capacity: usize) {
        self.tape = TapeBuffer::new(capacity);
    }

    /// Dispatch one call to `fn_id` (§4.5 steps 1–10). `args` must
    /// already be arity-sized to `fn_entry.arg_schema` by the caller's
    /// JS-value coercion; this still re-validates shape defensively.
    pub fn dispatch(
        &mut self,
        fn_entry: &FunctionEntry,
        args: &[Dv],
        gas: &mut GasAccountant,
    ) -> DispatchOutcome {
        if let Err(msg) = check_arg_shape(fn_entry, args) {
            return DispatchOutcome::ArgumentError(msg);
        }

        // Reentrancy: observed while the flag is set, the syscall
        // returns the transport sentinel immediately — no tape entry,
        // no handler invocation (§4.5 "Reentrancy").
        if self.reentrant {
            return self.as_outcome(SynthesizedError::transport());
        }

        let request_bytes = match encode(&Dv::Array(args.to_vec()), &self.dv_limits) {
            Ok(b) => b,
            Err(_) => {
                self.push_tape_synthesized(fn_entry.fn_id, Vec::new(), Vec::new(), gas);
                return self.as_outcome(SynthesizedError::envelope_invalid());
            }
        };

        if let Some(violation) = string_limit_violation(fn_entry, args) {
            let _ = violation;
            self.push_tape_synthesized(fn_entry.fn_id, request_bytes, Vec::new(), gas);
            return self.as_outcome(SynthesizedError::limit_exceeded());
        }
        if request_bytes.len() as u64 > fn_entry.limits.max_request_bytes as u64 {
            self.push_tape_synthesized(fn_entry.fn_id, request_bytes, Vec::new(), gas);
            return self.as_outcome(SynthesizedError::limit_exceeded());
        }

        let pre_cost = detjs_core::gas::cost_host_pre_charge(
            fn_entry.gas.base as u64,
            fn_entry.gas.k_arg_bytes as u64,
            request_bytes.len() as u64,
        );
        let pre_cost = match pre_cost {
            Some(c) => c,
            None => return DispatchOutcome::GasOverflow,
        };
        if let Err(OutOfGas) = gas.charge(pre_cost) {
            return DispatchOutcome::OutOfGas;
        }
        let gas_pre = gas.consumed();

        self.reentrant = true;
        let call_result = catch_unwind(AssertUnwindSafe(|| self.handlers.call(fn_entry.fn_id, args)));
        self.reentrant = false;

        let envelope = match call_result {
            Ok(env) => env,
            Err(_) => {
                self.push_tape_after_call(fn_entry.fn_id, &request_bytes, Vec::new(), 0, gas_pre, gas_pre, true, true);
                return self.as_outcome(SynthesizedError::transport());
            }
        };

        let response_bytes = encode(&envelope.to_dv(), &self.dv_limits).ok();
        let valid = response_bytes
            .as_ref()
            .map(|b| validate_response(fn_entry, &envelope, b, &self.dv_limits))
            .unwrap_or(false);

        if !valid {
            let resp_len = response_bytes.as_ref().map(|b| b.len()).unwrap_or(0);
            let resp_bytes = response_bytes.unwrap_or_default();
            // Envelope invalid: post-charge is still applied against the
            // raw response bytes, but `units` cannot be trusted (§4.5
            // step 6's own validation failed on it), so the units term
            // is charged as zero.
            let post_cost = detjs_core::gas::cost_host_post_charge(
                fn_entry.gas.k_ret_bytes as u64,
                resp_len as u64,
                fn_entry.gas.k_units as u64,
                0,
            );
            match post_cost {
                Some(c) => {
                    let charge_failed = gas.charge(c).is_err();
                    let gas_post = gas.consumed();
                    self.push_tape_after_call(
                        fn_entry.fn_id,
                        &request_bytes,
                        resp_bytes,
                        0,
                        gas_pre,
                        gas_post,
                        true,
                        true,
                    );
                    if charge_failed {
                        return DispatchOutcome::OutOfGas;
                    }
                }
                None => {
                    self.push_tape_after_call(
                        fn_entry.fn_id,
                        &request_bytes,
                        resp_bytes,
                        0,
                        gas_pre,
                        gas_pre,
                        true,
                        true,
                    );
                    return DispatchOutcome::GasOverflow;
                }
            }
            return self.as_outcome(SynthesizedError::envelope_invalid());
        }

        let response_bytes = response_bytes.unwrap_or_default();
        let units = match &envelope {
            HostResponseEnvelope::Ok { units, .. } => *units,
            HostResponseEnvelope::Err { units, .. } => *units,
        };
        let is_error = matches!(envelope, HostResponseEnvelope::Err { .. });

        let post_cost = detjs_core::gas::cost_host_post_charge(
            fn_entry.gas.k_ret_bytes as u64,
            response_bytes.len() as u64,
            fn_entry.gas.k_units as u64,
            units as u64,
        );
        let post_cost = match post_cost {
            Some(c) => c,
            None => {
                self.push_tape_after_call(
                    fn_entry.fn_id,
                    &request_bytes,
                    response_bytes,
                    units,
                    gas_pre,
                    gas_pre,
                    is_error,
                    true,
                );
                return DispatchOutcome::GasOverflow;
            }
        };
        let charge_failed = gas.charge(post_cost).is_err();
        let gas_post = gas.consumed();
        self.push_tape_after_call(
            fn_entry.fn_id,
            &request_bytes,
            response_bytes,
            units,
            gas_pre,
            gas_post,
            is_error,
            charge_failed,
        );
        if charge_failed {
            return DispatchOutcome::OutOfGas;
        }

        self.as_outcome(envelope)
    }

    fn as_outcome(&self, envelope: HostResponseEnvelope) -> DispatchOutcome {
        match envelope {
            HostResponseEnvelope::Ok { value, .. } => DispatchOutcome::Ok(value),
            HostResponseEnvelope::Err { code, tag, details, .. } => {
                DispatchOutcome::HostError { code, tag, details }
            }
        }
    }

    fn push_tape_synthesized(
        &mut self,
        fn_id: u32,
        request_bytes: Vec<u8>,
        response_bytes: Vec<u8>,
        gas: &GasAccountant,
    ) {
        let gas_now = gas.consumed();
        self.push_tape_after_call(
            fn_id,
            &request_bytes,
            response_bytes,
            0,
            gas_now,
            gas_now,
            true,
            true,
        );
    }

    #[allow(clippy::too_many_arguments)]
    fn push_tape_after_call(
        &mut self,
        fn_id: u32,
        request_bytes: &[u8],
        response_bytes: Vec<u8>,
        units: u32,
        gas_pre: u64,
        gas_post: u64,
        is_error: bool,
        charge_failed: bool,
    ) {
        self.tape.push(HostTapeRecord {
            fn_id,
            req_len: request_bytes.len() as u32,
            resp_len: response_bytes.len() as u32,
            units,
            gas_pre,
            gas_post,
            req_hash: sha256_bytes(request_bytes),
            resp_hash: sha256_bytes(&response_bytes),
            is_error,
            charge_failed,
        });
    }
}

fn check_arg_shape(fn_entry: &FunctionEntry, args: &[Dv]) -> Result<(), String> {
    if args.len() != fn_entry.arg_schema.len() {
        return Err(format!(
            "arity mismatch: expected {}, got {}",
            fn_entry.arg_schema.len(),
            args.len()
        ));
    }
    for (i, (schema, arg)) in fn_entry.arg_schema.iter().zip(args).enumerate() {
        if !arg_matches_schema(*schema, arg) {
            return Err(format!("argument {i} does not match declared type"));
        }
    }
    Ok(())
}

fn arg_matches_schema(schema: ArgType, value: &Dv) -> bool {
    match schema {
        ArgType::Dv => true,
        ArgType::Null => matches!(value, Dv::Null),
        ArgType::Bool => matches!(value, Dv::Bool(_)),
        ArgType::Int => matches!(value, Dv::Int(_)),
        ArgType::Float => matches!(value, Dv::Float(_) | Dv::Int(_)),
        ArgType::String => matches!(value, Dv::Str(_)),
        ArgType::Bytes => matches!(value, Dv::Bytes(_)),
    }
}

fn string_limit_violation(fn_entry: &FunctionEntry, args: &[Dv]) -> Option<usize> {
    let slots = fn_entry.limits.arg_utf8_max.as_ref()?;
    for (i, (slot, arg)) in slots.iter().zip(args).enumerate() {
        if let (Some(max), Dv::Str(s)) = (slot, arg) {
            if s.len() as u64 > *max as u64 {
                return Some(i);
            }
        }
    }
    None
}

fn validate_response(
    fn_entry: &FunctionEntry,
    envelope: &HostResponseEnvelope,
    response_bytes: &[u8],
    limits: &DvLimits,
) -> bool {
    if response_bytes.len() as u64 > fn_entry.limits.max_response_bytes as u64 {
        return false;
    }
    // Round-trip through the wire form: whatever the handler produced
    // must actually be representable on it.
    let Ok(decoded) = decode(response_bytes, limits) else {
        return false;
    };
    if HostResponseEnvelope::from_dv(&decoded).as_ref() != Some(envelope) {
        return false;
    }
    // The round-trip above only proves the envelope is DV-encodable, not
    // that its `ok` value matches `return_schema` — a schema of `Null`
    // round-trips a non-null value just fine.
    match envelope {
        HostResponseEnvelope::Ok { units, value } => {
            *units as u64 <= fn_entry.limits.max_units as u64
                && arg_matches_schema(fn_entry.return_schema, value)
        }
        HostResponseEnvelope::Err { code, units, .. } => {
            *units as u64 <= fn_entry.limits.max_units as u64 && error_code_allowed(fn_entry, code)
        }
    }
}

fn error_code_allowed(fn_entry: &FunctionEntry, code: &str) -> bool {
    code == detjs_core::RESERVED_CODE_HOST_TRANSPORT
        || code == detjs_core::RESERVED_CODE_HOST_ENVELOPE_INVALID
        || fn_entry.error_codes.iter().any(|ec| ec.code == code)
}

#[cfg(test)]
mod tests {
    use super::*;
    use detjs_core::{Effect, GasParams, Limits, Manifest};

    struct EchoHandlers;
    impl HostHandlers for EchoHandlers {
        fn call(&mut self, _fn_id: u32, args: &[Dv]) -> HostResponseEnvelope {
            HostResponseEnvelope::Ok {
                value: args.first().cloned().unwrap_or(Dv::Null),
                units: 5,
            }
        }
    }

    struct PanicHandlers;
    impl HostHandlers for PanicHandlers {
        fn call(&mut self, _fn_id: u32, _args: &[Dv]) -> HostResponseEnvelope {
            panic!("boom")
        }
    }

    fn get_fn() -> FunctionEntry {
        FunctionEntry {
            fn_id: 1,
            js_path: vec!["document".to_string(), "get".to_string()],
            effect: Effect::Read,
            arity: 1,
            arg_schema: vec![ArgType::String],
            return_schema: ArgType::Dv,
            gas: GasParams {
                schedule_id: 1,
                base: 10,
                k_arg_bytes: 1,
                k_ret_bytes: 1,
                k_units: 1,
            },
            limits: Limits {
                max_request_bytes: 4096,
                max_response_bytes: 4096,
                max_units: 1000,
                arg_utf8_max: Some(vec![Some(10)]),
            },
            error_codes: vec![],
        }
    }

    #[test]
    fn successful_call_charges_and_tapes() {
        let mut d = HostDispatcher::new(EchoHandlers, 8);
        let mut gas = GasAccountant::new(10_000);
        let f = get_fn();
        let out = d.dispatch(&f, &[Dv::Str("a/b".to_string())], &mut gas);
        assert_eq!(out, DispatchOutcome::Ok(Dv::Str("a/b".to_string())));
        assert_eq!(d.tape().len(), 1);
        assert!(!d.tape().records()[0].charge_failed);
        assert!(gas.consumed() > 0);
    }

    #[test]
    fn arity_mismatch_rejected_before_dispatch() {
        let mut d = HostDispatcher::new(EchoHandlers, 8);
        let mut gas = GasAccountant::new(10_000);
        let f = get_fn();
        let out = d.dispatch(&f, &[], &mut gas);
        assert!(matches!(out, DispatchOutcome::ArgumentError(_)));
        assert!(d.tape().is_empty());
    }

    #[test]
    fn oversized_string_arg_synthesizes_limit_exceeded() {
        let mut d = HostDispatcher::new(EchoHandlers, 8);
        let mut gas = GasAccountant::new(10_000);
        let f = get_fn();
        let big = "x".repeat(3000);
        let out = d.dispatch(&f, &[Dv::Str(big)], &mut gas);
        assert!(matches!(
            out,
            DispatchOutcome::HostError { ref code, .. } if code == "LIMIT_EXCEEDED"
        ));
        assert_eq!(d.tape().len(), 1);
        assert!(d.tape().records()[0].charge_failed);
        assert_eq!(d.tape().records()[0].units, 0);
        assert_eq!(gas.consumed(), 0, "handler never invoked, nothing charged");
    }

    #[test]
    fn panic_in_handler_becomes_transport_error_with_tape_entry() {
        let mut d = HostDispatcher::new(PanicHandlers, 8);
        let mut gas = GasAccountant::new(10_000);
        let f = get_fn();
        let out = d.dispatch(&f, &[Dv::Str("ok".to_string())], &mut gas);
        assert!(matches!(
            out,
            DispatchOutcome::HostError { ref code, .. } if code == "HOST_TRANSPORT"
        ));
        assert_eq!(d.tape().len(), 1);
        assert!(d.tape().records()[0].charge_failed);
        assert!(!d.reentrant);
    }

    #[test]
    fn reentrancy_rejected_without_invoking_handler() {
        let mut d = HostDispatcher::new(EchoHandlers, 8);
        d.reentrant = true;
        let mut gas = GasAccountant::new(10_000);
        let f = get_fn();
        let out = d.dispatch(&f, &[Dv::Str("ok".to_string())], &mut gas);
        assert!(matches!(
            out,
            DispatchOutcome::HostError { ref code, .. } if code == "HOST_TRANSPORT"
        ));
        assert!(d.tape().is_empty());
    }

    #[test]
    fn zero_gas_limit_aborts_before_invoking_handler() {
        let mut d = HostDispatcher::new(EchoHandlers, 8);
        let mut gas = GasAccountant::new(0);
        let f = get_fn();
        let out = d.dispatch(&f, &[Dv::Str("ok".to_string())], &mut gas);
        assert_eq!(out, DispatchOutcome::OutOfGas);
        assert!(d.tape().is_empty());
    }

    #[test]
    fn ok_value_violating_return_schema_is_envelope_invalid() {
        struct NonNullHandlers;
        impl HostHandlers for NonNullHandlers {
            fn call(&mut self, _fn_id: u32, _args: &[Dv]) -> HostResponseEnvelope {
                HostResponseEnvelope::Ok {
                    value: Dv::Str("not null".to_string()),
                    units: 1,
                }
            }
        }
        let mut d = HostDispatcher::new(NonNullHandlers, 8);
        let mut gas = GasAccountant::new(10_000);
        let mut f = get_fn();
        f.return_schema = ArgType::Null;
        let out = d.dispatch(&f, &[Dv::Str("ok".to_string())], &mut gas);
        assert!(matches!(
            out,
            DispatchOutcome::HostError { ref code, .. } if code == "HOST_ENVELOPE_INVALID"
        ));
        assert_eq!(d.tape().len(), 1);
        assert!(d.tape().records()[0].charge_failed);
    }

    #[test]
    fn unauthorized_error_code_is_envelope_invalid() {
        struct BadCodeHandlers;
        impl HostHandlers for BadCodeHandlers {
            fn call(&mut self, _fn_id: u32, _args: &[Dv]) -> HostResponseEnvelope {
                HostResponseEnvelope::Err {
                    code: "NOT_DECLARED".to_string(),
                    tag: None,
                    details: None,
                    units: 0,
                }
            }
        }
        let mut d = HostDispatcher::new(BadCodeHandlers, 8);
        let mut gas = GasAccountant::new(10_000);
        let f = get_fn();
        let out = d.dispatch(&f, &[Dv::Str("ok".to_string())], &mut gas);
        assert!(matches!(
            out,
            DispatchOutcome::HostError { ref code, .. } if code == "HOST_ENVELOPE_INVALID"
        ));
        assert_eq!(d.tape().len(), 1);
        assert!(d.tape().records()[0].charge_failed);
    }

    #[test]
    fn manifest_hash_is_unaffected_by_dispatch_activity() {
        // Sanity check that dispatch exercising a function entry never
        // mutates manifest state shared across calls.
        let f = get_fn();
        let manifest = Manifest {
            abi_id: "document.v1".to_string(),
            abi_version: 1,
            functions: vec![f],
        };
        let limits = DvLimits::default();
        let h1 = manifest.hash_hex(&limits).unwrap();
        let h2 = manifest.hash_hex(&limits).unwrap();
        assert_eq!(h1, h2);
    }
}
