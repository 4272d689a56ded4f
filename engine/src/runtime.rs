//! The public engine shell API (§4.1 "Public operations"): `Runtime` +
//! `Context`, their lifecycle, and the `eval` loop.
//!
//! Split the way the data model prescribes it (§3 "Lifecycles": "Runtime
//! and Context are created by init and destroyed by `free`"): `Runtime`
//! owns the embedded engine's heap, `Context` owns the per-evaluation
//! gas/tape/trace state and the installed `Host.v1` surface. A fresh
//! `Context` is the normal mode of use (§9 "No shared mutable state");
//! callers that need the S3-style same-context repetition construct one
//! `Context` and call `eval` more than once against it.

use std::cell::RefCell;
use std::rc::Rc;

use rquickjs::Context as JsContext;

use detjs_core::{
    DvLimits, ErrorInfo, ErrorKind, EvalOutcome, GasAccountant, GasTrace, HostTapeRecord, Input,
    Manifest, Program,
};
use detjs_host::{HostDispatcher, HostHandlers};

use crate::config::EngineConfig;
use crate::determinism::{install_freeze, install_removals};
use crate::error::EngineError;
use crate::gas_hooks::GasHooks;
use crate::host_bridge;
use crate::shims::{install_array_callback_shims, install_context_globals};
use crate::value::js_to_dv;

/// The script's completion, before gas/tape/trace are attached — kept
/// separate from `EvalOutcome` so the `took_out_of_gas` override can
/// short-circuit either branch uniformly in `eval`.
enum EvalStepOutcome {
    Completed(detjs_core::Dv),
    Failed(ErrorInfo, String),
}

/// Owns the embedded engine's heap. Cheap to clone internally (rquickjs
/// `Runtime` is a reference-counted handle) but this wrapper is not —
/// one `Runtime` per `new_runtime()` call, freed by `free`.
pub struct Runtime {
    js_runtime: rquickjs::Runtime,
    config: EngineConfig,
}

/// Per-evaluation state: the installed `Host.v1` surface, the gas
/// accountant, and the optional tape/trace collectors.
pub struct Context<H: HostHandlers + 'static> {
    js_context: Option<JsContext>,
    dv_limits: DvLimits,
    gas: Rc<RefCell<GasAccountant>>,
    hooks: Rc<GasHooks>,
    dispatcher: Option<Rc<RefCell<HostDispatcher<H>>>>,
    trace_enabled: bool,
    tape_capacity: usize,
    initialized: bool,
    freed: bool,
}

/// Build a fresh `(Runtime, Context)` pair (§4.1 "Public operations").
/// `handlers` is the concrete `HostHandlers` implementation the
/// resulting `Host.v1` surface will call into; it is not bound to a
/// manifest until `init_deterministic`.
pub fn new_runtime<H: HostHandlers + 'static>(
    config: EngineConfig,
    handlers: H,
) -> Result<(Runtime, Context<H>), EngineError> {
    let js_runtime = rquickjs::Runtime::new().map_err(|e| EngineError::Js(e.into()))?;

    let gas = Rc::new(RefCell::new(GasAccountant::unlimited()));
    let hooks = GasHooks::new(Rc::clone(&gas), config.opcode_ticks_per_charge);
    hooks.attach(&js_runtime);

    let dispatcher = Rc::new(RefCell::new(HostDispatcher::new(handlers, config.tape_capacity)));

    let runtime = Runtime {
        js_runtime,
        config: config.clone(),
    };
    let context = Context {
        js_context: None,
        dv_limits: config.dv_limits,
        gas,
        hooks,
        dispatcher: Some(dispatcher),
        trace_enabled: config.trace_enabled,
        tape_capacity: config.tape_capacity,
        initialized: false,
        freed: false,
    };
    Ok((runtime, context))
}

impl<H: HostHandlers + 'static> Context<H> {
    pub fn set_gas_limit(&mut self, limit: u64) -> Result<(), EngineError> {
        self.ensure_alive()?;
        self.gas.replace(GasAccountant::new(limit));
        self.gas.borrow_mut().set_trace_enabled(self.trace_enabled);
        Ok(())
    }

    pub fn enable_gas_trace(&mut self, enabled: bool) -> Result<(), EngineError> {
        self.ensure_alive()?;
        self.trace_enabled = enabled;
        self.gas.borrow_mut().set_trace_enabled(enabled);
        Ok(())
    }

    pub fn read_gas_trace(&self) -> Result<GasTrace, EngineError> {
        self.ensure_alive()?;
        Ok(self.gas.borrow().trace())
    }

    pub fn enable_host_tape(&mut self, capacity: usize) -> Result<(), EngineError> {
        self.ensure_alive()?;
        self.tape_capacity = capacity;
        if let Some(dispatcher) = &self.dispatcher {
            dispatcher.borrow_mut().set_tape_capacity(capacity);
        }
        Ok(())
    }

    pub fn read_host_tape(&self) -> Result<Vec<HostTapeRecord>, EngineError> {
        self.ensure_alive()?;
        let dispatcher = self
            .dispatcher
            .as_ref()
            .ok_or(EngineError::NotInitialized)?;
        Ok(dispatcher.borrow().tape().records().to_vec())
    }

    /// Bind the manifest, verify its pinned hash, install the
    /// determinism profile + `Host.v1` + context globals, freeze, and
    /// set the gas limit for the evaluation that follows (§4.1 "Manifest
    /// pinning").
    pub fn init_deterministic(
        &mut self,
        runtime: &Runtime,
        manifest: &Manifest,
        program: &Program,
        input: &Input,
        gas_limit: u64,
    ) -> Result<(), EngineError> {
        if self.freed {
            return Err(EngineError::AlreadyFreed);
        }
        manifest.validate()?;
        manifest.verify_hash(&program.abi_manifest_hash, &self.dv_limits).map_err(|e| match e {
            detjs_core::ManifestError::HashMismatch { expected, computed } => {
                EngineError::ManifestHashMismatch { expected, computed }
            }
            other => EngineError::Manifest(other),
        })?;

        let js_context =
            JsContext::full(&runtime.js_runtime).map_err(|e| EngineError::Js(e.into()))?;

        self.gas.replace(GasAccountant::new(gas_limit));
        self.gas.borrow_mut().set_trace_enabled(self.trace_enabled);
        self.hooks.reset();

        let dispatcher = self.dispatcher.take().ok_or(EngineError::NotInitialized)?;

        js_context.with(|ctx| -> Result<(), EngineError> {
            install_removals(&ctx).map_err(|e| EngineError::Js(e.into()))?;
            host_bridge::install(&ctx, manifest, Rc::clone(&dispatcher), Rc::clone(&self.hooks))?;
            install_context_globals(&ctx, &input.event, &input.event_canonical, &input.steps)?;
            install_array_callback_shims(&ctx, &self.hooks)?;
            install_freeze(&ctx).map_err(|e| EngineError::Js(e.into()))?;
            Ok(())
        })?;

        self.dispatcher = Some(dispatcher);
        self.js_context = Some(js_context);
        self.initialized = true;
        self.hooks.prime_allocation_baseline();
        Ok(())
    }

    /// Evaluate `source` as a global script (§4.1 "Eval contract").
    pub fn eval(&mut self, runtime: &Runtime, source: &str) -> Result<EvalOutcome, EngineError> {
        self.ensure_alive()?;
        if !self.initialized {
            return Err(EngineError::NotInitialized);
        }
        let js_context = self.js_context.as_ref().expect("initialized");

        self.hooks.checkpoint();

        let outcome: EvalStepOutcome = js_context.with(|ctx| match ctx.eval::<rquickjs::Value, _>(source) {
            Ok(value) => match js_to_dv(&value) {
                Ok(dv) => EvalStepOutcome::Completed(dv),
                Err(_) => EvalStepOutcome::Failed(
                    ErrorInfo {
                        kind: ErrorKind::JsError,
                        code: None,
                        tag: None,
                    },
                    "TypeError: result not DV-encodable".to_string(),
                ),
            },
            Err(rquickjs::Error::Exception) => {
                let thrown = ctx.catch();
                let (info, message) = crate::surfacer::classify_thrown(&ctx, &thrown);
                EvalStepOutcome::Failed(info, message)
            }
            Err(other) => EvalStepOutcome::Failed(
                ErrorInfo {
                    kind: ErrorKind::JsError,
                    code: None,
                    tag: None,
                },
                other.to_string(),
            ),
        });

        self.hooks.checkpoint();

        let gas = self.gas.borrow();
        let gas_used = gas.gas_used_reported();
        let gas_remaining = gas.remaining();
        let trace = if self.trace_enabled { Some(gas.trace()) } else { None };
        drop(gas);

        let tape = if self.tape_capacity > 0 {
            self.dispatcher
                .as_ref()
                .map(|d| d.borrow().tape().records().to_vec())
        } else {
            None
        };

        if self.hooks.took_out_of_gas() {
            return Ok(crate::surfacer::out_of_gas(gas_used, gas_remaining, tape, trace));
        }

        match outcome {
            EvalStepOutcome::Completed(dv) => {
                crate::surfacer::ok(dv, &self.dv_limits, gas_used, gas_remaining, tape, trace)
            }
            EvalStepOutcome::Failed(info, message) => Ok(crate::surfacer::err(
                info,
                message,
                gas_used,
                gas_remaining,
                tape,
                trace,
            )),
        }
    }

    /// Destroy the context. Every subsequent method returns
    /// `EngineError::AlreadyFreed`.
    pub fn free(mut self) {
        self.js_context = None;
        self.dispatcher = None;
        self.freed = true;
    }

    fn ensure_alive(&self) -> Result<(), EngineError> {
        if self.freed {
            Err(EngineError::AlreadyFreed)
        } else {
            Ok(())
        }
    }
}

impl Runtime {
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    // Exercised end-to-end in `engine/tests/golden_vectors.rs`,
    // `engine/tests/gas_accounting.rs`, and `engine/tests/determinism.rs`
    // rather than in isolation here — a meaningful unit test needs a
    // live `rquickjs::Runtime`, which every integration test already
    // sets up via `engine/tests/common/mod.rs`.
}
