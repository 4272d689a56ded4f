//! Wiring between `GasAccountant` and the embedded engine's own
//! instrumentation points (§4.1 "Eval contract", §4.2).
//!
//! rquickjs does not expose a hook per bytecode instruction; its
//! interrupt handler is the coarsest faithful proxy it offers, so one
//! handler tick does triple duty: it charges `COST_OPCODE`, polls the
//! runtime's reported malloc size for allocation charging, and runs the
//! pending-flag GC checkpoint. `opcode_ticks_per_charge` lets a caller
//! trade metering precision for fewer interrupt round-trips.

use std::cell::Cell;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};

use rquickjs::Runtime;

use detjs_core::{GasAccountant, OutOfGas};

/// Shared between the interrupt handler closure and the code that later
/// inspects why `eval` stopped. The "did we stop on OOG" flag is an
/// `AtomicBool` rather than a plain `Cell` purely so `GasHooks` stays
/// `Sync`-friendly if rquickjs ever calls the interrupt handler off the
/// owning thread; nothing in this crate currently touches it concurrently.
pub struct GasHooks {
    gas: Rc<std::cell::RefCell<GasAccountant>>,
    ticks_per_charge: u32,
    tick_counter: Cell<u32>,
    last_malloc_bytes: Cell<i64>,
    out_of_gas: AtomicBool,
    js_runtime: std::cell::RefCell<Option<Runtime>>,
}

impl GasHooks {
    pub fn new(gas: Rc<std::cell::RefCell<GasAccountant>>, ticks_per_charge: u32) -> Rc<Self> {
        Rc::new(Self {
            gas,
            ticks_per_charge: ticks_per_charge.max(1),
            tick_counter: Cell::new(0),
            last_malloc_bytes: Cell::new(0),
            out_of_gas: AtomicBool::new(false),
            js_runtime: std::cell::RefCell::new(None),
        })
    }

    pub fn gas(&self) -> &Rc<std::cell::RefCell<GasAccountant>> {
        &self.gas
    }

    pub fn took_out_of_gas(&self) -> bool {
        self.out_of_gas.load(Ordering::SeqCst)
    }

    pub fn reset(&self) {
        self.tick_counter.set(0);
        self.out_of_gas.store(false, Ordering::SeqCst);
    }

    /// Set when a host-call post-charge runs out of gas (§4.5 step 7,
    /// §9 "Open questions"). `eval` checks this after the script
    /// finishes running (however it finished) and overrides the outcome
    /// to `OutOfGas` when set, since that charge is uncatchable by JS
    /// even though the thrown exception that accompanies it is not.
    pub fn force_out_of_gas(&self) {
        self.out_of_gas.store(true, Ordering::SeqCst);
    }

    /// Install this as `runtime.set_interrupt_handler`. Returning `true`
    /// stops the engine with an "interrupted" error, which `eval` (in
    /// `runtime.rs`) distinguishes from an ordinary thrown exception by
    /// checking `took_out_of_gas()` immediately afterward.
    pub fn attach(self: &Rc<Self>, runtime: &Runtime) {
        *self.js_runtime.borrow_mut() = Some(runtime.clone());
        let hooks = Rc::clone(self);
        let runtime_handle = runtime.clone();
        runtime.set_interrupt_handler(Some(Box::new(move || hooks.on_tick(&runtime_handle))));
    }

    fn on_tick(&self, runtime: &Runtime) -> bool {
        let mut counter = self.tick_counter.get() + 1;
        if counter < self.ticks_per_charge {
            self.tick_counter.set(counter);
            return false;
        }
        counter = 0;
        self.tick_counter.set(counter);

        if self.poll_allocation(runtime).is_err() {
            self.out_of_gas.store(true, Ordering::SeqCst);
            return true;
        }
        if self.gas.borrow_mut().charge_opcode().is_err() {
            self.out_of_gas.store(true, Ordering::SeqCst);
            return true;
        }
        self.run_gc_checkpoint(runtime);
        false
    }

    fn poll_allocation(&self, runtime: &Runtime) -> Result<(), OutOfGas> {
        let usage = runtime.memory_usage();
        let current = usage.malloc_size as i64;
        let delta = current - self.last_malloc_bytes.get();
        self.last_malloc_bytes.set(current);
        if delta > 0 {
            self.gas.borrow_mut().charge_allocation(delta as u64)?;
        }
        Ok(())
    }

    fn run_gc_checkpoint(&self, runtime: &Runtime) {
        let runtime = runtime.clone();
        self.gas.borrow_mut().run_gc_checkpoint(|| runtime.run_gc());
    }

    /// Explicit checkpoint called before/after `eval` and around each
    /// host call (§4.2 "GC heuristics": "Checkpoints MUST run before and
    /// after eval, before each host-call pre-charge, and after each
    /// host-call post-charge"). Reaches for the `Runtime` handle stashed
    /// by `attach` rather than taking one as an argument, so callers with
    /// no direct `Runtime` in scope (the host-call closures in
    /// `host_bridge.rs`) can still checkpoint.
    pub fn checkpoint(&self) {
        if let Some(runtime) = self.js_runtime.borrow().as_ref() {
            self.run_gc_checkpoint(runtime);
        }
    }

    /// Reset the allocation-delta baseline to the runtime's current
    /// malloc size without charging anything for it. Must run once
    /// `init_deterministic` has finished installing the determinism
    /// profile, `Host.v1`, and the context globals — those installs
    /// allocate a baseline heap that `poll_allocation`'s delta must not
    /// attribute to the script that runs afterward.
    pub fn prime_allocation_baseline(&self) {
        if let Some(runtime) = self.js_runtime.borrow().as_ref() {
            let usage = runtime.memory_usage();
            self.last_malloc_bytes.set(usage.malloc_size as i64);
        }
    }

    /// Charge one array-callback builtin entry (§4.2). Called from the
    /// native function backing the `Array.prototype` polyfills installed
    /// by `shims.rs`.
    pub fn charge_array_callback_entry(&self) -> Result<(), OutOfGas> {
        self.gas.borrow_mut().charge_array_callback_entry()
    }

    /// Charge one array-callback iteration step.
    pub fn charge_array_callback_step(&self) -> Result<(), OutOfGas> {
        self.gas.borrow_mut().charge_array_callback_step()
    }
}
