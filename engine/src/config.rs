//! Engine configuration (§4.1, §4.2).

use detjs_core::DvLimits;

/// Configuration for a single `Runtime`. Unlike the gas limit — which is
/// per-evaluation and set via `set_gas_limit` — these are fixed for the
/// runtime's lifetime (§3 "Lifecycles": changing any of this requires
/// tearing down and recreating the runtime).
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Limits applied to every DV encode/decode the engine performs
    /// (result encoding, context blob, host-call envelopes).
    pub dv_limits: DvLimits,

    /// Capacity of the host-call audit tape. `0` disables it entirely.
    pub tape_capacity: usize,

    /// Whether the gas trace is collected by default; `enable_gas_trace`
    /// can still flip this after `init_deterministic`.
    pub trace_enabled: bool,

    /// How many QuickJS interrupt-handler ticks are charged as one
    /// `COST_OPCODE` unit (§4.2 "Opcode dispatch"). The embedded engine
    /// does not expose a true per-bytecode-instruction hook; this is the
    /// coarsest faithful proxy rquickjs's interrupt handler allows.
    pub opcode_ticks_per_charge: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            dv_limits: DvLimits::default(),
            tape_capacity: 256,
            trace_enabled: false,
            opcode_ticks_per_charge: 1,
        }
    }
}

impl EngineConfig {
    pub fn with_tape_capacity(mut self, capacity: usize) -> Self {
        self.tape_capacity = capacity;
        self
    }

    pub fn with_trace_enabled(mut self, enabled: bool) -> Self {
        self.trace_enabled = enabled;
        self
    }

    pub fn with_dv_limits(mut self, limits: DvLimits) -> Self {
        self.dv_limits = limits;
        self
    }
}
