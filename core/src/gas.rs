//! Gas accounting (§4.2). Charges are levied by the engine shell for
//! opcode dispatch, allocation, and array-callback entry, and by the
//! host dispatcher for the two-phase host-call charge. All of them flow
//! through one `GasAccountant` so that invariant 5 (charge completeness)
//! holds by construction rather than by bookkeeping after the fact.

/// Sentinel gas limit meaning "do not meter" (§3). `gasUsed` is reported
/// as `0` whenever the limit is `UNLIMITED`.
pub const UNLIMITED: u64 = u64::MAX;

pub const COST_OPCODE: u64 = 1;
pub const COST_ARRAY_CB_BASE: u64 = 5;
pub const COST_ARRAY_CB_PER_ELEMENT: u64 = 2;
pub const ALLOC_BASE: u64 = 3;

/// GC is heuristic-free here: a byte counter crossing this threshold
/// sets a pending flag; `run_gc_checkpoint` only does work when the
/// flag is set (§4.2 "GC heuristics").
pub const GC_FLUSH_THRESHOLD_BYTES: u64 = 512 * 1024;

/// Gas cost of allocating `n` bytes: `3 + ceil(n / 16)`.
pub fn cost_allocation(n_bytes: u64) -> u64 {
    let words = n_bytes.div_ceil(16);
    ALLOC_BASE.saturating_add(words)
}

/// Gas cost of one array-callback builtin entry after `iterations` steps
/// (including hole-skips and early returns, per §4.2).
pub fn cost_array_callback(iterations: u64) -> u64 {
    COST_ARRAY_CB_BASE.saturating_add(iterations.saturating_mul(COST_ARRAY_CB_PER_ELEMENT))
}

/// Host-call pre-charge: `base + k_arg_bytes * request_bytes`.
pub fn cost_host_pre_charge(base: u64, k_arg_bytes: u64, request_bytes: u64) -> Option<u64> {
    k_arg_bytes
        .checked_mul(request_bytes)
        .and_then(|b| base.checked_add(b))
}

/// Host-call post-charge: `k_ret_bytes * response_bytes + k_units * units`.
pub fn cost_host_post_charge(
    k_ret_bytes: u64,
    response_bytes: u64,
    k_units: u64,
    units: u64,
) -> Option<u64> {
    let a = k_ret_bytes.checked_mul(response_bytes)?;
    let b = k_units.checked_mul(units)?;
    a.checked_add(b)
}

/// Raised by `GasAccountant::charge` when a charge would exceed the
/// budget. This is the uncatchable-by-JS `OutOfGas` marker (§4.2, §7);
/// the engine shell is responsible for unwinding `eval` without letting
/// it cross a JS `try/catch` boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("out of gas")]
pub struct OutOfGas;

/// Raised when a gas computation itself overflows `u64` before being
/// applied (§4.2 "Overflow"). Catchable — the engine shell surfaces
/// this as `TypeError: host_call gas overflow`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("gas charge overflowed u64")]
pub struct GasOverflow;

/// Aggregate counters for the optional gas trace (§3 `GasTrace`).
/// Host-call gas is billed but intentionally not attributed here.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GasTrace {
    pub opcode_count: u64,
    pub opcode_gas: u64,
    pub array_cb_base_count: u64,
    pub array_cb_base_gas: u64,
    pub array_cb_per_element_count: u64,
    pub array_cb_per_element_gas: u64,
    pub allocation_count: u64,
    pub allocation_bytes: u64,
    pub allocation_gas: u64,
}

/// Tracks gas consumption for a single evaluation (§4.2).
///
/// `charge` never leaves the meter in a half-consumed state: on
/// rejection, `remaining` is driven to zero (per spec) but the error is
/// returned rather than silently applied, so the caller can distinguish
/// "terminate now" from "keep going".
#[derive(Debug, Clone)]
pub struct GasAccountant {
    limit: u64,
    consumed: u64,
    trace_enabled: bool,
    trace: GasTrace,
    gc_pending_bytes: u64,
    gc_flag: bool,
}

impl GasAccountant {
    pub fn new(limit: u64) -> Self {
        Self {
            limit,
            consumed: 0,
            trace_enabled: false,
            trace: GasTrace::default(),
            gc_pending_bytes: 0,
            gc_flag: false,
        }
    }

    pub fn unlimited() -> Self {
        Self::new(UNLIMITED)
    }

    pub fn is_unlimited(&self) -> bool {
        self.limit == UNLIMITED
    }

    pub fn set_trace_enabled(&mut self, enabled: bool) {
        self.trace_enabled = enabled;
    }

    pub fn trace(&self) -> GasTrace {
        self.trace
    }

    /// Charge `amount` gas. Returns `OutOfGas` (without overflowing) if
    /// the budget would be exceeded; skipped entirely under `UNLIMITED`.
    pub fn charge(&mut self, amount: u64) -> Result<(), OutOfGas> {
        if self.is_unlimited() {
            return Ok(());
        }
        match self.consumed.checked_add(amount) {
            Some(v) if v <= self.limit => {
                self.consumed = v;
                Ok(())
            }
            _ => {
                self.consumed = self.limit;
                Err(OutOfGas)
            }
        }
    }

    pub fn charge_opcode(&mut self) -> Result<(), OutOfGas> {
        self.charge(COST_OPCODE)?;
        if self.trace_enabled {
            self.trace.opcode_count += 1;
            self.trace.opcode_gas += COST_OPCODE;
        }
        Ok(())
    }

    pub fn charge_allocation(&mut self, n_bytes: u64) -> Result<(), OutOfGas> {
        let cost = cost_allocation(n_bytes);
        self.charge(cost)?;
        if self.trace_enabled {
            self.trace.allocation_count += 1;
            self.trace.allocation_bytes += n_bytes;
            self.trace.allocation_gas += cost;
        }
        self.gc_pending_bytes = self.gc_pending_bytes.saturating_add(n_bytes);
        if self.gc_pending_bytes >= GC_FLUSH_THRESHOLD_BYTES {
            self.gc_flag = true;
        }
        Ok(())
    }

    pub fn charge_array_callback_entry(&mut self) -> Result<(), OutOfGas> {
        self.charge(COST_ARRAY_CB_BASE)?;
        if self.trace_enabled {
            self.trace.array_cb_base_count += 1;
            self.trace.array_cb_base_gas += COST_ARRAY_CB_BASE;
        }
        Ok(())
    }

    pub fn charge_array_callback_step(&mut self) -> Result<(), OutOfGas> {
        self.charge(COST_ARRAY_CB_PER_ELEMENT)?;
        if self.trace_enabled {
            self.trace.array_cb_per_element_count += 1;
            self.trace.array_cb_per_element_gas += COST_ARRAY_CB_PER_ELEMENT;
        }
        Ok(())
    }

    /// Runs the pending-flag GC checkpoint (§4.2). A no-op unless the
    /// allocation byte counter has crossed the flush threshold since
    /// the last checkpoint; `on_collect` is invoked to perform the
    /// actual collection (owned by the engine shell).
    pub fn run_gc_checkpoint(&mut self, on_collect: impl FnOnce()) {
        if self.gc_flag {
            on_collect();
            self.gc_flag = false;
            self.gc_pending_bytes = 0;
        }
    }

    pub fn consumed(&self) -> u64 {
        self.consumed
    }

    pub fn remaining(&self) -> u64 {
        if self.is_unlimited() {
            return UNLIMITED;
        }
        self.limit.saturating_sub(self.consumed)
    }

    pub fn limit(&self) -> u64 {
        self.limit
    }

    pub fn is_exhausted(&self) -> bool {
        !self.is_unlimited() && self.consumed >= self.limit
    }

    /// Gas reported to the caller: `0` under `UNLIMITED`, else `consumed`.
    pub fn gas_used_reported(&self) -> u64 {
        if self.is_unlimited() {
            0
        } else {
            self.consumed
        }
    }
}
