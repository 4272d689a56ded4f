//! Two things installed between `determinism::install_removals` and
//! `determinism::install_freeze` (§4.1 "Determinism profile"):
//!
//! - the read-only `event`/`steps`/`document.canonical` globals derived
//!   from `Input`,
//! - `Array.prototype` callback-builtin polyfills that meter themselves
//!   against the gas accountant, since typed arrays are removed entirely
//!   and only plain arrays need covering (§4.2 "Array callback builtin
//!   entry").
//!
//! The polyfills replace the engine's native `forEach`/`map`/`filter`/
//! `every`/`some`/`reduce`/`reduceRight` with hand-written loops that
//! call a native `__detjs_charge_entry`/`__detjs_charge_step` pair before
//! doing any work, so every iteration (including hole-skips and early
//! returns, per §4.2) is charged exactly once.

use std::rc::Rc;

use rquickjs::{Ctx, Function};

use detjs_core::Dv;

use crate::error::EngineError;
use crate::gas_hooks::GasHooks;
use crate::value::dv_to_js;

/// Install `event`, `steps`, and `document.canonical` as frozen
/// properties of the global object, populated from `Input`.
pub fn install_context_globals(
    ctx: &Ctx<'_>,
    event: &Dv,
    event_canonical: &Dv,
    steps: &Dv,
) -> Result<(), EngineError> {
    let globals = ctx.globals();
    globals.set("event", dv_to_js(ctx, event)?)?;
    globals.set("steps", dv_to_js(ctx, steps)?)?;

    let document = rquickjs::Object::new(ctx.clone())?;
    document.set("canonical", dv_to_js(ctx, event_canonical)?)?;
    globals.set("document", document)?;

    Ok(())
}

/// Install the metered `Array.prototype` callback builtins and the two
/// native charge functions they call into.
pub fn install_array_callback_shims(ctx: &Ctx<'_>, hooks: &Rc<GasHooks>) -> Result<(), EngineError> {
    let charge_entry = {
        let hooks = Rc::clone(hooks);
        Function::new(ctx.clone(), move |ctx: Ctx<'_>| -> rquickjs::Result<()> {
            hooks
                .charge_array_callback_entry()
                .map_err(|_| rquickjs::Exception::throw_type(&ctx, "out of gas"))
        })?
    };
    let charge_step = {
        let hooks = Rc::clone(hooks);
        Function::new(ctx.clone(), move |ctx: Ctx<'_>| -> rquickjs::Result<()> {
            hooks
                .charge_array_callback_step()
                .map_err(|_| rquickjs::Exception::throw_type(&ctx, "out of gas"))
        })?
    };

    let globals = ctx.globals();
    globals.set("__detjs_charge_entry", charge_entry)?;
    globals.set("__detjs_charge_step", charge_step)?;

    ctx.eval::<(), _>(ARRAY_SHIM_SCRIPT)?;

    // The two natives are only needed during installation; remove them
    // from the global object before freezing so user code never sees
    // `__detjs_*` names.
    globals.set("__detjs_charge_entry", rquickjs::Undefined)?;
    globals.set("__detjs_charge_step", rquickjs::Undefined)?;
    Ok(())
}

const ARRAY_SHIM_SCRIPT: &str = r#"(function() {
    const chargeEntry = __detjs_charge_entry;
    const chargeStep = __detjs_charge_step;

    function meteredForEach(callback, thisArg) {
        chargeEntry();
        const len = this.length >>> 0;
        for (let i = 0; i < len; i++) {
            chargeStep();
            if (i in this) callback.call(thisArg, this[i], i, this);
        }
    }

    function meteredMap(callback, thisArg) {
        chargeEntry();
        const len = this.length >>> 0;
        const out = new Array(len);
        for (let i = 0; i < len; i++) {
            chargeStep();
            if (i in this) out[i] = callback.call(thisArg, this[i], i, this);
        }
        return out;
    }

    function meteredFilter(callback, thisArg) {
        chargeEntry();
        const len = this.length >>> 0;
        const out = [];
        for (let i = 0; i < len; i++) {
            chargeStep();
            if (i in this && callback.call(thisArg, this[i], i, this)) out.push(this[i]);
        }
        return out;
    }

    function meteredEvery(callback, thisArg) {
        chargeEntry();
        const len = this.length >>> 0;
        for (let i = 0; i < len; i++) {
            chargeStep();
            if (i in this && !callback.call(thisArg, this[i], i, this)) return false;
        }
        return true;
    }

    function meteredSome(callback, thisArg) {
        chargeEntry();
        const len = this.length >>> 0;
        for (let i = 0; i < len; i++) {
            chargeStep();
            if (i in this && callback.call(thisArg, this[i], i, this)) return true;
        }
        return false;
    }

    function meteredReduce(callback, initialValue) {
        chargeEntry();
        const len = this.length >>> 0;
        let i = 0;
        let acc;
        let haveAcc = arguments.length >= 2;
        if (haveAcc) {
            acc = initialValue;
        } else {
            while (i < len && !(i in this)) { chargeStep(); i++; }
            if (i >= len) throw new TypeError("Reduce of empty array with no initial value");
            acc = this[i++];
        }
        for (; i < len; i++) {
            chargeStep();
            if (i in this) acc = callback(acc, this[i], i, this);
        }
        return acc;
    }

    function meteredReduceRight(callback, initialValue) {
        chargeEntry();
        const len = this.length >>> 0;
        let i = len - 1;
        let acc;
        let haveAcc = arguments.length >= 2;
        if (haveAcc) {
            acc = initialValue;
        } else {
            while (i >= 0 && !(i in this)) { chargeStep(); i--; }
            if (i < 0) throw new TypeError("Reduce of empty array with no initial value");
            acc = this[i--];
        }
        for (; i >= 0; i--) {
            chargeStep();
            if (i in this) acc = callback(acc, this[i], i, this);
        }
        return acc;
    }

    Object.defineProperty(Array.prototype, "forEach", { value: meteredForEach, writable: false, configurable: false, enumerable: false });
    Object.defineProperty(Array.prototype, "map", { value: meteredMap, writable: false, configurable: false, enumerable: false });
    Object.defineProperty(Array.prototype, "filter", { value: meteredFilter, writable: false, configurable: false, enumerable: false });
    Object.defineProperty(Array.prototype, "every", { value: meteredEvery, writable: false, configurable: false, enumerable: false });
    Object.defineProperty(Array.prototype, "some", { value: meteredSome, writable: false, configurable: false, enumerable: false });
    Object.defineProperty(Array.prototype, "reduce", { value: meteredReduce, writable: false, configurable: false, enumerable: false });
    Object.defineProperty(Array.prototype, "reduceRight", { value: meteredReduceRight, writable: false, configurable: false, enumerable: false });
})();"#;
