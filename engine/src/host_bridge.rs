//! Installs the frozen `Host.v1.<js_path>` namespace described by a
//! manifest (§4.5 "Installation") and bridges each call into a
//! `HostDispatcher`.
//!
//! The dispatcher (`detjs-host`) only ever sees `&[Dv]` — it has no idea
//! a JS engine exists. This module is the one place that does: coerce
//! the JS arguments QuickJS handed a closure into `Dv`s, call
//! `dispatch`, and translate the `DispatchOutcome` back into a JS return
//! value or a thrown exception.

use std::cell::RefCell;
use std::rc::Rc;

use rquickjs::{Ctx, Exception, Function, Object};

use detjs_core::{FunctionEntry, GasAccountant, Manifest};
use detjs_host::{DispatchOutcome, HostDispatcher, HostHandlers};

use crate::error::EngineError;
use crate::gas_hooks::GasHooks;
use crate::value::{dv_to_js, js_to_dv};

/// Build `Host.v1` on the global object, one frozen closure per
/// `FunctionEntry`, nested per `js_path` segment.
pub fn install<H: HostHandlers + 'static>(
    ctx: &Ctx<'_>,
    manifest: &Manifest,
    dispatcher: Rc<RefCell<HostDispatcher<H>>>,
    hooks: Rc<GasHooks>,
) -> Result<(), EngineError> {
    let host_v1 = Object::new(ctx.clone())?;
    for entry in &manifest.functions {
        let closure = make_closure(ctx, entry.clone(), Rc::clone(&dispatcher), Rc::clone(&hooks))?;
        install_at_path(ctx, &host_v1, &entry.js_path, closure)?;
    }

    let host = Object::new(ctx.clone())?;
    host.set("v1", host_v1)?;
    ctx.globals().set("Host", host)?;
    Ok(())
}

fn install_at_path<'js>(
    ctx: &Ctx<'js>,
    root: &Object<'js>,
    path: &[String],
    leaf: Function<'js>,
) -> rquickjs::Result<()> {
    let mut cursor = root.clone();
    for segment in &path[..path.len() - 1] {
        let next: Option<Object> = cursor.get(segment.as_str()).ok();
        let next = match next {
            Some(obj) => obj,
            None => {
                let obj = Object::new(ctx.clone())?;
                cursor.set(segment.as_str(), obj.clone())?;
                obj
            }
        };
        cursor = next;
    }
    cursor.set(path.last().unwrap().as_str(), leaf)?;
    Ok(())
}

fn make_closure<'js, H: HostHandlers + 'static>(
    ctx: &Ctx<'js>,
    entry: FunctionEntry,
    dispatcher: Rc<RefCell<HostDispatcher<H>>>,
    hooks: Rc<GasHooks>,
) -> rquickjs::Result<Function<'js>> {
    Function::new(
        ctx.clone(),
        move |ctx: Ctx<'js>, args: rquickjs::function::Rest<rquickjs::Value<'js>>| -> rquickjs::Result<rquickjs::Value<'js>> {
            if args.len() != entry.arg_schema.len() {
                return Err(Exception::throw_type(
                    &ctx,
                    &format!(
                        "arity mismatch calling Host.v1.{}: expected {}, got {}",
                        entry.js_path.join("."),
                        entry.arg_schema.len(),
                        args.len()
                    ),
                ));
            }
            let mut dv_args = Vec::with_capacity(args.len());
            for value in args.0.iter() {
                match js_to_dv(value) {
                    Ok(dv) => dv_args.push(dv),
                    Err(_) => {
                        return Err(Exception::throw_type(
                            &ctx,
                            "argument is not DV-encodable",
                        ))
                    }
                }
            }

            hooks.checkpoint();
            let outcome = {
                let gas = Rc::clone(hooks.gas());
                let mut gas = gas.borrow_mut();
                let mut dispatcher = dispatcher.borrow_mut();
                run_dispatch(&mut dispatcher, &entry, &dv_args, &mut gas)
            };
            hooks.checkpoint();

            match outcome {
                DispatchOutcome::Ok(value) => dv_to_js(&ctx, &value),
                DispatchOutcome::HostError { code, tag, details } => {
                    Err(throw_host_error(&ctx, &code, tag.as_deref(), details.as_ref()))
                }
                DispatchOutcome::ArgumentError(msg) => Err(Exception::throw_type(&ctx, &msg)),
                DispatchOutcome::OutOfGas => {
                    // Thrown as an ordinary exception, but `eval` (in
                    // `runtime.rs`) overrides the final outcome to the
                    // uncatchable `OutOfGas` kind whenever
                    // `hooks.took_out_of_gas()` is set, regardless of
                    // whether JS caught this and kept running — gas
                    // post-charge OOG occurs after the host effect has
                    // already happened (§9 "Open questions"), so letting
                    // the script observe one more statement before the
                    // override takes effect does not change what was
                    // already charged or recorded on the tape.
                    hooks.force_out_of_gas();
                    Err(Exception::throw_type(&ctx, "out of gas"))
                }
                DispatchOutcome::GasOverflow => {
                    Err(Exception::throw_type(&ctx, "host_call gas overflow"))
                }
            }
        },
    )
}

fn run_dispatch<H: HostHandlers>(
    dispatcher: &mut HostDispatcher<H>,
    entry: &FunctionEntry,
    args: &[detjs_core::Dv],
    gas: &mut GasAccountant,
) -> DispatchOutcome {
    dispatcher.dispatch(entry, args, gas)
}

fn throw_host_error<'js>(
    ctx: &Ctx<'js>,
    code: &str,
    tag: Option<&str>,
    details: Option<&detjs_core::Dv>,
) -> rquickjs::Error {
    let make = || -> rquickjs::Result<rquickjs::Error> {
        let obj = Object::new(ctx.clone())?;
        obj.set("name", "HostError")?;
        obj.set("code", code)?;
        if let Some(tag) = tag {
            obj.set("tag", tag)?;
        }
        if let Some(details) = details {
            obj.set("details", dv_to_js(ctx, details)?)?;
        }
        Ok(ctx.throw(obj.into_value()))
    };
    make().unwrap_or_else(|e| e)
}
