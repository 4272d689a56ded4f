//! The determinism profile (§4.1): strips every source of
//! nondeterminism the embedded engine ships with, before any user code
//! (or the `Host.v1`/context globals installed on top of it) can run.
//!
//! The profile is two scripts, not one, because the global object has
//! to accept new properties (`Host.v1`, `event`, `steps`, `document`)
//! *between* them: removing the dangerous names comes first, freezing
//! comes last, and the engine shell's own installation happens in
//! between.

use rquickjs::Ctx;

/// Names removed from the global object (§4.1 "Determinism profile").
/// Typed-array constructors are listed explicitly — "all typed-array
/// constructors" in the profile's own words — rather than matched by a
/// prefix, since a prefix match would be mistaken for the kind of
/// cleverness this profile explicitly avoids.
const REMOVED_GLOBALS: &[&str] = &[
    "Date",
    "Promise",
    "eval",
    "Function",
    "Proxy",
    "RegExp",
    "WeakRef",
    "Int8Array",
    "Uint8Array",
    "Uint8ClampedArray",
    "Int16Array",
    "Uint16Array",
    "Int32Array",
    "Uint32Array",
    "Float32Array",
    "Float64Array",
    "BigInt64Array",
    "BigUint64Array",
    "ArrayBuffer",
    "SharedArrayBuffer",
    "WebAssembly",
];

/// Remove every name in `REMOVED_GLOBALS`, replacing each with an
/// accessor that raises the fixed-message `ReferenceError` the profile
/// requires on any access, and disable `Math.random`.
pub fn install_removals(ctx: &Ctx<'_>) -> rquickjs::Result<()> {
    let script = build_removal_script();
    ctx.eval::<(), _>(script)
}

/// Freeze the global object and the standard prototypes. Called last,
/// after `Host.v1` and the `I`-derived globals have been installed —
/// freezing first would make those installations fail.
pub fn install_freeze(ctx: &Ctx<'_>) -> rquickjs::Result<()> {
    ctx.eval::<(), _>(FREEZE_SCRIPT)
}

fn build_removal_script() -> String {
    let mut defines = String::new();
    for name in REMOVED_GLOBALS {
        defines.push_str(&format!(
            "Object.defineProperty(globalThis, {name:?}, {{\
                get() {{ throw new ReferenceError({name:?} + \" is not defined\"); }},\
                set() {{}},\
                configurable: false,\
                enumerable: false,\
            }});\n"
        ));
    }
    format!(
        "(function() {{\n{defines}\
         Math.random = function() {{ throw new ReferenceError(\"Math.random is not defined\"); }};\n\
         }})();"
    )
}

const FREEZE_SCRIPT: &str = r#"(function() {
    Object.freeze(Math);
    Object.freeze(Object.prototype);
    Object.freeze(Array.prototype);
    Object.freeze(Function.prototype);
    Object.freeze(String.prototype);
    Object.freeze(Number.prototype);
    Object.freeze(Boolean.prototype);
    Object.freeze(globalThis);
})();"#;
