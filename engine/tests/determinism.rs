//! §8 invariant 1 (determinism) and the removed-global/frozen-prototype
//! half of §4.1's determinism profile.

mod common;

use detjs_core::{Dv, EvalOutcome};
use detjs_engine::{new_runtime, EngineConfig};
use detjs_host::NullHandlers;

fn run_once(code: &str, gas_limit: u64) -> EvalOutcome {
    let (runtime, mut ctx) = new_runtime(EngineConfig::default(), NullHandlers).unwrap();
    ctx.init_deterministic(
        &runtime,
        &common::document_manifest(),
        &common::program(code),
        &common::empty_input(),
        gas_limit,
    )
    .unwrap();
    ctx.eval(&runtime, code).unwrap()
}

#[test]
fn same_program_same_input_same_gas_same_result() {
    let code = "let c = 0; for (let i = 0; i < 5; i++) { c = c + i; } c";
    let a = run_once(code, 5000);
    let b = run_once(code, 5000);
    match (a, b) {
        (
            EvalOutcome::Ok { value: v1, gas_used: g1, gas_remaining: r1, .. },
            EvalOutcome::Ok { value: v2, gas_used: g2, gas_remaining: r2, .. },
        ) => {
            assert_eq!(v1, v2);
            assert_eq!(g1, g2);
            assert_eq!(r1, r2);
        }
        other => panic!("expected two Ok outcomes, got {other:?}"),
    }
}

#[test]
fn removed_globals_raise_reference_error() {
    for name in ["Date", "Promise", "eval", "Proxy", "RegExp", "WeakRef", "WebAssembly", "Uint8Array"] {
        let code = format!("try {{ {name}; 'not-thrown' }} catch (e) {{ e instanceof ReferenceError }}");
        match run_once(&code, 100_000) {
            EvalOutcome::Ok { value, .. } => assert_eq!(value, Dv::Bool(true), "{name} should be removed"),
            other => panic!("expected Ok for {name}, got {other:?}"),
        }
    }
}

#[test]
fn math_random_is_removed() {
    let code = "try { Math.random(); 'not-thrown' } catch (e) { 'threw' }";
    match run_once(code, 100_000) {
        EvalOutcome::Ok { value, .. } => assert_eq!(value, Dv::Str("threw".to_string())),
        other => panic!("expected Ok, got {other:?}"),
    }
}

#[test]
fn global_object_is_frozen() {
    let code = "globalThis.evil = 1; typeof globalThis.evil";
    match run_once(code, 100_000) {
        EvalOutcome::Ok { value, .. } => assert_eq!(value, Dv::Str("undefined".to_string())),
        other => panic!("expected Ok, got {other:?}"),
    }
}

#[test]
fn context_globals_are_populated_from_input() {
    let (runtime, mut ctx) = new_runtime(EngineConfig::default(), NullHandlers).unwrap();
    let input = detjs_core::Input {
        event: Dv::Str("clicked".to_string()),
        event_canonical: Dv::Str("clicked".to_string()),
        steps: Dv::Int(3),
    };
    let code = "[event, steps, document.canonical]";
    ctx.init_deterministic(&runtime, &common::document_manifest(), &common::program(code), &input, 100_000)
        .unwrap();
    match ctx.eval(&runtime, code).unwrap() {
        EvalOutcome::Ok { value, .. } => {
            assert_eq!(
                value,
                Dv::Array(vec![
                    Dv::Str("clicked".to_string()),
                    Dv::Int(3),
                    Dv::Str("clicked".to_string()),
                ])
            );
        }
        other => panic!("expected Ok, got {other:?}"),
    }
}
