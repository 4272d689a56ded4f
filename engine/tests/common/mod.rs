#![allow(dead_code)]
//! Shared fixtures for the engine integration tests: a minimal manifest
//! exposing a single `document.get(string) -> dv` host function, a
//! deterministic in-memory handler for it, and small encode/hash
//! helpers mirroring the ones scenarios S6–S9 reference directly.

use std::collections::BTreeMap;

use sha2::{Digest, Sha256};

use detjs_core::{
    encode, ArgType, Dv, DvLimits, Effect, ErrorCodeEntry, FunctionEntry, GasParams, HostResponseEnvelope,
    Input, Limits, Manifest, Program,
};
use detjs_host::HostHandlers;

/// `document.get(path: string) -> {path: string}`, `arg_utf8_max=2048`
/// (the exact shape S6/S7 describe).
pub fn document_get_entry() -> FunctionEntry {
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
            max_request_bytes: 8192,
            max_response_bytes: 8192,
            max_units: 1000,
            arg_utf8_max: Some(vec![Some(2048)]),
        },
        error_codes: vec![ErrorCodeEntry {
            code: "NOT_FOUND".to_string(),
            tag: "document/not_found".to_string(),
        }],
    }
}

pub fn document_manifest() -> Manifest {
    Manifest {
        abi_id: "document.v1".to_string(),
        abi_version: 1,
        functions: vec![document_get_entry()],
    }
}

pub fn document_manifest_hash() -> String {
    document_manifest().hash_hex(&DvLimits::default()).unwrap()
}

pub fn program(code: &str) -> Program {
    Program {
        code: code.to_string(),
        abi_manifest_hash: document_manifest_hash(),
    }
}

pub fn empty_input() -> Input {
    Input {
        event: Dv::Null,
        event_canonical: Dv::Null,
        steps: Dv::Int(0),
    }
}

/// `document.get(path)` always answers `{ok: {path}, units: 5}` — the
/// S6 echo shape.
pub struct DocumentGetHandlers;

impl HostHandlers for DocumentGetHandlers {
    fn call(&mut self, fn_id: u32, args: &[Dv]) -> HostResponseEnvelope {
        assert_eq!(fn_id, 1);
        let path = match &args[0] {
            Dv::Str(s) => s.clone(),
            _ => unreachable!("arg_schema enforces string"),
        };
        let mut value = BTreeMap::new();
        value.insert("path".to_string(), Dv::Str(path));
        HostResponseEnvelope::Ok {
            value: Dv::Map(value),
            units: 5,
        }
    }
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    hex_lower(&Sha256::digest(bytes))
}

pub fn encode_hex(dv: &Dv) -> String {
    let bytes = encode(dv, &DvLimits::default()).unwrap();
    hex_lower(&bytes)
}

fn hex_lower(bytes: &[u8]) -> String {
    let mut s = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        s.push_str(&format!("{b:02x}"));
    }
    s
}
