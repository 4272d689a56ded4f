//! The ABI manifest (C2, §3/§4.4): the declarative, canonically-hashed
//! description of every host capability a program may call through
//! `Host.v1`. Manifests are authored as typed Rust values (there is no
//! separate "raw manifest" representation to parse) — invariants that
//! the spec phrases as numeric-field constraints (non-negative, no
//! fractional parts, no `-0`) hold automatically because every numeric
//! manifest field is a plain `u32`, and `-0.0` is something only the DV
//! float variant can carry, which the codec itself already refuses to
//! decode (see `dv::DvError::NanOrInf`).

use std::collections::BTreeMap;

use sha2::{Digest, Sha256};

use crate::dv::{Dv, DvLimits};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    Read,
    Write,
    Emit,
}

impl Effect {
    fn as_str(self) -> &'static str {
        match self {
            Effect::Read => "READ",
            Effect::Write => "WRITE",
            Effect::Emit => "EMIT",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgType {
    Null,
    Bool,
    Int,
    Float,
    String,
    Bytes,
    Dv,
}

impl ArgType {
    fn as_str(self) -> &'static str {
        match self {
            ArgType::Null => "null",
            ArgType::Bool => "bool",
            ArgType::Int => "int",
            ArgType::Float => "float",
            ArgType::String => "string",
            ArgType::Bytes => "bytes",
            ArgType::Dv => "dv",
        }
    }

    fn is_string(self) -> bool {
        matches!(self, ArgType::String)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GasParams {
    pub schedule_id: u32,
    pub base: u32,
    pub k_arg_bytes: u32,
    pub k_ret_bytes: u32,
    pub k_units: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Limits {
    pub max_request_bytes: u32,
    pub max_response_bytes: u32,
    pub max_units: u32,
    /// `None` when every argument is non-string (§4.4 "omitted entirely").
    /// Otherwise one slot per `arg_schema` entry: `Some(max)` for string
    /// arguments, `None` for every other slot.
    pub arg_utf8_max: Option<Vec<Option<u32>>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorCodeEntry {
    pub code: String,
    pub tag: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionEntry {
    pub fn_id: u32,
    pub js_path: Vec<String>,
    pub effect: Effect,
    pub arity: u32,
    pub arg_schema: Vec<ArgType>,
    pub return_schema: ArgType,
    pub gas: GasParams,
    pub limits: Limits,
    pub error_codes: Vec<ErrorCodeEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Manifest {
    pub abi_id: String,
    pub abi_version: u32,
    pub functions: Vec<FunctionEntry>,
}

/// Manifest validation failures (§4.4), each a stable discriminant.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ManifestError {
    #[error("functions must be sorted by fn_id (fn_id {0} is out of order)")]
    FunctionsNotSorted(u32),
    #[error("duplicate fn_id {0}")]
    DuplicateFnId(u32),
    #[error("fn_id {0} is not > 0")]
    FnIdNotPositive(u32),
    #[error("fn_id {0} has an empty js_path")]
    EmptyJsPath(u32),
    #[error("fn_id {0} has a js_path segment '{1}' that is forbidden")]
    ForbiddenPathSegment(u32, String),
    #[error("js_path of fn_id {0} is a prefix of (or prefixed by) fn_id {1}")]
    PathPrefixConflict(u32, u32),
    #[error("fn_id {0}: arg_utf8_max must be defined for string args and omitted elsewhere")]
    ArgUtf8MaxMismatch(u32),
    #[error("fn_id {0}: error_codes must be sorted by code and unique")]
    ErrorCodesNotSorted(u32),
    #[error("fn_id {0}: error code '{1}' is reserved")]
    ReservedErrorCode(u32, String),
    #[error("fn_id {0}: gas parameters overflow u64 at the declared limits")]
    GasOverflow(u32),
    #[error("canonical encoding failed: {0}")]
    Encoding(#[from] crate::dv::DvError),
    #[error("manifest hash mismatch: expected {expected}, computed {computed}")]
    HashMismatch { expected: String, computed: String },
}

const FORBIDDEN_SEGMENTS: [&str; 3] = ["__proto__", "constructor", "prototype"];

impl Manifest {
    /// Enforce every invariant in §3/§4.4. Called before encoding —
    /// `canonical_bytes`/`hash` both validate first.
    pub fn validate(&self) -> Result<(), ManifestError> {
        let mut last_fn_id: Option<u32> = None;
        for f in &self.functions {
            if f.fn_id == 0 {
                return Err(ManifestError::FnIdNotPositive(f.fn_id));
            }
            match last_fn_id {
                Some(prev) if prev == f.fn_id => return Err(ManifestError::DuplicateFnId(f.fn_id)),
                Some(prev) if prev > f.fn_id => {
                    return Err(ManifestError::FunctionsNotSorted(f.fn_id))
                }
                _ => {}
            }
            last_fn_id = Some(f.fn_id);

            if f.js_path.is_empty() {
                return Err(ManifestError::EmptyJsPath(f.fn_id));
            }
            for seg in &f.js_path {
                if FORBIDDEN_SEGMENTS.contains(&seg.as_str()) {
                    return Err(ManifestError::ForbiddenPathSegment(f.fn_id, seg.clone()));
                }
            }

            match &f.limits.arg_utf8_max {
                None => {
                    if f.arg_schema.iter().any(|a| a.is_string()) {
                        return Err(ManifestError::ArgUtf8MaxMismatch(f.fn_id));
                    }
                }
                Some(slots) => {
                    if slots.len() != f.arg_schema.len() {
                        return Err(ManifestError::ArgUtf8MaxMismatch(f.fn_id));
                    }
                    for (schema, slot) in f.arg_schema.iter().zip(slots) {
                        let ok = if schema.is_string() {
                            slot.is_some()
                        } else {
                            slot.is_none()
                        };
                        if !ok {
                            return Err(ManifestError::ArgUtf8MaxMismatch(f.fn_id));
                        }
                    }
                }
            }

            let mut last_code: Option<&str> = None;
            for ec in &f.error_codes {
                if ec.code == crate::error::RESERVED_CODE_HOST_TRANSPORT
                    || ec.code == crate::error::RESERVED_CODE_HOST_ENVELOPE_INVALID
                {
                    return Err(ManifestError::ReservedErrorCode(f.fn_id, ec.code.clone()));
                }
                if let Some(prev) = last_code {
                    if prev >= ec.code.as_str() {
                        return Err(ManifestError::ErrorCodesNotSorted(f.fn_id));
                    }
                }
                last_code = Some(ec.code.as_str());
            }

            gas_overflow_check(f)?;
        }

        for i in 0..self.functions.len() {
            for j in (i + 1)..self.functions.len() {
                if path_conflicts(&self.functions[i].js_path, &self.functions[j].js_path) {
                    return Err(ManifestError::PathPrefixConflict(
                        self.functions[i].fn_id,
                        self.functions[j].fn_id,
                    ));
                }
            }
        }

        Ok(())
    }

    /// Canonical DV encoding of the manifest (§4.4). Validates first.
    pub fn canonical_bytes(&self, limits: &DvLimits) -> Result<Vec<u8>, ManifestError> {
        self.validate()?;
        let dv = self.to_dv();
        Ok(crate::dv::encode(&dv, limits)?)
    }

    /// `SHA-256(canonical_bytes)`, lowercase hex (§4.4 "Hash").
    pub fn hash_hex(&self, limits: &DvLimits) -> Result<String, ManifestError> {
        let bytes = self.canonical_bytes(limits)?;
        Ok(hex_lower(&Sha256::digest(&bytes)))
    }

    /// Verify that `expected_hash_hex` matches this manifest's computed
    /// hash (§4.1 "Manifest pinning"). On mismatch, the runtime MUST be
    /// treated as unusable until a fresh `init_deterministic`.
    pub fn verify_hash(&self, expected_hash_hex: &str, limits: &DvLimits) -> Result<(), ManifestError> {
        let computed = self.hash_hex(limits)?;
        if computed.eq_ignore_ascii_case(expected_hash_hex) {
            Ok(())
        } else {
            Err(ManifestError::HashMismatch {
                expected: expected_hash_hex.to_string(),
                computed,
            })
        }
    }

    fn to_dv(&self) -> Dv {
        let mut top = BTreeMap::new();
        top.insert("abi_id".to_string(), Dv::Str(self.abi_id.clone()));
        top.insert("abi_version".to_string(), Dv::Int(self.abi_version as i64));
        top.insert(
            "functions".to_string(),
            Dv::Array(self.functions.iter().map(FunctionEntry::to_dv).collect()),
        );
        Dv::Map(top)
    }
}

impl FunctionEntry {
    fn to_dv(&self) -> Dv {
        let mut m = BTreeMap::new();
        m.insert("fn_id".to_string(), Dv::Int(self.fn_id as i64));
        m.insert(
            "js_path".to_string(),
            Dv::Array(self.js_path.iter().map(|s| Dv::Str(s.clone())).collect()),
        );
        m.insert("effect".to_string(), Dv::Str(self.effect.as_str().to_string()));
        m.insert("arity".to_string(), Dv::Int(self.arity as i64));
        m.insert(
            "arg_schema".to_string(),
            Dv::Array(
                self.arg_schema
                    .iter()
                    .map(|a| Dv::Str(a.as_str().to_string()))
                    .collect(),
            ),
        );
        m.insert(
            "return_schema".to_string(),
            Dv::Str(self.return_schema.as_str().to_string()),
        );
        m.insert("gas".to_string(), self.gas.to_dv());
        m.insert("limits".to_string(), self.limits.to_dv());
        m.insert(
            "error_codes".to_string(),
            Dv::Array(self.error_codes.iter().map(ErrorCodeEntry::to_dv).collect()),
        );
        Dv::Map(m)
    }
}

impl GasParams {
    fn to_dv(&self) -> Dv {
        let mut m = BTreeMap::new();
        m.insert("schedule_id".to_string(), Dv::Int(self.schedule_id as i64));
        m.insert("base".to_string(), Dv::Int(self.base as i64));
        m.insert("k_arg_bytes".to_string(), Dv::Int(self.k_arg_bytes as i64));
        m.insert("k_ret_bytes".to_string(), Dv::Int(self.k_ret_bytes as i64));
        m.insert("k_units".to_string(), Dv::Int(self.k_units as i64));
        Dv::Map(m)
    }
}

impl Limits {
    fn to_dv(&self) -> Dv {
        let mut m = BTreeMap::new();
        m.insert(
            "max_request_bytes".to_string(),
            Dv::Int(self.max_request_bytes as i64),
        );
        m.insert(
            "max_response_bytes".to_string(),
            Dv::Int(self.max_response_bytes as i64),
        );
        m.insert("max_units".to_string(), Dv::Int(self.max_units as i64));
        if let Some(slots) = &self.arg_utf8_max {
            let arr = slots
                .iter()
                .map(|s| match s {
                    Some(n) => Dv::Int(*n as i64),
                    None => Dv::Null,
                })
                .collect();
            m.insert("arg_utf8_max".to_string(), Dv::Array(arr));
        }
        Dv::Map(m)
    }
}

impl ErrorCodeEntry {
    fn to_dv(&self) -> Dv {
        let mut m = BTreeMap::new();
        m.insert("code".to_string(), Dv::Str(self.code.clone()));
        m.insert("tag".to_string(), Dv::Str(self.tag.clone()));
        Dv::Map(m)
    }
}

fn path_conflicts(a: &[String], b: &[String]) -> bool {
    let n = a.len().min(b.len());
    a[..n] == b[..n]
}

fn gas_overflow_check(f: &FunctionEntry) -> Result<(), ManifestError> {
    let g = &f.gas;
    let l = &f.limits;
    let arg_term = (g.k_arg_bytes as u64).checked_mul(l.max_request_bytes as u64);
    let ret_term = (g.k_ret_bytes as u64).checked_mul(l.max_response_bytes as u64);
    let units_term = (g.k_units as u64).checked_mul(l.max_units as u64);
    let total = arg_term
        .zip(ret_term)
        .and_then(|(a, b)| a.checked_add(b))
        .zip(units_term)
        .and_then(|(ab, c)| ab.checked_add(c))
        .and_then(|abc| (g.base as u64).checked_add(abc));
    match total {
        Some(_) => Ok(()),
        None => Err(ManifestError::GasOverflow(f.fn_id)),
    }
}

fn hex_lower(bytes: &[u8]) -> String {
    let mut s = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        s.push_str(&format!("{b:02x}"));
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_function(fn_id: u32, path: &[&str]) -> FunctionEntry {
        FunctionEntry {
            fn_id,
            js_path: path.iter().map(|s| s.to_string()).collect(),
            effect: Effect::Read,
            arity: 1,
            arg_schema: vec![ArgType::String],
            return_schema: ArgType::Dv,
            gas: GasParams {
                schedule_id: 1,
                base: 100,
                k_arg_bytes: 1,
                k_ret_bytes: 1,
                k_units: 1,
            },
            limits: Limits {
                max_request_bytes: 4096,
                max_response_bytes: 4096,
                max_units: 1000,
                arg_utf8_max: Some(vec![Some(2048)]),
            },
            error_codes: vec![ErrorCodeEntry {
                code: "NOT_FOUND".to_string(),
                tag: "document/not_found".to_string(),
            }],
        }
    }

    fn sample_manifest() -> Manifest {
        Manifest {
            abi_id: "document.v1".to_string(),
            abi_version: 1,
            functions: vec![sample_function(1, &["document", "get"])],
        }
    }

    #[test]
    fn valid_manifest_passes() {
        assert!(sample_manifest().validate().is_ok());
    }

    #[test]
    fn hash_is_stable_across_reencoding() {
        let m = sample_manifest();
        let limits = DvLimits::default();
        let h1 = m.hash_hex(&limits).unwrap();
        let h2 = m.hash_hex(&limits).unwrap();
        assert_eq!(h1, h2);
        assert_eq!(h1.len(), 64);
        assert!(h1.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn verify_hash_detects_mismatch() {
        let m = sample_manifest();
        let limits = DvLimits::default();
        let err = m.verify_hash("0".repeat(64).as_str(), &limits).unwrap_err();
        assert!(matches!(err, ManifestError::HashMismatch { .. }));
    }

    #[test]
    fn fn_id_zero_rejected() {
        let mut m = sample_manifest();
        m.functions[0].fn_id = 0;
        assert_eq!(m.validate().unwrap_err(), ManifestError::FnIdNotPositive(0));
    }

    #[test]
    fn unsorted_fn_ids_rejected() {
        let mut m = sample_manifest();
        m.functions.push(sample_function(0, &["document", "set"]));
        // fn_id 0 triggers FnIdNotPositive before the sort check; use a
        // valid-but-unsorted id instead.
        m.functions[1].fn_id = 1;
        m.functions[1].js_path = vec!["document".to_string(), "set".to_string()];
        let mut reordered = sample_manifest();
        reordered.functions.insert(0, sample_function(5, &["a"]));
        reordered.functions[1].fn_id = 2;
        assert!(matches!(
            reordered.validate().unwrap_err(),
            ManifestError::FunctionsNotSorted(_)
        ));
    }

    #[test]
    fn duplicate_fn_id_rejected() {
        let mut m = sample_manifest();
        let mut dup = sample_function(1, &["document", "set"]);
        dup.limits.arg_utf8_max = Some(vec![Some(2048)]);
        m.functions.push(dup);
        assert_eq!(m.validate().unwrap_err(), ManifestError::DuplicateFnId(1));
    }

    #[test]
    fn forbidden_path_segment_rejected() {
        let mut m = sample_manifest();
        m.functions[0].js_path = vec!["__proto__".to_string()];
        assert!(matches!(
            m.validate().unwrap_err(),
            ManifestError::ForbiddenPathSegment(_, _)
        ));
    }

    #[test]
    fn prefix_conflict_rejected() {
        let mut m = sample_manifest();
        let mut f2 = sample_function(2, &["document"]);
        f2.arg_schema = vec![];
        f2.limits.arg_utf8_max = None;
        m.functions.push(f2);
        assert!(matches!(
            m.validate().unwrap_err(),
            ManifestError::PathPrefixConflict(_, _)
        ));
    }

    #[test]
    fn arg_utf8_max_required_for_string_args() {
        let mut m = sample_manifest();
        m.functions[0].limits.arg_utf8_max = None;
        assert_eq!(
            m.validate().unwrap_err(),
            ManifestError::ArgUtf8MaxMismatch(1)
        );
    }

    #[test]
    fn arg_utf8_max_forbidden_for_non_string_args() {
        let mut m = sample_manifest();
        m.functions[0].arg_schema = vec![ArgType::Int];
        // arg_utf8_max still has Some(2048) for a non-string slot.
        assert_eq!(
            m.validate().unwrap_err(),
            ManifestError::ArgUtf8MaxMismatch(1)
        );
    }

    #[test]
    fn reserved_error_code_rejected() {
        let mut m = sample_manifest();
        m.functions[0].error_codes = vec![ErrorCodeEntry {
            code: "HOST_TRANSPORT".to_string(),
            tag: "x".to_string(),
        }];
        assert!(matches!(
            m.validate().unwrap_err(),
            ManifestError::ReservedErrorCode(_, _)
        ));
    }

    #[test]
    fn unsorted_error_codes_rejected() {
        let mut m = sample_manifest();
        m.functions[0].error_codes = vec![
            ErrorCodeEntry {
                code: "Z".to_string(),
                tag: "z".to_string(),
            },
            ErrorCodeEntry {
                code: "A".to_string(),
                tag: "a".to_string(),
            },
        ];
        assert!(matches!(
            m.validate().unwrap_err(),
            ManifestError::ErrorCodesNotSorted(_)
        ));
    }

    #[test]
    fn gas_overflow_rejected() {
        let mut m = sample_manifest();
        m.functions[0].gas.k_units = u32::MAX;
        m.functions[0].limits.max_units = u32::MAX;
        assert!(matches!(
            m.validate().unwrap_err(),
            ManifestError::GasOverflow(_)
        ));
    }

    #[test]
    fn arg_utf8_max_omitted_when_no_string_args() {
        let mut f = sample_function(1, &["document", "get"]);
        f.arg_schema = vec![ArgType::Int];
        f.limits.arg_utf8_max = None;
        let m = Manifest {
            abi_id: "x".to_string(),
            abi_version: 1,
            functions: vec![f],
        };
        assert!(m.validate().is_ok());
    }
}
