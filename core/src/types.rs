//! Wire-level data shapes shared by the engine shell and the host
//! dispatcher (§3, §6): `Program`/`Input` at init time, the host-call
//! envelope and tape record crossing the syscall boundary, and the
//! tagged outcome the result surfacer hands back to the embedder.

use sha2::{Digest, Sha256};

use crate::dv::Dv;
use crate::error::ErrorKind;
use crate::gas::GasTrace;

/// `P.code` plus the pinned hash of the manifest it was compiled
/// against (§3). The engine refuses to run if this hash does not match
/// the manifest actually bound (S8).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Program {
    pub code: String,
    pub abi_manifest_hash: String,
}

/// The three DV blobs an evaluation starts from (§3). `event_canonical`
/// is expected to already be the canonical encoding of `event`, but the
/// engine does not itself enforce that relationship — callers that care
/// should re-derive it rather than trust an out-of-band value.
#[derive(Debug, Clone, PartialEq)]
pub struct Input {
    pub event: Dv,
    pub event_canonical: Dv,
    pub steps: Dv,
}

/// The host's answer to one `host_call`, before or after the two-phase
/// gas charge has been applied (§3, §4.5). Exactly one of `Ok`/`Err`.
#[derive(Debug, Clone, PartialEq)]
pub enum HostResponseEnvelope {
    Ok { value: Dv, units: u32 },
    Err {
        code: String,
        tag: Option<String>,
        details: Option<Dv>,
        units: u32,
    },
}

impl HostResponseEnvelope {
    pub fn to_dv(&self) -> Dv {
        use std::collections::BTreeMap;
        let mut m = BTreeMap::new();
        match self {
            HostResponseEnvelope::Ok { value, units } => {
                m.insert("ok".to_string(), value.clone());
                m.insert("units".to_string(), Dv::Int(*units as i64));
            }
            HostResponseEnvelope::Err { code, tag, details, units } => {
                let mut err = BTreeMap::new();
                err.insert("code".to_string(), Dv::Str(code.clone()));
                if let Some(tag) = tag {
                    err.insert("tag".to_string(), Dv::Str(tag.clone()));
                }
                if let Some(details) = details {
                    err.insert("details".to_string(), details.clone());
                }
                m.insert("err".to_string(), Dv::Map(err));
                m.insert("units".to_string(), Dv::Int(*units as i64));
            }
        }
        Dv::Map(m)
    }

    /// Parse a decoded envelope DV back into the typed shape. Used by
    /// the dispatcher to validate whatever a `HostHandlers` impl
    /// produced before it is charged and taped.
    pub fn from_dv(dv: &Dv) -> Option<Self> {
        let Dv::Map(m) = dv else { return None };
        let units = match m.get("units")? {
            Dv::Int(v) if *v >= 0 && *v <= u32::MAX as i64 => *v as u32,
            _ => return None,
        };
        if let Some(value) = m.get("ok") {
            if m.len() != 2 {
                return None;
            }
            return Some(HostResponseEnvelope::Ok {
                value: value.clone(),
                units,
            });
        }
        if let Some(Dv::Map(err)) = m.get("err") {
            if m.len() != 2 {
                return None;
            }
            let code = match err.get("code") {
                Some(Dv::Str(s)) => s.clone(),
                _ => return None,
            };
            let tag = match err.get("tag") {
                Some(Dv::Str(s)) => Some(s.clone()),
                None => None,
                _ => return None,
            };
            let details = err.get("details").cloned();
            let known = 1 + tag.is_some() as usize + details.is_some() as usize;
            if err.len() != known {
                return None;
            }
            return Some(HostResponseEnvelope::Err {
                code,
                tag,
                details,
                units,
            });
        }
        None
    }
}

/// One entry in the bounded, drop-newest audit tape (§3, §4.5, §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostTapeRecord {
    pub fn_id: u32,
    pub req_len: u32,
    pub resp_len: u32,
    pub units: u32,
    pub gas_pre: u64,
    pub gas_post: u64,
    pub req_hash: [u8; 32],
    pub resp_hash: [u8; 32],
    pub is_error: bool,
    pub charge_failed: bool,
}

impl HostTapeRecord {
    /// The fixed-key JSON object used for cross-language tape hashing
    /// (§6). `gasPre`/`gasPost` are quoted strings — a `u64` does not
    /// round-trip losslessly through an ordinary JSON number.
    pub fn canonical_json(&self) -> String {
        format!(
            "{{\"fnId\":{},\"reqLen\":{},\"respLen\":{},\"units\":{},\"gasPre\":\"{}\",\"gasPost\":\"{}\",\"isError\":{},\"chargeFailed\":{},\"reqHash\":\"{}\",\"respHash\":\"{}\"}}",
            self.fn_id,
            self.req_len,
            self.resp_len,
            self.units,
            self.gas_pre,
            self.gas_post,
            self.is_error,
            self.charge_failed,
            hex_lower(&self.req_hash),
            hex_lower(&self.resp_hash),
        )
    }
}

/// SHA-256 over the concatenation of each record's `canonical_json`, in
/// tape order (§6 "Tape hashing").
pub fn tape_hash_hex(records: &[HostTapeRecord]) -> String {
    let mut hasher = Sha256::new();
    for r in records {
        hasher.update(r.canonical_json().as_bytes());
    }
    hex_lower(&hasher.finalize())
}

fn hex_lower(bytes: &[u8]) -> String {
    let mut s = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        s.push_str(&format!("{b:02x}"));
    }
    s
}

/// `sha256(bytes)` as raw 32 bytes, used for both `reqHash`/`respHash`
/// on the tape.
pub fn sha256_bytes(bytes: &[u8]) -> [u8; 32] {
    Sha256::digest(bytes).into()
}

/// `{kind, code?, tag?}` attached to every `Err` outcome (§4.6, §7).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorInfo {
    pub kind: ErrorKind,
    pub code: Option<String>,
    pub tag: Option<String>,
}

/// The tagged union the result surfacer (C6) hands back for one
/// evaluation (§4.6). `tape`/`trace` are only `Some` when the caller
/// enabled the corresponding collector before `eval`.
#[derive(Debug, Clone, PartialEq)]
pub enum EvalOutcome {
    Ok {
        value: Dv,
        raw: String,
        gas_used: u64,
        gas_remaining: u64,
        tape: Option<Vec<HostTapeRecord>>,
        trace: Option<GasTrace>,
    },
    Err {
        error: ErrorInfo,
        message: String,
        raw: String,
        gas_used: u64,
        gas_remaining: u64,
        tape: Option<Vec<HostTapeRecord>>,
        trace: Option<GasTrace>,
    },
}

/// `RESULT <dv-hex> GAS remaining=<n> used=<n>` (§6 raw output grammar).
pub fn raw_result_line(dv_hex: &str, remaining: u64, used: u64) -> String {
    format!("RESULT {dv_hex} GAS remaining={remaining} used={used}")
}

/// `ERROR <message> GAS remaining=<n> used=<n>` (§6 raw output grammar).
pub fn raw_error_line(message: &str, remaining: u64, used: u64) -> String {
    format!("ERROR {message} GAS remaining={remaining} used={used}")
}
