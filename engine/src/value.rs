//! Conversion between `Dv` and `rquickjs::Value` (§4.3, §4.5 step 1).
//!
//! The DV codec itself never touches a JS value — it only knows bytes.
//! This module is the one place that bridges the two: coercing a JS
//! argument into a `Dv` per a manifest `ArgType`, and converting a `Dv`
//! the dispatcher hands back into the JS value `Host.v1.<path>()`
//! actually returns.

use std::collections::BTreeMap;

use rquickjs::{Ctx, IntoJs, Object, TypedArray, Value};

use detjs_core::Dv;

use crate::error::EngineError;

/// Convert a `Dv` into the JS value that crosses back into the script.
pub fn dv_to_js<'js>(ctx: &Ctx<'js>, dv: &Dv) -> rquickjs::Result<Value<'js>> {
    match dv {
        Dv::Null => Ok(Value::new_null(ctx.clone())),
        Dv::Bool(b) => b.into_js(ctx),
        Dv::Int(i) => (*i as f64).into_js(ctx),
        Dv::Float(f) => (*f).into_js(ctx),
        Dv::Str(s) => s.as_str().into_js(ctx),
        Dv::Bytes(b) => {
            let arr = TypedArray::<u8>::new(ctx.clone(), b.clone())?;
            arr.into_js(ctx)
        }
        Dv::Array(items) => {
            let arr = rquickjs::Array::new(ctx.clone())?;
            for (i, item) in items.iter().enumerate() {
                arr.set(i, dv_to_js(ctx, item)?)?;
            }
            arr.into_js(ctx)
        }
        Dv::Map(entries) => {
            let obj = Object::new(ctx.clone())?;
            for (k, v) in entries {
                obj.set(k.as_str(), dv_to_js(ctx, v)?)?;
            }
            obj.into_js(ctx)
        }
    }
}

/// Convert a JS value into a `Dv`. Used both for the completion value of
/// `eval` (§4.1 "Eval contract") and for host-call arguments (§4.5 step 1).
///
/// Fails with `EngineError::Internal` rather than attempting a lossy
/// best-effort conversion — every caller of this function is expected to
/// turn that into the spec's `TypeError: result not DV-encodable` (or,
/// for host-call arguments, an `ArgumentError`) at its own call site.
pub fn js_to_dv(value: &Value<'_>) -> Result<Dv, EngineError> {
    if value.is_undefined() {
        return Err(EngineError::Internal(
            "undefined is not DV-encodable".to_string(),
        ));
    }
    if value.is_null() {
        return Ok(Dv::Null);
    }
    if let Some(b) = value.as_bool() {
        return Ok(Dv::Bool(b));
    }
    if let Some(i) = value.as_int() {
        return Ok(Dv::Int(i as i64));
    }
    if let Some(f) = value.as_float() {
        if f.fract() == 0.0 && f.is_finite() {
            return Ok(Dv::Int(f as i64));
        }
        return Ok(Dv::Float(f));
    }
    if let Some(s) = value.as_string() {
        let s = s
            .to_string()
            .map_err(|e| EngineError::Internal(format!("string conversion failed: {e}")))?;
        return Ok(Dv::Str(s));
    }
    if let Ok(bytes) = TypedArray::<u8>::from_value(value.clone()) {
        return Ok(Dv::Bytes(bytes.as_bytes().unwrap_or_default().to_vec()));
    }
    if let Some(arr) = value.as_array() {
        let mut items = Vec::with_capacity(arr.len());
        for item in arr.iter::<Value>() {
            let item = item.map_err(|e| EngineError::Internal(format!("array read failed: {e}")))?;
            items.push(js_to_dv(&item)?);
        }
        return Ok(Dv::Array(items));
    }
    if let Some(obj) = value.as_object() {
        // Plain objects only; anything with exotic internal behavior
        // (functions, proxies — already unreachable since `Proxy` is
        // removed by the determinism profile) is not DV-encodable.
        if obj.is_function() || obj.is_array() {
            return Err(EngineError::Internal(
                "value is not DV-encodable".to_string(),
            ));
        }
        let mut map = BTreeMap::new();
        for key in obj.keys::<String>() {
            let key = key.map_err(|e| EngineError::Internal(format!("object key read failed: {e}")))?;
            let val: Value = obj
                .get(key.as_str())
                .map_err(|e| EngineError::Internal(format!("object read failed: {e}")))?;
            map.insert(key, js_to_dv(&val)?);
        }
        return Ok(Dv::Map(map));
    }
    Err(EngineError::Internal(
        "value is not DV-encodable".to_string(),
    ))
}

#[cfg(test)]
mod tests {
    // `js_to_dv`/`dv_to_js` need a live `rquickjs::Context` to exercise;
    // covered end-to-end by `engine/tests/golden_vectors.rs` and
    // `engine/tests/gas_accounting.rs` rather than in isolation here.
}
