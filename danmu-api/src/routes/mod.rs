pub mod bangumi;
pub mod comment;
pub mod config;
pub mod matching;
pub mod search;
pub mod statics;

use serde_json::{json, Value};

/// Wrap a payload in the standard success envelope.
pub(crate) fn success_envelope(extra: Value) -> Value {
    let mut body = json!({
        "errorCode": 0,
        "success": true,
        "errorMessage": "",
    });
    if let (Some(obj), Some(extra)) = (body.as_object_mut(), extra.as_object()) {
        for (key, value) in extra {
            obj.insert(key.clone(), value.clone());
        }
    }
    body
}
