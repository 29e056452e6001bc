//! Reply parsing and error classification
//!
//! Turns raw reply text into either the JSON-RPC `result` or a classified
//! [`RpcError`]. All classification lives here so the retry loop only has to
//! look at [`RpcError::class`].

use crate::error::RpcError;
use crate::rpc::dialect::KNOWN_APIS;
use serde_json::Value;

/// Classify an HTTP status that is not a success
///
/// Returns `None` for statuses that carry no retry meaning on their own; the
/// body decides those.
pub fn classify_status(status: u16) -> Option<RpcError> {
    match status {
        500 | 502 | 503 | 504 => Some(RpcError::ServerBusy { status }),
        501 | 505..=511 => Some(RpcError::ServerPermanent { status }),
        _ => None,
    }
}

/// Classify a reply body that is not JSON (typically a proxy error page)
pub fn classify_server_reply(reply: &str) -> RpcError {
    const MARKERS: &[(&[&str], u16)] = &[
        (&["Internal Server Error", "500"], 500),
        (&["Not Implemented", "501"], 501),
        (&["Bad Gateway", "502"], 502),
        (&["Service Temporarily Unavailable", "Service Unavailable", "503"], 503),
        (&["Gateway Time-out", "Gateway Timeout", "504"], 504),
        (&["HTTP Version not supported", "505"], 505),
        (&["Variant Also Negotiates", "506"], 506),
        (&["Insufficient Storage", "507"], 507),
        (&["Loop Detected", "508"], 508),
        (&["Bandwidth Limit Exceeded", "509"], 509),
        (&["Not Extended", "510"], 510),
        (&["Network Authentication Required", "511"], 511),
    ];

    for (needles, status) in MARKERS {
        if needles.iter().any(|n| reply.contains(n)) {
            if let Some(err) = classify_status(*status) {
                return err;
            }
        }
    }

    let excerpt: String = reply.chars().take(120).collect();
    RpcError::InvalidResponse(format!("expected JSON, got: {excerpt}"))
}

/// Classify a JSON-RPC error object by its message
pub fn classify_remote_error(code: i64, message: &str) -> RpcError {
    let lower = message.to_lowercase();

    if lower.contains("could not find method") || lower.contains("no method with name") {
        RpcError::NoMethodWithName(message.to_string())
    } else if lower.contains("could not find api") || lower.contains("no api with name") {
        // A well-known API missing means this node lacks the plugin
        if mentions_known_api(message) {
            RpcError::NodeFault(message.to_string())
        } else {
            RpcError::NoApiWithName(message.to_string())
        }
    } else if lower.contains("internal error")
        || lower.contains("unknown exception")
        || lower.contains("!check_max_block_age")
    {
        RpcError::NodeFault(message.to_string())
    } else if lower.contains("unable to acquire database lock")
        || lower.contains("request timeout")
        || lower.contains("bad or missing upstream response")
    {
        RpcError::RetryableRemote(message.to_string())
    } else {
        RpcError::Unhandled {
            code,
            message: message.to_string(),
        }
    }
}

fn mentions_known_api(message: &str) -> bool {
    message
        .split(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .any(|token| KNOWN_APIS.contains(&token))
}

/// Extract the `result` of a JSON-RPC reply
///
/// A `null` result is returned as is; absence of a looked-up object is not an
/// error at this layer.
pub fn parse_reply(reply: &str, expected_id: u64) -> Result<Value, RpcError> {
    let parsed: Value = match serde_json::from_str(reply) {
        Ok(value) => value,
        Err(_) => return Err(classify_server_reply(reply)),
    };

    let Some(object) = parsed.as_object() else {
        return Err(RpcError::InvalidResponse("reply is not an object".to_string()));
    };

    if let Some(error) = object.get("error").filter(|e| !e.is_null()) {
        let code = error.get("code").and_then(Value::as_i64).unwrap_or(0);
        let message = error
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| error.to_string());
        return Err(classify_remote_error(code, &message));
    }

    if let Some(id) = object.get("id").and_then(Value::as_u64) {
        if id != expected_id {
            return Err(RpcError::InvalidResponse(format!(
                "reply id {id} does not match request id {expected_id}"
            )));
        }
    }

    object
        .get("result")
        .cloned()
        .ok_or_else(|| RpcError::InvalidResponse("reply has neither result nor error".to_string()))
}
