//! HTTP transport to the bridge script running inside the editor's own
//! scripting runtime.
//!
//! Wire format:
//! - `POST {base}/connect`: handshake, replies `{"ok": true, "result": {..}}`
//! - `POST {base}/call` with a [`RemoteCall`] body, replies
//!   `{"ok": true, "result": <value>}` or
//!   `{"ok": false, "error": {"code": "<code>", "message": ".."}}`
//!
//! Error code `stale_object` is the peer's dead-handle sentinel.

use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;

use super::{RemoteCall, RemoteError, Transport};

#[derive(Debug, Deserialize)]
struct Reply {
    ok: bool,
    #[serde(default)]
    result: Value,
    #[serde(default)]
    error: Option<ReplyError>,
}

#[derive(Debug, Deserialize)]
struct ReplyError {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
}

pub struct BridgeTransport {
    base_url: String,
    timeout: Duration,
    client: reqwest::blocking::Client,
}

impl BridgeTransport {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, RemoteError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RemoteError::ConnectionLost(format!("HTTP client init: {e}")))?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
            client,
        })
    }

    fn post(&self, path: &str, body: &Value, method: &str) -> Result<Value, RemoteError> {
        let url = format!("{}/{path}", self.base_url);
        let resp = self
            .client
            .post(&url)
            .json(body)
            .send()
            .map_err(|e| self.map_send_error(&e))?;
        let reply: Value = resp
            .json()
            .map_err(|e| RemoteError::Protocol(format!("{url}: {e}")))?;
        decode_reply(reply, method)
    }

    fn map_send_error(&self, e: &reqwest::Error) -> RemoteError {
        if e.is_timeout() {
            RemoteError::Timeout {
                timeout_ms: u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX),
            }
        } else {
            RemoteError::ConnectionLost(e.to_string())
        }
    }
}

impl Transport for BridgeTransport {
    fn connect(&self) -> Result<(), RemoteError> {
        let info = self.post("connect", &serde_json::json!({}), "connect")?;
        tracing::info!(endpoint = %self.base_url, peer = %info, "bridge handshake complete");
        Ok(())
    }

    fn call(&self, call: &RemoteCall) -> Result<Value, RemoteError> {
        let body = serde_json::to_value(call).map_err(|e| RemoteError::Protocol(e.to_string()))?;
        tracing::trace!(method = %call.method, "bridge call");
        self.post("call", &body, &call.method)
    }

    fn describe(&self) -> String {
        format!("bridge {}", self.base_url)
    }
}

/// Turn a reply envelope into the call's outcome.
pub(crate) fn decode_reply(reply: Value, method: &str) -> Result<Value, RemoteError> {
    let reply: Reply =
        serde_json::from_value(reply).map_err(|e| RemoteError::Protocol(e.to_string()))?;
    if reply.ok {
        return Ok(reply.result);
    }
    let err = reply.error.unwrap_or(ReplyError {
        code: String::new(),
        message: "peer reported failure without detail".to_string(),
    });
    Err(match err.code.as_str() {
        "stale_object" => RemoteError::StaleObject {
            method: method.to_string(),
        },
        "disconnected" => RemoteError::ConnectionLost(err.message),
        _ => RemoteError::Call {
            method: method.to_string(),
            message: err.message,
        },
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn ok_reply_yields_result() {
        let v = decode_reply(json!({"ok": true, "result": {"$ref": "1", "$type": "Project"}}), "GetCurrentProject").unwrap();
        assert_eq!(v["$type"], "Project");
    }

    #[test]
    fn ok_reply_without_result_is_null() {
        assert_eq!(decode_reply(json!({"ok": true}), "SaveProject").unwrap(), Value::Null);
    }

    #[test]
    fn stale_sentinel_maps_to_stale_object() {
        let err = decode_reply(
            json!({"ok": false, "error": {"code": "stale_object", "message": "gone"}}),
            "GetName",
        )
        .unwrap_err();
        assert_eq!(err, RemoteError::StaleObject { method: "GetName".into() });
    }

    #[test]
    fn other_codes_are_call_failures() {
        let err = decode_reply(
            json!({"ok": false, "error": {"code": "exception", "message": "boom"}}),
            "AppendToTimeline",
        )
        .unwrap_err();
        assert!(matches!(err, RemoteError::Call { ref message, .. } if message == "boom"));
        let lost = decode_reply(json!({"ok": false, "error": {"code": "disconnected"}}), "x").unwrap_err();
        assert!(lost.is_link_fatal());
    }

    #[test]
    fn garbage_is_protocol_error() {
        let err = decode_reply(json!([1, 2, 3]), "GetName").unwrap_err();
        assert!(matches!(err, RemoteError::Protocol(_)));
    }

    #[test]
    fn unreachable_bridge_reports_connection_lost() {
        let t = BridgeTransport::new("http://127.0.0.1:9/", Duration::from_millis(300)).unwrap();
        assert_eq!(t.describe(), "bridge http://127.0.0.1:9");
        let err = t.connect().unwrap_err();
        assert!(err.is_link_fatal());
    }
}
