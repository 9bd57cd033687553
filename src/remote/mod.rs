//! Remote scripting peer: object references, the transport contract, and the
//! serialized connection (`Link`) that survives logic reloads.
//!
//! Everything that crosses the wire is `serde_json::Value`. Object references
//! travel as `{"$ref": "<id>", "$type": "<Type>"}` and `null` means the peer had
//! no such object.

pub mod bridge;
pub mod fake;
pub mod value;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Opaque reference to an object living in the remote application.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectRef {
    #[serde(rename = "$ref")]
    pub id: String,
    #[serde(rename = "$type")]
    pub type_name: String,
}

impl ObjectRef {
    pub fn new(id: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            type_name: type_name.into(),
        }
    }

    /// Encode as a call argument.
    pub fn to_value(&self) -> Value {
        serde_json::json!({ "$ref": self.id, "$type": self.type_name })
    }
}

/// One remote method invocation. `target == None` addresses the scripting
/// entry point itself (the peer's module, not an object).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteCall {
    pub target: Option<ObjectRef>,
    pub method: String,
    #[serde(default)]
    pub args: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RemoteError {
    /// The peer reports the referenced object no longer exists.
    #[error("stale object reference in call to {method}")]
    StaleObject { method: String },
    #[error("connection to the scripting peer lost: {0}")]
    ConnectionLost(String),
    #[error("remote call timed out after {timeout_ms} ms")]
    Timeout { timeout_ms: u64 },
    /// The remote method itself raised.
    #[error("{method} failed: {message}")]
    Call { method: String, message: String },
    #[error("malformed reply from scripting peer: {0}")]
    Protocol(String),
}

impl RemoteError {
    /// Errors after which the transport itself can no longer be trusted.
    pub fn is_link_fatal(&self) -> bool {
        matches!(self, Self::ConnectionLost(_) | Self::Timeout { .. })
    }
}

/// Contract every scripting peer implementation fulfils.
pub trait Transport: Send + Sync {
    /// Handshake. Called once on first use and again on reconnect.
    fn connect(&self) -> Result<(), RemoteError>;

    fn call(&self, call: &RemoteCall) -> Result<Value, RemoteError>;

    /// Human-readable endpoint description for status output.
    fn describe(&self) -> String;
}

/// The long-lived connection handle. Owns the transport and serializes every
/// call through a single gate so at most one remote call is in flight.
pub struct Link {
    transport: Box<dyn Transport>,
    gate: Mutex<()>,
    dead: AtomicBool,
}

impl Link {
    /// Wrap a transport without performing the handshake.
    pub fn new(transport: Box<dyn Transport>) -> Self {
        Self {
            transport,
            gate: Mutex::new(()),
            dead: AtomicBool::new(false),
        }
    }

    /// Handshake and wrap.
    pub fn open(transport: Box<dyn Transport>) -> Result<Arc<Self>, RemoteError> {
        let link = Self::new(transport);
        link.reconnect()?;
        Ok(Arc::new(link))
    }

    pub fn call(
        &self,
        target: Option<&ObjectRef>,
        method: &str,
        args: Vec<Value>,
    ) -> Result<Value, RemoteError> {
        let _gate = self.gate.lock();
        let call = RemoteCall {
            target: target.cloned(),
            method: method.to_string(),
            args,
        };
        let result = self.transport.call(&call);
        if let Err(e) = &result {
            if e.is_link_fatal() {
                tracing::warn!(method, error = %e, "scripting link marked dead");
                self.dead.store(true, Ordering::SeqCst);
            }
        }
        result
    }

    pub fn call_object(
        &self,
        object: &ObjectRef,
        method: &str,
        args: Vec<Value>,
    ) -> Result<Value, RemoteError> {
        self.call(Some(object), method, args)
    }

    /// Re-run the transport handshake. Clears the dead flag on success.
    pub fn reconnect(&self) -> Result<(), RemoteError> {
        let _gate = self.gate.lock();
        self.transport.connect()?;
        self.dead.store(false, Ordering::SeqCst);
        Ok(())
    }

    /// True once a call failed in a way that invalidates the transport.
    pub fn is_dead(&self) -> bool {
        self.dead.load(Ordering::SeqCst)
    }

    pub fn describe(&self) -> String {
        self.transport.describe()
    }
}

impl std::fmt::Debug for Link {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Link")
            .field("endpoint", &self.transport.describe())
            .field("dead", &self.is_dead())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::fake::FakeResolve;
    use super::*;

    #[test]
    fn object_ref_wire_shape() {
        let r = ObjectRef::new("7", "Timeline");
        let v = serde_json::to_value(&r).unwrap();
        assert_eq!(v, serde_json::json!({"$ref": "7", "$type": "Timeline"}));
        assert_eq!(r.to_value(), v);
        let back: ObjectRef = serde_json::from_value(v).unwrap();
        assert_eq!(back, r);
    }

    #[test]
    fn fatal_error_marks_link_dead_until_reconnect() {
        let peer = FakeResolve::new();
        let link = Link::open(Box::new(peer.clone())).unwrap();
        assert!(!link.is_dead());

        peer.disconnect();
        let err = link.call(None, "scriptapp", vec![Value::from("Resolve")]).unwrap_err();
        assert!(err.is_link_fatal());
        assert!(link.is_dead());

        link.reconnect().unwrap();
        assert!(!link.is_dead());
        assert_eq!(peer.connect_count(), 2);
    }

    #[test]
    fn call_error_does_not_kill_link() {
        let peer = FakeResolve::new();
        let link = Link::open(Box::new(peer.clone())).unwrap();
        let err = link.call(None, "NoSuchEntryPoint", vec![]).unwrap_err();
        assert!(matches!(err, RemoteError::Call { .. }));
        assert!(!link.is_dead());
    }
}
