//! Liveness check for a single remote handle.

use serde::Serialize;

use crate::logic::CallStep;
use crate::remote::{Link, ObjectRef};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Liveness {
    Alive,
    Dead,
}

/// Issue the kind's read-only probe call against `object`.
///
/// Any successful reply counts as alive, including `null`, empty and `false`
/// business answers ("no current timeline" is still a live project). Any
/// error (stale reference, lost connection, timeout, exception) counts as
/// dead. Never propagates an error and never changes remote state.
pub fn probe(link: &Link, object: &ObjectRef, step: &CallStep) -> Liveness {
    match link.call_object(object, &step.method, step.args.clone()) {
        Ok(_) => Liveness::Alive,
        Err(e) => {
            tracing::debug!(
                target_type = %object.type_name,
                probe = %step.method,
                error = %e,
                "probe reports dead handle"
            );
            Liveness::Dead
        }
    }
}
