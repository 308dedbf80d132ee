//! Read routing policy.
//!
//! Decides which endpoint each read attempt goes to. The policy is fixed
//! per session: chosen once, applied identically to every attempt.

use crate::observation::EndpointDescriptor;
use serde::{Deserialize, Serialize};
use std::fmt;

/// How reads are routed for the lifetime of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoutingMode {
    /// Always target the synchronous replica, emulating read-your-writes
    /// pinning.
    Sticky,
    /// Always hand reads to the load-balanced endpoint. The balancer's
    /// internal choice of sync vs async is opaque to this engine; we only
    /// record what comes back.
    #[default]
    Balanced,
}

impl fmt::Display for RoutingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sticky => f.write_str("sticky"),
            Self::Balanced => f.write_str("balanced"),
        }
    }
}

/// Choose the target endpoint for one read attempt.
///
/// Pure function, no side effects.
pub fn resolve_target<'a>(
    mode: RoutingMode,
    sticky: &'a EndpointDescriptor,
    balanced: &'a EndpointDescriptor,
) -> &'a EndpointDescriptor {
    match mode {
        RoutingMode::Sticky => sticky,
        RoutingMode::Balanced => balanced,
    }
}
