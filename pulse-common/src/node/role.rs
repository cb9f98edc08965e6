use std::fmt;

use serde::{Deserialize, Serialize};

/// Role a node is admitted with. Never reassigned after admission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum StaticRole {
    Unknown,
    Virtual,
    LightMaterial,
    HeavyMaterial,
}

impl Default for StaticRole {
    fn default() -> Self {
        Self::Unknown
    }
}

impl fmt::Display for StaticRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StaticRole::Unknown => "unknown",
            StaticRole::Virtual => "virtual",
            StaticRole::LightMaterial => "light_material",
            StaticRole::HeavyMaterial => "heavy_material",
        };
        write!(f, "{}", s)
    }
}

/// Per-task role used by the execution layer when it asks which nodes may
/// serve a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DynamicRole {
    VirtualExecutor,
    VirtualValidator,
    LightExecutor,
    LightValidator,
    HeavyExecutor,
    Undefined,
}

impl From<DynamicRole> for StaticRole {
    fn from(role: DynamicRole) -> Self {
        match role {
            DynamicRole::VirtualExecutor | DynamicRole::VirtualValidator => StaticRole::Virtual,
            DynamicRole::LightExecutor | DynamicRole::LightValidator => StaticRole::LightMaterial,
            DynamicRole::HeavyExecutor => StaticRole::HeavyMaterial,
            DynamicRole::Undefined => StaticRole::Unknown,
        }
    }
}
