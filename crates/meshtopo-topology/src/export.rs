//! Routing-priority annotations for the fleet-wide priority resolver.

use meshtopo_common::constants::{NETWORKING_PRIORITY, SERVICE_NAME};
use meshtopo_common::types::InstanceName;
use serde::{Deserialize, Serialize};

/// Priority fact attached to an instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Export {
    /// Key identifying the exporting instance, `nebula/<instance>`.
    pub scope_key: String,
    /// Routing priority; higher wins.
    pub priority: i64,
}

/// The export of an instance. Always carries the fixed networking priority.
#[must_use]
pub fn export_for(instance: &InstanceName) -> Export {
    Export {
        scope_key: format!("{SERVICE_NAME}/{instance}"),
        priority: NETWORKING_PRIORITY,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn export_carries_fixed_priority() {
        let export = export_for(&InstanceName::new("mesh"));
        assert_eq!(export.scope_key, "nebula/mesh");
        assert_eq!(export.priority, 850);
    }
}
