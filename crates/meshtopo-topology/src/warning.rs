//! Recoverable topology inconsistencies.
//!
//! Warnings never abort resolution. They are logged when raised and returned
//! alongside the resolved instance so callers can surface them.

use std::fmt;

use meshtopo_common::types::{MachineName, Role};

use crate::parser::net::Cidr;

/// An inconsistency that resolution tolerated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TopologyWarning {
    /// A lighthouse declares a CIDR different from the selected instance CIDR.
    CidrDisagreement {
        /// Lighthouse whose CIDR was used.
        selected_from: MachineName,
        /// Instance CIDR in effect.
        selected: Cidr,
        /// Disagreeing lighthouse.
        machine: MachineName,
        /// CIDR it declared.
        declared: Cidr,
    },
    /// A machine is assigned a role but has no settings yet.
    Unconfigured {
        /// The machine.
        machine: MachineName,
        /// Role it was assigned.
        role: Role,
    },
}

impl fmt::Display for TopologyWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CidrDisagreement {
                selected_from,
                selected,
                machine,
                declared,
            } => write!(
                f,
                "lighthouse {machine} declares {declared}, using {selected} from {selected_from}"
            ),
            Self::Unconfigured { machine, role } => {
                write!(f, "{role} {machine} has no settings and was skipped")
            }
        }
    }
}
