//! The diff engine: a pure function of old and new desired state that
//! partitions each object kind into added/removed/changed sets. No
//! kernel interaction, no journal: this module only ever reads its
//! two input documents.

use std::collections::HashMap;

use crate::config::{VlanBinding, VrfBinding};

/// The three-way partition produced for VLAN bindings.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VlanDiff {
    pub added: Vec<VlanBinding>,
    pub removed: Vec<VlanBinding>,
    pub changed: Vec<VlanBinding>,
}

/// A single differing field on a changed VRF binding.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldChange {
    pub field: &'static str,
    pub old: String,
    pub new: String,
}

/// A VRF binding that exists in both old and new state but with at
/// least one differing field.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangedVrf {
    pub old: VrfBinding,
    pub new: VrfBinding,
    pub changes: Vec<FieldChange>,
}

/// The three-way partition produced for VRF bindings.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VrfDiff {
    pub added: Vec<VrfBinding>,
    pub removed: Vec<VrfBinding>,
    pub changed: Vec<ChangedVrf>,
}

/// Diffs VLAN bindings by `VlanID` identity. An entry with a matching
/// `VlanID` but any other differing field lands in `changed`; the
/// reconciler treats `changed` identically to `added`, rebuilding the
/// subtree in place rather than tearing the old one down first.
///
/// Output order is stable: `added`/`changed` follow `new`'s order,
/// `removed` follows `old`'s order.
pub fn diff_vlans(old: &[VlanBinding], new: &[VlanBinding]) -> VlanDiff {
    let old_by_id: HashMap<u32, &VlanBinding> = old.iter().map(|v| (v.VlanID, v)).collect();
    let new_by_id: HashMap<u32, &VlanBinding> = new.iter().map(|v| (v.VlanID, v)).collect();

    let mut out = VlanDiff::default();
    for v in new {
        match old_by_id.get(&v.VlanID) {
            None => out.added.push(v.clone()),
            Some(prev) if *prev != v => out.changed.push(v.clone()),
            Some(_) => {}
        }
    }
    for v in old {
        if !new_by_id.contains_key(&v.VlanID) {
            out.removed.push(v.clone());
        }
    }
    out
}

/// Diffs VRF bindings by `VrfName` identity, with a per-field change
/// map for the changed set.
pub fn diff_vrfs(old: &[VrfBinding], new: &[VrfBinding]) -> VrfDiff {
    let old_by_name: HashMap<&str, &VrfBinding> =
        old.iter().map(|v| (v.VrfName.as_str(), v)).collect();
    let new_by_name: HashMap<&str, &VrfBinding> =
        new.iter().map(|v| (v.VrfName.as_str(), v)).collect();

    let mut out = VrfDiff::default();
    for v in new {
        match old_by_name.get(v.VrfName.as_str()) {
            None => out.added.push(v.clone()),
            Some(prev) => {
                let changes = field_changes(prev, v);
                if !changes.is_empty() {
                    out.changed.push(ChangedVrf {
                        old: (*prev).clone(),
                        new: v.clone(),
                        changes,
                    });
                }
            }
        }
    }
    for v in old {
        if !new_by_name.contains_key(v.VrfName.as_str()) {
            out.removed.push(v.clone());
        }
    }
    out
}

fn field_changes(old: &VrfBinding, new: &VrfBinding) -> Vec<FieldChange> {
    let mut changes = Vec::new();
    macro_rules! check {
        ($field:literal, $old:expr, $new:expr) => {
            if $old != $new {
                changes.push(FieldChange {
                    field: $field,
                    old: format!("{:?}", $old),
                    new: format!("{:?}", $new),
                });
            }
        };
    }
    check!("VrfName", old.VrfName, new.VrfName);
    check!("L3VNI", old.L3VNI, new.L3VNI);
    check!("RouteTableID", old.route_table_id(), new.route_table_id());
    check!("VethPrefix", old.veth_prefix(), new.veth_prefix());
    check!("VethRequired", old.VethRequired, new.VethRequired);
    check!("InVethCIDR", old.InVethCIDR, new.InVethCIDR);
    check!("ExtVethCIDR", old.ExtVethCIDR, new.ExtVethCIDR);
    changes
}
