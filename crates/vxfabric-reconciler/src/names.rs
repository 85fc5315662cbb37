//! Deterministic kernel object names derived from desired-state
//! fields. Centralized here so the reconciler, diff engine, and tests
//! never hand-format these strings independently.

/// Name of the L2 VXLAN device for a given L2VNI.
pub fn l2_vxlan(l2vni: u32) -> String {
    format!("vxlan{l2vni}")
}

/// Name of the L3 VXLAN device for a given L3VNI.
pub fn l3_vxlan(l3vni: u32) -> String {
    format!("vxlan{l3vni}")
}

/// Name of the L2 bridge for a given L2VNI.
pub fn l2_bridge(l2vni: u32) -> String {
    format!("br-vsi{l2vni}")
}

/// Name of the L3 bridge for a given L3VNI.
pub fn l3_bridge(l3vni: u32) -> String {
    format!("br-vsi{l3vni}")
}

/// Name of the per-VLAN dot1q tap on the overlay interface.
pub fn vlan_tap(overlay_if: &str, vlan_id: u32) -> String {
    format!("{overlay_if}.{vlan_id}")
}

/// Name of the inner leg of a VRF's veth pair.
pub fn veth_inner(prefix: &str) -> String {
    format!("{prefix}-in")
}

/// Name of the external leg of a VRF's veth pair.
pub fn veth_ext(prefix: &str) -> String {
    format!("{prefix}-ext")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derived_names() {
        assert_eq!(l2_vxlan(10100), "vxlan10100");
        assert_eq!(l3_vxlan(10010), "vxlan10010");
        assert_eq!(l2_bridge(10100), "br-vsi10100");
        assert_eq!(l3_bridge(10010), "br-vsi10010");
        assert_eq!(vlan_tap("eth1", 100), "eth1.100");
        assert_eq!(veth_inner("10010"), "10010-in");
        assert_eq!(veth_ext("10010"), "10010-ext");
    }
}
