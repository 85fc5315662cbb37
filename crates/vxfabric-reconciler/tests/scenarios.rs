//! End-to-end reconciliation scenarios driven against the in-memory
//! kernel double, exercising the reconciler, diff engine, journal, and
//! state store together the way a real invocation would chain them.

use vxfabric_reconciler::config::{DesiredState, Mode, VlanBinding, VrfBinding};
use vxfabric_reconciler::diff::{diff_vlans, diff_vrfs};
use vxfabric_reconciler::facade::mock::MockKernelLink;
use vxfabric_reconciler::mode::dispatch;
use vxfabric_reconciler::store::{StateRecord, StateStore};

fn base_state() -> DesiredState {
    DesiredState {
        Mode: Mode::DistributeSymmetric,
        UnderlayIf: "eth0".into(),
        OverlayIf: "eth1".into(),
        VlanBindings: vec![],
        VrfBindings: vec![],
    }
}

fn vrf(name: &str, l3vni: u32, veth_required: bool) -> VrfBinding {
    VrfBinding {
        VrfName: name.into(),
        L3VNI: l3vni,
        RouteTableID: None,
        VethPrefix: None,
        VethRequired: veth_required,
        InVethCIDR: None,
        ExtVethCIDR: None,
    }
}

fn vlan(id: u32, l2vni: u32, l3vni: u32) -> VlanBinding {
    VlanBinding {
        VlanID: id,
        L2VNI: l2vni,
        L2IPAddr: "10.0.0.1/24".into(),
        L2MacAddr: "02:00:00:00:00:01".into(),
        L3VNI: l3vni,
    }
}

async fn link_with_underlay() -> MockKernelLink {
    let link = MockKernelLink::new();
    link.existing.lock().unwrap().insert("eth0".into());
    link.existing.lock().unwrap().insert("eth1".into());
    link.set_ipv4_addr("eth0", "192.0.2.1");
    link
}

/// Empty to one-VRF-one-VLAN apply materializes the exact object set
/// and wiring expected for a single tenant's L2/L3 subtree.
#[tokio::test]
async fn scenario_empty_to_one_vrf_one_vlan() {
    let link = link_with_underlay().await;
    let mut state = base_state();
    state
        .VrfBindings
        .push(vrf("tenantA", 10010, false));
    state.VlanBindings.push(vlan(100, 10100, 10010));

    let journal = dispatch(&link, None, &state).await.unwrap();
    assert!(!journal.is_empty());

    for name in [
        "tenantA",
        "vxlan10010",
        "br-vsi10010",
        "eth1.100",
        "vxlan10100",
        "br-vsi10100",
    ] {
        assert!(link.contains(name), "expected {name} to exist");
    }

    use vxfabric_reconciler::facade::mock::Call;
    let calls = link.calls();
    assert!(calls.contains(&Call::SetMaster {
        slave: "vxlan10010".into(),
        master: "br-vsi10010".into(),
    }));
    assert!(calls.contains(&Call::SetMaster {
        slave: "br-vsi10010".into(),
        master: "tenantA".into(),
    }));
    assert!(calls.contains(&Call::SetMaster {
        slave: "vxlan10100".into(),
        master: "br-vsi10100".into(),
    }));
    assert!(calls.contains(&Call::SetMaster {
        slave: "eth1.100".into(),
        master: "br-vsi10100".into(),
    }));
    assert!(calls.contains(&Call::SetMaster {
        slave: "br-vsi10100".into(),
        master: "tenantA".into(),
    }));
    assert!(calls.contains(&Call::SetMac {
        ifname: "br-vsi10100".into(),
        mac: "02:00:00:00:00:01".into(),
    }));
}

/// Reapplying the same desired state against its own persisted prior
/// state is a no-op at the diff level and issues no new kernel calls.
#[tokio::test]
async fn property_reapply_same_state_is_empty_diff() {
    let link = link_with_underlay().await;
    let mut state = base_state();
    state.VrfBindings.push(vrf("tenantA", 10010, false));
    state.VlanBindings.push(vlan(100, 10100, 10010));

    dispatch(&link, None, &state).await.unwrap();

    let vlan_diff = diff_vlans(&state.VlanBindings, &state.VlanBindings);
    let vrf_diff = diff_vrfs(&state.VrfBindings, &state.VrfBindings);
    assert!(vlan_diff.added.is_empty() && vlan_diff.removed.is_empty() && vlan_diff.changed.is_empty());
    assert!(vrf_diff.added.is_empty() && vrf_diff.removed.is_empty() && vrf_diff.changed.is_empty());

    // And re-running the reconciler against identical prior/new state
    // issues no additional kernel mutations.
    let before = link.calls().len();
    let journal = dispatch(&link, Some(&state), &state).await.unwrap();
    assert!(journal.is_empty());
    assert_eq!(link.calls().len(), before);
}

/// Incremental add only touches the new subtree.
#[tokio::test]
async fn scenario_incremental_add_vlan_leaves_prior_subtree_untouched() {
    let link = link_with_underlay().await;
    let mut prior = base_state();
    prior.VrfBindings.push(vrf("tenantA", 10010, false));
    prior.VlanBindings.push(vlan(100, 10100, 10010));
    dispatch(&link, None, &prior).await.unwrap();

    let calls_before_incremental = link.calls().len();

    let mut new = prior.clone();
    new.VlanBindings.push(vlan(200, 10200, 10010));
    dispatch(&link, Some(&prior), &new).await.unwrap();

    assert!(link.contains("vxlan10200"));
    assert!(link.contains("br-vsi10200"));
    assert!(link.contains("eth1.200"));
    assert!(link.contains("vxlan10100"));
    assert!(link.contains("br-vsi10100"));

    // No mutation referencing the 10100 subtree occurred after the
    // prior apply completed.
    use vxfabric_reconciler::facade::mock::Call;
    let new_calls = &link.calls()[calls_before_incremental..];
    assert!(new_calls.iter().all(|c| !matches!(c,
        Call::CreateVxlan { name, .. } if name == "vxlan10100")));
}

/// Incremental removal deletes the old VLAN subtree in dependency
/// order and leaves siblings alone.
#[tokio::test]
async fn scenario_incremental_remove_vlan_dependency_order() {
    let link = link_with_underlay().await;
    let mut prior = base_state();
    prior.VrfBindings.push(vrf("tenantA", 10010, false));
    prior.VlanBindings.push(vlan(100, 10100, 10010));
    prior.VlanBindings.push(vlan(200, 10200, 10010));
    dispatch(&link, None, &prior).await.unwrap();

    let mut new = prior.clone();
    new.VlanBindings.retain(|v| v.VlanID != 100);
    dispatch(&link, Some(&prior), &new).await.unwrap();

    assert!(!link.contains("vxlan10100"));
    assert!(!link.contains("br-vsi10100"));
    assert!(!link.contains("eth1.100"));
    assert!(link.contains("br-vsi10200"));

    use vxfabric_reconciler::facade::mock::Call;
    let calls = link.calls();
    let master_clear_idx = calls
        .iter()
        .position(|c| matches!(c, Call::ClearMaster { slave } if slave == "br-vsi10100"))
        .unwrap();
    let bridge_del_idx = calls
        .iter()
        .position(|c| matches!(c, Call::DeleteLink { name } if name == "br-vsi10100"))
        .unwrap();
    let vxlan_del_idx = calls
        .iter()
        .position(|c| matches!(c, Call::DeleteLink { name } if name == "vxlan10100"))
        .unwrap();
    assert!(master_clear_idx < bridge_del_idx);
    assert!(bridge_del_idx < vxlan_del_idx);
}

/// A VRF rename recreates the VRF device but does not automatically
/// re-enslave dependent bridges: a known reconciliation gap, preserved
/// here as observed behavior rather than silently patched.
#[tokio::test]
async fn scenario_vrf_rename_does_not_reenslave_dependents() {
    let link = link_with_underlay().await;
    let mut prior = base_state();
    prior.VrfBindings.push(vrf("tenantA", 10010, false));
    prior.VlanBindings.push(vlan(100, 10100, 10010));
    dispatch(&link, None, &prior).await.unwrap();

    let mut new = prior.clone();
    new.VrfBindings[0].VrfName = "tenantB".into();
    // The VLAN binding's L3VNI is unchanged, so diff_vrfs still
    // identifies this as a VrfName change on the same L3VNI record
    // rather than an add+remove pair.
    dispatch(&link, Some(&prior), &new).await.unwrap();

    assert!(link.contains("tenantB"));
    assert!(!link.contains("tenantA"));

    use vxfabric_reconciler::facade::mock::Call;
    let calls = link.calls();
    // No SetMaster call re-enslaves br-vsi10010 (the VRF's own L3
    // bridge) or br-vsi10100 (the VLAN bridge) to tenantB; this is the
    // documented reconciliation gap, not a regression.
    assert!(!calls.iter().any(|c| matches!(c,
        Call::SetMaster { master, .. } if master == "tenantB")));
}

/// Toggling VethRequired false->true materializes both legs, up, with
/// the inner leg enslaved and both CIDRs assigned.
#[tokio::test]
async fn scenario_veth_toggle_on() {
    let link = link_with_underlay().await;
    let mut prior = base_state();
    prior.VrfBindings.push(vrf("tenantA", 10010, false));
    dispatch(&link, None, &prior).await.unwrap();

    let mut new = prior.clone();
    new.VrfBindings[0].VethRequired = true;
    new.VrfBindings[0].InVethCIDR = Some("169.254.1.1/30".into());
    new.VrfBindings[0].ExtVethCIDR = Some("169.254.1.2/30".into());
    dispatch(&link, Some(&prior), &new).await.unwrap();

    assert!(link.contains("10010-in"));
    assert!(link.contains("10010-ext"));

    use vxfabric_reconciler::facade::mock::Call;
    let calls = link.calls();
    assert!(calls.contains(&Call::AddAddr {
        ifname: "10010-in".into(),
        cidr: "169.254.1.1/30".into(),
    }));
    assert!(calls.contains(&Call::AddAddr {
        ifname: "10010-ext".into(),
        cidr: "169.254.1.2/30".into(),
    }));
    assert!(calls.contains(&Call::SetMaster {
        slave: "10010-in".into(),
        master: "tenantA".into(),
    }));
}

/// Toggling VethRequired true->false deletes the existing inner leg
/// (which takes the peer with it) and does not attempt to recreate
/// the pair, even though the CIDRs are no longer present on the VRF.
#[tokio::test]
async fn scenario_veth_toggle_off() {
    let link = link_with_underlay().await;
    let mut prior = base_state();
    prior.VrfBindings.push(vrf("tenantA", 10010, true));
    prior.VrfBindings[0].InVethCIDR = Some("169.254.1.1/30".into());
    prior.VrfBindings[0].ExtVethCIDR = Some("169.254.1.2/30".into());
    dispatch(&link, None, &prior).await.unwrap();
    assert!(link.contains("10010-in"));
    assert!(link.contains("10010-ext"));

    let calls_before_incremental = link.calls().len();

    let mut new = prior.clone();
    new.VrfBindings[0].VethRequired = false;
    new.VrfBindings[0].InVethCIDR = None;
    new.VrfBindings[0].ExtVethCIDR = None;

    let result = dispatch(&link, Some(&prior), &new).await;
    assert!(result.is_ok(), "toggling VethRequired off must not fail: {result:?}");
    assert!(!link.contains("10010-in"));
    assert!(!link.contains("10010-ext"));

    use vxfabric_reconciler::facade::mock::Call;
    let new_calls = &link.calls()[calls_before_incremental..];
    assert!(new_calls.iter().any(|c| matches!(c, Call::DeleteLink { name } if name == "10010-in")));
    assert!(!new_calls.iter().any(|c| matches!(c, Call::CreateVethPair { .. })));
}

/// A mid-apply kernel failure rolls back only the objects this
/// attempt created, leaving a pre-existing out-of-band object alone.
#[tokio::test]
async fn scenario_mid_apply_failure_preserves_preexisting_object() {
    let link = link_with_underlay().await;
    link.existing.lock().unwrap().insert("br-vsi99999".into());

    let mut state = base_state();
    state.VrfBindings.push(vrf("tenantA", 10010, false));
    state.VlanBindings.push(vlan(1, 99999, 10010));
    link.fail_on("br-vsi99999");

    let result = dispatch(&link, None, &state).await;
    assert!(result.is_err());
    assert!(!link.contains("tenantA"));
    assert!(!link.contains("vxlan10010"));
    assert!(link.contains("br-vsi99999"));
}

/// The state store persists the outcome of a reconciliation attempt
/// and a subsequent run treats a fresh empty document correctly as an
/// incremental remove against the persisted prior state.
#[tokio::test]
async fn store_round_trip_drives_next_reconciliation() {
    let link = link_with_underlay().await;
    let dir = tempfile::tempdir().unwrap();
    let store = StateStore::new(dir.path().join("vxfabric-state.json"));

    let mut state = base_state();
    state.VrfBindings.push(vrf("tenantA", 10010, false));
    state.VlanBindings.push(vlan(100, 10100, 10010));

    let journal = dispatch(&link, None, &state).await.unwrap();
    store
        .save(&StateRecord {
            timestamp: "2026-07-28T00:00:00Z".into(),
            config: state.clone(),
            success: true,
            operations: journal,
        })
        .unwrap();

    let loaded = store.load().unwrap().unwrap();
    assert!(loaded.success);
    assert_eq!(loaded.config, state);

    let mut next = state.clone();
    next.VlanBindings.clear();
    dispatch(&link, Some(&loaded.config), &next).await.unwrap();
    assert!(!link.contains("vxlan10100"));
    assert!(!link.contains("br-vsi10100"));
}

/// diff_vrfs is symmetric under swap: added/removed swap while the
/// changed-key set stays the same.
#[test]
fn property_diff_vrfs_swap_symmetry() {
    let old = vec![vrf("a", 1, false), vrf("b", 2, false)];
    let mut new = vec![vrf("b", 2, true), vrf("c", 3, false)];
    new[0].InVethCIDR = Some("169.254.1.1/30".into());
    new[0].ExtVethCIDR = Some("169.254.1.2/30".into());

    let forward = diff_vrfs(&old, &new);
    let backward = diff_vrfs(&new, &old);

    let forward_added: Vec<_> = forward.added.iter().map(|v| v.VrfName.clone()).collect();
    let backward_removed: Vec<_> = backward.removed.iter().map(|v| v.VrfName.clone()).collect();
    assert_eq!(forward_added, backward_removed);

    let forward_removed: Vec<_> = forward.removed.iter().map(|v| v.VrfName.clone()).collect();
    let backward_added: Vec<_> = backward.added.iter().map(|v| v.VrfName.clone()).collect();
    assert_eq!(forward_removed, backward_added);

    let mut forward_changed: Vec<_> = forward.changed.iter().map(|c| c.new.VrfName.clone()).collect();
    let mut backward_changed: Vec<_> = backward.changed.iter().map(|c| c.new.VrfName.clone()).collect();
    forward_changed.sort();
    backward_changed.sort();
    assert_eq!(forward_changed, backward_changed);
}
