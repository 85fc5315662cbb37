//! Desired-state document types, defaulting, and validation.
//!
//! The document is sourced from a single environment variable holding
//! JSON whose schema matches the fields below one-for-one (see the
//! `Deserialize` derives; field names are the JSON keys verbatim).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use vxfabric_common::error::{ReconcileError, ReconcileResult};
use vxfabric_common::netutil::{parse_cidr, validate_mac, validate_vlan_id, validate_vni};

/// Name of the environment variable holding the desired-state JSON
/// document.
pub const DESIRED_STATE_ENV_VAR: &str = "VXFABRIC_DESIRED_STATE";

/// The reconciliation strategy to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Mode {
    /// Centralized route-reflector style distribution. Not implemented.
    #[serde(rename = "central")]
    Central,
    /// Asymmetric IRB distribution. Not implemented.
    #[serde(rename = "distribute-asymmetric")]
    DistributeAsymmetric,
    /// Symmetric IRB distribution. The only implemented mode.
    #[serde(rename = "distribute-symmetric")]
    DistributeSymmetric,
}

/// A single VLAN → VNI binding.
#[allow(non_snake_case)]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VlanBinding {
    pub VlanID: u32,
    pub L2VNI: u32,
    pub L2IPAddr: String,
    pub L2MacAddr: String,
    pub L3VNI: u32,
}

/// A single VRF → L3-VNI binding.
#[allow(non_snake_case)]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VrfBinding {
    pub VrfName: String,
    pub L3VNI: u32,
    #[serde(default)]
    pub RouteTableID: Option<u32>,
    #[serde(default)]
    pub VethPrefix: Option<String>,
    pub VethRequired: bool,
    #[serde(default)]
    pub InVethCIDR: Option<String>,
    #[serde(default)]
    pub ExtVethCIDR: Option<String>,
}

impl VrfBinding {
    /// `RouteTableID`, defaulted from `L3VNI` when absent from the
    /// input document.
    pub fn route_table_id(&self) -> u32 {
        self.RouteTableID.unwrap_or(self.L3VNI)
    }

    /// `VethPrefix`, defaulted from the decimal rendering of `L3VNI`
    /// when absent from the input document.
    pub fn veth_prefix(&self) -> String {
        self.VethPrefix
            .clone()
            .unwrap_or_else(|| self.L3VNI.to_string())
    }
}

/// The full desired-state document.
#[allow(non_snake_case)]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DesiredState {
    pub Mode: Mode,
    pub UnderlayIf: String,
    pub OverlayIf: String,
    pub VlanBindings: Vec<VlanBinding>,
    pub VrfBindings: Vec<VrfBinding>,
}

impl DesiredState {
    /// Loads and decodes the document from `VXFABRIC_DESIRED_STATE`,
    /// applying the same field defaulting as [`VrfBinding::route_table_id`]
    /// and [`VrfBinding::veth_prefix`], then runs structural validation.
    pub fn from_env() -> ReconcileResult<Self> {
        let raw = std::env::var(DESIRED_STATE_ENV_VAR).map_err(|_| {
            ReconcileError::config_invalid(
                DESIRED_STATE_ENV_VAR,
                "environment variable is not set",
            )
        })?;
        Self::from_json(&raw)
    }

    /// Decodes and validates a document from a JSON string directly,
    /// bypassing the environment. Used by tests and by callers that
    /// source the document some other way.
    pub fn from_json(raw: &str) -> ReconcileResult<Self> {
        if raw.trim().is_empty() {
            return Err(ReconcileError::config_invalid(
                DESIRED_STATE_ENV_VAR,
                "document is empty",
            ));
        }
        let state: DesiredState = serde_json::from_str(raw).map_err(|e| {
            ReconcileError::config_invalid(DESIRED_STATE_ENV_VAR, format!("invalid JSON: {e}"))
        })?;
        state.validate()?;
        Ok(state)
    }

    /// Re-asserts every structural invariant the desired-state document
    /// is expected to uphold, defensively, so the reconciler tolerates
    /// being called directly by tests or future mode dispatchers that
    /// skip the external loader.
    pub fn validate(&self) -> ReconcileResult<()> {
        if self.UnderlayIf.is_empty() {
            return Err(ReconcileError::config_invalid(
                "UnderlayIf",
                "must not be empty",
            ));
        }
        if self.OverlayIf.is_empty() {
            return Err(ReconcileError::config_invalid(
                "OverlayIf",
                "must not be empty",
            ));
        }

        let mut seen_vlans = HashMap::new();
        for vlan in &self.VlanBindings {
            validate_vlan_id("VlanID", vlan.VlanID)?;
            validate_vni("L2VNI", vlan.L2VNI)?;
            validate_vni("L3VNI", vlan.L3VNI)?;
            validate_mac("L2MacAddr", &vlan.L2MacAddr)?;
            parse_cidr("L2IPAddr", &vlan.L2IPAddr)?;
            if seen_vlans.insert(vlan.VlanID, ()).is_some() {
                return Err(ReconcileError::config_invalid(
                    "VlanID",
                    format!("duplicate VlanID {}", vlan.VlanID),
                ));
            }
        }

        let mut seen_vrfs = HashMap::new();
        let mut vrf_by_l3vni = HashMap::new();
        for vrf in &self.VrfBindings {
            if vrf.VrfName.is_empty() {
                return Err(ReconcileError::config_invalid("VrfName", "must not be empty"));
            }
            validate_vni("L3VNI", vrf.L3VNI)?;
            if vrf.VethRequired {
                let in_cidr = vrf.InVethCIDR.as_deref().ok_or_else(|| {
                    ReconcileError::config_invalid(
                        "InVethCIDR",
                        format!("required for VRF '{}' with VethRequired=true", vrf.VrfName),
                    )
                })?;
                let ext_cidr = vrf.ExtVethCIDR.as_deref().ok_or_else(|| {
                    ReconcileError::config_invalid(
                        "ExtVethCIDR",
                        format!("required for VRF '{}' with VethRequired=true", vrf.VrfName),
                    )
                })?;
                parse_cidr("InVethCIDR", in_cidr)?;
                parse_cidr("ExtVethCIDR", ext_cidr)?;
            }
            if seen_vrfs.insert(vrf.VrfName.clone(), ()).is_some() {
                return Err(ReconcileError::config_invalid(
                    "VrfName",
                    format!("duplicate VrfName '{}'", vrf.VrfName),
                ));
            }
            vrf_by_l3vni.insert(vrf.L3VNI, &vrf.VrfName);
        }

        // I1: every VLAN binding's L3VNI must match a VRF binding.
        for vlan in &self.VlanBindings {
            if !vrf_by_l3vni.contains_key(&vlan.L3VNI) {
                return Err(ReconcileError::precondition(format!(
                    "VlanID {} references L3VNI {} with no matching VrfBinding",
                    vlan.VlanID, vlan.L3VNI
                )));
            }
        }

        Ok(())
    }

    /// Index of VRF bindings by L3VNI, built once per reconciliation
    /// per the re-architecture guidance against repeated linear scans.
    pub fn vrf_by_l3vni(&self) -> HashMap<u32, &VrfBinding> {
        self.VrfBindings.iter().map(|v| (v.L3VNI, v)).collect()
    }
}
