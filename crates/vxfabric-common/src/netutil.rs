//! Small validation/parsing helpers for network identifiers that
//! appear in the desired-state document: VNIs, VLAN IDs, MAC
//! addresses, and CIDR prefixes.

use crate::error::ReconcileError;

/// Smallest valid 802.1Q VLAN id.
pub const VLAN_ID_MIN: u32 = 1;
/// Largest valid 802.1Q VLAN id (4095 is reserved).
pub const VLAN_ID_MAX: u32 = 4094;

/// Smallest valid VXLAN Network Identifier.
pub const VNI_MIN: u32 = 1;
/// Largest valid VXLAN Network Identifier (24-bit field).
pub const VNI_MAX: u32 = (1 << 24) - 1;

/// Validates a VLAN id is in the usable 802.1Q range.
pub fn validate_vlan_id(field: &str, vlan_id: u32) -> Result<(), ReconcileError> {
    if (VLAN_ID_MIN..=VLAN_ID_MAX).contains(&vlan_id) {
        Ok(())
    } else {
        Err(ReconcileError::config_invalid(
            field,
            format!("VLAN id {vlan_id} out of range {VLAN_ID_MIN}..={VLAN_ID_MAX}"),
        ))
    }
}

/// Validates a VXLAN Network Identifier is in the usable 24-bit range.
pub fn validate_vni(field: &str, vni: u32) -> Result<(), ReconcileError> {
    if (VNI_MIN..=VNI_MAX).contains(&vni) {
        Ok(())
    } else {
        Err(ReconcileError::config_invalid(
            field,
            format!("VNI {vni} out of range {VNI_MIN}..={VNI_MAX}"),
        ))
    }
}

/// A parsed `address/prefixlen` pair, e.g. `10.0.0.1/24`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CidrAddr {
    /// The address portion, verbatim as given (IPv4 or IPv6).
    pub address: String,
    /// The prefix length portion, verbatim as given.
    pub prefix_len: String,
}

impl CidrAddr {
    /// Renders back the `address/prefixlen` form used on `ip addr add`
    /// command lines.
    pub fn as_cidr(&self) -> String {
        format!("{}/{}", self.address, self.prefix_len)
    }
}

impl std::fmt::Display for CidrAddr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_cidr())
    }
}

/// Parses a CIDR string, requiring exactly one `/` separator.
///
/// Does not range-check octets or validate IPv6 grouping, only the
/// slash-separated shape the kernel's `ip addr add` expects.
pub fn parse_cidr(field: &str, s: &str) -> Result<CidrAddr, ReconcileError> {
    let mut parts = s.splitn(2, '/');
    let address = parts.next().unwrap_or("");
    let prefix_len = parts.next();
    match prefix_len {
        Some(p) if !address.is_empty() && !p.is_empty() => Ok(CidrAddr {
            address: address.to_string(),
            prefix_len: p.to_string(),
        }),
        _ => Err(ReconcileError::config_invalid(
            field,
            format!("'{s}' is not a valid CIDR address (expected address/prefixlen)"),
        )),
    }
}

/// Validates a MAC address is six colon-separated hex octets.
pub fn validate_mac(field: &str, s: &str) -> Result<(), ReconcileError> {
    let parts: Vec<&str> = s.split(':').collect();
    if parts.len() != 6 || !parts.iter().all(|p| u8::from_str_radix(p, 16).is_ok()) {
        return Err(ReconcileError::config_invalid(
            field,
            format!("'{s}' is not a valid MAC address (expected six colon-separated hex octets)"),
        ));
    }
    Ok(())
}
