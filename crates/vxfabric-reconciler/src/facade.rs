//! The netlink facade: the narrow trait boundary between the
//! reconciler's orchestration logic and whatever actually talks to
//! the kernel. The production implementation shells out to `ip` and
//! `bridge`, the same mechanism this workspace's other
//! configuration-manager daemons use to reach the kernel's
//! link/address tables. A second, in-memory implementation backs the
//! reconciler's own test suite.

use async_trait::async_trait;

use vxfabric_common::error::{ReconcileError, ReconcileResult};
use vxfabric_common::shell::{self, shellquote, IP_CMD};

/// UDP destination port VXLAN devices are created with.
pub const VXLAN_DSTPORT: u32 = 4789;
/// VXLAN TTL every device in this system is created with.
pub const VXLAN_TTL: u32 = 64;

/// Whether a named kernel object is present.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presence {
    Present,
    Absent,
}

/// The kernel link/address operations the reconciler depends on.
///
/// Every create operation brings the device administratively up
/// before returning. Every operation is idempotent where the kernel
/// permits it and distinguishes "object not found" from "operation
/// failed" so the rollback journal can downgrade the former to a
/// no-op.
#[async_trait]
pub trait KernelLink: Send + Sync {
    /// Looks up whether a named link currently exists.
    async fn lookup(&self, name: &str) -> ReconcileResult<Presence>;

    /// Creates a VXLAN device with the given VNI and local IPv4
    /// source, UDP port 4789, learning disabled, TTL 64, and brings it
    /// up.
    async fn create_vxlan(&self, name: &str, vni: u32, local_ip: &str) -> ReconcileResult<()>;

    /// Creates a Linux bridge and brings it up.
    async fn create_bridge(&self, name: &str) -> ReconcileResult<()>;

    /// Creates an 802.1Q sub-interface on `parent` for `vlan_id` and
    /// brings it up.
    async fn create_vlan(&self, name: &str, parent: &str, vlan_id: u32) -> ReconcileResult<()>;

    /// Creates a VRF device bound to the given routing table and
    /// brings it up.
    async fn create_vrf(&self, name: &str, table_id: u32) -> ReconcileResult<()>;

    /// Creates a veth pair (`a`, `b`) and brings both legs up.
    async fn create_veth_pair(&self, a: &str, b: &str) -> ReconcileResult<()>;

    /// Brings a link administratively down, then deletes it. Missing
    /// links are reported as success (idempotent deletion).
    async fn delete_link(&self, name: &str) -> ReconcileResult<()>;

    /// Adds an address in CIDR form to an interface.
    async fn add_addr(&self, ifname: &str, cidr: &str) -> ReconcileResult<()>;

    /// Removes an address in CIDR form from an interface.
    async fn del_addr(&self, ifname: &str, cidr: &str) -> ReconcileResult<()>;

    /// Sets `slave`'s master device to `master` (bridge or VRF
    /// enslavement).
    async fn set_master(&self, slave: &str, master: &str) -> ReconcileResult<()>;

    /// Clears `slave`'s master device.
    async fn clear_master(&self, slave: &str) -> ReconcileResult<()>;

    /// Sets the link-layer address of an interface.
    async fn set_mac(&self, ifname: &str, mac: &str) -> ReconcileResult<()>;

    /// Returns the first IPv4 address currently assigned to the named
    /// interface, if any, as a bare address (no prefix length): the
    /// VXLAN source address is always an interface's address, never a
    /// CIDR.
    async fn first_ipv4_addr(&self, ifname: &str) -> ReconcileResult<Option<String>>;
}

/// Production [`KernelLink`] implementation: shells out to `ip` and
/// `bridge`. Holds no state of its own.
#[derive(Debug, Clone, Copy, Default)]
pub struct ShellKernelLink;

impl ShellKernelLink {
    pub fn new() -> Self {
        Self
    }

    async fn run(&self, operation: &str, object: &str, cmd: String) -> ReconcileResult<()> {
        let result = shell::exec(&cmd).await?;
        if result.success() {
            Ok(())
        } else {
            Err(ReconcileError::kernel_op(
                operation,
                object,
                result.combined_output(),
            ))
        }
    }
}

#[async_trait]
impl KernelLink for ShellKernelLink {
    async fn lookup(&self, name: &str) -> ReconcileResult<Presence> {
        let cmd = format!("{IP_CMD} link show dev {}", shellquote(name));
        let result = shell::exec(&cmd).await?;
        if result.success() {
            Ok(Presence::Present)
        } else {
            Ok(Presence::Absent)
        }
    }

    async fn create_vxlan(&self, name: &str, vni: u32, local_ip: &str) -> ReconcileResult<()> {
        let cmd = format!(
            "{IP_CMD} link add {} type vxlan id {vni} local {} dstport {VXLAN_DSTPORT} nolearning ttl {VXLAN_TTL} && {IP_CMD} link set dev {} up",
            shellquote(name),
            shellquote(local_ip),
            shellquote(name),
        );
        self.run("createVxlan", name, cmd).await
    }

    async fn create_bridge(&self, name: &str) -> ReconcileResult<()> {
        let cmd = format!(
            "{IP_CMD} link add {} type bridge && {IP_CMD} link set dev {} up",
            shellquote(name),
            shellquote(name),
        );
        self.run("createBridge", name, cmd).await
    }

    async fn create_vlan(&self, name: &str, parent: &str, vlan_id: u32) -> ReconcileResult<()> {
        let cmd = format!(
            "{IP_CMD} link add link {} name {} type vlan id {vlan_id} && {IP_CMD} link set dev {} up",
            shellquote(parent),
            shellquote(name),
            shellquote(name),
        );
        self.run("createVlan", name, cmd).await
    }

    async fn create_vrf(&self, name: &str, table_id: u32) -> ReconcileResult<()> {
        let cmd = format!(
            "{IP_CMD} link add {} type vrf table {table_id} && {IP_CMD} link set dev {} up",
            shellquote(name),
            shellquote(name),
        );
        self.run("createVrf", name, cmd).await
    }

    async fn create_veth_pair(&self, a: &str, b: &str) -> ReconcileResult<()> {
        let cmd = format!(
            "{IP_CMD} link add {} type veth peer name {} && {IP_CMD} link set dev {} up && {IP_CMD} link set dev {} up",
            shellquote(a),
            shellquote(b),
            shellquote(a),
            shellquote(b),
        );
        self.run("createVethPair", a, cmd).await
    }

    async fn delete_link(&self, name: &str) -> ReconcileResult<()> {
        let cmd = format!(
            "{IP_CMD} link set dev {} down; {IP_CMD} link del dev {}",
            shellquote(name),
            shellquote(name),
        );
        let result = shell::exec(&cmd).await?;
        if result.success() || result.looks_like_not_found() {
            Ok(())
        } else {
            Err(ReconcileError::kernel_op(
                "deleteLink",
                name,
                result.combined_output(),
            ))
        }
    }

    async fn add_addr(&self, ifname: &str, cidr: &str) -> ReconcileResult<()> {
        let cmd = format!(
            "{IP_CMD} addr add {} dev {}",
            shellquote(cidr),
            shellquote(ifname),
        );
        self.run("addAddr", ifname, cmd).await
    }

    async fn del_addr(&self, ifname: &str, cidr: &str) -> ReconcileResult<()> {
        let cmd = format!(
            "{IP_CMD} addr del {} dev {}",
            shellquote(cidr),
            shellquote(ifname),
        );
        let result = shell::exec(&cmd).await?;
        if result.success() || result.looks_like_not_found() {
            Ok(())
        } else {
            Err(ReconcileError::kernel_op(
                "delAddr",
                ifname,
                result.combined_output(),
            ))
        }
    }

    async fn set_master(&self, slave: &str, master: &str) -> ReconcileResult<()> {
        let cmd = format!(
            "{IP_CMD} link set dev {} master {}",
            shellquote(slave),
            shellquote(master),
        );
        self.run("setMaster", slave, cmd).await
    }

    async fn clear_master(&self, slave: &str) -> ReconcileResult<()> {
        let cmd = format!("{IP_CMD} link set dev {} nomaster", shellquote(slave));
        let result = shell::exec(&cmd).await?;
        if result.success() || result.looks_like_not_found() {
            Ok(())
        } else {
            Err(ReconcileError::kernel_op(
                "clearMaster",
                slave,
                result.combined_output(),
            ))
        }
    }

    async fn set_mac(&self, ifname: &str, mac: &str) -> ReconcileResult<()> {
        let cmd = format!(
            "{IP_CMD} link set dev {} address {}",
            shellquote(ifname),
            shellquote(mac),
        );
        self.run("setMac", ifname, cmd).await
    }

    async fn first_ipv4_addr(&self, ifname: &str) -> ReconcileResult<Option<String>> {
        let cmd = format!(
            "{IP_CMD} -4 -o addr show dev {}",
            shellquote(ifname),
        );
        let result = shell::exec(&cmd).await?;
        if !result.success() {
            return Err(ReconcileError::kernel_op(
                "firstIpv4Addr",
                ifname,
                result.combined_output(),
            ));
        }
        // Each matching line looks like:
        // "2: eth0    inet 10.0.0.1/24 brd ... scope global eth0\..."
        for line in result.stdout.lines() {
            if let Some(pos) = line.find("inet ") {
                let rest = &line[pos + "inet ".len()..];
                if let Some(cidr) = rest.split_whitespace().next() {
                    if let Some(addr) = cidr.split('/').next() {
                        return Ok(Some(addr.to_string()));
                    }
                }
            }
        }
        Ok(None)
    }
}

/// In-memory [`KernelLink`] used by the reconciler's own test suite
/// (both the in-crate unit tests and the `tests/` scenario suite),
/// mirroring the `mock_mode`/`captured_commands` pattern this
/// workspace's configuration-manager daemons use. Not `cfg(test)`
/// because integration tests under `tests/` compile this crate
/// without that cfg; kept out of the production code path simply by
/// never being constructed there.
pub mod mock {

    use super::*;
    use std::collections::HashSet;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// A single captured mutation, recorded in call order.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum Call {
        CreateVxlan { name: String, vni: u32, local_ip: String },
        CreateBridge { name: String },
        CreateVlan { name: String, parent: String, vlan_id: u32 },
        CreateVrf { name: String, table_id: u32 },
        CreateVethPair { a: String, b: String },
        DeleteLink { name: String },
        AddAddr { ifname: String, cidr: String },
        DelAddr { ifname: String, cidr: String },
        SetMaster { slave: String, master: String },
        ClearMaster { slave: String },
        SetMac { ifname: String, mac: String },
    }

    /// An in-memory kernel double: tracks which link names exist and
    /// records every call for test assertions. Can be told to fail a
    /// named operation to exercise rollback.
    #[derive(Default)]
    pub struct MockKernelLink {
        pub existing: Mutex<HashSet<String>>,
        pub calls: Mutex<Vec<Call>>,
        pub fail_on: Mutex<Option<String>>,
        pub ipv4_addrs: Mutex<HashMap<String, String>>,
    }

    impl MockKernelLink {
        pub fn new() -> Self {
            Self::default()
        }

        /// Causes the next operation that creates or mutates `name` to
        /// fail with a `KernelOp` error.
        pub fn fail_on(&self, name: &str) {
            *self.fail_on.lock().unwrap() = Some(name.to_string());
        }

        /// Preloads the IPv4 address `first_ipv4_addr` should report
        /// for a given interface, standing in for a physical interface
        /// the test doesn't actually create.
        pub fn set_ipv4_addr(&self, ifname: &str, addr: &str) {
            self.ipv4_addrs
                .lock()
                .unwrap()
                .insert(ifname.to_string(), addr.to_string());
        }

        fn check_fail(&self, name: &str) -> ReconcileResult<()> {
            let guard = self.fail_on.lock().unwrap();
            if guard.as_deref() == Some(name) {
                return Err(ReconcileError::kernel_op(
                    "mock",
                    name,
                    "injected failure",
                ));
            }
            Ok(())
        }

        pub fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }

        pub fn contains(&self, name: &str) -> bool {
            self.existing.lock().unwrap().contains(name)
        }
    }

    #[async_trait]
    impl KernelLink for MockKernelLink {
        async fn lookup(&self, name: &str) -> ReconcileResult<Presence> {
            Ok(if self.contains(name) {
                Presence::Present
            } else {
                Presence::Absent
            })
        }

        async fn create_vxlan(&self, name: &str, vni: u32, local_ip: &str) -> ReconcileResult<()> {
            self.check_fail(name)?;
            self.existing.lock().unwrap().insert(name.to_string());
            self.calls.lock().unwrap().push(Call::CreateVxlan {
                name: name.to_string(),
                vni,
                local_ip: local_ip.to_string(),
            });
            Ok(())
        }

        async fn create_bridge(&self, name: &str) -> ReconcileResult<()> {
            self.check_fail(name)?;
            self.existing.lock().unwrap().insert(name.to_string());
            self.calls
                .lock()
                .unwrap()
                .push(Call::CreateBridge { name: name.to_string() });
            Ok(())
        }

        async fn create_vlan(&self, name: &str, parent: &str, vlan_id: u32) -> ReconcileResult<()> {
            self.check_fail(name)?;
            self.existing.lock().unwrap().insert(name.to_string());
            self.calls.lock().unwrap().push(Call::CreateVlan {
                name: name.to_string(),
                parent: parent.to_string(),
                vlan_id,
            });
            Ok(())
        }

        async fn create_vrf(&self, name: &str, table_id: u32) -> ReconcileResult<()> {
            self.check_fail(name)?;
            self.existing.lock().unwrap().insert(name.to_string());
            self.calls.lock().unwrap().push(Call::CreateVrf {
                name: name.to_string(),
                table_id,
            });
            Ok(())
        }

        async fn create_veth_pair(&self, a: &str, b: &str) -> ReconcileResult<()> {
            self.check_fail(a)?;
            let mut existing = self.existing.lock().unwrap();
            existing.insert(a.to_string());
            existing.insert(b.to_string());
            drop(existing);
            self.calls.lock().unwrap().push(Call::CreateVethPair {
                a: a.to_string(),
                b: b.to_string(),
            });
            Ok(())
        }

        async fn delete_link(&self, name: &str) -> ReconcileResult<()> {
            self.existing.lock().unwrap().remove(name);
            self.calls
                .lock()
                .unwrap()
                .push(Call::DeleteLink { name: name.to_string() });
            Ok(())
        }

        async fn add_addr(&self, ifname: &str, cidr: &str) -> ReconcileResult<()> {
            self.check_fail(ifname)?;
            self.calls.lock().unwrap().push(Call::AddAddr {
                ifname: ifname.to_string(),
                cidr: cidr.to_string(),
            });
            Ok(())
        }

        async fn del_addr(&self, ifname: &str, cidr: &str) -> ReconcileResult<()> {
            self.calls.lock().unwrap().push(Call::DelAddr {
                ifname: ifname.to_string(),
                cidr: cidr.to_string(),
            });
            Ok(())
        }

        async fn set_master(&self, slave: &str, master: &str) -> ReconcileResult<()> {
            self.check_fail(slave)?;
            self.calls.lock().unwrap().push(Call::SetMaster {
                slave: slave.to_string(),
                master: master.to_string(),
            });
            Ok(())
        }

        async fn clear_master(&self, slave: &str) -> ReconcileResult<()> {
            self.calls
                .lock()
                .unwrap()
                .push(Call::ClearMaster { slave: slave.to_string() });
            Ok(())
        }

        async fn set_mac(&self, ifname: &str, mac: &str) -> ReconcileResult<()> {
            self.check_fail(ifname)?;
            self.calls.lock().unwrap().push(Call::SetMac {
                ifname: ifname.to_string(),
                mac: mac.to_string(),
            });
            Ok(())
        }

        async fn first_ipv4_addr(&self, ifname: &str) -> ReconcileResult<Option<String>> {
            Ok(self.ipv4_addrs.lock().unwrap().get(ifname).cloned())
        }
    }

}
