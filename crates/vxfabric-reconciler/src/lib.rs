//! A declarative reconciler for a VXLAN/BGP-EVPN kernel network
//! datapath: given desired VLAN→VNI and VRF→L3-VNI mappings, drives
//! the kernel's link/address configuration API to materialize VXLAN
//! interfaces, dot1q sub-interfaces, bridges, VRF devices, and veth
//! pairs, then reconciles the live datapath against a previously
//! persisted desired state.
//!
//! The binary entry point lives in `main.rs`; this library exposes
//! the modules it orchestrates so they can be exercised directly by
//! the integration test suite under `tests/`.

pub mod config;
pub mod diff;
pub mod facade;
pub mod journal;
pub mod mode;
pub mod names;
pub mod reconciler;
pub mod store;

pub use config::DesiredState;
pub use facade::{KernelLink, ShellKernelLink};
pub use journal::Journal;
pub use store::{StateRecord, StateStore};
