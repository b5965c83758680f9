//! Common infrastructure for the SR-IOV plugin daemon.
//!
//! This crate holds the pieces of the daemon that know nothing about
//! networks or endpoints:
//!
//! - [`error`]: the [`DriverError`] taxonomy shared by every operation
//! - [`shell`]: safe shell command execution with proper quoting
//! - [`sysfs`]: leaf accessors over the `/sys/class/net` device tree
//!
//! # Architecture
//!
//! The daemon touches the kernel on two surfaces. Attribute changes on
//! netdevices (link up, per-VF MAC/VLAN/trust/spoof-check) go through
//! `/sbin/ip` via [`shell`]; SR-IOV capability control and topology
//! discovery (VF counts, `virtfn*` links, driver bind/unbind) are plain
//! file operations via [`sysfs`]. Both report failures as
//! [`DriverError`] variants so callers can abort the enclosing lifecycle
//! operation without translating error types at every layer.

pub mod error;
pub mod shell;
pub mod sysfs;

// Re-export commonly used items at crate root
pub use error::{DriverError, DriverResult};
