//! Error types for driver operations.
//!
//! One enum covers the whole daemon. The variants fall into five groups:
//! validation, capacity, hardware, not-found, and persistence. Validation
//! errors are always raised before any hardware or persisted state is
//! touched; hardware errors abort the enclosing lifecycle operation.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for driver operations.
pub type DriverResult<T> = Result<T, DriverError>;

/// Errors that can occur during network lifecycle operations.
#[derive(Debug, Error)]
pub enum DriverError {
    /// Malformed or missing network-creation option.
    #[error("invalid option '{option}': {message}")]
    InvalidConfig {
        /// The option that failed validation.
        option: String,
        /// Error message.
        message: String,
    },

    /// Another network already owns this gateway.
    #[error("a network with gateway {gateway} already exists")]
    GatewayConflict {
        /// The conflicting gateway, in CIDR form.
        gateway: String,
    },

    /// Another network on the same device already uses this VLAN.
    #[error("vlan {vlan} already exists on device '{device}'")]
    VlanConflict {
        /// The physical device.
        device: String,
        /// The VLAN tag.
        vlan: u16,
    },

    /// No free VFs remain on the device.
    #[error("no free virtual functions left on device '{device}'")]
    PoolExhausted {
        /// The physical device whose pool is empty.
        device: String,
    },

    /// A passthrough device can back only one endpoint at a time.
    #[error("device '{device}' supports only one endpoint")]
    DeviceBusy {
        /// The passthrough device.
        device: String,
    },

    /// No free VF carries the MAC address the caller requested.
    #[error("no free virtual function with MAC {mac} on device '{device}'")]
    VfNotFound {
        /// The physical device.
        device: String,
        /// The requested MAC address.
        mac: String,
    },

    /// The device reports a maximum VF count of zero.
    #[error("SR-IOV is unsupported on device '{device}'")]
    SriovUnsupported {
        /// The physical device.
        device: String,
    },

    /// The named netdevice does not exist in sysfs.
    #[error("netdevice '{device}' not found")]
    DeviceNotFound {
        /// The missing device name.
        device: String,
    },

    /// Failed to spawn a shell command.
    #[error("failed to execute '{command}': {source}")]
    ShellExec {
        /// The command that failed to spawn.
        command: String,
        /// The underlying IO error.
        #[source]
        source: io::Error,
    },

    /// Shell command returned a non-zero exit code.
    #[error("command failed: '{command}' (exit code {exit_code}): {output}")]
    ShellCommandFailed {
        /// The command that failed.
        command: String,
        /// The exit code.
        exit_code: i32,
        /// Combined stdout/stderr output.
        output: String,
    },

    /// Reading or writing a sysfs attribute failed.
    #[error("sysfs access failed: {path}: {source}")]
    Sysfs {
        /// The sysfs path involved.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: io::Error,
    },

    /// Operation referenced an unknown network id.
    #[error("network '{id}' not found")]
    NetworkNotFound {
        /// The network id.
        id: String,
    },

    /// Operation referenced an unknown endpoint id.
    #[error("endpoint '{id}' not found")]
    EndpointNotFound {
        /// The endpoint id.
        id: String,
    },

    /// Join on an endpoint that is already bound to a sandbox.
    #[error("endpoint '{id}' is already bound to sandbox '{sandbox_key}'")]
    EndpointInUse {
        /// The endpoint id.
        id: String,
        /// The sandbox it is bound to.
        sandbox_key: String,
    },

    /// Persistence store read/write/delete failure.
    #[error("config store failure at {path}: {message}")]
    Store {
        /// The store path involved.
        path: PathBuf,
        /// Error message.
        message: String,
    },

    /// Internal error (unexpected state).
    #[error("internal error: {message}")]
    Internal {
        /// Error message.
        message: String,
    },
}

impl DriverError {
    /// Creates an invalid configuration error.
    pub fn invalid_config(option: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            option: option.into(),
            message: message.into(),
        }
    }

    /// Creates a sysfs access error.
    pub fn sysfs(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Sysfs {
            path: path.into(),
            source,
        }
    }

    /// Creates a config store error.
    pub fn store(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Store {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Creates an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns true if this error was raised before any side effect
    /// (option validation, gateway or VLAN collision).
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            DriverError::InvalidConfig { .. }
                | DriverError::GatewayConflict { .. }
                | DriverError::VlanConflict { .. }
        )
    }

    /// Returns true if this error reports resource exhaustion rather than a
    /// fault; retrying without freeing something will fail again.
    pub fn is_capacity(&self) -> bool {
        matches!(
            self,
            DriverError::PoolExhausted { .. } | DriverError::DeviceBusy { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = DriverError::invalid_config("mode", "valid modes are: passthrough and sriov");
        assert_eq!(
            err.to_string(),
            "invalid option 'mode': valid modes are: passthrough and sriov"
        );
    }

    #[test]
    fn test_gateway_conflict_display() {
        let err = DriverError::GatewayConflict {
            gateway: "192.168.1.1/24".to_string(),
        };
        assert!(err.to_string().contains("192.168.1.1/24"));
    }

    #[test]
    fn test_shell_command_failed_display() {
        let err = DriverError::ShellCommandFailed {
            command: "/sbin/ip link set dev eth1 up".to_string(),
            exit_code: 2,
            output: "Cannot find device".to_string(),
        };
        assert!(err.to_string().contains("ip link set dev"));
        assert!(err.to_string().contains("exit code 2"));
    }

    #[test]
    fn test_is_validation() {
        assert!(DriverError::invalid_config("netdevice", "missing").is_validation());
        assert!(DriverError::VlanConflict {
            device: "eth1".to_string(),
            vlan: 10,
        }
        .is_validation());
        assert!(!DriverError::PoolExhausted {
            device: "eth1".to_string(),
        }
        .is_validation());
    }

    #[test]
    fn test_is_capacity() {
        assert!(DriverError::PoolExhausted {
            device: "eth1".to_string(),
        }
        .is_capacity());
        assert!(DriverError::DeviceBusy {
            device: "eth2".to_string(),
        }
        .is_capacity());
        assert!(!DriverError::internal("bug").is_capacity());
    }
}
