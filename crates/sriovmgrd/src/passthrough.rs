//! Passthrough network variant: the physical device itself, capacity one.

use sriovmgr_common::{DriverError, DriverResult};

use crate::network::GenericNetwork;
use crate::types::Endpoint;

/// Passthrough network variant.
///
/// Wraps exactly one physical device; no device state is touched at
/// creation or deletion, so both are no-ops beyond the shared record.
#[derive(Debug, Default)]
pub struct PassthroughNetwork;

impl PassthroughNetwork {
    /// Creates the variant. Gateway validation already happened in the
    /// registry; nothing device-specific remains to set up.
    pub fn create() -> Self {
        PassthroughNetwork
    }

    /// Hands out the physical device, failing once any endpoint exists.
    pub fn create_endpoint(
        &self,
        gen: &GenericNetwork,
        endpoint_id: &str,
        address: Option<String>,
    ) -> DriverResult<Endpoint> {
        if !gen.endpoints.is_empty() {
            return Err(DriverError::DeviceBusy {
                device: gen.ndev_name.clone(),
            });
        }

        Ok(Endpoint {
            id: endpoint_id.to_string(),
            dev_name: gen.ndev_name.clone(),
            address,
            sandbox_key: None,
            vf: None,
            vf_name: None,
        })
    }
}
