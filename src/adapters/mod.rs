//! Narrow capability interfaces over the three wrapped subsystems.
//!
//! The core only ever talks to `Arc<dyn ...>` handles of these traits; the
//! concrete clients live in the submodules.

use std::future::Future;
use std::time::Duration;

use crate::error::AdapterError;

pub mod control_plane;
pub mod storage_gateway;
pub mod switch;

pub use control_plane::{
    ComputeNetworkStorageProvider, ComputeService, NetworkAgent, NetworkSpec, NetworkType, Port,
    Project, QosPolicy, QosRequest, ResourceRef, Role, Router, RuleDirection, SecurityGroup,
    SecurityGroupRule, Server, ServerRequest, Subnet, SubnetSpec, UnconfiguredControlPlane, User,
    Volume, VolumeRequest, Network,
};
pub use storage_gateway::{
    NodeRole, ObjectStorageGateway, ProtectionDomain, Provisioning, RestStorageGateway,
    StorageNode, StoragePool, StorageVolume, SystemStatistics,
};
pub use switch::{
    BridgeInfo, CommandOutput, InterfaceInfo, OvsSwitchController, PortProperty, ProcessSample,
    SwitchController,
};

/// Run an adapter call under a deadline.
pub async fn call_with_timeout<T, F>(limit: Duration, call: F) -> Result<T, AdapterError>
where
    F: Future<Output = Result<T, AdapterError>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(AdapterError::Timeout(format!("no response within {:?}", limit))),
    }
}
