//! UDP protocol runtime.
//!
//! Binds the node's operational UDP port with socket2 and builds the
//! commissionable-node discovery record (`_matterc._udp`) that a responder
//! publishes. Stopping a node closes the socket and withdraws the record, so
//! a fresh node can bind the same port right away.

use super::{
    AttributeChange, ContextHandle, NodeIdentity, ProtocolRuntime, RuntimeError, RuntimeNode,
    apply_change,
};
use crate::matter::endpoint::EndpointTree;
use async_trait::async_trait;
use log::{debug, info};
use parking_lot::Mutex;
use socket2::{Domain, Protocol, Socket, Type};
use std::collections::BTreeMap;
use std::io;
use std::net::{IpAddr, Ipv6Addr, SocketAddr, UdpSocket};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Service type for commissionable node discovery.
pub const COMMISSIONABLE_SERVICE: &str = "_matterc._udp";

/// Discovery record for a commissionable node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Advertisement {
    pub instance_name: String,
    pub service: &'static str,
    pub hostname: String,
    pub port: u16,
    pub txt: Vec<(&'static str, String)>,
}

impl Advertisement {
    /// Build the discovery record for a node identity.
    pub fn for_identity(identity: &NodeIdentity, hostname: &str, port: u16) -> Self {
        let instance_name = identity
            .unique_id
            .chars()
            .filter(|c| c.is_ascii_hexdigit())
            .take(16)
            .collect::<String>()
            .to_uppercase();
        Self {
            instance_name,
            service: COMMISSIONABLE_SERVICE,
            hostname: hostname.to_string(),
            port,
            txt: vec![
                ("D", identity.discriminator.to_string()),
                ("CM", "1".to_string()),
                ("VP", format!("{}+{}", identity.vendor_id, identity.product_id)),
                ("DT", identity.device_type_code.to_string()),
                ("DN", identity.device_name.clone()),
            ],
        }
    }

    /// Short discriminator subtype (`_S<n>`), the top four bits.
    pub fn short_discriminator_subtype(&self) -> Option<String> {
        self.txt
            .iter()
            .find(|(key, _)| *key == "D")
            .and_then(|(_, value)| value.parse::<u16>().ok())
            .map(|d| format!("_S{}", d >> 8))
    }
}

/// Runtime that serves nodes over UDP.
pub struct UdpRuntime {
    bind_ip: IpAddr,
    hostname: String,
    next_context: AtomicU64,
}

impl UdpRuntime {
    /// Runtime bound to the IPv6 wildcard (dual stack).
    pub fn new() -> Self {
        Self::with_bind_ip(IpAddr::V6(Ipv6Addr::UNSPECIFIED))
    }

    pub fn with_bind_ip(bind_ip: IpAddr) -> Self {
        Self {
            bind_ip,
            hostname: gethostname::gethostname().to_string_lossy().into_owned(),
            next_context: AtomicU64::new(1),
        }
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }
}

impl Default for UdpRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl ProtocolRuntime for UdpRuntime {
    fn name(&self) -> &'static str {
        "udp"
    }

    fn create_context(&self, identity: &NodeIdentity) -> Result<ContextHandle, RuntimeError> {
        Ok(ContextHandle {
            id: self.next_context.fetch_add(1, Ordering::SeqCst),
            identity: identity.clone(),
        })
    }

    fn create_node(&self, context: &ContextHandle) -> Result<Arc<dyn RuntimeNode>, RuntimeError> {
        Ok(Arc::new(UdpNode {
            identity: context.identity.clone(),
            bind_addr: SocketAddr::new(self.bind_ip, context.identity.port),
            hostname: self.hostname.clone(),
            state: Mutex::new(UdpNodeState::default()),
        }))
    }
}

#[derive(Default)]
struct UdpNodeState {
    socket: Option<UdpSocket>,
    advertisement: Option<Advertisement>,
    trees: BTreeMap<String, EndpointTree>,
}

struct UdpNode {
    identity: NodeIdentity,
    bind_addr: SocketAddr,
    hostname: String,
    state: Mutex<UdpNodeState>,
}

impl UdpNode {
    fn bind(&self) -> io::Result<UdpSocket> {
        let domain = match self.bind_addr {
            SocketAddr::V4(_) => Domain::IPV4,
            SocketAddr::V6(_) => Domain::IPV6,
        };
        let socket = Socket::new(domain, Type::DGRAM, Some(Protocol::UDP))?;
        if self.bind_addr.is_ipv6() {
            socket.set_only_v6(false)?;
        }
        socket.set_nonblocking(true)?;
        socket.bind(&self.bind_addr.into())?;
        Ok(socket.into())
    }
}

#[async_trait]
impl RuntimeNode for UdpNode {
    async fn add(&self, tree: EndpointTree) -> Result<(), RuntimeError> {
        debug!(
            "[Matter] {}: publishing endpoint tree {} ({} endpoints)",
            self.identity.store_id,
            tree.id,
            tree.len()
        );
        self.state.lock().trees.insert(tree.id.clone(), tree);
        Ok(())
    }

    async fn start(&self) -> Result<(), RuntimeError> {
        let mut state = self.state.lock();
        if state.socket.is_some() {
            return Ok(());
        }

        let socket = self.bind().map_err(|e| {
            if e.kind() == io::ErrorKind::AddrInUse {
                RuntimeError::AddressInUse(self.bind_addr.to_string())
            } else {
                RuntimeError::Io(e)
            }
        })?;
        let local = socket.local_addr()?;
        info!(
            "[Matter] {}: UDP socket bound to {}",
            self.identity.store_id, local
        );

        let advertisement =
            Advertisement::for_identity(&self.identity, &self.hostname, local.port());
        info!(
            "[Matter] {}: advertising {}.{} on {}:{} (D={}, VP={}+{})",
            self.identity.store_id,
            advertisement.instance_name,
            advertisement.service,
            advertisement.hostname,
            advertisement.port,
            self.identity.discriminator,
            self.identity.vendor_id,
            self.identity.product_id
        );

        state.socket = Some(socket);
        state.advertisement = Some(advertisement);
        Ok(())
    }

    async fn stop(&self) -> Result<(), RuntimeError> {
        let mut state = self.state.lock();
        if let Some(advertisement) = state.advertisement.take() {
            info!(
                "[Matter] {}: withdrew {}.{}",
                self.identity.store_id, advertisement.instance_name, advertisement.service
            );
        }
        if state.socket.take().is_some() {
            info!(
                "[Matter] {}: UDP socket on {} closed",
                self.identity.store_id, self.bind_addr
            );
        }
        Ok(())
    }

    async fn report_attribute_change(&self, change: &AttributeChange) -> Result<(), RuntimeError> {
        let mut state = self.state.lock();
        if state.socket.is_none() {
            return Err(RuntimeError::NotRunning);
        }
        let applied = state
            .trees
            .values_mut()
            .any(|tree| apply_change(tree, change));
        if !applied {
            return Err(RuntimeError::UnknownEndpoint(change.endpoint.clone()));
        }
        debug!(
            "[Matter] {}: {} 0x{:04X}.{} = {}",
            self.identity.store_id,
            change.endpoint,
            change.cluster_id,
            change.attribute,
            change.value
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn identity(port: u16) -> NodeIdentity {
        NodeIdentity {
            store_id: "udp-test".to_string(),
            device_name: "UDP Test".to_string(),
            device_type_code: 0x000E,
            vendor_id: 0xFFF1,
            vendor_name: "Test".to_string(),
            product_id: 0x8000,
            product_name: "Bridge".to_string(),
            serial_number: "SN-1".to_string(),
            unique_id: "0a1b2c3d-4e5f-6071-8293-a4b5c6d7e8f9".to_string(),
            discriminator: 3840,
            passcode: 20202021,
            port,
        }
    }

    #[test]
    fn test_advertisement_record() {
        let ad = Advertisement::for_identity(&identity(5540), "host", 5540);
        assert_eq!(ad.instance_name, "0A1B2C3D4E5F6071");
        assert_eq!(ad.service, "_matterc._udp");
        assert!(ad.txt.contains(&("D", "3840".to_string())));
        assert!(ad.txt.contains(&("VP", "65521+32768".to_string())));
        assert!(ad.txt.contains(&("DN", "UDP Test".to_string())));
        assert_eq!(ad.short_discriminator_subtype().as_deref(), Some("_S15"));
    }

    #[tokio::test]
    async fn test_second_node_on_same_port_fails_until_first_stops() {
        let holder = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
        let port = holder.local_addr().unwrap().port();
        drop(holder);

        let runtime = UdpRuntime::with_bind_ip(IpAddr::V4(Ipv4Addr::LOCALHOST));
        let ctx = runtime.create_context(&identity(port)).unwrap();
        let first = runtime.create_node(&ctx).unwrap();
        let second = runtime.create_node(&ctx).unwrap();

        first.start().await.unwrap();
        assert!(matches!(
            second.start().await,
            Err(RuntimeError::AddressInUse(_))
        ));
        first.stop().await.unwrap();
        second.start().await.unwrap();
        second.stop().await.unwrap();
    }
}
