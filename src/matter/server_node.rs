//! Server node: one Matter node served to controllers.
//!
//! A [`ServerNodeContext`] carries the node's persisted identity (vendor,
//! product, discriminator, passcode, unique id). A [`ServerNode`] owns the
//! root endpoints published under that identity and drives the runtime
//! through `Created -> Online -> Offline (-> Online)`.
//!
//! At most one node per context is online at a time. Endpoints added to a
//! node are bound to it through a shared [`NodeLink`], which is how an
//! attribute write on a plugin-held endpoint finds its way to the runtime.

use super::clusters::{AttributeValue, ClusterId};
use super::device_types::{AGGREGATOR, DeviceType};
use super::endpoint::Endpoint;
use super::pairing;
use super::runtime::{
    AttributeChange, ContextHandle, NodeIdentity, ProtocolRuntime, RuntimeError, RuntimeNode,
};
use crate::error::{BridgeError, Result};
use crate::storage::Storage;
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use parking_lot::RwLock;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use strum::Display;

/// Node lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum Lifecycle {
    Created,
    Online,
    Offline,
}

/// Parameters for [`ServerNodeContext::create`].
#[derive(Debug, Clone)]
pub struct ContextRequest {
    pub store_id: String,
    pub device_name: String,
    pub device_type: DeviceType,
    pub vendor_id: u16,
    pub vendor_name: String,
    pub product_id: u16,
    pub product_name: String,
    pub port: u16,
    /// Fixed commissioning credentials; generated on first creation if unset
    pub discriminator: Option<u16>,
    pub passcode: Option<u32>,
}

impl ContextRequest {
    pub fn new(
        store_id: impl Into<String>,
        device_name: impl Into<String>,
        device_type: DeviceType,
    ) -> Self {
        Self {
            store_id: store_id.into(),
            device_name: device_name.into(),
            device_type,
            vendor_id: 0xFFF1,
            vendor_name: "Matterbridge".to_string(),
            product_id: 0x8000,
            product_name: "Matterbridge aggregator".to_string(),
            port: 5540,
            discriminator: None,
            passcode: None,
        }
    }

    pub fn vendor(mut self, id: u16, name: impl Into<String>) -> Self {
        self.vendor_id = id;
        self.vendor_name = name.into();
        self
    }

    pub fn product(mut self, id: u16, name: impl Into<String>) -> Self {
        self.product_id = id;
        self.product_name = name.into();
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn credentials(mut self, discriminator: u16, passcode: u32) -> Self {
        self.discriminator = Some(discriminator);
        self.passcode = Some(passcode);
        self
    }
}

/// Stored form of a context.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ContextRecord {
    #[serde(flatten)]
    identity: NodeIdentity,
    created_at: DateTime<Utc>,
}

/// Persisted identity and configuration of one logical server.
pub struct ServerNodeContext {
    identity: NodeIdentity,
    created_at: DateTime<Utc>,
    handle: ContextHandle,
    runtime: Arc<dyn ProtocolRuntime>,
    online: AtomicBool,
}

impl ServerNodeContext {
    /// Load the context for `request.store_id`, creating and saving it on
    /// first use. Calling this again with the same store id yields the same
    /// discriminator, passcode and unique id.
    pub fn create(
        runtime: Arc<dyn ProtocolRuntime>,
        storage: &Storage,
        request: ContextRequest,
    ) -> Result<Arc<Self>> {
        check_credentials(&request)?;
        let key = format!("context-{}", request.store_id);
        let stored: Option<ContextRecord> = storage.load(&key)?;

        let record = match stored {
            Some(previous) if previous.identity.store_id != request.store_id => {
                return Err(BridgeError::Storage(format!(
                    "record {} belongs to store id {:?}, not {:?}",
                    key, previous.identity.store_id, request.store_id
                )));
            }
            Some(previous) => {
                let updated = ContextRecord {
                    identity: merge_identity(previous.identity.clone(), &request),
                    created_at: previous.created_at,
                };
                if updated.identity != previous.identity {
                    storage.save(&key, &updated)?;
                }
                debug!("[Node] {}: reusing stored context", request.store_id);
                updated
            }
            None => {
                let record = ContextRecord {
                    identity: new_identity(&request),
                    created_at: Utc::now(),
                };
                storage.save(&key, &record)?;
                info!("[Node] {}: created new context", request.store_id);
                record
            }
        };

        let handle = runtime.create_context(&record.identity)?;
        Ok(Arc::new(Self {
            identity: record.identity,
            created_at: record.created_at,
            handle,
            runtime,
            online: AtomicBool::new(false),
        }))
    }

    pub fn store_id(&self) -> &str {
        &self.identity.store_id
    }

    pub fn identity(&self) -> &NodeIdentity {
        &self.identity
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn manual_pairing_code(&self) -> String {
        pairing::formatted_pairing_code(self.identity.discriminator, self.identity.passcode)
    }

    /// Aggregator endpoint for bridged devices, id `"<storeId> aggregator"`.
    pub fn create_aggregator(&self) -> Endpoint {
        Endpoint::new(format!("{} aggregator", self.identity.store_id), AGGREGATOR)
    }

    /// Whether some node of this context is online.
    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }
}

/// Reject fixed credentials a controller could not commission with.
fn check_credentials(request: &ContextRequest) -> Result<()> {
    if let Some(discriminator) = request.discriminator
        && !pairing::is_valid_discriminator(discriminator)
    {
        return Err(BridgeError::InvalidCredentials(format!(
            "{}: discriminator {} exceeds {}",
            request.store_id,
            discriminator,
            pairing::MAX_DISCRIMINATOR
        )));
    }
    if let Some(passcode) = request.passcode
        && !pairing::is_valid_passcode(passcode)
    {
        return Err(BridgeError::InvalidCredentials(format!(
            "{}: passcode {} is not allowed",
            request.store_id, passcode
        )));
    }
    Ok(())
}

fn new_identity(request: &ContextRequest) -> NodeIdentity {
    let mut rng = rand::thread_rng();
    let discriminator = request
        .discriminator
        .unwrap_or_else(|| rng.gen_range(0..=pairing::MAX_DISCRIMINATOR));
    let passcode = request.passcode.unwrap_or_else(|| loop {
        let candidate = rng.gen_range(1..=pairing::MAX_PASSCODE);
        if pairing::is_valid_passcode(candidate) {
            break candidate;
        }
    });
    let unique_id = uuid::Uuid::new_v4();

    NodeIdentity {
        store_id: request.store_id.clone(),
        device_name: request.device_name.clone(),
        device_type_code: request.device_type.code,
        vendor_id: request.vendor_id,
        vendor_name: request.vendor_name.clone(),
        product_id: request.product_id,
        product_name: request.product_name.clone(),
        serial_number: unique_id.simple().to_string()[..12].to_uppercase(),
        unique_id: unique_id.to_string(),
        discriminator,
        passcode,
        port: request.port,
    }
}

/// Apply request fields to a stored identity, keeping generated credentials.
fn merge_identity(mut identity: NodeIdentity, request: &ContextRequest) -> NodeIdentity {
    identity.device_name = request.device_name.clone();
    identity.device_type_code = request.device_type.code;
    identity.vendor_id = request.vendor_id;
    identity.vendor_name = request.vendor_name.clone();
    identity.product_id = request.product_id;
    identity.product_name = request.product_name.clone();
    identity.port = request.port;
    if let Some(discriminator) = request.discriminator {
        identity.discriminator = discriminator;
    }
    if let Some(passcode) = request.passcode {
        identity.passcode = passcode;
    }
    identity
}

/// Shared between a node and every endpoint bound to it.
pub struct NodeLink {
    name: String,
    lifecycle: RwLock<Lifecycle>,
    runtime: Arc<dyn RuntimeNode>,
}

impl NodeLink {
    pub fn lifecycle(&self) -> Lifecycle {
        *self.lifecycle.read()
    }

    pub fn is_online(&self) -> bool {
        self.lifecycle() == Lifecycle::Online
    }

    /// Report a committed change if the node is online.
    pub(crate) async fn report(
        &self,
        endpoint: &str,
        cluster_id: ClusterId,
        attribute: &str,
        value: &AttributeValue,
    ) -> Result<()> {
        if !self.is_online() {
            debug!(
                "[Node] {}: {} 0x{:04X}.{} kept local while {}",
                self.name,
                endpoint,
                cluster_id,
                attribute,
                self.lifecycle()
            );
            return Ok(());
        }
        let change = AttributeChange {
            endpoint: endpoint.to_string(),
            cluster_id,
            attribute: attribute.to_string(),
            value: value.clone(),
        };
        self.runtime
            .report_attribute_change(&change)
            .await
            .map_err(|e| {
                warn!(
                    "[Node] {}: failed to report {} 0x{:04X}.{}: {}",
                    self.name, endpoint, cluster_id, attribute, e
                );
                BridgeError::PropagationFailure {
                    attribute: format!("{}/0x{:04X}/{}", endpoint, cluster_id, attribute),
                    reason: e.to_string(),
                }
            })
    }
}

/// One server node and the endpoint trees it publishes.
pub struct ServerNode {
    context: Arc<ServerNodeContext>,
    link: Arc<NodeLink>,
    roots: Vec<Endpoint>,
    aggregator: Option<Endpoint>,
}

impl ServerNode {
    /// Allocate the runtime node for a context. The node starts `Created`.
    pub fn create(context: Arc<ServerNodeContext>) -> Result<Self> {
        let runtime = context.runtime.create_node(&context.handle)?;
        debug!(
            "[Node] {}: created on {} runtime",
            context.store_id(),
            context.runtime.name()
        );
        Ok(Self {
            link: Arc::new(NodeLink {
                name: context.store_id().to_string(),
                lifecycle: RwLock::new(Lifecycle::Created),
                runtime,
            }),
            context,
            roots: Vec::new(),
            aggregator: None,
        })
    }

    pub fn name(&self) -> &str {
        &self.link.name
    }

    pub fn context(&self) -> &Arc<ServerNodeContext> {
        &self.context
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.link.lifecycle()
    }

    pub fn is_online(&self) -> bool {
        self.link.is_online()
    }

    /// The first aggregator endpoint added to this node, if any.
    pub fn aggregator(&self) -> Option<&Endpoint> {
        self.aggregator.as_ref()
    }

    pub fn roots(&self) -> &[Endpoint] {
        &self.roots
    }

    /// Add an endpoint tree. Only valid while the node is not online.
    pub fn add(&mut self, endpoint: Endpoint) -> Result<()> {
        if self.is_online() {
            return Err(BridgeError::IllegalStateAfterStart(format!(
                "adding endpoint {} to server node {}",
                endpoint.id(),
                self.name()
            )));
        }
        if let Some(other) = endpoint.link()
            && !Arc::ptr_eq(&other, &self.link)
            && other.is_online()
        {
            return Err(BridgeError::IllegalStateAfterStart(format!(
                "endpoint {} belongs to online server node {}",
                endpoint.id(),
                other.name
            )));
        }

        validate_trees(self.roots.iter().chain(std::iter::once(&endpoint)))?;

        endpoint.bind(Some(self.link.clone()));
        if self.aggregator.is_none() && endpoint.device_types().contains(&AGGREGATOR) {
            self.aggregator = Some(endpoint.clone());
        }
        debug!(
            "[Node] {}: added endpoint {} ({} total)",
            self.name(),
            endpoint.id(),
            endpoint.walk().len()
        );
        self.roots.push(endpoint);
        Ok(())
    }

    /// Publish the endpoint trees and bring the node online.
    ///
    /// On failure the node keeps its previous state.
    pub async fn start(&mut self) -> Result<()> {
        if self.is_online() {
            debug!("[Node] {}: already online", self.name());
            return Ok(());
        }
        if self
            .context
            .online
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(BridgeError::StartFailure {
                node: self.name().to_string(),
                reason: "another server node of this context is online".to_string(),
            });
        }

        if let Err(e) = self.publish_and_start().await {
            self.context.online.store(false, Ordering::SeqCst);
            warn!("[Node] {}: start failed: {}", self.name(), e);
            return Err(e);
        }

        *self.link.lifecycle.write() = Lifecycle::Online;
        let identity = self.context.identity();
        info!(
            "[Node] {}: online with {} endpoints on port {}",
            self.name(),
            self.endpoints().len(),
            identity.port
        );
        info!(
            "[Node] {}: discriminator {}, manual pairing code {}",
            self.name(),
            identity.discriminator,
            self.context.manual_pairing_code()
        );
        Ok(())
    }

    async fn publish_and_start(&self) -> Result<()> {
        validate_trees(self.roots.iter())?;
        let start_failure = |e: RuntimeError| BridgeError::StartFailure {
            node: self.name().to_string(),
            reason: e.to_string(),
        };
        for root in &self.roots {
            self.link.runtime.add(root.tree()).await.map_err(start_failure)?;
        }
        self.link.runtime.start().await.map_err(start_failure)
    }

    /// Take the node offline and release its runtime resources.
    ///
    /// Does nothing unless the node is online. A runtime error is returned as
    /// `StopFailure`, but the node is offline either way.
    pub async fn stop(&mut self) -> Result<()> {
        if !self.is_online() {
            debug!("[Node] {}: stop ignored while {}", self.name(), self.lifecycle());
            return Ok(());
        }

        *self.link.lifecycle.write() = Lifecycle::Offline;
        let result = self.link.runtime.stop().await;
        self.context.online.store(false, Ordering::SeqCst);

        match result {
            Ok(()) => {
                info!("[Node] {}: offline", self.name());
                Ok(())
            }
            Err(e) => {
                warn!("[Node] {}: runtime stop failed: {}", self.name(), e);
                Err(BridgeError::StopFailure {
                    node: self.name().to_string(),
                    reason: e.to_string(),
                })
            }
        }
    }

    /// Every endpoint published by this node, depth first.
    pub fn endpoints(&self) -> Vec<Endpoint> {
        self.roots.iter().flat_map(Endpoint::walk).collect()
    }

    /// Find an endpoint by id anywhere in this node.
    pub fn endpoint(&self, id: &str) -> Option<Endpoint> {
        self.endpoints().into_iter().find(|e| e.id() == id)
    }

    /// Resolve an endpoint's parent within this node.
    pub fn parent_of(&self, endpoint: &Endpoint) -> Option<Endpoint> {
        let parent_id = endpoint.parent_id()?;
        self.endpoint(&parent_id)
    }
}

impl Drop for ServerNode {
    fn drop(&mut self) {
        if self.is_online() {
            warn!("[Node] {}: dropped while online", self.name());
            self.context.online.store(false, Ordering::SeqCst);
        }
        for root in &self.roots {
            if root.link().is_some_and(|link| Arc::ptr_eq(&link, &self.link)) {
                root.clear_subscribers();
                root.bind(None);
            }
        }
    }
}

/// Check endpoint ids are unique across all trees and every endpoint carries
/// the clusters its device types require.
fn validate_trees<'a>(roots: impl Iterator<Item = &'a Endpoint>) -> Result<()> {
    let mut seen = HashSet::new();
    for endpoint in roots.flat_map(Endpoint::walk) {
        if !seen.insert(endpoint.id().to_string()) {
            return Err(BridgeError::DuplicateEndpointId(endpoint.id().to_string()));
        }
        if let Some((device_type, cluster_id)) = endpoint.missing_required_clusters().first() {
            return Err(BridgeError::MissingRequiredCluster {
                endpoint: endpoint.id().to_string(),
                device_type: device_type.name.to_string(),
                cluster_id: *cluster_id,
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matter::clusters::{boolean_state, identify, on_off};
    use crate::matter::device_types::{CONTACT_SENSOR, ON_OFF_LIGHT};
    use crate::matter::runtime::{MemoryRuntime, RuntimeEvent};

    fn context(
        runtime: &MemoryRuntime,
        storage: &Storage,
        store_id: &str,
        port: u16,
    ) -> Arc<ServerNodeContext> {
        ServerNodeContext::create(
            Arc::new(runtime.clone()),
            storage,
            ContextRequest::new(store_id, store_id, AGGREGATOR).port(port),
        )
        .unwrap()
    }

    fn light(id: &str) -> Endpoint {
        Endpoint::with_required_clusters(id, ON_OFF_LIGHT).unwrap()
    }

    #[tokio::test]
    async fn test_lifecycle() {
        let runtime = MemoryRuntime::new();
        let ctx = context(&runtime, &Storage::in_memory(), "Jest", 5540);
        let mut node = ServerNode::create(ctx.clone()).unwrap();
        assert_eq!(node.lifecycle(), Lifecycle::Created);

        let aggregator = ctx.create_aggregator();
        assert_eq!(aggregator.id(), "Jest aggregator");
        node.add(aggregator.clone()).unwrap();
        let device = light("OnOffLight");
        aggregator.add_child(device.clone()).unwrap();

        node.start().await.unwrap();
        assert_eq!(node.lifecycle(), Lifecycle::Online);
        assert!(node.is_online());
        assert!(ctx.is_online());
        assert!(node.aggregator().is_some_and(|a| a.ptr_eq(&aggregator)));

        // Composition is frozen while online
        assert!(matches!(
            device.add_cluster_server(boolean_state::cluster_server(false)),
            Err(BridgeError::IllegalStateAfterStart(_))
        ));
        assert!(matches!(
            node.add(light("late")),
            Err(BridgeError::IllegalStateAfterStart(_))
        ));

        node.stop().await.unwrap();
        assert_eq!(node.lifecycle(), Lifecycle::Offline);
        assert!(!ctx.is_online());
        node.stop().await.unwrap();
        assert_eq!(node.lifecycle(), Lifecycle::Offline);

        node.start().await.unwrap();
        assert!(node.is_online());
        node.stop().await.unwrap();

        let stops = runtime
            .journal()
            .iter()
            .filter(|e| matches!(e, RuntimeEvent::Stopped(_)))
            .count();
        assert_eq!(stops, 2);
    }

    #[tokio::test]
    async fn test_stop_before_start_is_noop() {
        let runtime = MemoryRuntime::new();
        let ctx = context(&runtime, &Storage::in_memory(), "idle", 5541);
        let mut node = ServerNode::create(ctx).unwrap();
        node.stop().await.unwrap();
        assert_eq!(node.lifecycle(), Lifecycle::Created);
        assert!(!runtime.journal().iter().any(|e| matches!(e, RuntimeEvent::Stopped(_))));
    }

    #[tokio::test]
    async fn test_start_failure_keeps_prior_state() {
        let runtime = MemoryRuntime::new();
        runtime.reserve_port(5542);
        let ctx = context(&runtime, &Storage::in_memory(), "busy", 5542);
        let mut node = ServerNode::create(ctx.clone()).unwrap();
        node.add(light("lamp")).unwrap();

        assert!(matches!(
            node.start().await,
            Err(BridgeError::StartFailure { .. })
        ));
        assert_eq!(node.lifecycle(), Lifecycle::Created);
        assert!(!ctx.is_online());

        runtime.release_port(5542);
        node.start().await.unwrap();
        assert!(node.is_online());
    }

    #[tokio::test]
    async fn test_one_online_node_per_context() {
        let runtime = MemoryRuntime::new();
        let ctx = context(&runtime, &Storage::in_memory(), "shared", 5543);
        let mut first = ServerNode::create(ctx.clone()).unwrap();
        let mut second = ServerNode::create(ctx.clone()).unwrap();

        first.start().await.unwrap();
        assert!(matches!(
            second.start().await,
            Err(BridgeError::StartFailure { .. })
        ));
        assert_eq!(second.lifecycle(), Lifecycle::Created);

        first.stop().await.unwrap();
        second.start().await.unwrap();
        assert!(second.is_online());
    }

    #[tokio::test]
    async fn test_stop_failure_still_offline() {
        let runtime = MemoryRuntime::new();
        let ctx = context(&runtime, &Storage::in_memory(), "flaky", 5544);
        let mut node = ServerNode::create(ctx).unwrap();
        node.start().await.unwrap();

        runtime.set_fail_stop(true);
        assert!(matches!(
            node.stop().await,
            Err(BridgeError::StopFailure { .. })
        ));
        assert_eq!(node.lifecycle(), Lifecycle::Offline);
        assert!(runtime.ports_in_use().is_empty());
    }

    #[tokio::test]
    async fn test_online_write_is_reported() {
        let runtime = MemoryRuntime::new();
        let ctx = context(&runtime, &Storage::in_memory(), "reporting", 5545);
        let mut node = ServerNode::create(ctx).unwrap();
        let lamp = light("lamp");
        node.add(lamp.clone()).unwrap();
        node.start().await.unwrap();

        lamp.set_attribute(on_off::CLUSTER_ID, on_off::ON_OFF, true)
            .await
            .unwrap();

        let reported = runtime.journal().into_iter().find_map(|e| match e {
            RuntimeEvent::Reported { change, .. } => Some(change),
            _ => None,
        });
        let change = reported.unwrap();
        assert_eq!(change.endpoint, "lamp");
        assert_eq!(change.cluster_id, on_off::CLUSTER_ID);
        assert_eq!(change.value, AttributeValue::Bool(true));
    }

    #[tokio::test]
    async fn test_propagation_failure_keeps_local_commit() {
        let runtime = MemoryRuntime::new();
        let ctx = context(&runtime, &Storage::in_memory(), "lossy", 5546);
        let mut node = ServerNode::create(ctx).unwrap();
        let lamp = light("lamp");
        node.add(lamp.clone()).unwrap();
        node.start().await.unwrap();

        runtime.set_fail_reports(true);
        let result = lamp
            .set_attribute(on_off::CLUSTER_ID, on_off::ON_OFF, true)
            .await;
        assert!(matches!(result, Err(BridgeError::PropagationFailure { .. })));
        assert_eq!(
            lamp.get_attribute(on_off::CLUSTER_ID, on_off::ON_OFF).unwrap(),
            AttributeValue::Bool(true)
        );
    }

    #[tokio::test]
    async fn test_offline_write_is_resynced_on_start() {
        let runtime = MemoryRuntime::new();
        let ctx = context(&runtime, &Storage::in_memory(), "resync", 5547);
        let mut node = ServerNode::create(ctx).unwrap();
        let lamp = light("lamp");
        node.add(lamp.clone()).unwrap();
        node.start().await.unwrap();
        node.stop().await.unwrap();

        lamp.set_attribute(on_off::CLUSTER_ID, on_off::ON_OFF, true)
            .await
            .unwrap();
        assert!(!runtime.journal().iter().any(|e| matches!(e, RuntimeEvent::Reported { .. })));

        runtime.clear_journal();
        node.start().await.unwrap();
        let published = runtime.journal().into_iter().find_map(|e| match e {
            RuntimeEvent::Added { tree, .. } => Some(tree),
            _ => None,
        });
        let tree = published.unwrap();
        let on_off_state = tree
            .clusters
            .iter()
            .find(|c| c.id == on_off::CLUSTER_ID)
            .unwrap();
        assert_eq!(on_off_state.attributes[on_off::ON_OFF], AttributeValue::Bool(true));
    }

    #[test]
    fn test_duplicate_endpoint_id_across_trees() {
        let runtime = MemoryRuntime::new();
        let ctx = context(&runtime, &Storage::in_memory(), "dupes", 5548);
        let mut node = ServerNode::create(ctx).unwrap();
        let first = light("lamp");
        first
            .add_child_device_type_with_cluster_server(
                "door",
                &[CONTACT_SENSOR],
                &[boolean_state::CLUSTER_ID],
            )
            .unwrap();
        node.add(first).unwrap();

        let clash = Endpoint::with_required_clusters("door", CONTACT_SENSOR).unwrap();
        assert!(matches!(
            node.add(clash),
            Err(BridgeError::DuplicateEndpointId(id)) if id == "door"
        ));
        assert_eq!(node.roots().len(), 1);
    }

    #[test]
    fn test_missing_required_cluster_rejected() {
        let runtime = MemoryRuntime::new();
        let ctx = context(&runtime, &Storage::in_memory(), "bare", 5549);
        let mut node = ServerNode::create(ctx).unwrap();
        let bare = Endpoint::new("bare light", ON_OFF_LIGHT);
        bare.add_cluster_server(identify::identify_cluster_server(0)).unwrap();
        assert!(matches!(
            node.add(bare),
            Err(BridgeError::MissingRequiredCluster { .. })
        ));
    }

    #[test]
    fn test_parent_of() {
        let runtime = MemoryRuntime::new();
        let ctx = context(&runtime, &Storage::in_memory(), "family", 5550);
        let mut node = ServerNode::create(ctx).unwrap();
        let lamp = light("lamp");
        let door = lamp
            .add_child_device_type_with_cluster_server(
                "door",
                &[CONTACT_SENSOR],
                &[boolean_state::CLUSTER_ID],
            )
            .unwrap();
        node.add(lamp.clone()).unwrap();

        assert!(node.parent_of(&door).is_some_and(|p| p.ptr_eq(&lamp)));
        assert!(node.parent_of(&lamp).is_none());
        assert!(node.endpoint("door").is_some());
    }

    #[test]
    fn test_context_is_idempotent_per_store_id() {
        let runtime = MemoryRuntime::new();
        let storage = Storage::in_memory();
        let first = context(&runtime, &storage, "stable", 5551);
        let second = context(&runtime, &storage, "stable", 5551);

        assert_eq!(first.identity(), second.identity());
        assert_eq!(first.created_at(), second.created_at());
        assert!(first.identity().discriminator <= pairing::MAX_DISCRIMINATOR);
        assert!(pairing::is_valid_passcode(first.identity().passcode));
        assert_eq!(first.manual_pairing_code().len(), 13);

        let other = context(&runtime, &storage, "other", 5552);
        assert_ne!(first.identity().unique_id, other.identity().unique_id);
    }

    #[test]
    fn test_context_credentials_override() {
        let runtime = MemoryRuntime::new();
        let ctx = ServerNodeContext::create(
            Arc::new(runtime),
            &Storage::in_memory(),
            ContextRequest::new("fixed", "Fixed", AGGREGATOR)
                .vendor(0xFFF1, "Test vendor")
                .product(0x8001, "Test product")
                .credentials(3840, 20202021),
        )
        .unwrap();
        assert_eq!(ctx.manual_pairing_code(), "3497-011-2332");
        assert_eq!(ctx.identity().vendor_name, "Test vendor");
        assert_eq!(ctx.identity().product_id, 0x8001);
    }

    #[test]
    fn test_invalid_fixed_credentials_rejected() {
        let runtime = MemoryRuntime::new();
        let storage = Storage::in_memory();
        let create = |request: ContextRequest| {
            ServerNodeContext::create(Arc::new(runtime.clone()), &storage, request)
        };

        let result =
            create(ContextRequest::new("a", "A", AGGREGATOR).credentials(0xFFFF, 20202021));
        assert!(matches!(result, Err(BridgeError::InvalidCredentials(_))));
        let result =
            create(ContextRequest::new("a", "A", AGGREGATOR).credentials(3840, 4_000_000_000));
        assert!(matches!(result, Err(BridgeError::InvalidCredentials(_))));
        // Nothing was persisted for the rejected requests
        assert!(storage.load::<ContextRecord>("context-a").unwrap().is_none());

        // A stored context cannot be switched to bad credentials either
        create(ContextRequest::new("b", "B", AGGREGATOR)).unwrap();
        let result =
            create(ContextRequest::new("b", "B", AGGREGATOR).credentials(3840, 11111111));
        assert!(matches!(result, Err(BridgeError::InvalidCredentials(_))));
    }

    #[test]
    fn test_similar_store_ids_get_separate_identities() {
        let dir = std::env::temp_dir().join(format!("pmb-context-{}", uuid::Uuid::new_v4()));
        let runtime = MemoryRuntime::new();
        let storage = Storage::at(&dir);

        let spaced = context(&runtime, &storage, "my plugin", 5560);
        let underscored = context(&runtime, &storage, "my_plugin", 5561);
        assert_eq!(spaced.store_id(), "my plugin");
        assert_eq!(underscored.store_id(), "my_plugin");
        assert_ne!(spaced.identity().unique_id, underscored.identity().unique_id);

        // Reloading still finds each record
        let reloaded = context(&runtime, &Storage::at(&dir), "my plugin", 5560);
        assert_eq!(reloaded.identity(), spaced.identity());
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_record_for_other_store_id_rejected() {
        let runtime = MemoryRuntime::new();
        let storage = Storage::in_memory();
        let foreign = context(&runtime, &storage, "kitchen", 5562);
        let record = ContextRecord {
            identity: foreign.identity().clone(),
            created_at: foreign.created_at(),
        };
        storage.save("context-garage", &record).unwrap();

        let result = ServerNodeContext::create(
            Arc::new(runtime),
            &storage,
            ContextRequest::new("garage", "Garage", AGGREGATOR),
        );
        assert!(matches!(result, Err(BridgeError::Storage(_))));
    }
}
