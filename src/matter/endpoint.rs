//! Endpoint: one node in a device's capability tree.
//!
//! An [`Endpoint`] is a cheap, cloneable handle. The plugin that created it
//! and the server node it was added to share the same underlying state, so
//! attribute writes made by the plugin reach the node's runtime.
//!
//! Ownership runs strictly downwards: an endpoint owns its children and its
//! cluster servers. The parent is recorded by id only and resolved through the
//! owning [`ServerNode`](super::server_node::ServerNode).
//!
//! Composition (device types, clusters, children) is only allowed while the
//! owning node is not online.
//!
//! # Example
//! ```ignore
//! let light = Endpoint::new("Kitchen light", ON_OFF_LIGHT);
//! light.add_cluster_server(identify::identify_cluster_server(0))?;
//! light.add_cluster_server(identify::groups_cluster_server())?;
//! light.add_cluster_server(on_off::cluster_server(false))?;
//!
//! let contact = light.add_child_device_type_with_cluster_server(
//!     "contactChild-1",
//!     &[CONTACT_SENSOR],
//!     &[boolean_state::CLUSTER_ID],
//! )?;
//!
//! light.subscribe_attribute(on_off::CLUSTER_ID, on_off::ON_OFF, |new, old| {
//!     log::info!("onOff {} -> {}", old, new);
//! })?;
//! light.set_attribute(on_off::CLUSTER_ID, on_off::ON_OFF, true).await?;
//! ```

use super::attribute_store::{AttributeStore, ClusterState, SubscriptionHandle};
use super::cluster_server::ClusterServer;
use super::clusters::{AttributeValue, ClusterId};
use super::device_types::DeviceType;
use super::server_node::NodeLink;
use crate::error::{BridgeError, Result};
use log::debug;
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

#[derive(Clone)]
pub struct Endpoint {
    inner: Arc<EndpointInner>,
}

struct EndpointInner {
    id: String,
    composition: RwLock<Composition>,
    store: AttributeStore,
    link: RwLock<Option<Arc<NodeLink>>>,
}

struct Composition {
    device_types: Vec<DeviceType>,
    children: Vec<Endpoint>,
    parent: Option<String>,
}

/// Device type reference as handed to the protocol runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceTypeRef {
    pub name: &'static str,
    pub code: u32,
    pub revision: u16,
}

/// Snapshot of an endpoint subtree, including current attribute values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EndpointTree {
    pub id: String,
    pub device_types: Vec<DeviceTypeRef>,
    pub clusters: Vec<ClusterState>,
    pub children: Vec<EndpointTree>,
}

impl EndpointTree {
    /// Number of endpoints in this subtree.
    pub fn len(&self) -> usize {
        1 + self.children.iter().map(EndpointTree::len).sum::<usize>()
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    /// Find an endpoint in this subtree by id.
    pub fn find(&self, id: &str) -> Option<&EndpointTree> {
        if self.id == id {
            return Some(self);
        }
        self.children.iter().find_map(|child| child.find(id))
    }
}

impl Endpoint {
    /// Create an endpoint with a device type and no clusters.
    pub fn new(id: impl Into<String>, device_type: DeviceType) -> Self {
        let id = id.into();
        Self {
            inner: Arc::new(EndpointInner {
                store: AttributeStore::new(id.clone()),
                id,
                composition: RwLock::new(Composition {
                    device_types: vec![device_type],
                    children: Vec::new(),
                    parent: None,
                }),
                link: RwLock::new(None),
            }),
        }
    }

    /// Create an endpoint carrying default cluster servers for every cluster
    /// its device type requires.
    pub fn with_required_clusters(id: impl Into<String>, device_type: DeviceType) -> Result<Self> {
        let endpoint = Self::new(id, device_type);
        endpoint.add_cluster_server_from_list(device_type.required_clusters)?;
        Ok(endpoint)
    }

    pub fn id(&self) -> &str {
        &self.inner.id
    }

    /// Base (first) device type.
    pub fn device_type(&self) -> DeviceType {
        self.inner.composition.read().device_types[0]
    }

    pub fn device_types(&self) -> Vec<DeviceType> {
        self.inner.composition.read().device_types.clone()
    }

    /// Id of the parent endpoint, if this endpoint is a child.
    pub fn parent_id(&self) -> Option<String> {
        self.inner.composition.read().parent.clone()
    }

    pub fn children(&self) -> Vec<Endpoint> {
        self.inner.composition.read().children.clone()
    }

    pub fn cluster_ids(&self) -> Vec<ClusterId> {
        self.inner.store.cluster_ids()
    }

    pub fn has_cluster_server(&self, cluster_id: ClusterId) -> bool {
        self.inner.store.contains(cluster_id)
    }

    /// Whether both handles refer to the same endpoint.
    pub fn ptr_eq(&self, other: &Endpoint) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    // ------------------------------------------------------------------
    // Composition
    // ------------------------------------------------------------------

    /// Attach a cluster server. Fails with `DuplicateCluster` if the cluster
    /// id is already present.
    pub fn add_cluster_server(&self, server: ClusterServer) -> Result<()> {
        self.ensure_offline("add_cluster_server")?;
        self.inner.store.insert(server)
    }

    /// Attach default cluster servers for every id not yet present.
    pub fn add_cluster_server_from_list(&self, cluster_ids: &[ClusterId]) -> Result<()> {
        self.ensure_offline("add_cluster_server_from_list")?;
        for &id in cluster_ids {
            if self.inner.store.contains(id) {
                continue;
            }
            self.inner.store.insert(ClusterServer::for_cluster(id)?)?;
        }
        Ok(())
    }

    /// Add a device type to this endpoint. Already declared types are kept
    /// once.
    pub fn add_device_type(&self, device_type: DeviceType) -> Result<()> {
        self.ensure_offline("add_device_type")?;
        let mut composition = self.inner.composition.write();
        if !composition.device_types.contains(&device_type) {
            composition.device_types.push(device_type);
        }
        Ok(())
    }

    /// Add device types and default cluster servers in place. Existing
    /// cluster servers are left untouched.
    pub fn add_device_type_with_cluster_server(
        &self,
        device_types: &[DeviceType],
        cluster_ids: &[ClusterId],
    ) -> Result<()> {
        self.ensure_offline("add_device_type_with_cluster_server")?;
        // Resolve every id first so a bad id leaves the endpoint unchanged
        for &id in cluster_ids {
            if !self.inner.store.contains(id) && super::clusters::schema(id).is_none() {
                return Err(BridgeError::NotFound(format!("cluster 0x{:04X}", id)));
            }
        }
        for &device_type in device_types {
            self.add_device_type(device_type)?;
        }
        self.add_cluster_server_from_list(cluster_ids)
    }

    /// Create a child endpoint with the given device types and return it.
    ///
    /// The child gets default cluster servers for every requested id and for
    /// every cluster its device types require.
    pub fn add_child_device_type_with_cluster_server(
        &self,
        child_id: &str,
        device_types: &[DeviceType],
        cluster_ids: &[ClusterId],
    ) -> Result<Endpoint> {
        self.ensure_offline("add_child_device_type_with_cluster_server")?;
        let Some((&base, extra)) = device_types.split_first() else {
            return Err(BridgeError::RedundantDeviceType {
                child: child_id.to_string(),
                device_type: "none".to_string(),
            });
        };

        let child = Endpoint::new(child_id, base);
        for &device_type in extra {
            child.add_device_type(device_type)?;
        }
        child.add_cluster_server_from_list(cluster_ids)?;
        for device_type in device_types {
            child.add_cluster_server_from_list(device_type.required_clusters)?;
        }

        self.attach_child(child.clone())?;
        Ok(child)
    }

    /// Attach an existing endpoint as a child (e.g. a bridged device under
    /// an aggregator).
    pub fn add_child(&self, child: Endpoint) -> Result<()> {
        self.check_child(&child)?;
        self.attach_child(child)
    }

    /// Run the placement checks of `add_child` without modifying either
    /// endpoint.
    pub fn check_child(&self, child: &Endpoint) -> Result<()> {
        self.ensure_offline("add_child")?;
        // A parented endpoint, or one that already contains `self`, would
        // end up in the tree twice
        if child.parent_id().is_some() || child.walk().iter().any(|e| e.ptr_eq(self)) {
            return Err(BridgeError::DuplicateEndpointId(child.id().to_string()));
        }
        if self.get_child_endpoint_by_name(child.id()).is_some() {
            return Err(BridgeError::DuplicateChildId {
                parent: self.inner.id.clone(),
                child: child.id().to_string(),
            });
        }
        Ok(())
    }

    /// Look up a direct child by id.
    pub fn get_child_endpoint_by_name(&self, child_id: &str) -> Option<Endpoint> {
        self.inner
            .composition
            .read()
            .children
            .iter()
            .find(|child| child.id() == child_id)
            .cloned()
    }

    /// Required clusters missing from this endpoint, per declared device type.
    pub fn missing_required_clusters(&self) -> Vec<(DeviceType, ClusterId)> {
        self.device_types()
            .into_iter()
            .flat_map(|device_type| {
                device_type
                    .required_clusters
                    .iter()
                    .filter(|id| !self.inner.store.contains(**id))
                    .map(move |id| (device_type, *id))
                    .collect::<Vec<_>>()
            })
            .collect()
    }

    /// This endpoint followed by all descendants, depth first.
    pub fn walk(&self) -> Vec<Endpoint> {
        let mut out = vec![self.clone()];
        for child in self.children() {
            out.extend(child.walk());
        }
        out
    }

    /// Snapshot of this subtree for the protocol runtime.
    pub fn tree(&self) -> EndpointTree {
        let (device_types, children) = {
            let composition = self.inner.composition.read();
            (
                composition.device_types.clone(),
                composition.children.clone(),
            )
        };
        EndpointTree {
            id: self.inner.id.clone(),
            device_types: device_types
                .iter()
                .map(|dt| DeviceTypeRef {
                    name: dt.name,
                    code: dt.code,
                    revision: dt.revision,
                })
                .collect(),
            clusters: self.inner.store.snapshot(),
            children: children.iter().map(Endpoint::tree).collect(),
        }
    }

    // ------------------------------------------------------------------
    // Attribute access
    // ------------------------------------------------------------------

    /// Read an attribute.
    pub fn get_attribute(&self, cluster_id: ClusterId, attribute: &str) -> Result<AttributeValue> {
        self.require_cluster(cluster_id)?;
        self.inner.store.get(cluster_id, attribute)
    }

    /// Write an attribute and report it to the protocol runtime.
    ///
    /// Subscribers have run by the time the local commit is done. If the
    /// owning node is online the change is then reported; a failed report
    /// returns `PropagationFailure` but the local value stays committed.
    pub async fn set_attribute(
        &self,
        cluster_id: ClusterId,
        attribute: &str,
        value: impl Into<AttributeValue>,
    ) -> Result<AttributeValue> {
        self.require_cluster(cluster_id)?;
        let committed = self.inner.store.set(cluster_id, attribute, value.into())?;

        let link = self.inner.link.read().clone();
        if let Some(link) = link {
            link.report(self.id(), cluster_id, attribute, &committed).await?;
        }
        Ok(committed)
    }

    /// Subscribe to changes of an attribute. The callback receives
    /// `(new_value, old_value)`.
    pub fn subscribe_attribute(
        &self,
        cluster_id: ClusterId,
        attribute: &str,
        callback: impl Fn(&AttributeValue, &AttributeValue) + Send + Sync + 'static,
    ) -> Result<SubscriptionHandle> {
        self.require_cluster(cluster_id)?;
        self.inner.store.subscribe(cluster_id, attribute, callback)
    }

    pub fn unsubscribe_attribute(&self, handle: SubscriptionHandle) -> bool {
        self.inner.store.unsubscribe(handle)
    }

    /// Write version of an attribute.
    pub fn attribute_version(&self, cluster_id: ClusterId, attribute: &str) -> Result<u64> {
        self.require_cluster(cluster_id)?;
        self.inner.store.version(cluster_id, attribute)
    }

    // ------------------------------------------------------------------
    // Node binding
    // ------------------------------------------------------------------

    /// Bind this subtree to a node (or unbind with `None`).
    pub(crate) fn bind(&self, link: Option<Arc<NodeLink>>) {
        *self.inner.link.write() = link.clone();
        for child in self.children() {
            child.bind(link.clone());
        }
    }

    pub(crate) fn link(&self) -> Option<Arc<NodeLink>> {
        self.inner.link.read().clone()
    }

    /// Drop all plugin subscriptions in this subtree.
    pub(crate) fn clear_subscribers(&self) {
        for endpoint in self.walk() {
            endpoint.inner.store.clear_subscribers();
        }
    }

    fn attach_child(&self, child: Endpoint) -> Result<()> {
        let mut composition = self.inner.composition.write();
        if composition
            .children
            .iter()
            .any(|existing| existing.id() == child.id())
        {
            return Err(BridgeError::DuplicateChildId {
                parent: self.inner.id.clone(),
                child: child.id().to_string(),
            });
        }

        let base = composition.device_types[0];
        let inherited: BTreeSet<ClusterId> = base.required_clusters.iter().copied().collect();
        let child_types = child.device_types();
        let adds_capability = child_types
            .iter()
            .flat_map(|dt| dt.required_clusters.iter())
            .any(|id| !inherited.contains(id));
        if !adds_capability {
            let names: Vec<_> = child_types.iter().map(|dt| dt.name).collect();
            return Err(BridgeError::RedundantDeviceType {
                child: child.id().to_string(),
                device_type: names.join(", "),
            });
        }

        child.inner.composition.write().parent = Some(self.inner.id.clone());
        child.bind(self.link());
        debug!(
            "[Endpoint] {}: added child {} ({})",
            self.inner.id,
            child.id(),
            child.device_type().name
        );
        composition.children.push(child);
        Ok(())
    }

    fn ensure_offline(&self, operation: &str) -> Result<()> {
        match self.inner.link.read().as_ref() {
            Some(link) if link.is_online() => Err(BridgeError::IllegalStateAfterStart(format!(
                "{} on endpoint {}",
                operation, self.inner.id
            ))),
            _ => Ok(()),
        }
    }

    fn require_cluster(&self, cluster_id: ClusterId) -> Result<()> {
        if self.inner.store.contains(cluster_id) {
            Ok(())
        } else {
            Err(BridgeError::ClusterNotPresent {
                endpoint: self.inner.id.clone(),
                cluster_id,
            })
        }
    }
}

impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let composition = self.inner.composition.read();
        f.debug_struct("Endpoint")
            .field("id", &self.inner.id)
            .field(
                "device_types",
                &composition
                    .device_types
                    .iter()
                    .map(|dt| dt.name)
                    .collect::<Vec<_>>(),
            )
            .field("clusters", &self.inner.store.cluster_ids())
            .field("children", &composition.children.len())
            .finish()
    }
}
