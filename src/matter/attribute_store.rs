//! Per-endpoint attribute state with get/set/subscribe semantics.
//!
//! The store owns the endpoint's cluster servers. Writes are validated against
//! the cluster schema, bump the slot version and fan out synchronously to
//! subscribers in subscription order.
//!
//! Locking: the cluster map sits behind a `parking_lot::RwLock` that is never
//! held while a subscriber runs. A write copies the subscriber list before
//! releasing the lock, so subscribers may read or write the store themselves,
//! and a subscription added during dispatch only sees later writes.

use super::cluster_server::ClusterServer;
use super::clusters::{AttributeSpec, AttributeValue, ClusterId};
use crate::error::{BridgeError, Result};
use log::{debug, error};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::BTreeMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Subscriber callback, invoked with `(new_value, old_value)`.
pub type AttributeCallback = Arc<dyn Fn(&AttributeValue, &AttributeValue) + Send + Sync>;

/// Handle returned by `subscribe`, used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle {
    pub cluster_id: ClusterId,
    pub attribute: &'static str,
    id: u64,
}

#[derive(Clone)]
struct Subscriber {
    id: u64,
    callback: AttributeCallback,
}

/// Live state of one attribute.
pub struct AttributeSlot {
    spec: &'static AttributeSpec,
    pub(crate) value: AttributeValue,
    subscribers: Vec<Subscriber>,
    version: u64,
}

impl AttributeSlot {
    pub(crate) fn new(spec: &'static AttributeSpec, value: AttributeValue) -> Self {
        Self {
            spec,
            value,
            subscribers: Vec::new(),
            version: 0,
        }
    }

    pub fn spec(&self) -> &'static AttributeSpec {
        self.spec
    }

    pub fn version(&self) -> u64 {
        self.version
    }
}

/// Serializable copy of one cluster's attribute values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClusterState {
    pub id: ClusterId,
    pub name: &'static str,
    pub revision: u16,
    pub attributes: BTreeMap<&'static str, AttributeValue>,
}

pub struct AttributeStore {
    endpoint: String,
    clusters: RwLock<BTreeMap<ClusterId, ClusterServer>>,
    next_subscription: AtomicU64,
}

impl AttributeStore {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            clusters: RwLock::new(BTreeMap::new()),
            next_subscription: AtomicU64::new(1),
        }
    }

    /// Take ownership of a cluster server. Cluster ids are unique per store.
    pub fn insert(&self, server: ClusterServer) -> Result<()> {
        let mut clusters = self.clusters.write();
        if clusters.contains_key(&server.id()) {
            return Err(BridgeError::DuplicateCluster {
                endpoint: self.endpoint.clone(),
                cluster_id: server.id(),
            });
        }
        debug!(
            "[Attr] {}: added cluster {} (0x{:04X})",
            self.endpoint,
            server.name(),
            server.id()
        );
        clusters.insert(server.id(), server);
        Ok(())
    }

    pub fn contains(&self, cluster_id: ClusterId) -> bool {
        self.clusters.read().contains_key(&cluster_id)
    }

    pub fn cluster_ids(&self) -> Vec<ClusterId> {
        self.clusters.read().keys().copied().collect()
    }

    /// Current value of an attribute.
    pub fn get(&self, cluster_id: ClusterId, attribute: &str) -> Result<AttributeValue> {
        let clusters = self.clusters.read();
        clusters
            .get(&cluster_id)
            .and_then(|server| server.slot(attribute))
            .map(|slot| slot.value.clone())
            .ok_or_else(|| self.not_found(cluster_id, attribute))
    }

    /// Write version of an attribute (0 until the first successful `set`).
    pub fn version(&self, cluster_id: ClusterId, attribute: &str) -> Result<u64> {
        let clusters = self.clusters.read();
        clusters
            .get(&cluster_id)
            .and_then(|server| server.slot(attribute))
            .map(AttributeSlot::version)
            .ok_or_else(|| self.not_found(cluster_id, attribute))
    }

    /// Validate and commit a value, then notify subscribers.
    ///
    /// Returns the committed (normalized) value. On `TypeMismatch` the stored
    /// value is left untouched and no subscriber runs.
    pub fn set(
        &self,
        cluster_id: ClusterId,
        attribute: &str,
        value: AttributeValue,
    ) -> Result<AttributeValue> {
        let (name, committed, old, subscribers, version) = {
            let mut clusters = self.clusters.write();
            let server = clusters
                .get_mut(&cluster_id)
                .ok_or_else(|| self.not_found(cluster_id, attribute))?;
            let cluster_name = server.name();
            let slot = server
                .slot_mut(attribute)
                .ok_or_else(|| self.not_found(cluster_id, attribute))?;
            let spec = slot.spec();
            let committed =
                spec.normalize(value.clone())
                    .ok_or_else(|| BridgeError::TypeMismatch {
                        attribute: format!("{}.{}.{}", self.endpoint, cluster_name, spec.name),
                        expected: spec.describe(),
                        actual: format!("{} ({})", value, value.type_name()),
                    })?;
            let old = std::mem::replace(&mut slot.value, committed.clone());
            slot.version += 1;
            (
                spec.name,
                committed,
                old,
                slot.subscribers.clone(),
                slot.version,
            )
        };

        debug!(
            "[Attr] {}: 0x{:04X}.{} {} -> {} (v{})",
            self.endpoint, cluster_id, name, old, committed, version
        );

        for subscriber in &subscribers {
            self.dispatch(cluster_id, name, subscriber, &committed, &old);
        }

        if let Ok(current) = self.version(cluster_id, name)
            && current != version
        {
            debug!(
                "[Attr] {}: 0x{:04X}.{} was rewritten during dispatch (v{} -> v{})",
                self.endpoint, cluster_id, name, version, current
            );
        }

        Ok(committed)
    }

    /// Register a callback for changes of one attribute.
    pub fn subscribe(
        &self,
        cluster_id: ClusterId,
        attribute: &str,
        callback: impl Fn(&AttributeValue, &AttributeValue) + Send + Sync + 'static,
    ) -> Result<SubscriptionHandle> {
        let mut clusters = self.clusters.write();
        let slot = clusters
            .get_mut(&cluster_id)
            .and_then(|server| server.slot_mut(attribute))
            .ok_or_else(|| self.not_found(cluster_id, attribute))?;
        let id = self.next_subscription.fetch_add(1, Ordering::SeqCst);
        slot.subscribers.push(Subscriber {
            id,
            callback: Arc::new(callback),
        });
        Ok(SubscriptionHandle {
            cluster_id,
            attribute: slot.spec().name,
            id,
        })
    }

    /// Remove a subscription. Returns `false` if it was already gone.
    pub fn unsubscribe(&self, handle: SubscriptionHandle) -> bool {
        let mut clusters = self.clusters.write();
        let Some(slot) = clusters
            .get_mut(&handle.cluster_id)
            .and_then(|server| server.slot_mut(handle.attribute))
        else {
            return false;
        };
        let before = slot.subscribers.len();
        slot.subscribers.retain(|s| s.id != handle.id);
        slot.subscribers.len() != before
    }

    /// Drop every subscriber on every attribute.
    pub fn clear_subscribers(&self) {
        let mut clusters = self.clusters.write();
        for server in clusters.values_mut() {
            for slot in server.slots_mut() {
                slot.subscribers.clear();
            }
        }
    }

    /// Copy of all cluster values, ordered by cluster id.
    pub fn snapshot(&self) -> Vec<ClusterState> {
        self.clusters
            .read()
            .values()
            .map(|server| ClusterState {
                id: server.id(),
                name: server.name(),
                revision: server.revision(),
                attributes: server
                    .slots()
                    .map(|slot| (slot.spec().name, slot.value.clone()))
                    .collect(),
            })
            .collect()
    }

    fn dispatch(
        &self,
        cluster_id: ClusterId,
        attribute: &str,
        subscriber: &Subscriber,
        new_value: &AttributeValue,
        old_value: &AttributeValue,
    ) {
        let callback = &subscriber.callback;
        if let Err(panic) = catch_unwind(AssertUnwindSafe(|| callback(new_value, old_value))) {
            let reason = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            error!(
                "[Attr] {}: subscriber {} for 0x{:04X}.{} failed: {}",
                self.endpoint, subscriber.id, cluster_id, attribute, reason
            );
        }
    }

    fn not_found(&self, cluster_id: ClusterId, attribute: &str) -> BridgeError {
        BridgeError::NotFound(format!(
            "{}: attribute 0x{:04X}.{}",
            self.endpoint, cluster_id, attribute
        ))
    }
}
