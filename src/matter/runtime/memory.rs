//! In-memory protocol runtime.
//!
//! Nothing touches the network. Every call is appended to a shared journal so
//! callers can assert on ordering, and a port table stands in for the real
//! socket namespace so two nodes on the same port collide the way they would
//! on a host.

use super::{
    AttributeChange, ContextHandle, NodeIdentity, ProtocolRuntime, RuntimeError, RuntimeNode,
    apply_change,
};
use crate::matter::endpoint::EndpointTree;
use async_trait::async_trait;
use log::debug;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

/// One journaled runtime call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuntimeEvent {
    ContextCreated(String),
    NodeCreated(String),
    Added { node: String, tree: EndpointTree },
    Started(String),
    Stopped(String),
    Reported { node: String, change: AttributeChange },
}

#[derive(Default)]
struct Shared {
    journal: Mutex<Vec<RuntimeEvent>>,
    ports: Mutex<HashSet<u16>>,
    fail_reports: AtomicBool,
    fail_stop: AtomicBool,
    stop_delay: Mutex<Duration>,
    next_context: AtomicU64,
}

/// Runtime that keeps all node state in memory.
#[derive(Clone, Default)]
pub struct MemoryRuntime {
    shared: Arc<Shared>,
}

impl MemoryRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the call journal.
    pub fn journal(&self) -> Vec<RuntimeEvent> {
        self.shared.journal.lock().clone()
    }

    pub fn clear_journal(&self) {
        self.shared.journal.lock().clear();
    }

    /// Ports currently held by started nodes.
    pub fn ports_in_use(&self) -> Vec<u16> {
        let mut ports: Vec<_> = self.shared.ports.lock().iter().copied().collect();
        ports.sort_unstable();
        ports
    }

    /// Occupy a port as if another process held it.
    pub fn reserve_port(&self, port: u16) {
        self.shared.ports.lock().insert(port);
    }

    pub fn release_port(&self, port: u16) {
        self.shared.ports.lock().remove(&port);
    }

    pub fn set_fail_reports(&self, fail: bool) {
        self.shared.fail_reports.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_stop(&self, fail: bool) {
        self.shared.fail_stop.store(fail, Ordering::SeqCst);
    }

    /// Make every `stop` take this long before releasing its port.
    pub fn set_stop_delay(&self, delay: Duration) {
        *self.shared.stop_delay.lock() = delay;
    }

    fn record(&self, event: RuntimeEvent) {
        debug!("[Runtime] {:?}", event);
        self.shared.journal.lock().push(event);
    }
}

impl ProtocolRuntime for MemoryRuntime {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn create_context(&self, identity: &NodeIdentity) -> Result<ContextHandle, RuntimeError> {
        self.record(RuntimeEvent::ContextCreated(identity.store_id.clone()));
        Ok(ContextHandle {
            id: self.shared.next_context.fetch_add(1, Ordering::SeqCst),
            identity: identity.clone(),
        })
    }

    fn create_node(&self, context: &ContextHandle) -> Result<Arc<dyn RuntimeNode>, RuntimeError> {
        self.record(RuntimeEvent::NodeCreated(context.identity.store_id.clone()));
        Ok(Arc::new(MemoryNode {
            runtime: self.clone(),
            name: context.identity.store_id.clone(),
            port: context.identity.port,
            running: AtomicBool::new(false),
            trees: Mutex::new(BTreeMap::new()),
        }))
    }
}

struct MemoryNode {
    runtime: MemoryRuntime,
    name: String,
    port: u16,
    running: AtomicBool,
    trees: Mutex<BTreeMap<String, EndpointTree>>,
}

#[async_trait]
impl RuntimeNode for MemoryNode {
    async fn add(&self, tree: EndpointTree) -> Result<(), RuntimeError> {
        self.runtime.record(RuntimeEvent::Added {
            node: self.name.clone(),
            tree: tree.clone(),
        });
        self.trees.lock().insert(tree.id.clone(), tree);
        Ok(())
    }

    async fn start(&self) -> Result<(), RuntimeError> {
        if !self.runtime.shared.ports.lock().insert(self.port) {
            return Err(RuntimeError::AddressInUse(format!("udp port {}", self.port)));
        }
        self.running.store(true, Ordering::SeqCst);
        self.runtime.record(RuntimeEvent::Started(self.name.clone()));
        Ok(())
    }

    async fn stop(&self) -> Result<(), RuntimeError> {
        let delay = *self.runtime.shared.stop_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if self.running.swap(false, Ordering::SeqCst) {
            self.runtime.shared.ports.lock().remove(&self.port);
        }
        self.runtime.record(RuntimeEvent::Stopped(self.name.clone()));
        if self.runtime.shared.fail_stop.load(Ordering::SeqCst) {
            return Err(RuntimeError::Rejected("injected stop failure".to_string()));
        }
        Ok(())
    }

    async fn report_attribute_change(&self, change: &AttributeChange) -> Result<(), RuntimeError> {
        if !self.running.load(Ordering::SeqCst) {
            return Err(RuntimeError::NotRunning);
        }
        if self.runtime.shared.fail_reports.load(Ordering::SeqCst) {
            return Err(RuntimeError::Rejected("injected report failure".to_string()));
        }
        let applied = self
            .trees
            .lock()
            .values_mut()
            .any(|tree| apply_change(tree, change));
        if !applied {
            return Err(RuntimeError::UnknownEndpoint(change.endpoint.clone()));
        }
        self.runtime.record(RuntimeEvent::Reported {
            node: self.name.clone(),
            change: change.clone(),
        });
        Ok(())
    }
}
