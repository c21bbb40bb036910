//! Bridge controller: owns the running instance and applies lifecycle
//! events one at a time.
//!
//! Shutdown, restart and update requests all go through a single FIFO queue.
//! An event is only taken off the queue after the previous one has finished,
//! so a restart never overlaps a shutdown and a new instance is fully built
//! before anything else is looked at.
//!
//! Events that arrive behind a shutdown still run: a restart or update from
//! the stopped state brings up a new instance, and a second shutdown does
//! nothing. [`BridgeController::run`] returns once the bridge is stopped and
//! the queue is empty.

use super::instance::{BridgeFactory, BridgeInstance};
use super::updater::SoftwareUpdater;
use crate::error::Result;
use log::{debug, info, warn};
use std::sync::Arc;
use strum::Display;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;

/// Lifecycle request for the bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum BridgeEvent {
    Shutdown,
    Restart,
    Update,
}

/// Why [`BridgeController::run`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeExit {
    Shutdown,
}

/// Cloneable handle that queues events for the controller.
#[derive(Clone)]
pub struct BridgeSignal {
    tx: mpsc::UnboundedSender<BridgeEvent>,
}

impl BridgeSignal {
    /// Queue an event. Returns false once the controller has exited.
    pub fn send(&self, event: BridgeEvent) -> bool {
        self.tx.send(event).is_ok()
    }

    pub fn shutdown(&self) -> bool {
        self.send(BridgeEvent::Shutdown)
    }

    pub fn restart(&self) -> bool {
        self.send(BridgeEvent::Restart)
    }

    pub fn update(&self) -> bool {
        self.send(BridgeEvent::Update)
    }
}

pub struct BridgeController {
    factory: BridgeFactory,
    updater: Arc<dyn SoftwareUpdater>,
    tx: mpsc::UnboundedSender<BridgeEvent>,
    rx: mpsc::UnboundedReceiver<BridgeEvent>,
    instance: Option<BridgeInstance>,
    generation: u64,
}

impl BridgeController {
    pub fn new(factory: BridgeFactory, updater: Arc<dyn SoftwareUpdater>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            factory,
            updater,
            tx,
            rx,
            instance: None,
            generation: 0,
        }
    }

    /// Handle for queueing events.
    pub fn signal(&self) -> BridgeSignal {
        BridgeSignal {
            tx: self.tx.clone(),
        }
    }

    /// Build and start the first instance, then process events until the
    /// bridge is stopped with nothing left in the queue.
    pub async fn run(mut self) -> Result<BridgeExit> {
        self.bring_up().await?;

        loop {
            let event = match self.rx.try_recv() {
                Ok(event) => event,
                Err(TryRecvError::Empty) if self.instance.is_none() => {
                    info!("[Bridge] Stopped, event queue drained");
                    return Ok(BridgeExit::Shutdown);
                }
                Err(TryRecvError::Empty) => match self.rx.recv().await {
                    Some(event) => event,
                    None => BridgeEvent::Shutdown,
                },
                Err(TryRecvError::Disconnected) => BridgeEvent::Shutdown,
            };
            self.handle(event).await?;
        }
    }

    async fn handle(&mut self, event: BridgeEvent) -> Result<()> {
        info!("[Bridge] Handling {}", event);
        match event {
            BridgeEvent::Shutdown => {
                if self.instance.is_none() {
                    debug!("[Bridge] Already stopped, ignoring shutdown");
                    return Ok(());
                }
                self.tear_down().await;
                info!("[Bridge] Shutdown complete");
            }
            BridgeEvent::Restart => {
                self.tear_down().await;
                self.bring_up().await?;
                info!("[Bridge] Restart complete");
            }
            BridgeEvent::Update => {
                self.tear_down().await;
                if let Err(e) = self.updater.update().await {
                    warn!("[Bridge] Update failed, restarting current version: {}", e);
                }
                self.bring_up().await?;
                info!("[Bridge] Update complete");
            }
        }
        Ok(())
    }

    async fn bring_up(&mut self) -> Result<()> {
        self.generation += 1;
        let mut instance = self.factory.build(self.generation).await?;
        instance.start().await?;
        self.instance = Some(instance);
        Ok(())
    }

    /// Stop and discard the current instance. Stop failures are logged; the
    /// nodes end offline regardless.
    async fn tear_down(&mut self) {
        if let Some(mut instance) = self.instance.take()
            && let Err(e) = instance.stop().await
        {
            warn!(
                "[Bridge] Instance {} did not stop cleanly: {}",
                instance.generation(),
                e
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::plugin::{Plugin, PluginContext, PluginRegistry};
    use crate::config::Config;
    use crate::error::BridgeError;
    use crate::matter::Endpoint;
    use crate::matter::device_types::ON_OFF_LIGHT;
    use crate::matter::runtime::{MemoryRuntime, RuntimeEvent};
    use crate::storage::Storage;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Default)]
    struct Recorder {
        calls: Mutex<Vec<String>>,
    }

    struct TestPlugin(Arc<Recorder>);

    #[async_trait]
    impl Plugin for TestPlugin {
        fn name(&self) -> &str {
            "test"
        }

        async fn register(&self, ctx: &PluginContext) -> Result<Vec<Endpoint>> {
            self.0.calls.lock().push(format!("register {}", ctx.generation));
            Ok(vec![Endpoint::with_required_clusters("Lamp", ON_OFF_LIGHT)?])
        }

        async fn on_start(&self, devices: &[Endpoint]) -> Result<()> {
            self.0.calls.lock().push(format!("start {}", devices.len()));
            Ok(())
        }

        async fn on_shutdown(&self) -> Result<()> {
            self.0.calls.lock().push("shutdown".to_string());
            Ok(())
        }
    }

    struct CountingUpdater {
        runs: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl SoftwareUpdater for CountingUpdater {
        async fn update(&self) -> Result<()> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(BridgeError::UpdateFailure("download failed".to_string()))
            } else {
                Ok(())
            }
        }
    }

    fn controller(
        updater: Arc<CountingUpdater>,
    ) -> (BridgeController, MemoryRuntime, Arc<Recorder>) {
        let runtime = MemoryRuntime::new();
        let recorder = Arc::new(Recorder::default());
        let mut config = Config::default();
        config.bridge.storage_dir = None;
        let factory = BridgeFactory::new(
            config,
            Arc::new(runtime.clone()),
            Storage::in_memory(),
            PluginRegistry::new().with(TestPlugin(recorder.clone())),
        );
        (BridgeController::new(factory, updater), runtime, recorder)
    }

    fn updater(fail: bool) -> Arc<CountingUpdater> {
        Arc::new(CountingUpdater {
            runs: AtomicUsize::new(0),
            fail,
        })
    }

    fn lifecycle(runtime: &MemoryRuntime) -> Vec<&'static str> {
        runtime
            .journal()
            .iter()
            .filter_map(|e| match e {
                RuntimeEvent::Started(_) => Some("started"),
                RuntimeEvent::Stopped(_) => Some("stopped"),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_shutdown() {
        let (controller, runtime, recorder) = controller(updater(false));
        let signal = controller.signal();
        assert!(signal.shutdown());

        let exit = controller.run().await.unwrap();
        assert_eq!(exit, BridgeExit::Shutdown);
        assert_eq!(lifecycle(&runtime), vec!["started", "stopped"]);
        assert_eq!(*recorder.calls.lock(), vec!["register 1", "start 1", "shutdown"]);
        assert!(runtime.ports_in_use().is_empty());
        assert!(!signal.shutdown());
    }

    #[tokio::test]
    async fn test_restart_rebuilds_instance() {
        let (controller, runtime, recorder) = controller(updater(false));
        let signal = controller.signal();
        signal.restart();
        signal.shutdown();

        controller.run().await.unwrap();
        assert_eq!(
            lifecycle(&runtime),
            vec!["started", "stopped", "started", "stopped"]
        );
        assert_eq!(
            *recorder.calls.lock(),
            vec![
                "register 1",
                "start 1",
                "shutdown",
                "register 2",
                "start 1",
                "shutdown"
            ]
        );
    }

    #[tokio::test]
    async fn test_update_runs_updater_then_rebuilds() {
        let updates = updater(false);
        let (controller, runtime, _recorder) = controller(updates.clone());
        let signal = controller.signal();
        signal.update();
        signal.shutdown();

        controller.run().await.unwrap();
        assert_eq!(updates.runs.load(Ordering::SeqCst), 1);
        assert_eq!(
            lifecycle(&runtime),
            vec!["started", "stopped", "started", "stopped"]
        );
    }

    #[tokio::test]
    async fn test_failed_update_still_rebuilds() {
        let updates = updater(true);
        let (controller, runtime, recorder) = controller(updates.clone());
        let signal = controller.signal();
        signal.update();
        signal.shutdown();

        controller.run().await.unwrap();
        assert_eq!(updates.runs.load(Ordering::SeqCst), 1);
        assert_eq!(lifecycle(&runtime).len(), 4);
        assert!(recorder.calls.lock().contains(&"register 2".to_string()));
    }

    #[tokio::test]
    async fn test_events_behind_shutdown_are_applied_in_order() {
        let (controller, runtime, recorder) = controller(updater(false));
        runtime.set_stop_delay(Duration::from_millis(20));
        let signal = controller.signal();

        let task = tokio::spawn(controller.run());
        signal.shutdown();
        signal.restart();
        signal.shutdown();
        signal.shutdown();

        let exit = task.await.unwrap().unwrap();
        assert_eq!(exit, BridgeExit::Shutdown);
        assert_eq!(
            lifecycle(&runtime),
            vec!["started", "stopped", "started", "stopped"]
        );
        let registers = recorder
            .calls
            .lock()
            .iter()
            .filter(|c| c.starts_with("register"))
            .count();
        assert_eq!(registers, 2);
    }

    async fn wait_for_lifecycle(runtime: &MemoryRuntime, len: usize) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while lifecycle(runtime).len() < len {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_restart_sent_while_stopping_brings_bridge_back() {
        let (controller, runtime, _recorder) = controller(updater(false));
        runtime.set_stop_delay(Duration::from_millis(100));
        let signal = controller.signal();
        let task = tokio::spawn(controller.run());

        wait_for_lifecycle(&runtime, 1).await;
        assert!(signal.shutdown());
        tokio::time::sleep(Duration::from_millis(20)).await;
        // The node is still stopping when the restart arrives
        assert_eq!(lifecycle(&runtime), vec!["started"]);
        assert!(!runtime.ports_in_use().is_empty());
        assert!(signal.restart());

        wait_for_lifecycle(&runtime, 3).await;
        assert!(!task.is_finished());
        assert!(signal.shutdown());

        let exit = tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(exit, BridgeExit::Shutdown);
        assert_eq!(
            lifecycle(&runtime),
            vec!["started", "stopped", "started", "stopped"]
        );
        assert!(runtime.ports_in_use().is_empty());
    }

    #[tokio::test]
    async fn test_failed_start_is_returned() {
        let (controller, runtime, _recorder) = controller(updater(false));
        runtime.reserve_port(Config::default().matter.port);
        let result = controller.run().await;
        assert!(matches!(result, Err(BridgeError::StartFailure { .. })));
    }
}
