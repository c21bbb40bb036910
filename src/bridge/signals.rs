//! Process signal handling.
//!
//! SIGINT and SIGTERM request a shutdown, SIGHUP a restart and SIGUSR1 an
//! update. Each signal is queued on the controller like any other event.

use super::controller::{BridgeEvent, BridgeSignal};
use log::info;
use tokio::signal::unix::{SignalKind, signal};
use tokio::task::JoinHandle;

/// Event requested by a Unix signal, if the bridge handles it.
pub fn event_for(kind: SignalKind) -> Option<BridgeEvent> {
    if kind == SignalKind::interrupt() || kind == SignalKind::terminate() {
        Some(BridgeEvent::Shutdown)
    } else if kind == SignalKind::hangup() {
        Some(BridgeEvent::Restart)
    } else if kind == SignalKind::user_defined1() {
        Some(BridgeEvent::Update)
    } else {
        None
    }
}

/// Install the signal handlers and forward signals to the controller.
///
/// The task ends once the controller stops accepting events.
pub fn spawn_signal_listener(bridge: BridgeSignal) -> std::io::Result<JoinHandle<()>> {
    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut terminate = signal(SignalKind::terminate())?;
    let mut hangup = signal(SignalKind::hangup())?;
    let mut user1 = signal(SignalKind::user_defined1())?;

    Ok(tokio::spawn(async move {
        loop {
            let (name, kind) = tokio::select! {
                _ = interrupt.recv() => ("SIGINT", SignalKind::interrupt()),
                _ = terminate.recv() => ("SIGTERM", SignalKind::terminate()),
                _ = hangup.recv() => ("SIGHUP", SignalKind::hangup()),
                _ = user1.recv() => ("SIGUSR1", SignalKind::user_defined1()),
            };
            let Some(event) = event_for(kind) else {
                continue;
            };
            info!("[Bridge] Received {}, queueing {}", name, event);
            if !bridge.send(event) {
                break;
            }
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signal_mapping() {
        assert_eq!(event_for(SignalKind::interrupt()), Some(BridgeEvent::Shutdown));
        assert_eq!(event_for(SignalKind::terminate()), Some(BridgeEvent::Shutdown));
        assert_eq!(event_for(SignalKind::hangup()), Some(BridgeEvent::Restart));
        assert_eq!(event_for(SignalKind::user_defined1()), Some(BridgeEvent::Update));
        assert_eq!(event_for(SignalKind::user_defined2()), None);
    }
}
