//! BLE connection management.
//!
//! Owns one physical connection to a single cooker: the connect/disconnect
//! state machine, notification subscription, and the pump that drains raw
//! notification bytes into framed response lines.

use btleplug::api::Peripheral as _;
use btleplug::platform::Peripheral;
use futures::stream::StreamExt;
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tokio::time;
use tracing::{debug, error, info, warn};

use crate::ble::transport::GattTransport;
use crate::ble::uuids::{COMMAND_CHARACTERISTIC_UUID, RESPONSE_CHARACTERISTIC_UUID};
use crate::error::{Error, Result};
use crate::policy::RetryPolicy;
use crate::protocol::LineFramer;

/// Connection state for a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionState {
    /// Not connected to the cooker.
    #[default]
    Disconnected,
    /// Currently attempting to connect.
    Connecting,
    /// Connected with the notification channel subscribed.
    Connected,
    /// Currently disconnecting.
    Disconnecting,
}

impl ConnectionState {
    /// Check if connected.
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }

    /// Check if in a transitional state.
    pub fn is_transitioning(&self) -> bool {
        matches!(self, Self::Connecting | Self::Disconnecting)
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected => write!(f, "Disconnected"),
            Self::Connecting => write!(f, "Connecting"),
            Self::Connected => write!(f, "Connected"),
            Self::Disconnecting => write!(f, "Disconnecting"),
        }
    }
}

/// Event for connection state changes.
#[derive(Debug, Clone)]
pub struct ConnectionEvent {
    /// The identifier of the peripheral.
    pub identifier: String,
    /// The new connection state.
    pub state: ConnectionState,
}

/// Manages the physical connection to one cooker.
pub struct ConnectionManager {
    /// The peripheral to manage.
    peripheral: Peripheral,
    /// Current connection state.
    state: Arc<RwLock<ConnectionState>>,
    /// Retry policy for connect attempts.
    policy: RetryPolicy,
    /// Channel for connection events.
    event_tx: broadcast::Sender<ConnectionEvent>,
    /// Handle to the notification pump task.
    pump_handle: RwLock<Option<tokio::task::JoinHandle<()>>>,
}

impl ConnectionManager {
    /// Create a new connection manager for a peripheral.
    pub fn new(peripheral: Peripheral, policy: RetryPolicy) -> Self {
        let (event_tx, _) = broadcast::channel(16);

        Self {
            peripheral,
            state: Arc::new(RwLock::new(ConnectionState::Disconnected)),
            policy,
            event_tx,
            pump_handle: RwLock::new(None),
        }
    }

    /// Get the current connection state.
    pub fn state(&self) -> ConnectionState {
        *self.state.read()
    }

    /// Check if connected.
    pub fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    /// Subscribe to connection events.
    pub fn subscribe(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.event_tx.subscribe()
    }

    /// Establish the link, subscribe to response notifications, and start the
    /// line pump.
    ///
    /// Returns the byte-write transport and the receiver of framed response
    /// lines. The physical connect is retried up to the policy's attempt
    /// budget with backoff; each attempt has its own timeout. Subscribe or
    /// characteristic failures are not retried and land the session back in
    /// Disconnected.
    ///
    /// A second connect while one is outstanding (or while already connected)
    /// fails fast with [`Error::AlreadyInProgress`].
    pub async fn connect(&self) -> Result<(GattTransport, mpsc::UnboundedReceiver<String>)> {
        if !claim_connecting(&self.state) {
            return Err(Error::AlreadyInProgress);
        }
        self.emit(ConnectionState::Connecting);

        let mut attempt = 0;
        loop {
            attempt += 1;
            debug!("Connection attempt {} of {}", attempt, self.policy.max_attempts);

            match time::timeout(self.policy.attempt_timeout, self.peripheral.connect()).await {
                Ok(Ok(())) => {
                    info!("Link established");
                    break;
                }
                Ok(Err(e)) => warn!("Connection attempt {} failed: {}", attempt, e),
                Err(_) => warn!("Connection attempt {} timed out", attempt),
            }

            if attempt >= self.policy.max_attempts {
                self.set_state(ConnectionState::Disconnected);
                return Err(Error::ConnectionFailed {
                    reason: format!("no link after {attempt} attempts"),
                });
            }

            time::sleep(self.policy.backoff).await;
        }

        match self.establish_session().await {
            Ok(parts) => {
                self.set_state(ConnectionState::Connected);
                Ok(parts)
            }
            Err(e) => {
                // Teardown: the link is up but unusable without notifications.
                if let Err(disconnect_err) = self.peripheral.disconnect().await {
                    debug!("Teardown disconnect failed: {}", disconnect_err);
                }
                self.set_state(ConnectionState::Disconnected);
                Err(e)
            }
        }
    }

    /// Resolve characteristics, subscribe, and spawn the notification pump.
    async fn establish_session(
        &self,
    ) -> Result<(GattTransport, mpsc::UnboundedReceiver<String>)> {
        self.peripheral
            .discover_services()
            .await
            .map_err(Error::Bluetooth)?;

        let characteristics = self.peripheral.characteristics();
        let command = characteristics
            .iter()
            .find(|c| c.uuid == COMMAND_CHARACTERISTIC_UUID)
            .cloned()
            .ok_or_else(|| Error::CharacteristicNotFound {
                uuid: COMMAND_CHARACTERISTIC_UUID.to_string(),
            })?;
        let response = characteristics
            .iter()
            .find(|c| c.uuid == RESPONSE_CHARACTERISTIC_UUID)
            .cloned()
            .ok_or_else(|| Error::CharacteristicNotFound {
                uuid: RESPONSE_CHARACTERISTIC_UUID.to_string(),
            })?;

        // Take the notification stream before subscribing so no early bytes
        // are missed.
        let notifications = self
            .peripheral
            .notifications()
            .await
            .map_err(Error::Bluetooth)?;

        self.peripheral
            .subscribe(&response)
            .await
            .map_err(|e| Error::ConnectionFailed {
                reason: format!("subscribe failed: {e}"),
            })?;

        debug!("Subscribed to response notifications");

        let (line_tx, line_rx) = mpsc::unbounded_channel();
        let handle = spawn_notification_pump(
            notifications,
            self.state.clone(),
            self.event_tx.clone(),
            format!("{:?}", self.peripheral.id()),
            line_tx,
        );
        *self.pump_handle.write() = Some(handle);

        let transport =
            GattTransport::new(self.peripheral.clone(), command, self.state.clone());

        Ok((transport, line_rx))
    }

    /// Disconnect from the cooker.
    ///
    /// Idempotent from Disconnected. A concurrent disconnect while one is in
    /// flight fails fast with [`Error::AlreadyInProgress`].
    pub async fn disconnect(&self) -> Result<()> {
        if !claim_disconnecting(&self.state)? {
            return Ok(());
        }
        self.emit(ConnectionState::Disconnecting);

        let result = self.peripheral.disconnect().await;

        // The pump ends once the notification stream closes; aborting it here
        // closes the line channel deterministically either way.
        if let Some(handle) = self.pump_handle.write().take() {
            handle.abort();
        }

        // Forced teardown always lands in Disconnected.
        self.set_state(ConnectionState::Disconnected);

        match result {
            Ok(()) => {
                info!("Disconnected from cooker");
                Ok(())
            }
            Err(e) => {
                error!("Failed to disconnect cleanly: {}", e);
                Err(Error::Bluetooth(e))
            }
        }
    }

    /// Update the connection state and emit an event.
    fn set_state(&self, new_state: ConnectionState) {
        set_state(
            &self.state,
            &self.event_tx,
            &format!("{:?}", self.peripheral.id()),
            new_state,
        );
    }

    /// Emit an event for a state already written by a claim.
    fn emit(&self, state: ConnectionState) {
        debug!("Connection state changed to {}", state);
        let _ = self.event_tx.send(ConnectionEvent {
            identifier: format!("{:?}", self.peripheral.id()),
            state,
        });
    }
}

/// Atomically claim the Disconnected to Connecting transition.
///
/// The check and the write happen under one lock so two concurrent connect
/// calls cannot both pass the guard.
fn claim_connecting(state: &RwLock<ConnectionState>) -> bool {
    let mut state = state.write();
    if *state != ConnectionState::Disconnected {
        return false;
    }
    *state = ConnectionState::Connecting;
    true
}

/// Atomically claim the Disconnecting transition.
///
/// `Ok(false)` means already Disconnected, which makes disconnect a no-op.
fn claim_disconnecting(state: &RwLock<ConnectionState>) -> Result<bool> {
    let mut state = state.write();
    match *state {
        ConnectionState::Disconnected => Ok(false),
        ConnectionState::Disconnecting => Err(Error::AlreadyInProgress),
        ConnectionState::Connecting | ConnectionState::Connected => {
            *state = ConnectionState::Disconnecting;
            Ok(true)
        }
    }
}

fn set_state(
    state: &RwLock<ConnectionState>,
    event_tx: &broadcast::Sender<ConnectionEvent>,
    identifier: &str,
    new_state: ConnectionState,
) {
    let old_state = {
        let mut state = state.write();
        let old = *state;
        *state = new_state;
        old
    };

    if old_state != new_state {
        debug!("Connection state changed: {} -> {}", old_state, new_state);

        let _ = event_tx.send(ConnectionEvent {
            identifier: identifier.to_string(),
            state: new_state,
        });
    }
}

/// Drain the notification stream into framed response lines.
///
/// Runs until the stream ends or the line receiver is dropped. Delivery never
/// blocks on a slow consumer: the channel is unbounded and the correlator
/// discards anything it was not waiting for.
fn spawn_notification_pump(
    mut notifications: std::pin::Pin<
        Box<dyn futures::Stream<Item = btleplug::api::ValueNotification> + Send>,
    >,
    state: Arc<RwLock<ConnectionState>>,
    event_tx: broadcast::Sender<ConnectionEvent>,
    identifier: String,
    line_tx: mpsc::UnboundedSender<String>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        debug!("Notification pump started");

        let mut framer = LineFramer::new();

        while let Some(notification) = notifications.next().await {
            if notification.uuid != RESPONSE_CHARACTERISTIC_UUID {
                continue;
            }

            for line in framer.push(&notification.value) {
                if line.is_empty() {
                    debug!("Discarding empty response line");
                    continue;
                }
                if line_tx.send(line).is_err() {
                    // Session torn down; nobody is listening anymore.
                    debug!("Line receiver dropped, stopping pump");
                    return;
                }
            }
        }

        if let Some(partial) = framer.finish() {
            warn!(
                "Discarding {} unterminated byte(s) at session end: {:02X?}",
                partial.len(),
                partial
            );
        }

        // Stream end while Connected means the link dropped under us. The
        // session still passes through Disconnecting so observers see the
        // same teardown sequence as an explicit disconnect.
        let lost = *state.read() == ConnectionState::Connected;
        if lost {
            warn!("Connection lost");
            set_state(&state, &event_tx, &identifier, ConnectionState::Disconnecting);
            set_state(&state, &event_tx, &identifier, ConnectionState::Disconnected);
        }

        debug!("Notification pump stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use btleplug::api::ValueNotification;

    fn init_tracing() {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    }

    fn pump_fixture(
        initial: ConnectionState,
        notifications: Vec<ValueNotification>,
    ) -> (
        Arc<RwLock<ConnectionState>>,
        broadcast::Receiver<ConnectionEvent>,
        mpsc::UnboundedReceiver<String>,
        tokio::task::JoinHandle<()>,
    ) {
        let state = Arc::new(RwLock::new(initial));
        let (event_tx, events) = broadcast::channel(16);
        let (line_tx, lines) = mpsc::unbounded_channel();
        let handle = spawn_notification_pump(
            Box::pin(futures::stream::iter(notifications)),
            state.clone(),
            event_tx,
            "cooker".to_string(),
            line_tx,
        );
        (state, events, lines, handle)
    }

    #[tokio::test]
    async fn test_pump_emits_full_teardown_on_link_loss() {
        init_tracing();

        let notification = ValueNotification {
            uuid: RESPONSE_CHARACTERISTIC_UUID,
            value: b"60.0\r".to_vec(),
        };
        let (state, mut events, mut lines, handle) =
            pump_fixture(ConnectionState::Connected, vec![notification]);
        handle.await.unwrap();

        assert_eq!(lines.recv().await, Some("60.0".to_string()));

        // Unexpected stream end while Connected walks the same state
        // sequence as an explicit disconnect.
        assert_eq!(
            events.recv().await.unwrap().state,
            ConnectionState::Disconnecting
        );
        assert_eq!(
            events.recv().await.unwrap().state,
            ConnectionState::Disconnected
        );
        assert_eq!(*state.read(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_pump_silent_during_explicit_disconnect() {
        init_tracing();

        let (state, mut events, _lines, handle) =
            pump_fixture(ConnectionState::Disconnecting, vec![]);
        handle.await.unwrap();

        // The disconnect path owns the teardown transitions.
        assert!(events.try_recv().is_err());
        assert_eq!(*state.read(), ConnectionState::Disconnecting);
    }

    #[test]
    fn test_only_one_connect_claims_the_transition() {
        let state = RwLock::new(ConnectionState::Disconnected);

        assert!(claim_connecting(&state));
        assert_eq!(*state.read(), ConnectionState::Connecting);

        // A second caller, however interleaved, must lose the claim.
        assert!(!claim_connecting(&state));
    }

    #[test]
    fn test_disconnect_claim_is_idempotent_and_exclusive() {
        let state = RwLock::new(ConnectionState::Disconnected);
        assert!(!claim_disconnecting(&state).unwrap());

        *state.write() = ConnectionState::Connected;
        assert!(claim_disconnecting(&state).unwrap());
        assert!(matches!(
            claim_disconnecting(&state),
            Err(Error::AlreadyInProgress)
        ));
    }

    #[test]
    fn test_connection_state() {
        assert!(!ConnectionState::Disconnected.is_connected());
        assert!(ConnectionState::Connected.is_connected());
        assert!(!ConnectionState::Connecting.is_connected());

        assert!(ConnectionState::Connecting.is_transitioning());
        assert!(ConnectionState::Disconnecting.is_transitioning());
        assert!(!ConnectionState::Connected.is_transitioning());
    }

    #[test]
    fn test_connection_state_display() {
        assert_eq!(format!("{}", ConnectionState::Connected), "Connected");
        assert_eq!(format!("{}", ConnectionState::Disconnected), "Disconnected");
    }

    #[test]
    fn test_default_state_is_disconnected() {
        assert_eq!(ConnectionState::default(), ConnectionState::Disconnected);
    }
}
