//! MQTT connection driver.
//!
//! rumqttc only moves packets while its event loop is polled. The
//! [`MqttConnection`] polls it in a dedicated task, reports the connection
//! state on a watch channel, waits a fixed delay after connection errors and
//! disconnects cleanly on cancellation.

use std::{fmt, time::Duration};

use rumqttc::{AsyncClient, ConnectReturnCode, Event, EventLoop, Packet};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{info, trace, warn};

/// State of the broker connection.
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionState {
    Connecting,
    Connected,
    /// Lost or refused, with the reason.
    Disconnected(String),
    /// Waiting this many seconds before the next attempt.
    Reconnecting(f64),
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }

    pub fn as_str(&self) -> &str {
        match self {
            ConnectionState::Connecting => "Connecting",
            ConnectionState::Connected => "Connected",
            ConnectionState::Disconnected(_) => "Disconnected",
            ConnectionState::Reconnecting(_) => "Reconnecting",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Disconnected(reason) => write!(f, "Disconnected: {}", reason),
            ConnectionState::Reconnecting(secs) => write!(f, "Reconnecting (in {:.1} seconds)", secs),
            other => f.write_str(other.as_str()),
        }
    }
}

/// Drives the rumqttc event loop until cancelled.
pub struct MqttConnection {
    client: AsyncClient,
    event_loop: EventLoop,
    reconnect_delay: Duration,
    cancel: CancellationToken,
    state_tx: watch::Sender<ConnectionState>,
}

impl MqttConnection {
    /// Creates a driver in the `Connecting` state. Nothing is polled until
    /// [`run`](Self::run).
    ///
    /// # Arguments
    ///
    /// * `client` - Client whose requests the event loop carries
    /// * `event_loop` - The client's rumqttc event loop
    /// * `reconnect_delay` - Pause after a connection error before polling again
    /// * `cancel` - Stops the driver and sends a disconnect
    pub fn new(
        client: AsyncClient,
        event_loop: EventLoop,
        reconnect_delay: Duration,
        cancel: CancellationToken,
    ) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Connecting);
        Self {
            client,
            event_loop,
            reconnect_delay,
            cancel,
            state_tx,
        }
    }

    /// Receiver that sees every connection state change.
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    /// Broadcasts `state` if it differs from the current one.
    fn update_state(&self, state: ConnectionState) {
        let changed = self.state_tx.send_if_modified(|current| {
            if *current != state {
                *current = state.clone();
                true
            } else {
                false
            }
        });
        if changed {
            info!("MQTT connection state: {}", state);
        }
    }

    /// Polls the event loop until the cancellation token fires.
    pub async fn run(mut self) {
        info!("Starting MQTT connection loop");
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    if let Err(e) = self.client.disconnect().await {
                        warn!("Error sending disconnect packet: {}", e);
                    }
                    self.update_state(ConnectionState::Disconnected("shutdown".into()));
                    info!("MQTT connection loop stopped");
                    return;
                }

                event = self.event_loop.poll() => match event {
                    Ok(event) => self.handle_event(event),
                    Err(e) => {
                        warn!("MQTT connection error: {}", e);
                        self.update_state(ConnectionState::Reconnecting(
                            self.reconnect_delay.as_secs_f64(),
                        ));
                        tokio::select! {
                            _ = self.cancel.cancelled() => {}
                            _ = tokio::time::sleep(self.reconnect_delay) => {
                                self.update_state(ConnectionState::Connecting);
                            }
                        }
                    }
                },
            }
        }
    }

    fn handle_event(&self, event: Event) {
        match event {
            Event::Incoming(Packet::ConnAck(ack)) => {
                if ack.code == ConnectReturnCode::Success {
                    self.update_state(ConnectionState::Connected);
                } else {
                    self.update_state(ConnectionState::Disconnected(format!(
                        "Connection refused: {:?}",
                        ack.code
                    )));
                }
            }
            Event::Incoming(Packet::Disconnect) => {
                self.update_state(ConnectionState::Disconnected(
                    "Disconnected by broker".into(),
                ));
            }
            Event::Incoming(packet) => trace!("Incoming packet: {:?}", packet),
            Event::Outgoing(outgoing) => trace!("Outgoing packet: {:?}", outgoing),
        }
    }
}

impl fmt::Debug for MqttConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MqttConnection")
            .field("state", &*self.state_tx.borrow())
            .field("reconnect_delay", &self.reconnect_delay)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use tokio::time::timeout;

    use super::*;
    use crate::{config::transport::MqttConfig, transport::mqtt::build_client};

    #[test]
    fn test_connection_state_display() {
        assert_eq!(ConnectionState::Connected.to_string(), "Connected");
        assert_eq!(
            ConnectionState::Reconnecting(2.0).to_string(),
            "Reconnecting (in 2.0 seconds)"
        );
        assert!(ConnectionState::Disconnected("refused".into())
            .to_string()
            .contains("refused"));
        assert!(ConnectionState::Connected.is_connected());
        assert!(!ConnectionState::Connecting.is_connected());
    }

    #[tokio::test]
    async fn test_run_stops_on_cancel_without_broker() {
        let config = MqttConfig {
            host: "127.0.0.1".into(),
            port: 1,
            client_id: "base-status-test".into(),
            ..Default::default()
        };
        let (client, event_loop) = build_client(&config, "node");
        let cancel = CancellationToken::new();
        let connection =
            MqttConnection::new(client, event_loop, Duration::from_millis(50), cancel.clone());
        let state_rx = connection.subscribe_state();

        let task = tokio::spawn(connection.run());
        tokio::time::sleep(Duration::from_millis(100)).await;
        cancel.cancel();

        timeout(Duration::from_secs(2), task).await.unwrap().unwrap();
        assert!(matches!(
            *state_rx.borrow(),
            ConnectionState::Disconnected(_)
        ));
    }
}
