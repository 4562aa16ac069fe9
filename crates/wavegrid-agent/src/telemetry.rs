//! Telemetry sessions: one sampling task per active connection.
//!
//! A session reads every interface of its connection at the configured
//! interval and publishes `telemetry` events. Sessions are replaced on
//! reconfigure (no gap in the stream), stopped on teardown, and cancelled
//! within one sampling interval via a watch channel.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use wave_core::{epoch_secs_f64, MonitoringEvent, TelemetryData};

use crate::transceiver::{InterfaceLocks, Transceiver};

/// Identity stamped onto every telemetry event.
#[derive(Debug, Clone)]
pub struct AgentIdentity {
    pub agent_id: String,
    pub pop_id: String,
    pub router_id: String,
}

struct SessionSlot {
    handle: JoinHandle<()>,
    shutdown: watch::Sender<bool>,
    interfaces: Vec<String>,
}

/// Manages the sampling tasks for all of this agent's connections.
pub struct TelemetrySessions {
    identity: AgentIdentity,
    interval: Duration,
    transceiver: Arc<dyn Transceiver>,
    locks: InterfaceLocks,
    events: mpsc::Sender<MonitoringEvent>,
    sessions: HashMap<String, SessionSlot>,
}

impl TelemetrySessions {
    pub fn new(
        identity: AgentIdentity,
        interval: Duration,
        transceiver: Arc<dyn Transceiver>,
        locks: InterfaceLocks,
        events: mpsc::Sender<MonitoringEvent>,
    ) -> Self {
        TelemetrySessions {
            identity,
            interval,
            transceiver,
            locks,
            events,
            sessions: HashMap::new(),
        }
    }

    /// Start (or replace) the session for a connection.
    ///
    /// Replacing keeps the stream alive across reconfigurations: the old
    /// task is cancelled and the new one samples immediately.
    pub fn start(&mut self, connection_id: &str, interfaces: Vec<String>) {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(sample_loop(
            connection_id.to_string(),
            interfaces.clone(),
            self.identity.clone(),
            self.interval,
            self.transceiver.clone(),
            self.locks.clone(),
            self.events.clone(),
            shutdown_rx,
        ));

        if let Some(old) = self.sessions.insert(
            connection_id.to_string(),
            SessionSlot {
                handle,
                shutdown: shutdown_tx,
                interfaces,
            },
        ) {
            let _ = old.shutdown.send(true);
            old.handle.abort();
            debug!(connection = connection_id, "telemetry session replaced");
        } else {
            info!(connection = connection_id, "telemetry session started");
        }
    }

    /// Stop the session for a connection. Returns false when none exists.
    pub fn stop(&mut self, connection_id: &str) -> bool {
        match self.sessions.remove(connection_id) {
            Some(slot) => {
                let _ = slot.shutdown.send(true);
                slot.handle.abort();
                info!(connection = connection_id, "telemetry session stopped");
                true
            }
            None => false,
        }
    }

    /// Stop everything (graceful shutdown).
    pub fn stop_all(&mut self) {
        for (connection_id, slot) in self.sessions.drain() {
            let _ = slot.shutdown.send(true);
            slot.handle.abort();
            debug!(connection = %connection_id, "telemetry session stopped");
        }
    }

    pub fn active_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_active(&self, connection_id: &str) -> bool {
        self.sessions.contains_key(connection_id)
    }

    /// Interfaces currently sampled for a connection.
    pub fn interfaces(&self, connection_id: &str) -> Option<&[String]> {
        self.sessions
            .get(connection_id)
            .map(|s| s.interfaces.as_slice())
    }
}

#[allow(clippy::too_many_arguments)]
async fn sample_loop(
    connection_id: String,
    interfaces: Vec<String>,
    identity: AgentIdentity,
    interval: Duration,
    transceiver: Arc<dyn Transceiver>,
    locks: InterfaceLocks,
    events: mpsc::Sender<MonitoringEvent>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                for interface in &interfaces {
                    let sample = {
                        let lock = locks.for_interface(interface);
                        let _guard = lock.lock().await;
                        transceiver.read_sample(interface).await
                    };
                    match sample {
                        Ok(fields) => {
                            let event = MonitoringEvent::Telemetry {
                                agent_id: identity.agent_id.clone(),
                                pop_id: identity.pop_id.clone(),
                                router_id: identity.router_id.clone(),
                                data: TelemetryData {
                                    connection_id: connection_id.clone(),
                                    interface: interface.clone(),
                                    timestamp: epoch_secs_f64(),
                                    fields,
                                },
                            };
                            if events.send(event).await.is_err() {
                                return;
                            }
                        }
                        Err(e) => {
                            warn!(connection = %connection_id, %interface, error = %e,
                                  "telemetry read failed");
                        }
                    }
                }
            }
            _ = shutdown.changed() => break,
        }
    }
}
