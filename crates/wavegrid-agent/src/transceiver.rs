//! The transceiver capability and its mock implementation.
//!
//! The concrete CMIS driver is platform-provided; everything the agent
//! needs from it is this four-operation capability. The mock keeps laser
//! state per interface and synthesizes deterministic QoT readings
//! influenced by the commanded tx-power, which is enough for development
//! and for exercising the whole control loop without hardware.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use wave_core::QotFields;

use crate::error::{AgentError, AgentResult};

/// Capability over one switch's coherent pluggables.
#[async_trait]
pub trait Transceiver: Send + Sync {
    /// Whether a module is present in the cage.
    async fn presence(&self, interface: &str) -> AgentResult<bool>;

    /// Tune frequency (THz), set tx-power (dBm), enable the laser.
    async fn configure(&self, interface: &str, frequency_thz: f64, tx_power_dbm: f64)
        -> AgentResult<()>;

    /// Read one QoT sample from the module diagnostics.
    async fn read_sample(&self, interface: &str) -> AgentResult<QotFields>;

    /// Disable the laser and leave the interface admin-down.
    async fn disable(&self, interface: &str) -> AgentResult<()>;
}

/// Per-interface hardware locks, shared between the command executor and
/// the telemetry sessions.
#[derive(Clone, Default)]
pub struct InterfaceLocks {
    locks: Arc<Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>>,
}

impl InterfaceLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// The lock guarding one interface's hardware access.
    pub fn for_interface(&self, interface: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().expect("interface lock map poisoned");
        locks
            .entry(interface.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }
}

// ── Mock ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
struct LaserState {
    frequency_thz: f64,
    tx_power_dbm: f64,
    enabled: bool,
}

/// Mock transceiver for development and tests.
///
/// Selected with `MOCK_HARDWARE=true`. Readings are deterministic:
/// rx-power follows tx-power minus a fixed span loss, OSNR improves with
/// tx-power, BER decays with OSNR.
#[derive(Default)]
pub struct MockTransceiver {
    lasers: Mutex<HashMap<String, LaserState>>,
    /// Interfaces that report as absent (for fault-path tests).
    absent: Mutex<Vec<String>>,
    configure_calls: Mutex<u64>,
}

impl MockTransceiver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make an interface report "no module present".
    pub fn set_absent(&self, interface: &str) {
        self.absent.lock().unwrap().push(interface.to_string());
    }

    /// Total number of `configure` calls (idempotence checks).
    pub fn configure_count(&self) -> u64 {
        *self.configure_calls.lock().unwrap()
    }

    /// Laser state for assertions: (frequency_thz, tx_power_dbm, enabled).
    pub fn laser(&self, interface: &str) -> Option<(f64, f64, bool)> {
        self.lasers
            .lock()
            .unwrap()
            .get(interface)
            .map(|l| (l.frequency_thz, l.tx_power_dbm, l.enabled))
    }

    fn is_absent(&self, interface: &str) -> bool {
        self.absent.lock().unwrap().iter().any(|i| i == interface)
    }
}

#[async_trait]
impl Transceiver for MockTransceiver {
    async fn presence(&self, interface: &str) -> AgentResult<bool> {
        Ok(!self.is_absent(interface))
    }

    async fn configure(
        &self,
        interface: &str,
        frequency_thz: f64,
        tx_power_dbm: f64,
    ) -> AgentResult<()> {
        if self.is_absent(interface) {
            return Err(AgentError::TransceiverAbsent(interface.to_string()));
        }
        *self.configure_calls.lock().unwrap() += 1;
        self.lasers.lock().unwrap().insert(
            interface.to_string(),
            LaserState {
                frequency_thz,
                tx_power_dbm,
                enabled: true,
            },
        );
        Ok(())
    }

    async fn read_sample(&self, interface: &str) -> AgentResult<QotFields> {
        let lasers = self.lasers.lock().unwrap();
        let laser = lasers
            .get(interface)
            .filter(|l| l.enabled)
            .ok_or_else(|| AgentError::NotConfigured(interface.to_string()))?;

        // 18 dB span loss, OSNR tracks tx-power, BER decays with OSNR.
        let tx = laser.tx_power_dbm;
        let rx = tx - 18.0;
        let osnr = 23.0 + (tx + 2.0) * 0.5;
        let pre_fec_ber = 10f64.powf(-(osnr / 4.0) - 1.0);
        Ok(QotFields {
            rx_power: rx,
            tx_power: tx,
            osnr,
            pre_fec_ber,
        })
    }

    async fn disable(&self, interface: &str) -> AgentResult<()> {
        if let Some(laser) = self.lasers.lock().unwrap().get_mut(interface) {
            laser.enabled = false;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn configure_then_sample() {
        let mock = MockTransceiver::new();
        mock.configure("Ethernet48", 193.1, -2.0).await.unwrap();

        let sample = mock.read_sample("Ethernet48").await.unwrap();
        assert!((sample.tx_power - (-2.0)).abs() < 1e-9);
        assert!((sample.rx_power - (-20.0)).abs() < 1e-9);
        assert!(sample.osnr > 18.0);
        assert!(sample.pre_fec_ber < 1e-3);
    }

    #[tokio::test]
    async fn higher_tx_power_improves_osnr() {
        let mock = MockTransceiver::new();
        mock.configure("e1", 193.1, -6.0).await.unwrap();
        let low = mock.read_sample("e1").await.unwrap();
        mock.configure("e1", 193.1, -2.0).await.unwrap();
        let high = mock.read_sample("e1").await.unwrap();
        assert!(high.osnr > low.osnr);
        assert!(high.pre_fec_ber < low.pre_fec_ber);
    }

    #[tokio::test]
    async fn sampling_unconfigured_interface_fails() {
        let mock = MockTransceiver::new();
        assert!(matches!(
            mock.read_sample("e1").await,
            Err(AgentError::NotConfigured(_))
        ));
    }

    #[tokio::test]
    async fn disable_stops_sampling() {
        let mock = MockTransceiver::new();
        mock.configure("e1", 193.1, -2.0).await.unwrap();
        mock.disable("e1").await.unwrap();
        assert!(mock.read_sample("e1").await.is_err());
        assert_eq!(mock.laser("e1"), Some((193.1, -2.0, false)));
    }

    #[tokio::test]
    async fn absent_interface_refuses_configuration() {
        let mock = MockTransceiver::new();
        mock.set_absent("e9");
        assert!(!mock.presence("e9").await.unwrap());
        assert!(matches!(
            mock.configure("e9", 193.1, -2.0).await,
            Err(AgentError::TransceiverAbsent(_))
        ));
    }

    #[test]
    fn interface_locks_are_shared_per_name() {
        let locks = InterfaceLocks::new();
        let a = locks.for_interface("e1");
        let b = locks.for_interface("e1");
        let c = locks.for_interface("e2");
        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
    }
}
