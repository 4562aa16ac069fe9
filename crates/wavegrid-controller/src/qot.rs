//! The QoT loop: persistency, cooldown, clamped tx-power steps.
//!
//! A sample is degraded when `osnr < OSNR_THRESHOLD_DB` or
//! `pre_fec_ber > BER_THRESHOLD`. Persistency suppresses single-sample
//! outliers; cooldown prevents oscillation while the physical layer
//! settles; clamping enforces transceiver safety bounds.

use std::collections::VecDeque;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use wave_core::QotFields;

/// Bounded sample history kept per connection (for the status API).
const WINDOW_CAPACITY: usize = 100;

/// Which endpoints a QoT reconfiguration adjusts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdjustMode {
    /// Step tx-power on every endpoint.
    Both,
    /// Step tx-power only on the endpoint that reported the degradation.
    One,
}

impl std::str::FromStr for AdjustMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "both" => Ok(AdjustMode::Both),
            "one" => Ok(AdjustMode::One),
            other => Err(format!("unknown adjust mode {other:?} (expected both|one)")),
        }
    }
}

/// QoT loop configuration.
#[derive(Debug, Clone)]
pub struct QotConfig {
    pub enabled: bool,
    pub osnr_threshold_db: f64,
    pub ber_threshold: f64,
    pub persistency_samples: u32,
    pub cooldown: Duration,
    pub tx_step_db: f64,
    pub tx_min_dbm: f64,
    pub tx_max_dbm: f64,
    pub adjust_mode: AdjustMode,
}

impl Default for QotConfig {
    fn default() -> Self {
        QotConfig {
            enabled: true,
            osnr_threshold_db: 18.0,
            ber_threshold: 1e-3,
            persistency_samples: 3,
            cooldown: Duration::from_secs(20),
            tx_step_db: 1.0,
            tx_min_dbm: -15.0,
            tx_max_dbm: 0.0,
            adjust_mode: AdjustMode::Both,
        }
    }
}

impl QotConfig {
    /// Whether one sample violates the thresholds.
    pub fn is_degraded(&self, fields: &QotFields) -> bool {
        fields.osnr < self.osnr_threshold_db || fields.pre_fec_ber > self.ber_threshold
    }

    /// Step a tx-power and clamp it into the transceiver safety bounds.
    pub fn step_tx(&self, current_dbm: f64) -> f64 {
        (current_dbm + self.tx_step_db).clamp(self.tx_min_dbm, self.tx_max_dbm)
    }
}

/// Outcome of feeding one sample into the evaluator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum QotDecision {
    /// Nothing to do.
    Nominal,
    /// Persistently degraded, but reconfiguration is held back (cooldown
    /// or not yet persistent while already marked degraded).
    Degraded,
    /// Clean sample while the connection was marked degraded.
    Recovered,
    /// Fire a reconfiguration. Carries the consecutive bad-sample count
    /// at the moment of the trigger (reported in the reason payload).
    Reconfigure { bad_count: u32 },
}

/// Per-connection QoT evaluator state.
#[derive(Debug, Default)]
pub struct QotState {
    bad_count: u32,
    last_action_epoch: Option<f64>,
    window: VecDeque<(f64, QotFields)>,
}

impl QotState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one sample.
    ///
    /// `now_epoch` is the controller-side clock (seconds);
    /// `currently_degraded` reflects the connection's state so the
    /// evaluator can report recovery.
    pub fn observe(
        &mut self,
        cfg: &QotConfig,
        fields: &QotFields,
        now_epoch: f64,
        currently_degraded: bool,
    ) -> QotDecision {
        self.window.push_back((now_epoch, *fields));
        while self.window.len() > WINDOW_CAPACITY {
            self.window.pop_front();
        }

        if !cfg.is_degraded(fields) {
            self.bad_count = 0;
            return if currently_degraded {
                QotDecision::Recovered
            } else {
                QotDecision::Nominal
            };
        }

        self.bad_count += 1;
        if self.bad_count < cfg.persistency_samples {
            return if currently_degraded {
                QotDecision::Degraded
            } else {
                QotDecision::Nominal
            };
        }

        let cooled_down = match self.last_action_epoch {
            None => true,
            Some(last) => now_epoch - last >= cfg.cooldown.as_secs_f64(),
        };
        if !cooled_down {
            return QotDecision::Degraded;
        }

        let bad_count = self.bad_count;
        self.bad_count = 0;
        self.last_action_epoch = Some(now_epoch);
        QotDecision::Reconfigure { bad_count }
    }

    /// Recent samples, oldest first.
    pub fn recent(&self, count: usize) -> Vec<(f64, QotFields)> {
        self.window
            .iter()
            .rev()
            .take(count)
            .rev()
            .copied()
            .collect()
    }

    pub fn bad_count(&self) -> u32 {
        self.bad_count
    }
}
