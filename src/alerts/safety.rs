// src/alerts/safety.rs
//
// Local safety outputs. Hardware is not driven from here; with GPIO
// disabled the door alert is a log line pointing at the dashboard.

use tracing::{info, warn};

use crate::types::SafetyConfig;

pub struct SafetyHooks {
    config: SafetyConfig,
    door_alerts: u64,
}

impl SafetyHooks {
    pub fn new(config: SafetyConfig) -> Self {
        if config.use_gpio {
            warn!(
                "⚠️  GPIO requested (door pin {}, engine pin {}) but no GPIO backend is built in, simulating",
                config.door_alert_pin, config.engine_stop_pin
            );
        }
        Self {
            config,
            door_alerts: 0,
        }
    }

    pub fn door_alert(&mut self) {
        self.door_alerts += 1;
        info!(
            "🔔 [SAFETY] Door alert sound triggered! Dashboard: {}",
            self.config.dashboard_link
        );
    }

    /// How many times the door alert has sounded this run.
    pub fn door_alerts(&self) -> u64 {
        self.door_alerts
    }
}
