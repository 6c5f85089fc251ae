//! Run parameters for the `simnet` demo, loadable from JSON.
//!
//! Durations and times are integer nanoseconds on the wire:
//!
//! ```json
//! {
//!   "seed": 7,
//!   "stop_time": 10000000000,
//!   "link": { "delay": 2000000, "jitter": 0, "drop_probability": 0.0 },
//!   "route_update_interval": 1000000000,
//!   "traffic": { "packet_size": 512, "count": 20, "interval": 250000000 }
//! }
//! ```
//!
//! Every field is optional; missing ones take the [`Default`] values.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{SimError, SimResult};
use crate::network::LinkConfig;
use crate::socket::{SendCount, SendSchedule};
use crate::time::{SimDuration, VirtualTime};

fn default_seed() -> u64 {
    1
}

fn default_stop_time() -> VirtualTime {
    VirtualTime::from_secs(10)
}

fn default_update_interval() -> SimDuration {
    SimDuration::from_secs(1)
}

/// The demo sender's traffic pattern.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TrafficConfig {
    pub packet_size: usize,
    /// `None` sends until the run ends.
    pub count: Option<u64>,
    pub interval: SimDuration,
    pub start_delay: SimDuration,
    /// Destination UDP port of the sink.
    pub port: u16,
}

impl Default for TrafficConfig {
    fn default() -> Self {
        TrafficConfig {
            packet_size: 512,
            count: Some(20),
            interval: SimDuration::from_millis(250),
            start_delay: SimDuration::ZERO,
            port: 9,
        }
    }
}

impl TrafficConfig {
    pub fn schedule(&self) -> SendSchedule {
        let count = match self.count {
            Some(n) => SendCount::Bounded(n),
            None => SendCount::Unbounded,
        };
        SendSchedule::new(self.packet_size, count, self.interval).starting_after(self.start_delay)
    }
}

/// An interface outage injected into the demo run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OutageConfig {
    pub down_at: VirtualTime,
    /// `None` leaves the interface down for the rest of the run.
    #[serde(default)]
    pub up_at: Option<VirtualTime>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SimulationConfig {
    /// Seeds link loss, jitter and the Poisson cost metric.
    #[serde(default = "default_seed")]
    pub seed: u64,
    #[serde(default = "default_stop_time")]
    pub stop_time: VirtualTime,
    /// Parameters shared by every demo link.
    #[serde(default)]
    pub link: LinkConfig,
    #[serde(default = "default_update_interval")]
    pub route_update_interval: SimDuration,
    #[serde(default)]
    pub traffic: TrafficConfig,
    #[serde(default = "default_outage")]
    pub outage: Option<OutageConfig>,
}

fn default_outage() -> Option<OutageConfig> {
    Some(OutageConfig {
        down_at: VirtualTime::from_secs(3),
        up_at: Some(VirtualTime::from_secs(6)),
    })
}

impl Default for SimulationConfig {
    fn default() -> Self {
        SimulationConfig {
            seed: default_seed(),
            stop_time: default_stop_time(),
            link: LinkConfig::default(),
            route_update_interval: default_update_interval(),
            traffic: TrafficConfig::default(),
            outage: default_outage(),
        }
    }
}

impl SimulationConfig {
    /// Parse and validate a JSON document.
    pub fn from_json_str(json: &str) -> SimResult<Self> {
        let config: SimulationConfig = serde_json::from_str(json)
            .map_err(|e| SimError::InvalidConfig(format!("malformed config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> SimResult<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| {
            SimError::InvalidConfig(format!("cannot open {}: {}", path.display(), e))
        })?;
        let config: SimulationConfig = serde_json::from_reader(BufReader::new(file))
            .map_err(|e| SimError::InvalidConfig(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> SimResult<()> {
        self.link.validate()?;
        if self.route_update_interval <= SimDuration::ZERO {
            return Err(SimError::InvalidConfig(format!(
                "route update interval {} must be positive",
                self.route_update_interval
            )));
        }
        let traffic = &self.traffic;
        if traffic.port == 0 {
            return Err(SimError::InvalidConfig("traffic port must be non-zero".into()));
        }
        if traffic.interval.is_negative() || traffic.start_delay.is_negative() {
            return Err(SimError::InvalidConfig(
                "traffic interval and start delay must not be negative".into(),
            ));
        }
        if traffic.count.is_none() && traffic.interval.is_zero() {
            return Err(SimError::InvalidConfig(
                "unbounded traffic needs a positive interval".into(),
            ));
        }
        if let Some(outage) = self.outage {
            if outage.up_at.is_some_and(|up| up <= outage.down_at) {
                return Err(SimError::InvalidConfig(format!(
                    "outage must end after it starts at {}",
                    outage.down_at
                )));
            }
        }
        Ok(())
    }
}
