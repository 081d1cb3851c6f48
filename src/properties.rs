// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Binder Configuration
//!
//! Property structures carried by each binding. All of them deserialize with
//! `serde` and fall back to the documented defaults for missing fields, so a
//! binding can be configured with only the keys it cares about.

use crate::session::Credentials;
use serde::Deserialize;
use std::{collections::HashMap, env, time::Duration};
use tracing::{debug, warn};

/// Default address of the broker management endpoint
pub const DEFAULT_MANAGEMENT_ADDRESS: &str = "activemq.management";

/// Per-destination delivery policy pushed into the broker address settings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct BrokerProperties {
    pub management_address: String,
    pub modify_address_settings: bool,
    pub auto_bind_dead_letter_address: bool,
    pub auto_bind_expiry_address: bool,
    pub broker_expiry_delay: i64,
    pub broker_redelivery_delay: i64,
    pub broker_max_redelivery_delay: Option<i64>,
    pub broker_redelivery_delay_multiplier: f64,
    pub broker_max_delivery_attempts: i32,
    pub broker_send_to_dla_on_no_route: bool,
}

impl Default for BrokerProperties {
    fn default() -> Self {
        BrokerProperties {
            management_address: DEFAULT_MANAGEMENT_ADDRESS.to_owned(),
            modify_address_settings: false,
            auto_bind_dead_letter_address: false,
            auto_bind_expiry_address: false,
            broker_expiry_delay: -1,
            broker_redelivery_delay: 0,
            broker_max_redelivery_delay: None,
            broker_redelivery_delay_multiplier: 1.0,
            broker_max_delivery_attempts: 10,
            broker_send_to_dla_on_no_route: false,
        }
    }
}

impl BrokerProperties {
    /// Max redelivery delay, ten times the redelivery delay when not set.
    pub fn max_redelivery_delay(&self) -> i64 {
        self.broker_max_redelivery_delay
            .unwrap_or(self.broker_redelivery_delay * 10)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ConsumerProperties {
    pub max_attempts: u32,
    pub concurrency: usize,
    /// Milliseconds
    pub back_off_initial_interval: u64,
    /// Milliseconds
    pub back_off_max_interval: u64,
    pub back_off_multiplier: f64,
    pub auto_startup: bool,
    pub partitioned: bool,
    pub instance_index: usize,
    pub instance_count: usize,
    pub broker: BrokerProperties,
}

impl Default for ConsumerProperties {
    fn default() -> Self {
        ConsumerProperties {
            max_attempts: 3,
            concurrency: 1,
            back_off_initial_interval: 1000,
            back_off_max_interval: 10000,
            back_off_multiplier: 2.0,
            auto_startup: true,
            partitioned: false,
            instance_index: 0,
            instance_count: 1,
            broker: BrokerProperties::default(),
        }
    }
}

impl ConsumerProperties {
    pub fn back_off_initial_interval(&self) -> Duration {
        Duration::from_millis(self.back_off_initial_interval)
    }

    pub fn back_off_max_interval(&self) -> Duration {
        Duration::from_millis(self.back_off_max_interval)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ProducerProperties {
    pub partitioned: bool,
    pub partition_count: usize,
    pub required_groups: Vec<String>,
    pub broker: BrokerProperties,
}

impl Default for ProducerProperties {
    fn default() -> Self {
        ProducerProperties {
            partitioned: false,
            partition_count: 1,
            required_groups: vec![],
            broker: BrokerProperties::default(),
        }
    }
}

/// Broker extension properties of a single binding.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct BindingProperties {
    pub consumer: BrokerProperties,
    pub producer: BrokerProperties,
}

/// Broker extension properties for every binding, keyed by channel name.
///
/// Channels without an entry use `default`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ExtendedBindingProperties {
    pub default: BindingProperties,
    pub bindings: HashMap<String, BindingProperties>,
}

impl ExtendedBindingProperties {
    pub fn consumer_properties(&self, channel: &str) -> BrokerProperties {
        self.binding(channel).consumer.clone()
    }

    pub fn producer_properties(&self, channel: &str) -> BrokerProperties {
        self.binding(channel).producer.clone()
    }

    fn binding(&self, channel: &str) -> &BindingProperties {
        self.bindings.get(channel).unwrap_or(&self.default)
    }
}

/// Connection settings of the binder.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct BinderConfig {
    pub transport: String,
    pub host: String,
    pub port: u16,
    pub user: Option<String>,
    pub password: Option<String>,
}

impl Default for BinderConfig {
    fn default() -> Self {
        BinderConfig {
            transport: "tcp".to_owned(),
            host: "localhost".to_owned(),
            port: 61616,
            user: None,
            password: None,
        }
    }
}

impl BinderConfig {
    /// Reads the connection settings from `ARTEMIS_*` environment variables.
    pub fn from_env() -> Self {
        let mut cfg = BinderConfig::default();

        if let Ok(transport) = env::var("ARTEMIS_TRANSPORT") {
            cfg.transport = transport;
        }

        if let Ok(host) = env::var("ARTEMIS_HOST") {
            cfg.host = host;
        }

        if let Ok(port) = env::var("ARTEMIS_PORT") {
            match port.parse() {
                Ok(port) => cfg.port = port,
                Err(err) => warn!(
                    error = err.to_string(),
                    value = port.as_str(),
                    "ignoring invalid ARTEMIS_PORT"
                ),
            }
        }

        cfg.user = env::var("ARTEMIS_USER").ok();
        cfg.password = env::var("ARTEMIS_PASSWORD").ok();

        debug!("binder configured for {}", cfg.broker_url());
        cfg
    }

    pub fn broker_url(&self) -> String {
        format!("{}://{}:{}", self.transport, self.host, self.port)
    }

    /// Credentials are only used when a user is configured.
    pub fn credentials(&self) -> Option<Credentials> {
        self.user.as_ref().map(|user| Credentials {
            username: user.clone(),
            password: self.password.clone().unwrap_or_default(),
        })
    }
}
