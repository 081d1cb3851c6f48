// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Address Settings
//!
//! Current address settings as reported by the broker, and the merged update
//! submitted back through the `addAddressSettings` management operation.
//!
//! The update is a read-modify-write without any locking: two binders changing
//! the settings of the same address at the same time can lose one of the two
//! updates. Fields the binder does not own are copied from the current
//! settings so unrelated configuration survives.

use crate::{errors::SessionError, naming, properties::BrokerProperties};
use serde::Deserialize;
use serde_json::{json, Value};

/// Management operation upserting address settings
pub const ADD_SETTINGS_OPERATION: &str = "addAddressSettings";
/// Management operation reading address settings
pub const GET_SETTINGS_OPERATION: &str = "getAddressSettingsAsJSON";

/// Address settings as returned by `getAddressSettingsAsJSON`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AddressSettingsInfo {
    pub address_full_message_policy: Option<String>,
    pub max_size_bytes: i64,
    pub page_size_bytes: i32,
    pub page_cache_max_size: i32,
    pub max_delivery_attempts: i32,
    pub redelivery_delay: i64,
    pub redelivery_multiplier: f64,
    pub max_redelivery_delay: i64,
    #[serde(rename = "DLA")]
    pub dead_letter_address: Option<String>,
    pub expiry_address: Option<String>,
    pub last_value_queue: bool,
    pub redistribution_delay: i64,
    pub slow_consumer_threshold: i64,
    pub slow_consumer_check_period: i64,
    pub slow_consumer_policy: Option<String>,
    pub auto_create_jms_queues: bool,
    pub auto_delete_jms_queues: bool,
    pub auto_create_jms_topics: bool,
    pub auto_delete_jms_topics: bool,
}

impl AddressSettingsInfo {
    pub fn from_json(json: &str) -> Result<Self, SessionError> {
        serde_json::from_str(json).map_err(|err| SessionError::InvalidReply(err.to_string()))
    }
}

/// Settings submitted with `addAddressSettings`.
#[derive(Debug, Clone, PartialEq)]
pub struct AddressSettingsUpdate {
    pub address: String,
    pub dead_letter_address: Option<String>,
    pub expiry_address: Option<String>,
    pub expiry_delay: i64,
    pub last_value_queue: bool,
    pub max_delivery_attempts: i32,
    pub max_size_bytes: i64,
    pub page_size_bytes: i32,
    pub page_cache_max_size: i32,
    pub redelivery_delay: i64,
    pub redelivery_multiplier: f64,
    pub max_redelivery_delay: i64,
    pub redistribution_delay: i64,
    pub send_to_dla_on_no_route: bool,
    pub address_full_message_policy: Option<String>,
    pub slow_consumer_threshold: i64,
    pub slow_consumer_check_period: i64,
    pub slow_consumer_policy: Option<String>,
    pub auto_create_jms_queues: bool,
    pub auto_delete_jms_queues: bool,
    pub auto_create_jms_topics: bool,
    pub auto_delete_jms_topics: bool,
}

impl AddressSettingsUpdate {
    /// Merges the binding policy into the current settings of `address`.
    ///
    /// Dead-letter and expiry addresses are only replaced when the matching
    /// auto-bind flag is set. Delivery policy always comes from `properties`.
    pub fn merge(address: &str, current: &AddressSettingsInfo, properties: &BrokerProperties) -> Self {
        let dead_letter_address = if properties.auto_bind_dead_letter_address {
            Some(naming::dead_letter_address(address))
        } else {
            current.dead_letter_address.clone()
        };

        let expiry_address = if properties.auto_bind_expiry_address {
            Some(naming::expiry_address(address))
        } else {
            current.expiry_address.clone()
        };

        AddressSettingsUpdate {
            address: address.to_owned(),
            dead_letter_address,
            expiry_address,
            expiry_delay: properties.broker_expiry_delay,
            last_value_queue: current.last_value_queue,
            max_delivery_attempts: properties.broker_max_delivery_attempts,
            max_size_bytes: current.max_size_bytes,
            page_size_bytes: current.page_size_bytes,
            page_cache_max_size: current.page_cache_max_size,
            redelivery_delay: properties.broker_redelivery_delay,
            redelivery_multiplier: properties.broker_redelivery_delay_multiplier,
            max_redelivery_delay: properties.max_redelivery_delay(),
            redistribution_delay: current.redistribution_delay,
            send_to_dla_on_no_route: properties.broker_send_to_dla_on_no_route,
            address_full_message_policy: current.address_full_message_policy.clone(),
            slow_consumer_threshold: current.slow_consumer_threshold,
            slow_consumer_check_period: current.slow_consumer_check_period,
            slow_consumer_policy: current.slow_consumer_policy.clone(),
            auto_create_jms_queues: current.auto_create_jms_queues,
            auto_delete_jms_queues: current.auto_delete_jms_queues,
            auto_create_jms_topics: current.auto_create_jms_topics,
            auto_delete_jms_topics: current.auto_delete_jms_topics,
        }
    }

    /// Positional parameters of the `addAddressSettings` operation.
    pub fn parameters(&self) -> Vec<Value> {
        vec![
            json!(self.address),
            json!(self.dead_letter_address),
            json!(self.expiry_address),
            json!(self.expiry_delay),
            json!(self.last_value_queue),
            json!(self.max_delivery_attempts),
            json!(self.max_size_bytes),
            json!(self.page_size_bytes),
            json!(self.page_cache_max_size),
            json!(self.redelivery_delay),
            json!(self.redelivery_multiplier),
            json!(self.max_redelivery_delay),
            json!(self.redistribution_delay),
            json!(self.send_to_dla_on_no_route),
            json!(self.address_full_message_policy),
            json!(self.slow_consumer_threshold),
            json!(self.slow_consumer_check_period),
            json!(self.slow_consumer_policy),
            json!(self.auto_create_jms_queues),
            json!(self.auto_delete_jms_queues),
            json!(self.auto_create_jms_topics),
            json!(self.auto_delete_jms_topics),
        ]
    }
}
