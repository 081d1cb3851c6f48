// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Broker Naming
//!
//! Derives broker-level names from logical destinations. The formats are part
//! of the contract with other clients of the same broker and must not change:
//!
//! - partition address: `{address}-{partition}`
//! - group queue: `{address}-{group}`
//! - anonymous queue: `{address}-{random suffix}`
//! - error channel: `{queue or address}.errors`
//! - dead-letter / expiry address: `{address}.dlq` / `{address}.exp`

use crate::errors::BinderError;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use rand::{rngs::StdRng, RngCore, SeedableRng};
use std::sync::{Mutex, PoisonError};
use uuid::Builder;

/// Suffix of the address receiving dead letters
pub const DLQ_SUFFIX: &str = "dlq";
/// Suffix of the address receiving expired messages
pub const EXP_SUFFIX: &str = "exp";
/// Suffix of error channel names
pub const ERRORS_SUFFIX: &str = "errors";

pub(crate) fn require<'a>(value: &'a str, argument: &str) -> Result<&'a str, BinderError> {
    if value.is_empty() {
        return Err(BinderError::InvalidArgument(format!(
            "`{}` must not be empty",
            argument
        )));
    }

    Ok(value)
}

/// Builds the address of a single partition.
///
/// # Parameters
/// * `address` - Logical destination address, must not be empty
/// * `partition` - Partition index
///
/// # Returns
/// `{address}-{partition}` or BinderError::InvalidArgument for an empty address
pub fn partition_address(address: &str, partition: usize) -> Result<String, BinderError> {
    let address = require(address, "address")?;

    Ok(format!("{}-{}", address, partition))
}

/// Builds the name of the durable queue shared by a consumer group.
///
/// # Parameters
/// * `address` - Address the queue is bound to, must not be empty
/// * `group` - Consumer group, must not be empty
///
/// # Returns
/// `{address}-{group}` or BinderError::InvalidArgument when an argument is empty
pub fn queue_name(address: &str, group: &str) -> Result<String, BinderError> {
    let address = require(address, "address")?;
    let group = require(group, "group")?;

    Ok(format!("{}-{}", address, group))
}

/// Builds a queue name for a consumer without a group.
///
/// The suffix is a random 128-bit UUID, base64url encoded without padding,
/// with `-` replaced by `$` so that the suffix never looks like a partition
/// or group separator.
pub fn anonymous_queue_name<R: RngCore + ?Sized>(
    address: &str,
    rng: &mut R,
) -> Result<String, BinderError> {
    let address = require(address, "address")?;

    let mut bytes = [0u8; 16];
    rng.fill_bytes(&mut bytes);
    let uuid = Builder::from_random_bytes(bytes).into_uuid();
    let suffix = URL_SAFE_NO_PAD.encode(uuid.as_bytes()).replace('-', "$");

    Ok(format!("{}-{}", address, suffix))
}

/// Address receiving the dead letters of `address`.
pub fn dead_letter_address(address: &str) -> String {
    format!("{}.{}", address, DLQ_SUFFIX)
}

/// Address receiving the expired messages of `address`.
pub fn expiry_address(address: &str) -> String {
    format!("{}.{}", address, EXP_SUFFIX)
}

/// Error channel name derived from a group queue or an address.
pub fn errors_name(base: &str) -> String {
    format!("{}.{}", base, ERRORS_SUFFIX)
}

/// Source of anonymous queue names shared by all consumer bindings of a binder.
///
/// The random generator is injected so tests can run with a seeded one.
pub struct AnonymousNames {
    rng: Mutex<Box<dyn RngCore + Send>>,
}

impl AnonymousNames {
    pub fn new(rng: impl RngCore + Send + 'static) -> Self {
        AnonymousNames {
            rng: Mutex::new(Box::new(rng)),
        }
    }

    pub fn queue_name(&self, address: &str) -> Result<String, BinderError> {
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        anonymous_queue_name(address, &mut **rng)
    }
}

impl Default for AnonymousNames {
    fn default() -> Self {
        AnonymousNames::new(StdRng::from_os_rng())
    }
}
