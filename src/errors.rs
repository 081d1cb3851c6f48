// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Error Types for the Artemis Binder
//!
//! `BinderError` is the error surfaced by provisioning, naming, routing and
//! consumer endpoint operations. Failures reported by the underlying broker
//! client are described by `SessionError` and carried as the source of the
//! provisioning variants, so the offending address or queue name is always
//! part of the message.

use thiserror::Error;

/// Failure reported by the broker client while talking to the broker.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// The connection to the broker could not be established or was lost
    #[error("failure to connect `{0}`")]
    Connection(String),

    /// A session could not be created, started or stopped
    #[error("session failure `{0}`")]
    Session(String),

    /// A core operation (query, create) was rejected by the broker
    #[error("broker operation failure `{0}`")]
    Operation(String),

    /// A management request did not complete
    #[error("management request failure `{0}`")]
    Management(String),

    /// A management reply could not be decoded
    #[error("invalid management reply `{0}`")]
    InvalidReply(String),
}

/// Errors produced by the binder.
///
/// Provisioning variants always name the address and/or queue involved and
/// wrap the transport cause. Argument and usage variants fail fast, before any
/// broker interaction happens.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BinderError {
    /// Address query or creation failed
    #[error("failed to create address '{address}'")]
    CreateAddress {
        address: String,
        #[source]
        source: SessionError,
    },

    /// Queue query or creation failed
    #[error("failed to create queue '{queue}' with address '{address}'")]
    CreateQueue {
        queue: String,
        address: String,
        #[source]
        source: SessionError,
    },

    /// The queue is already bound to another address; it is never rebound
    #[error(
        "failed to create queue '{queue}' with address '{address}'. Queue already exists under another address '{existing}'"
    )]
    QueueAddressConflict {
        queue: String,
        address: String,
        existing: String,
    },

    /// Reading or writing the address settings through the management address failed
    #[error("failed to update address '{address}' settings")]
    UpdateAddressSettings {
        address: String,
        #[source]
        source: SessionError,
    },

    /// The operation succeeded but the broker session could not be closed
    #[error("failure to close broker session")]
    SessionClose(#[source] SessionError),

    /// A required argument was missing or had an unsupported shape
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// `name` was requested from a partitioned destination
    #[error("partitioned destination has no single name, use the partition name instead")]
    PartitionedName,

    /// `name_for_partition` was requested from an unpartitioned destination
    #[error("unpartitioned destination has no partition names")]
    UnpartitionedName,

    /// The partition index is outside of the provisioned range
    #[error("invalid partition `{partition}`, destination has {count} partitions")]
    InvalidPartition { partition: i64, count: usize },

    /// Sending a message to the broker failed
    #[error("failure to publish to `{destination}`")]
    Publishing {
        destination: String,
        #[source]
        source: SessionError,
    },

    /// The consumer endpoint could not be started
    #[error("failure to consume message `{0}`")]
    Consumer(String),
}

impl BinderError {
    /// Returns true for failures raised while provisioning broker artifacts.
    pub fn is_provisioning(&self) -> bool {
        matches!(
            self,
            BinderError::CreateAddress { .. }
                | BinderError::CreateQueue { .. }
                | BinderError::QueueAddressConflict { .. }
                | BinderError::UpdateAddressSettings { .. }
                | BinderError::SessionClose(_)
        )
    }
}

/// Error type returned by application handlers and error channels.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;
