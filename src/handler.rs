// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Producer Message Handler
//!
//! Routes outbound messages to the address of their producer destination,
//! selecting the partition address from the `scst_partition` header when the
//! destination is partitioned.

use crate::{
    destination::ProducerDestination,
    errors::{BinderError, HandlerError, SessionError},
    listener::MessageChannel,
    message::{HeaderValue, Message, MESSAGE_ID_HEADER, PARTITION_HEADER},
    otel,
};
use async_trait::async_trait;
use opentelemetry::Context;
use std::sync::Arc;
use tracing::error;
use uuid::Uuid;

#[cfg(test)]
use mockall::automock;

/// Sends messages to a multicast address on the broker.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait MessageSender: Send + Sync {
    async fn send(&self, address: &str, message: &Message) -> Result<(), SessionError>;
}

/// Resolves the address `message` must be sent to.
///
/// Without a partition header the destination's single name is used. An
/// integer header, or a text header holding an integer, selects the partition
/// address. Any other header value is rejected.
pub fn resolve_destination<'d>(
    message: &Message,
    destination: &'d ProducerDestination,
) -> Result<&'d str, BinderError> {
    match message.header(PARTITION_HEADER) {
        None => destination.name(),
        Some(HeaderValue::Int(partition)) => destination.name_for_partition(i64::from(*partition)),
        Some(HeaderValue::Long(partition)) => destination.name_for_partition(*partition),
        Some(HeaderValue::Text(value)) => {
            let partition = value.parse::<i64>().map_err(|_| {
                BinderError::InvalidArgument(format!(
                    "the provided partition '{}' is not a valid integer",
                    value
                ))
            })?;
            destination.name_for_partition(partition)
        }
        Some(other) => Err(BinderError::InvalidArgument(format!(
            "the provided partition '{:?}' is neither an integer nor a string",
            other
        ))),
    }
}

/// Producer handler sending messages to the addresses of a provisioned destination.
pub struct ArtemisMessageHandler {
    destination: ProducerDestination,
    sender: Arc<dyn MessageSender>,
}

impl ArtemisMessageHandler {
    /// Creates a new ArtemisMessageHandler.
    ///
    /// # Parameters
    /// * `destination` - Destination returned by producer provisioning
    /// * `sender` - Sender publishing to broker addresses
    pub fn new(destination: ProducerDestination, sender: Arc<dyn MessageSender>) -> Self {
        ArtemisMessageHandler {
            destination,
            sender,
        }
    }

    pub fn destination(&self) -> &ProducerDestination {
        &self.destination
    }

    /// Sends `message` to its resolved address, propagating the trace context of `ctx`.
    ///
    /// # Parameters
    /// * `ctx` - OpenTelemetry context injected into the message headers
    /// * `message` - Outbound message, optionally carrying `scst_partition`
    ///
    /// # Returns
    /// Ok(()) on success, BinderError::InvalidArgument or a usage error for an
    /// unusable partition header, BinderError::Publishing when the send fails
    pub async fn handle(&self, ctx: &Context, mut message: Message) -> Result<(), BinderError> {
        let address = resolve_destination(&message, &self.destination)?;

        otel::inject(ctx, &mut message.headers);
        message.headers.insert(
            MESSAGE_ID_HEADER.to_owned(),
            HeaderValue::Text(Uuid::new_v4().to_string()),
        );

        self.sender
            .send(address, &message)
            .await
            .map_err(|source| {
                error!(
                    error = source.to_string(),
                    address = address,
                    "error publishing message"
                );
                BinderError::Publishing {
                    destination: address.to_owned(),
                    source,
                }
            })
    }
}

#[async_trait]
impl MessageChannel for ArtemisMessageHandler {
    async fn send(&self, message: Message) -> Result<(), HandlerError> {
        self.handle(&Context::current(), message)
            .await
            .map_err(HandlerError::from)
    }
}
