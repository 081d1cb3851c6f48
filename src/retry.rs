// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Consumer Retry
//!
//! `RetryingListener` decorates a delivery listener with a bounded retry
//! policy. Each delivery runs its own attempt loop, so the decorator can be
//! shared by every consumer task of an endpoint. Once the attempts are
//! exhausted the recovery callback is invoked exactly once and the delivery
//! is reported as handled: the broker's own redelivery counter is never
//! involved.

use crate::{
    errors::HandlerError,
    listener::{MessageChannel, MessageListener},
    message::{HeaderValue, InboundMessage, Message},
    properties::ConsumerProperties,
};
use async_trait::async_trait;
use std::{sync::Arc, time::Duration};
use tracing::{debug, error, warn};

/// Header holding the failure of the last attempt
pub const EXCEPTION_MESSAGE_HEADER: &str = "x-exception-message";
/// Header holding the address the failed message was consumed from
pub const ORIGINAL_DESTINATION_HEADER: &str = "x-original-destination";
/// Header holding the number of attempts made
pub const DELIVERY_ATTEMPTS_HEADER: &str = "x-delivery-attempts";

/// Bounded exponential backoff retry policy.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_interval: Duration,
    pub multiplier: f64,
    pub max_interval: Duration,
}

impl RetryPolicy {
    pub fn from_properties(properties: &ConsumerProperties) -> Self {
        RetryPolicy {
            max_attempts: properties.max_attempts.max(1),
            initial_interval: properties.back_off_initial_interval(),
            multiplier: properties.back_off_multiplier,
            max_interval: properties.back_off_max_interval(),
        }
    }

    /// Delay before the attempt following `attempt` (1-based).
    ///
    /// Computed in microseconds and clamped to `max_interval`; an overflowing
    /// or undefined growth yields `max_interval`.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let cap_us = self.max_interval.as_micros() as f64;
        let delay_us = self.initial_interval.as_micros() as f64 * self.multiplier.powi(exponent);

        let delay_us = if delay_us.is_finite() {
            delay_us.clamp(0.0, cap_us)
        } else {
            cap_us
        };

        Duration::from_micros(delay_us as u64)
    }
}

/// A delivery whose retry budget is exhausted.
#[derive(Debug)]
pub struct DeliveryFailure {
    pub destination: String,
    pub message: Message,
    pub cause: HandlerError,
    pub attempts: u32,
}

/// Invoked once when a delivery ran out of attempts.
#[async_trait]
pub trait RecoveryCallback: Send + Sync {
    async fn recover(&self, failure: DeliveryFailure) -> Result<(), HandlerError>;
}

/// Publishes exhausted deliveries to an error channel.
pub struct ErrorMessageRecoverer {
    channel_name: String,
    channel: Arc<dyn MessageChannel>,
}

impl ErrorMessageRecoverer {
    pub fn new(channel_name: impl Into<String>, channel: Arc<dyn MessageChannel>) -> Self {
        ErrorMessageRecoverer {
            channel_name: channel_name.into(),
            channel,
        }
    }

    pub fn channel_name(&self) -> &str {
        &self.channel_name
    }
}

#[async_trait]
impl RecoveryCallback for ErrorMessageRecoverer {
    async fn recover(&self, failure: DeliveryFailure) -> Result<(), HandlerError> {
        error!(
            error = failure.cause.to_string(),
            channel = self.channel_name.as_str(),
            attempts = failure.attempts,
            "too many attempts, sending to error channel"
        );

        let mut message = failure.message;
        message.headers.insert(
            EXCEPTION_MESSAGE_HEADER.to_owned(),
            HeaderValue::Text(failure.cause.to_string()),
        );
        message.headers.insert(
            ORIGINAL_DESTINATION_HEADER.to_owned(),
            HeaderValue::Text(failure.destination),
        );
        message.headers.insert(
            DELIVERY_ATTEMPTS_HEADER.to_owned(),
            HeaderValue::Long(i64::from(failure.attempts)),
        );

        self.channel.send(message).await
    }
}

/// Delivery listener retrying the wrapped listener.
pub struct RetryingListener {
    inner: Arc<dyn MessageListener>,
    policy: RetryPolicy,
    recoverer: Arc<dyn RecoveryCallback>,
}

impl RetryingListener {
    pub fn new(
        inner: Arc<dyn MessageListener>,
        policy: RetryPolicy,
        recoverer: Arc<dyn RecoveryCallback>,
    ) -> Self {
        RetryingListener {
            inner,
            policy,
            recoverer,
        }
    }
}

#[async_trait]
impl MessageListener for RetryingListener {
    async fn on_message(&self, message: &mut InboundMessage) -> Result<(), HandlerError> {
        let mut attempt = 1;

        loop {
            message.reset();

            let cause = match self.inner.on_message(message).await {
                Ok(()) => {
                    if attempt > 1 {
                        debug!(attempt = attempt, "delivery recovered after retry");
                    }
                    return Ok(());
                }
                Err(cause) => cause,
            };

            if attempt >= self.policy.max_attempts {
                message.reset();
                let failed = message.read_message()?;
                return self
                    .recoverer
                    .recover(DeliveryFailure {
                        destination: message.destination.clone(),
                        message: failed,
                        cause,
                        attempts: attempt,
                    })
                    .await;
            }

            let delay = self.policy.delay_after(attempt);
            warn!(
                error = cause.to_string(),
                attempt = attempt,
                delay_ms = delay.as_millis() as u64,
                "error whiling handling msg, retrying"
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}
