// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Message-Driven Consumer Endpoint
//!
//! A `MessageDrivenEndpoint` subscribes to a durable shared multicast
//! subscription through a `ListenerContainer` and hands every delivery to a
//! `MessageListener`. Deliveries arrive inside a transacted session: the
//! session is committed when the listener returns successfully and rolled
//! back otherwise, which lets the broker redeliver the message.
//!
//! Deliveries are processed by a spawned task with at most `concurrency`
//! listener invocations in flight.

use crate::{
    errors::{BinderError, HandlerError, SessionError},
    message::{InboundMessage, Message},
    otel,
};
use async_trait::async_trait;
use futures_util::{stream::BoxStream, StreamExt};
use opentelemetry::{
    global::{self, BoxedTracer},
    trace::{Span, Status},
};
use std::{
    borrow::Cow,
    sync::{Arc, Mutex, PoisonError},
};
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

/// Processes a single inbound delivery.
#[async_trait]
pub trait MessageListener: Send + Sync {
    async fn on_message(&self, message: &mut InboundMessage) -> Result<(), HandlerError>;
}

/// Destination for application messages, such as a bound output or an error channel.
#[async_trait]
pub trait MessageChannel: Send + Sync {
    async fn send(&self, message: Message) -> Result<(), HandlerError>;
}

/// Reads each delivery into a `Message` and forwards it to the output channel.
pub struct ChannelPublishingListener {
    output: Arc<dyn MessageChannel>,
}

impl ChannelPublishingListener {
    pub fn new(output: Arc<dyn MessageChannel>) -> Self {
        ChannelPublishingListener { output }
    }
}

#[async_trait]
impl MessageListener for ChannelPublishingListener {
    async fn on_message(&self, message: &mut InboundMessage) -> Result<(), HandlerError> {
        let message = message.read_message()?;
        self.output.send(message).await
    }
}

/// Subscription settings handed to the listener container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenerContainerSpec {
    pub destination: String,
    pub subscription_name: String,
    pub pub_sub: bool,
    pub durable: bool,
    pub shared: bool,
    pub session_transacted: bool,
    pub concurrency: usize,
    pub auto_startup: bool,
}

impl ListenerContainerSpec {
    /// Durable shared transacted multicast subscription named `subscription_name`.
    pub fn shared_subscription(destination: &str, subscription_name: &str) -> Self {
        ListenerContainerSpec {
            destination: destination.to_owned(),
            subscription_name: subscription_name.to_owned(),
            pub_sub: true,
            durable: true,
            shared: true,
            session_transacted: true,
            concurrency: 1,
            auto_startup: true,
        }
    }
}

/// Transaction a delivery was received in.
#[async_trait]
pub trait TransactedSession: Send {
    async fn commit(self: Box<Self>) -> Result<(), SessionError>;

    async fn rollback(self: Box<Self>) -> Result<(), SessionError>;
}

pub struct Delivery {
    pub message: InboundMessage,
    pub session: Box<dyn TransactedSession>,
}

pub type DeliveryStream = BoxStream<'static, Result<Delivery, SessionError>>;

/// Opens subscriptions on the broker.
#[async_trait]
pub trait ListenerContainer: Send + Sync {
    async fn subscribe(&self, spec: &ListenerContainerSpec) -> Result<DeliveryStream, SessionError>;
}

pub struct MessageDrivenEndpoint {
    spec: ListenerContainerSpec,
    container: Arc<dyn ListenerContainer>,
    listener: Arc<dyn MessageListener>,
    task: Mutex<Option<JoinHandle<()>>>,
    /// Held from the running check until the task is stored
    starting: tokio::sync::Mutex<()>,
}

impl MessageDrivenEndpoint {
    pub fn new(
        spec: ListenerContainerSpec,
        container: Arc<dyn ListenerContainer>,
        listener: Arc<dyn MessageListener>,
    ) -> Self {
        MessageDrivenEndpoint {
            spec,
            container,
            listener,
            task: Mutex::new(None),
            starting: tokio::sync::Mutex::new(()),
        }
    }

    pub fn spec(&self) -> &ListenerContainerSpec {
        &self.spec
    }

    /// Subscribes and starts dispatching deliveries.
    ///
    /// Starting a running endpoint is a no-op. Concurrent calls are serialized,
    /// so the container is subscribed at most once per run.
    ///
    /// # Returns
    /// Ok(()) once the consumer task runs or BinderError::Consumer when the subscription fails
    pub async fn start(&self) -> Result<(), BinderError> {
        let _starting = self.starting.lock().await;
        if self.is_running() {
            return Ok(());
        }

        let stream = match self.container.subscribe(&self.spec).await {
            Err(err) => {
                error!(
                    error = err.to_string(),
                    subscription = self.spec.subscription_name.as_str(),
                    "error to create the consumer"
                );
                Err(BinderError::Consumer(err.to_string()))
            }
            Ok(stream) => Ok(stream),
        }?;

        debug!(
            "starting consumer for subscription: {} on address: {}",
            self.spec.subscription_name, self.spec.destination
        );

        let listener = self.listener.clone();
        let subscription = self.spec.subscription_name.clone();
        let concurrency = self.spec.concurrency.max(1);

        let handle = tokio::spawn(async move {
            let tracer = global::tracer("artemis consumer");
            stream
                .for_each_concurrent(concurrency, |result| {
                    let listener = listener.clone();
                    let tracer = &tracer;
                    let subscription = subscription.as_str();
                    async move {
                        match result {
                            Ok(delivery) => dispatch(tracer, subscription, delivery, listener).await,
                            Err(err) => error!(error = err.to_string(), "errors consume msg"),
                        }
                    }
                })
                .await;
            debug!("subscription stream closed: {}", subscription);
        });

        *self.task.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);

        Ok(())
    }

    pub fn stop(&self) {
        let mut task = self.task.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(handle) = task.take() {
            debug!("stopping consumer for subscription: {}", self.spec.subscription_name);
            handle.abort();
        }
    }

    pub fn is_running(&self) -> bool {
        self.task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }
}

impl Drop for MessageDrivenEndpoint {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn dispatch(
    tracer: &BoxedTracer,
    subscription: &str,
    delivery: Delivery,
    listener: Arc<dyn MessageListener>,
) {
    let Delivery {
        mut message,
        session,
    } = delivery;

    let (_ctx, mut span) = otel::new_span(&message.headers, tracer, subscription);

    debug!("received: {} - address: {}", subscription, message.destination);

    match listener.on_message(&mut message).await {
        Ok(()) => match session.commit().await {
            Err(err) => {
                error!(error = err.to_string(), "error whiling commit msg");
                span.record_error(&err);
                span.set_status(Status::Error {
                    description: Cow::from("error to commit msg"),
                });
            }
            Ok(()) => span.set_status(Status::Ok),
        },
        Err(cause) => {
            warn!(error = cause.to_string(), "error whiling handling msg, rolling back");
            span.record_error(cause.as_ref());
            span.set_status(Status::Error {
                description: Cow::from("listener failure"),
            });

            if let Err(err) = session.rollback().await {
                error!(error = err.to_string(), "error whiling rollback msg");
            }
        }
    }
}
