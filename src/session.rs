// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Broker Session Management
//!
//! Interfaces of the broker client used for provisioning. A `ServerLocator`
//! hands out short-lived `ClientSession`s; every provisioning step opens one,
//! runs a single logical operation and closes it again through
//! `ScopedSession::finish`.

use crate::errors::{BinderError, SessionError};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::ops::Deref;
use tracing::{debug, warn};

#[cfg(test)]
use mockall::automock;

/// Resource name of the broker control in management requests
pub const RESOURCE_BROKER: &str = "broker";

/// Routing type of addresses and queues created by the binder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoutingType {
    Multicast,
    Anycast,
}

/// Result of an address existence query
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AddressQuery {
    pub exists: bool,
}

/// Result of a queue existence query
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueueQuery {
    pub exists: bool,
    /// Address the queue is bound to, when it exists
    pub address: Option<String>,
}

/// Operation invocation sent to the broker management address.
#[derive(Debug, Clone, PartialEq)]
pub struct ManagementRequest {
    pub resource: String,
    pub operation: String,
    pub parameters: Vec<Value>,
}

impl ManagementRequest {
    pub fn broker(operation: &str, parameters: Vec<Value>) -> Self {
        ManagementRequest {
            resource: RESOURCE_BROKER.to_owned(),
            operation: operation.to_owned(),
            parameters,
        }
    }
}

/// Reply to a management request. The body is a JSON array holding the result.
#[derive(Debug, Clone, PartialEq)]
pub struct ManagementReply {
    pub body: Value,
}

impl ManagementReply {
    pub fn new(body: Value) -> Self {
        ManagementReply { body }
    }

    pub fn result<T: DeserializeOwned>(&self) -> Result<T, SessionError> {
        let value = match &self.body {
            Value::Array(values) => values.first().cloned().unwrap_or(Value::Null),
            other => other.clone(),
        };

        serde_json::from_value(value).map_err(|err| SessionError::InvalidReply(err.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

/// Options used to open an authenticated session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOptions {
    pub username: String,
    pub password: String,
    pub xa: bool,
    pub auto_commit_sends: bool,
    pub auto_commit_acks: bool,
    pub pre_acknowledge: bool,
    pub ack_batch_size: i32,
}

/// A session with the broker.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ClientSession: Send + Sync {
    /// Starts message flow on the session.
    async fn start(&self) -> Result<(), SessionError>;

    /// Stops message flow on the session.
    async fn stop(&self) -> Result<(), SessionError>;

    /// Releases the session. No other call is valid afterwards.
    async fn close(&self) -> Result<(), SessionError>;

    /// Checks whether an address named `name` exists.
    async fn address_query(&self, name: &str) -> Result<AddressQuery, SessionError>;

    /// Checks whether a queue named `name` exists and which address it is bound to.
    async fn queue_query(&self, name: &str) -> Result<QueueQuery, SessionError>;

    /// Creates an address.
    ///
    /// # Parameters
    /// * `name` - Address name
    /// * `routing` - Routing type of the address
    /// * `durable` - Whether the address survives a broker restart
    async fn create_address(
        &self,
        name: &str,
        routing: RoutingType,
        durable: bool,
    ) -> Result<(), SessionError>;

    /// Creates a queue that can be consumed by several consumers at once.
    ///
    /// # Parameters
    /// * `address` - Address the queue is bound to
    /// * `routing` - Routing type of the queue
    /// * `name` - Queue name
    /// * `durable` - Whether the queue and its messages survive a broker restart
    async fn create_shared_queue(
        &self,
        address: &str,
        routing: RoutingType,
        name: &str,
        durable: bool,
    ) -> Result<(), SessionError>;

    /// Sends a management request to `management_address` and waits for the reply.
    async fn request(
        &self,
        management_address: &str,
        request: &ManagementRequest,
    ) -> Result<ManagementReply, SessionError>;
}

/// Entry point of the broker client.
#[async_trait]
pub trait ServerLocator: Send + Sync {
    async fn create_session(&self) -> Result<Box<dyn ClientSession>, SessionError>;

    async fn create_authenticated_session(
        &self,
        options: &SessionOptions,
    ) -> Result<Box<dyn ClientSession>, SessionError>;

    fn is_pre_acknowledge(&self) -> bool;

    fn ack_batch_size(&self) -> i32;
}

/// Opens an anonymous session, or an authenticated one when credentials are set.
///
/// The locator flags are read on every call, nothing is cached.
pub async fn open_session(
    locator: &dyn ServerLocator,
    credentials: Option<&Credentials>,
) -> Result<ScopedSession, SessionError> {
    let session = match credentials {
        None => locator.create_session().await?,
        Some(credentials) => {
            let options = SessionOptions {
                username: credentials.username.clone(),
                password: credentials.password.clone(),
                xa: true,
                auto_commit_sends: false,
                auto_commit_acks: false,
                pre_acknowledge: locator.is_pre_acknowledge(),
                ack_batch_size: locator.ack_batch_size(),
            };
            locator.create_authenticated_session(&options).await?
        }
    };

    debug!("broker session opened");
    Ok(ScopedSession { session })
}

/// A session that must be released with `finish`.
pub struct ScopedSession {
    session: Box<dyn ClientSession>,
}

impl Deref for ScopedSession {
    type Target = dyn ClientSession;

    fn deref(&self) -> &Self::Target {
        self.session.as_ref()
    }
}

impl ScopedSession {
    /// Closes the session and returns the operation result.
    ///
    /// An operation failure wins over a close failure; a close failure after a
    /// successful operation is reported as `BinderError::SessionClose`.
    pub async fn finish<T>(self, result: Result<T, BinderError>) -> Result<T, BinderError> {
        let closed = self.session.close().await;

        match (result, closed) {
            (Err(err), Err(close_err)) => {
                warn!(
                    error = close_err.to_string(),
                    "failure to close session after a failed operation"
                );
                Err(err)
            }
            (Err(err), Ok(())) => Err(err),
            (Ok(_), Err(close_err)) => Err(BinderError::SessionClose(close_err)),
            (Ok(value), Ok(())) => {
                debug!("broker session closed");
                Ok(value)
            }
        }
    }
}
