// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Broker Topology Management
//!
//! Idempotent creation of multicast addresses and durable shared queues, and
//! the address settings update that pushes delivery policy (dead-lettering,
//! expiry, redelivery backoff) into the broker.
//!
//! The main components are:
//! - `BrokerManager` trait: Interface used by the provisioner
//! - `ArtemisBrokerManager`: Implementation talking to the broker through a `ServerLocator`
//!
//! Existence checks and creations are check-then-act without any mutual
//! exclusion. Two processes provisioning the same new queue race, and the
//! broker's own handling of duplicate creation decides the winner.

use crate::{
    errors::{BinderError, SessionError},
    naming,
    properties::BrokerProperties,
    session::{open_session, ClientSession, Credentials, ManagementRequest, RoutingType, ServerLocator},
    settings::{
        AddressSettingsInfo, AddressSettingsUpdate, ADD_SETTINGS_OPERATION, GET_SETTINGS_OPERATION,
    },
};
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, error};

#[cfg(test)]
use mockall::automock;

/// Trait defining the broker operations needed to provision destinations.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait BrokerManager: Send + Sync {
    /// Creates a multicast address unless it already exists.
    ///
    /// Address settings are only updated for a newly created address and only
    /// when `properties.modify_address_settings` is set.
    async fn create_address(
        &self,
        name: &str,
        properties: &BrokerProperties,
    ) -> Result<(), BinderError>;

    /// Creates a durable shared multicast queue bound to `address`.
    ///
    /// Fails when a queue with the same name is bound to another address.
    async fn create_queue(&self, address: &str, name: &str) -> Result<(), BinderError>;
}

/// Broker manager opening one short-lived session per operation.
pub struct ArtemisBrokerManager {
    locator: Arc<dyn ServerLocator>,
    credentials: Option<Credentials>,
}

impl ArtemisBrokerManager {
    /// Creates a new ArtemisBrokerManager.
    ///
    /// # Parameters
    /// * `locator` - Entry point of the broker client
    /// * `credentials` - Credentials for authenticated sessions, anonymous sessions when `None`
    pub fn new(locator: Arc<dyn ServerLocator>, credentials: Option<Credentials>) -> Self {
        ArtemisBrokerManager {
            locator,
            credentials,
        }
    }
}

#[async_trait]
impl BrokerManager for ArtemisBrokerManager {
    async fn create_address(
        &self,
        name: &str,
        properties: &BrokerProperties,
    ) -> Result<(), BinderError> {
        debug!("creating address: {}", name);

        let session = open_session(self.locator.as_ref(), self.credentials.as_ref())
            .await
            .map_err(|err| create_address_error(name, err))?;

        let result = create_address_in(&*session, name, properties).await;
        session.finish(result).await
    }

    async fn create_queue(&self, address: &str, name: &str) -> Result<(), BinderError> {
        let session = open_session(self.locator.as_ref(), self.credentials.as_ref())
            .await
            .map_err(|err| create_queue_error(address, name, err))?;

        let result = create_queue_in(&*session, address, name).await;
        session.finish(result).await
    }
}

async fn create_address_in(
    session: &dyn ClientSession,
    name: &str,
    properties: &BrokerProperties,
) -> Result<(), BinderError> {
    session
        .start()
        .await
        .map_err(|err| create_address_error(name, err))?;

    let query = session
        .address_query(name)
        .await
        .map_err(|err| create_address_error(name, err))?;

    if query.exists {
        debug!("address: {} already exists, ignoring", name);
    } else {
        session
            .create_address(name, RoutingType::Multicast, true)
            .await
            .map_err(|err| create_address_error(name, err))?;

        if properties.modify_address_settings {
            configure_address(session, name, properties).await?;
        }

        debug!("address: {} was created", name);
    }

    session
        .stop()
        .await
        .map_err(|err| create_address_error(name, err))
}

async fn create_queue_in(
    session: &dyn ClientSession,
    address: &str,
    name: &str,
) -> Result<(), BinderError> {
    debug!("creating queue: {} with address: {}", name, address);

    let query = session
        .queue_query(name)
        .await
        .map_err(|err| create_queue_error(address, name, err))?;

    if !query.exists {
        session
            .create_shared_queue(address, RoutingType::Multicast, name, true)
            .await
            .map_err(|err| create_queue_error(address, name, err))?;

        debug!("queue: {} was created", name);
        return Ok(());
    }

    match query.address {
        Some(existing) if existing != address => {
            error!(
                queue = name,
                address = address,
                existing = existing.as_str(),
                "queue already exists under another address"
            );
            Err(BinderError::QueueAddressConflict {
                queue: name.to_owned(),
                address: address.to_owned(),
                existing,
            })
        }
        _ => {
            debug!("queue: {} already exists, ignoring", name);
            Ok(())
        }
    }
}

/// Applies the address settings and binds the dead-letter and expiry queues.
async fn configure_address(
    session: &dyn ClientSession,
    address: &str,
    properties: &BrokerProperties,
) -> Result<(), BinderError> {
    update_address_settings(session, address, properties).await?;

    if properties.auto_bind_dead_letter_address {
        let dlq_address = naming::dead_letter_address(address);
        create_queue_in(session, &dlq_address, &dlq_address).await?;
    }

    if properties.auto_bind_expiry_address {
        let exp_address = naming::expiry_address(address);
        create_queue_in(session, &exp_address, &exp_address).await?;
    }

    Ok(())
}

/// Reads the current settings of `address` and submits the merged settings back.
pub async fn update_address_settings(
    session: &dyn ClientSession,
    address: &str,
    properties: &BrokerProperties,
) -> Result<(), BinderError> {
    debug!("updating address: {} settings", address);

    let to_error = |source: SessionError| {
        error!(
            error = source.to_string(),
            address = address,
            "failure to update address settings"
        );
        BinderError::UpdateAddressSettings {
            address: address.to_owned(),
            source,
        }
    };

    let current = current_address_settings(session, address, properties)
        .await
        .map_err(to_error)?;

    let update = AddressSettingsUpdate::merge(address, &current, properties);
    let request = ManagementRequest::broker(ADD_SETTINGS_OPERATION, update.parameters());

    session
        .request(&properties.management_address, &request)
        .await
        .map_err(to_error)?;

    Ok(())
}

async fn current_address_settings(
    session: &dyn ClientSession,
    address: &str,
    properties: &BrokerProperties,
) -> Result<AddressSettingsInfo, SessionError> {
    let request = ManagementRequest::broker(GET_SETTINGS_OPERATION, vec![json!(address)]);
    let reply = session
        .request(&properties.management_address, &request)
        .await?;

    AddressSettingsInfo::from_json(&reply.result::<String>()?)
}

fn create_address_error(name: &str, source: SessionError) -> BinderError {
    error!(
        error = source.to_string(),
        name = name,
        "error to create the address"
    );
    BinderError::CreateAddress {
        address: name.to_owned(),
        source,
    }
}

fn create_queue_error(address: &str, name: &str, source: SessionError) -> BinderError {
    error!(
        error = source.to_string(),
        name = name,
        address = address,
        "error to create the queue"
    );
    BinderError::CreateQueue {
        queue: name.to_owned(),
        address: address.to_owned(),
        source,
    }
}
