// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Destination Provisioning
//!
//! Realizes producer and consumer destinations on the broker.
//!
//! Producers get their address (or one address per partition) plus a durable
//! queue for every required group, so messages are kept until the group's
//! consumers show up. Consumers only get their address: the group queue is
//! the durable shared subscription created when the consumer endpoint binds.
//!
//! Nothing is rolled back on failure. Artifacts created before the failing
//! step stay on the broker and provisioning the whole destination again is
//! the recovery path.

use crate::{
    destination::{ConsumerDestination, ProducerDestination},
    errors::BinderError,
    naming,
    properties::{BrokerProperties, ConsumerProperties, ProducerProperties},
    topology::BrokerManager,
};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

/// Trait realizing binding destinations on the broker.
#[async_trait]
pub trait ProvisioningProvider: Send + Sync {
    /// Provisions the address(es) and required group queues of a producer binding.
    ///
    /// # Parameters
    /// * `address` - Logical destination address
    /// * `properties` - Partitioning, required groups and broker settings of the binding
    ///
    /// # Returns
    /// The provisioned destination or a provisioning BinderError
    async fn provision_producer_destination(
        &self,
        address: &str,
        properties: &ProducerProperties,
    ) -> Result<ProducerDestination, BinderError>;

    /// Provisions the address a consumer binding subscribes to.
    ///
    /// # Parameters
    /// * `address` - Logical destination address
    /// * `group` - Consumer group, `None` for an anonymous consumer
    /// * `properties` - Partitioning and broker settings of the binding
    ///
    /// # Returns
    /// The consumer destination or a provisioning BinderError
    async fn provision_consumer_destination(
        &self,
        address: &str,
        group: Option<&str>,
        properties: &ConsumerProperties,
    ) -> Result<ConsumerDestination, BinderError>;
}

/// Provisioner creating destinations through a `BrokerManager`.
pub struct ArtemisProvisioningProvider {
    broker: Arc<dyn BrokerManager>,
}

impl ArtemisProvisioningProvider {
    /// Creates a new ArtemisProvisioningProvider.
    ///
    /// # Parameters
    /// * `broker` - Broker manager creating addresses and queues
    pub fn new(broker: Arc<dyn BrokerManager>) -> Self {
        ArtemisProvisioningProvider { broker }
    }

    async fn provision_address(
        &self,
        address: &str,
        groups: &[String],
        properties: &BrokerProperties,
    ) -> Result<(), BinderError> {
        self.broker.create_address(address, properties).await?;

        for group in groups {
            let queue = naming::queue_name(address, group)?;
            self.broker.create_queue(address, &queue).await?;
        }

        Ok(())
    }
}

#[async_trait]
impl ProvisioningProvider for ArtemisProvisioningProvider {
    /// Provisions the addresses and required group queues of a producer.
    ///
    /// A partitioned destination gets one address per partition, named
    /// `{address}-{partition}`, each with its own group queues.
    async fn provision_producer_destination(
        &self,
        address: &str,
        properties: &ProducerProperties,
    ) -> Result<ProducerDestination, BinderError> {
        debug!("provisioning producer destination: {}", address);
        naming::require(address, "address")?;

        if !properties.partitioned {
            self.provision_address(address, &properties.required_groups, &properties.broker)
                .await?;
            return Ok(ProducerDestination::unpartitioned(address));
        }

        let mut names = Vec::with_capacity(properties.partition_count);
        for partition in 0..properties.partition_count {
            let partition_address = naming::partition_address(address, partition)?;
            self.provision_address(
                &partition_address,
                &properties.required_groups,
                &properties.broker,
            )
            .await?;
            names.push(partition_address);
        }

        Ok(ProducerDestination::partitioned(names))
    }

    /// Provisions the address of a consumer, `{address}-{instance}` when partitioned.
    async fn provision_consumer_destination(
        &self,
        address: &str,
        group: Option<&str>,
        properties: &ConsumerProperties,
    ) -> Result<ConsumerDestination, BinderError> {
        debug!(
            "provisioning consumer destination: {} for group: {}",
            address,
            group.unwrap_or("<anonymous>")
        );

        let target = if properties.partitioned {
            naming::partition_address(address, properties.instance_index)?
        } else {
            naming::require(address, "address")?.to_owned()
        };

        self.broker
            .create_address(&target, &properties.broker)
            .await?;

        Ok(ConsumerDestination::new(target))
    }
}
