// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Provisioned Destinations
//!
//! A producer destination is either a single address or an ordered list of
//! per-partition addresses. Asking a destination for the kind of name it does
//! not have is a usage error.

use crate::errors::BinderError;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProducerDestination {
    Unpartitioned { name: String },
    /// Partition addresses, indexed by partition
    Partitioned { names: Vec<String> },
}

impl ProducerDestination {
    pub fn unpartitioned(name: impl Into<String>) -> Self {
        ProducerDestination::Unpartitioned { name: name.into() }
    }

    pub fn partitioned(names: Vec<String>) -> Self {
        ProducerDestination::Partitioned { names }
    }

    pub fn is_partitioned(&self) -> bool {
        matches!(self, ProducerDestination::Partitioned { .. })
    }

    /// Returns the single address of an unpartitioned destination.
    ///
    /// # Returns
    /// The address or BinderError::PartitionedName for a partitioned destination
    pub fn name(&self) -> Result<&str, BinderError> {
        match self {
            ProducerDestination::Unpartitioned { name } => Ok(name),
            ProducerDestination::Partitioned { .. } => Err(BinderError::PartitionedName),
        }
    }

    /// Returns the address of `partition`.
    ///
    /// # Parameters
    /// * `partition` - Partition index, valid in `[0, partition count)`
    ///
    /// # Returns
    /// The partition address, BinderError::UnpartitionedName for an
    /// unpartitioned destination or BinderError::InvalidPartition when out of range
    pub fn name_for_partition(&self, partition: i64) -> Result<&str, BinderError> {
        match self {
            ProducerDestination::Unpartitioned { .. } => Err(BinderError::UnpartitionedName),
            ProducerDestination::Partitioned { names } => usize::try_from(partition)
                .ok()
                .and_then(|index| names.get(index))
                .map(String::as_str)
                .ok_or(BinderError::InvalidPartition {
                    partition,
                    count: names.len(),
                }),
        }
    }
}

impl fmt::Display for ProducerDestination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProducerDestination::Unpartitioned { name } => write!(f, "{}", name),
            ProducerDestination::Partitioned { names } => write!(f, "[{}]", names.join(", ")),
        }
    }
}

/// Address a consumer binds to, already resolved to its partition when partitioned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumerDestination {
    name: String,
}

impl ConsumerDestination {
    pub fn new(name: impl Into<String>) -> Self {
        ConsumerDestination { name: name.into() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for ConsumerDestination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}
