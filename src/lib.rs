// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

mod otel;

#[cfg(test)]
mod testing;

pub mod binder;
pub mod destination;
pub mod errors;
pub mod handler;
pub mod listener;
pub mod message;
pub mod naming;
pub mod properties;
pub mod provisioning;
pub mod retry;
pub mod session;
pub mod settings;
pub mod topology;
