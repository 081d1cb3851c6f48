// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! In-memory broker used by the unit tests.

use crate::{
    errors::{HandlerError, SessionError},
    listener::{
        Delivery, DeliveryStream, ListenerContainer, ListenerContainerSpec, MessageChannel,
        TransactedSession,
    },
    message::{InboundMessage, Message},
    session::{
        AddressQuery, ClientSession, ManagementReply, ManagementRequest, QueueQuery, RoutingType,
        ServerLocator, SessionOptions,
    },
    settings::{ADD_SETTINGS_OPERATION, GET_SETTINGS_OPERATION},
};
use async_trait::async_trait;
use futures_util::{stream, StreamExt};
use serde_json::{json, Value};
use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

#[derive(Debug, Default)]
pub(crate) struct BrokerState {
    pub addresses: Vec<String>,
    pub queues: HashMap<String, String>,
    pub created_addresses: Vec<String>,
    pub created_queues: Vec<(String, String)>,
    pub settings: HashMap<String, String>,
    pub requests: Vec<(String, ManagementRequest)>,
    pub sessions_opened: usize,
    pub sessions_closed: usize,
    pub starts: usize,
    pub stops: usize,
    pub authenticated: Vec<SessionOptions>,
    pub refuse_connections: bool,
    pub refuse_queue_creation: bool,
}

impl BrokerState {
    pub fn settings_updates(&self) -> Vec<Vec<Value>> {
        self.requests
            .iter()
            .filter(|(_, request)| request.operation == ADD_SETTINGS_OPERATION)
            .map(|(_, request)| request.parameters.clone())
            .collect()
    }
}

pub(crate) struct FakeBroker {
    state: Arc<Mutex<BrokerState>>,
    pre_acknowledge: bool,
    ack_batch_size: i32,
}

impl FakeBroker {
    pub fn new() -> Self {
        FakeBroker {
            state: Arc::new(Mutex::new(BrokerState::default())),
            pre_acknowledge: false,
            ack_batch_size: 1024 * 1024,
        }
    }

    pub fn with_locator_flags(mut self, pre_acknowledge: bool, ack_batch_size: i32) -> Self {
        self.pre_acknowledge = pre_acknowledge;
        self.ack_batch_size = ack_batch_size;
        self
    }

    pub fn with_address(self, name: &str) -> Self {
        self.state().addresses.push(name.to_owned());
        self
    }

    pub fn with_queue(self, queue: &str, address: &str) -> Self {
        self.state()
            .queues
            .insert(queue.to_owned(), address.to_owned());
        self
    }

    pub fn with_settings(self, address: &str, json: &str) -> Self {
        self.state()
            .settings
            .insert(address.to_owned(), json.to_owned());
        self
    }

    pub fn state(&self) -> MutexGuard<'_, BrokerState> {
        self.state.lock().unwrap()
    }

    fn session(&self) -> Box<dyn ClientSession> {
        self.state().sessions_opened += 1;
        Box::new(FakeSession {
            state: self.state.clone(),
        })
    }
}

#[async_trait]
impl ServerLocator for FakeBroker {
    async fn create_session(&self) -> Result<Box<dyn ClientSession>, SessionError> {
        if self.state().refuse_connections {
            return Err(SessionError::Connection("refused".to_owned()));
        }

        Ok(self.session())
    }

    async fn create_authenticated_session(
        &self,
        options: &SessionOptions,
    ) -> Result<Box<dyn ClientSession>, SessionError> {
        if self.state().refuse_connections {
            return Err(SessionError::Connection("refused".to_owned()));
        }

        self.state().authenticated.push(options.clone());
        Ok(self.session())
    }

    fn is_pre_acknowledge(&self) -> bool {
        self.pre_acknowledge
    }

    fn ack_batch_size(&self) -> i32 {
        self.ack_batch_size
    }
}

struct FakeSession {
    state: Arc<Mutex<BrokerState>>,
}

impl FakeSession {
    fn state(&self) -> MutexGuard<'_, BrokerState> {
        self.state.lock().unwrap()
    }
}

#[async_trait]
impl ClientSession for FakeSession {
    async fn start(&self) -> Result<(), SessionError> {
        self.state().starts += 1;
        Ok(())
    }

    async fn stop(&self) -> Result<(), SessionError> {
        self.state().stops += 1;
        Ok(())
    }

    async fn close(&self) -> Result<(), SessionError> {
        self.state().sessions_closed += 1;
        Ok(())
    }

    async fn address_query(&self, name: &str) -> Result<AddressQuery, SessionError> {
        Ok(AddressQuery {
            exists: self.state().addresses.iter().any(|a| a == name),
        })
    }

    async fn queue_query(&self, name: &str) -> Result<QueueQuery, SessionError> {
        let address = self.state().queues.get(name).cloned();

        Ok(QueueQuery {
            exists: address.is_some(),
            address,
        })
    }

    async fn create_address(
        &self,
        name: &str,
        _routing: RoutingType,
        _durable: bool,
    ) -> Result<(), SessionError> {
        let mut state = self.state();
        state.created_addresses.push(name.to_owned());
        if !state.addresses.iter().any(|a| a == name) {
            state.addresses.push(name.to_owned());
        }
        Ok(())
    }

    async fn create_shared_queue(
        &self,
        address: &str,
        _routing: RoutingType,
        name: &str,
        _durable: bool,
    ) -> Result<(), SessionError> {
        let mut state = self.state();
        if state.refuse_queue_creation {
            return Err(SessionError::Operation("queue creation refused".to_owned()));
        }

        state
            .created_queues
            .push((address.to_owned(), name.to_owned()));
        state.queues.insert(name.to_owned(), address.to_owned());
        Ok(())
    }

    async fn request(
        &self,
        management_address: &str,
        request: &ManagementRequest,
    ) -> Result<ManagementReply, SessionError> {
        let mut state = self.state();
        state
            .requests
            .push((management_address.to_owned(), request.clone()));

        match request.operation.as_str() {
            GET_SETTINGS_OPERATION => {
                let address = request
                    .parameters
                    .first()
                    .and_then(Value::as_str)
                    .unwrap_or_default();
                let settings = state
                    .settings
                    .get(address)
                    .cloned()
                    .unwrap_or_else(|| "{}".to_owned());
                Ok(ManagementReply::new(json!([settings])))
            }
            ADD_SETTINGS_OPERATION => Ok(ManagementReply::new(json!([null]))),
            other => Err(SessionError::Management(format!(
                "unknown operation {}",
                other
            ))),
        }
    }
}

/// Polls `condition` until it holds, failing the test after about a second.
pub(crate) async fn wait_until(condition: impl Fn() -> bool) {
    for _ in 0..100 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached");
}

struct RecordingSession {
    id: usize,
    events: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl TransactedSession for RecordingSession {
    async fn commit(self: Box<Self>) -> Result<(), SessionError> {
        self.events.lock().unwrap().push(format!("commit:{}", self.id));
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), SessionError> {
        self.events.lock().unwrap().push(format!("rollback:{}", self.id));
        Ok(())
    }
}

/// Listener container delivering a fixed set of messages, then staying open.
pub(crate) struct FakeContainer {
    messages: Mutex<Vec<InboundMessage>>,
    specs: Mutex<Vec<ListenerContainerSpec>>,
    events: Arc<Mutex<Vec<String>>>,
    refuse: bool,
}

impl FakeContainer {
    pub fn new(messages: Vec<InboundMessage>) -> Self {
        FakeContainer {
            messages: Mutex::new(messages),
            specs: Mutex::default(),
            events: Arc::default(),
            refuse: false,
        }
    }

    pub fn refusing() -> Self {
        FakeContainer {
            refuse: true,
            ..FakeContainer::new(vec![])
        }
    }

    /// Commit and rollback events, tagged with the delivery index.
    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    pub fn specs(&self) -> Vec<ListenerContainerSpec> {
        self.specs.lock().unwrap().clone()
    }
}

#[async_trait]
impl ListenerContainer for FakeContainer {
    async fn subscribe(&self, spec: &ListenerContainerSpec) -> Result<DeliveryStream, SessionError> {
        tokio::task::yield_now().await;
        if self.refuse {
            return Err(SessionError::Connection("refused".to_owned()));
        }

        self.specs.lock().unwrap().push(spec.clone());
        let messages = std::mem::take(&mut *self.messages.lock().unwrap());
        let deliveries: Vec<Result<Delivery, SessionError>> = messages
            .into_iter()
            .enumerate()
            .map(|(id, message)| {
                Ok(Delivery {
                    message,
                    session: Box::new(RecordingSession {
                        id,
                        events: self.events.clone(),
                    }),
                })
            })
            .collect();

        Ok(stream::iter(deliveries).chain(stream::pending()).boxed())
    }
}

#[derive(Default)]
pub(crate) struct RecordingChannel {
    messages: Mutex<Vec<Message>>,
}

impl RecordingChannel {
    pub fn messages(&self) -> Vec<Message> {
        self.messages.lock().unwrap().clone()
    }

    pub fn payloads(&self) -> Vec<Vec<u8>> {
        self.messages().into_iter().map(|m| m.payload).collect()
    }
}

#[async_trait]
impl MessageChannel for RecordingChannel {
    async fn send(&self, message: Message) -> Result<(), HandlerError> {
        self.messages.lock().unwrap().push(message);
        Ok(())
    }
}
