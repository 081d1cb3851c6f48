// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Artemis Message Channel Binder
//!
//! Binds application channels to broker destinations: provisions producer and
//! consumer destinations, creates the producer message handler and builds the
//! consumer endpoint with its retry and error-channel infrastructure.

use crate::{
    destination::{ConsumerDestination, ProducerDestination},
    errors::BinderError,
    handler::{ArtemisMessageHandler, MessageSender},
    listener::{
        ChannelPublishingListener, ListenerContainer, ListenerContainerSpec, MessageChannel,
        MessageDrivenEndpoint, MessageListener,
    },
    naming::{self, AnonymousNames},
    properties::{ConsumerProperties, ExtendedBindingProperties, ProducerProperties},
    provisioning::ProvisioningProvider,
    retry::{ErrorMessageRecoverer, RetryPolicy, RetryingListener},
};
use std::sync::Arc;
use tracing::debug;

/// Resolves the error channel used for exhausted deliveries.
pub trait ErrorChannelRegistry: Send + Sync {
    fn error_channel(&self, name: &str) -> Arc<dyn MessageChannel>;
}

/// Binder connecting application channels to Artemis addresses.
///
/// Owns the collaborators shared by every binding: the provisioner, the
/// sender used by producer handlers, the listener container used by consumer
/// endpoints and the registry of error channels.
pub struct ArtemisMessageChannelBinder {
    provisioner: Arc<dyn ProvisioningProvider>,
    sender: Arc<dyn MessageSender>,
    container: Arc<dyn ListenerContainer>,
    error_channels: Arc<dyn ErrorChannelRegistry>,
    anonymous_names: AnonymousNames,
    binding_properties: ExtendedBindingProperties,
}

impl ArtemisMessageChannelBinder {
    /// Creates a new ArtemisMessageChannelBinder.
    ///
    /// # Parameters
    /// * `provisioner` - Provisions producer and consumer destinations
    /// * `sender` - Sends the messages of producer handlers
    /// * `container` - Opens the subscriptions of consumer endpoints
    /// * `error_channels` - Resolves error channels by name
    pub fn new(
        provisioner: Arc<dyn ProvisioningProvider>,
        sender: Arc<dyn MessageSender>,
        container: Arc<dyn ListenerContainer>,
        error_channels: Arc<dyn ErrorChannelRegistry>,
    ) -> Self {
        ArtemisMessageChannelBinder {
            provisioner,
            sender,
            container,
            error_channels,
            anonymous_names: AnonymousNames::default(),
            binding_properties: ExtendedBindingProperties::default(),
        }
    }

    /// Replaces the source of anonymous subscription names.
    pub fn with_anonymous_names(mut self, names: AnonymousNames) -> Self {
        self.anonymous_names = names;
        self
    }

    pub fn with_binding_properties(mut self, properties: ExtendedBindingProperties) -> Self {
        self.binding_properties = properties;
        self
    }

    /// Provisions the destination of a producer binding.
    ///
    /// # Parameters
    /// * `address` - Logical destination address
    /// * `properties` - Producer properties of the binding
    ///
    /// # Returns
    /// The provisioned ProducerDestination or a provisioning BinderError
    pub async fn provision_producer_destination(
        &self,
        address: &str,
        properties: &ProducerProperties,
    ) -> Result<ProducerDestination, BinderError> {
        self.provisioner
            .provision_producer_destination(address, properties)
            .await
    }

    /// Provisions the destination of a consumer binding.
    ///
    /// # Parameters
    /// * `address` - Logical destination address
    /// * `group` - Consumer group, `None` for an anonymous consumer
    /// * `properties` - Consumer properties of the binding
    ///
    /// # Returns
    /// The provisioned ConsumerDestination or a provisioning BinderError
    pub async fn provision_consumer_destination(
        &self,
        address: &str,
        group: Option<&str>,
        properties: &ConsumerProperties,
    ) -> Result<ConsumerDestination, BinderError> {
        self.provisioner
            .provision_consumer_destination(address, group, properties)
            .await
    }

    /// Creates the handler routing outbound messages to `destination`.
    pub fn create_producer_message_handler(
        &self,
        destination: ProducerDestination,
        _properties: &ProducerProperties,
    ) -> ArtemisMessageHandler {
        ArtemisMessageHandler::new(destination, self.sender.clone())
    }

    /// Builds the endpoint consuming `destination` into `output`.
    ///
    /// The subscription is the group queue `{address}-{group}`, or a fresh
    /// anonymous name when no group is given. With more than one attempt the
    /// listener is wrapped in a `RetryingListener` whose recoverer publishes to
    /// the error channel named by `errors_base_name`. The endpoint is started
    /// when `auto_startup` is set.
    pub async fn create_consumer_endpoint(
        &self,
        destination: &ConsumerDestination,
        group: Option<&str>,
        properties: &ConsumerProperties,
        output: Arc<dyn MessageChannel>,
    ) -> Result<MessageDrivenEndpoint, BinderError> {
        let address = destination.name();
        let subscription_name = match group.filter(|group| !group.is_empty()) {
            Some(group) => naming::queue_name(address, group)?,
            None => self.anonymous_names.queue_name(address)?,
        };

        let spec = ListenerContainerSpec {
            concurrency: properties.concurrency,
            auto_startup: properties.auto_startup,
            ..ListenerContainerSpec::shared_subscription(address, &subscription_name)
        };

        let listener: Arc<dyn MessageListener> = Arc::new(ChannelPublishingListener::new(output));
        let listener = if properties.max_attempts > 1 {
            let error_channel = naming::errors_name(&self.errors_base_name(destination, group)?);
            debug!(
                "retrying subscription: {} up to {} attempts, errors to: {}",
                subscription_name, properties.max_attempts, error_channel
            );

            let recoverer = ErrorMessageRecoverer::new(
                error_channel.clone(),
                self.error_channels.error_channel(&error_channel),
            );
            Arc::new(RetryingListener::new(
                listener,
                RetryPolicy::from_properties(properties),
                Arc::new(recoverer),
            ))
        } else {
            listener
        };

        let endpoint = MessageDrivenEndpoint::new(spec, self.container.clone(), listener);
        if properties.auto_startup {
            endpoint.start().await?;
        }

        Ok(endpoint)
    }

    /// Base of the error channel name for a consumer.
    ///
    /// For an anonymous consumer this is the address itself, not the random
    /// subscription name the endpoint consumes from.
    pub fn errors_base_name(
        &self,
        destination: &ConsumerDestination,
        group: Option<&str>,
    ) -> Result<String, BinderError> {
        match group.filter(|group| !group.is_empty()) {
            Some(group) => naming::queue_name(destination.name(), group),
            None => Ok(destination.name().to_owned()),
        }
    }

    /// Provisions and binds a producer for `channel`, applying the channel's broker settings.
    pub async fn bind_producer(
        &self,
        channel: &str,
        address: &str,
        properties: &ProducerProperties,
    ) -> Result<ArtemisMessageHandler, BinderError> {
        let properties = ProducerProperties {
            broker: self.binding_properties.producer_properties(channel),
            ..properties.clone()
        };

        let destination = self
            .provision_producer_destination(address, &properties)
            .await?;
        Ok(self.create_producer_message_handler(destination, &properties))
    }

    /// Provisions and binds a consumer for `channel`, applying the channel's broker settings.
    pub async fn bind_consumer(
        &self,
        channel: &str,
        address: &str,
        group: Option<&str>,
        properties: &ConsumerProperties,
        output: Arc<dyn MessageChannel>,
    ) -> Result<MessageDrivenEndpoint, BinderError> {
        let properties = ConsumerProperties {
            broker: self.binding_properties.consumer_properties(channel),
            ..properties.clone()
        };

        let destination = self
            .provision_consumer_destination(address, group, &properties)
            .await?;
        self.create_consumer_endpoint(&destination, group, &properties, output)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        errors::HandlerError,
        handler::MockMessageSender,
        message::{HeaderValue, InboundMessage, Message},
        properties::{BindingProperties, BrokerProperties},
        provisioning::ArtemisProvisioningProvider,
        retry::EXCEPTION_MESSAGE_HEADER,
        testing::{wait_until, FakeBroker, FakeContainer, RecordingChannel},
        topology::ArtemisBrokerManager,
    };
    use async_trait::async_trait;
    use rand::{rngs::StdRng, SeedableRng};
    use std::{collections::HashMap, sync::Mutex};

    #[derive(Default)]
    struct Registry {
        channels: Mutex<HashMap<String, Arc<RecordingChannel>>>,
    }

    impl Registry {
        fn channel(&self, name: &str) -> Option<Arc<RecordingChannel>> {
            self.channels.lock().unwrap().get(name).cloned()
        }
    }

    impl ErrorChannelRegistry for Registry {
        fn error_channel(&self, name: &str) -> Arc<dyn MessageChannel> {
            self.channels
                .lock()
                .unwrap()
                .entry(name.to_owned())
                .or_default()
                .clone()
        }
    }

    struct FailingChannel;

    #[async_trait]
    impl MessageChannel for FailingChannel {
        async fn send(&self, _message: Message) -> Result<(), HandlerError> {
            Err("handler failure".into())
        }
    }

    struct Fixture {
        broker: Arc<FakeBroker>,
        container: Arc<FakeContainer>,
        registry: Arc<Registry>,
        binder: ArtemisMessageChannelBinder,
    }

    fn fixture(messages: Vec<InboundMessage>) -> Fixture {
        let broker = Arc::new(FakeBroker::new());
        let manager = Arc::new(ArtemisBrokerManager::new(broker.clone(), None));
        let container = Arc::new(FakeContainer::new(messages));
        let registry = Arc::new(Registry::default());
        let binder = ArtemisMessageChannelBinder::new(
            Arc::new(ArtemisProvisioningProvider::new(manager)),
            Arc::new(MockMessageSender::new()),
            container.clone(),
            registry.clone(),
        )
        .with_anonymous_names(AnonymousNames::new(StdRng::seed_from_u64(7)));

        Fixture {
            broker,
            container,
            registry,
            binder,
        }
    }

    fn consumer_properties(max_attempts: u32) -> ConsumerProperties {
        ConsumerProperties {
            max_attempts,
            back_off_initial_interval: 1,
            back_off_max_interval: 1,
            ..Default::default()
        }
    }

    #[test]
    fn errors_base_name_uses_group_queue() {
        let fixture = fixture(vec![]);
        let destination = ConsumerDestination::new("orders");

        assert_eq!(
            fixture.binder.errors_base_name(&destination, Some("g1")),
            Ok("orders-g1".to_owned())
        );
        assert_eq!(
            fixture.binder.errors_base_name(&destination, None),
            Ok("orders".to_owned())
        );
    }

    #[tokio::test]
    async fn grouped_consumer_subscribes_to_group_queue() {
        let fixture = fixture(vec![]);
        let destination = ConsumerDestination::new("orders");

        let endpoint = fixture
            .binder
            .create_consumer_endpoint(
                &destination,
                Some("g1"),
                &ConsumerProperties {
                    concurrency: 4,
                    ..consumer_properties(1)
                },
                Arc::new(RecordingChannel::default()),
            )
            .await
            .unwrap();

        assert!(endpoint.is_running());
        let spec = &fixture.container.specs()[0];
        assert_eq!(spec.subscription_name, "orders-g1");
        assert_eq!(spec.destination, "orders");
        assert_eq!(spec.concurrency, 4);
        assert!(spec.durable && spec.shared && spec.session_transacted && spec.pub_sub);
    }

    #[tokio::test]
    async fn anonymous_consumer_gets_random_subscription() {
        let fixture = fixture(vec![]);
        let destination = ConsumerDestination::new("orders");

        let first = fixture
            .binder
            .create_consumer_endpoint(
                &destination,
                None,
                &consumer_properties(1),
                Arc::new(RecordingChannel::default()),
            )
            .await
            .unwrap();
        let second = fixture
            .binder
            .create_consumer_endpoint(
                &destination,
                Some(""),
                &consumer_properties(1),
                Arc::new(RecordingChannel::default()),
            )
            .await
            .unwrap();

        let first = first.spec().subscription_name.clone();
        let second = second.spec().subscription_name.clone();
        assert!(first.starts_with("orders-"));
        assert!(second.starts_with("orders-"));
        assert_ne!(first, second);
    }

    #[tokio::test]
    async fn endpoint_without_auto_startup_is_idle() {
        let fixture = fixture(vec![]);

        let endpoint = fixture
            .binder
            .create_consumer_endpoint(
                &ConsumerDestination::new("orders"),
                Some("g1"),
                &ConsumerProperties {
                    auto_startup: false,
                    ..consumer_properties(1)
                },
                Arc::new(RecordingChannel::default()),
            )
            .await
            .unwrap();

        assert!(!endpoint.is_running());
        assert!(fixture.container.specs().is_empty());
    }

    #[tokio::test]
    async fn single_attempt_failure_rolls_back() {
        let fixture = fixture(vec![InboundMessage::text("orders", "payload")]);

        let _endpoint = fixture
            .binder
            .create_consumer_endpoint(
                &ConsumerDestination::new("orders"),
                Some("g1"),
                &consumer_properties(1),
                Arc::new(FailingChannel),
            )
            .await
            .unwrap();

        wait_until(|| fixture.container.events().len() == 1).await;
        assert_eq!(fixture.container.events(), vec!["rollback:0".to_owned()]);
        assert!(fixture.registry.channels.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn exhausted_delivery_goes_to_group_error_channel_and_commits() {
        let fixture = fixture(vec![InboundMessage::text("orders", "payload")]);

        let _endpoint = fixture
            .binder
            .create_consumer_endpoint(
                &ConsumerDestination::new("orders"),
                Some("g1"),
                &consumer_properties(3),
                Arc::new(FailingChannel),
            )
            .await
            .unwrap();

        wait_until(|| fixture.container.events().len() == 1).await;
        assert_eq!(fixture.container.events(), vec!["commit:0".to_owned()]);

        let errors = fixture.registry.channel("orders-g1.errors").unwrap();
        let messages = errors.messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].payload, b"payload");
        assert_eq!(
            messages[0].header(EXCEPTION_MESSAGE_HEADER),
            Some(&HeaderValue::Text("handler failure".to_owned()))
        );
    }

    #[tokio::test]
    async fn anonymous_group_error_channel_uses_address_not_subscription_name() {
        let fixture = fixture(vec![]);

        let endpoint = fixture
            .binder
            .create_consumer_endpoint(
                &ConsumerDestination::new("orders"),
                None,
                &consumer_properties(3),
                Arc::new(RecordingChannel::default()),
            )
            .await
            .unwrap();

        let channels: Vec<String> = fixture
            .registry
            .channels
            .lock()
            .unwrap()
            .keys()
            .cloned()
            .collect();
        assert_eq!(channels, vec!["orders.errors".to_owned()]);
        assert_ne!(
            format!("{}.errors", endpoint.spec().subscription_name),
            "orders.errors"
        );
    }

    #[tokio::test]
    async fn bind_consumer_applies_channel_broker_settings() {
        let mut bindings = HashMap::new();
        bindings.insert(
            "input".to_owned(),
            BindingProperties {
                consumer: BrokerProperties {
                    modify_address_settings: true,
                    auto_bind_dead_letter_address: true,
                    ..Default::default()
                },
                ..Default::default()
            },
        );
        let fixture = fixture(vec![]);
        let binder = fixture.binder.with_binding_properties(ExtendedBindingProperties {
            bindings,
            ..Default::default()
        });

        let endpoint = binder
            .bind_consumer(
                "input",
                "orders",
                Some("g1"),
                &consumer_properties(1),
                Arc::new(RecordingChannel::default()),
            )
            .await
            .unwrap();

        assert_eq!(endpoint.spec().subscription_name, "orders-g1");
        let state = fixture.broker.state();
        assert!(state.addresses.contains(&"orders".to_owned()));
        assert_eq!(state.queues.get("orders.dlq"), Some(&"orders.dlq".to_owned()));
        assert_eq!(state.settings_updates().len(), 1);
    }

    #[tokio::test]
    async fn bind_producer_provisions_required_groups() {
        let fixture = fixture(vec![]);

        let handler = fixture
            .binder
            .bind_producer(
                "output",
                "orders",
                &ProducerProperties {
                    required_groups: vec!["g1".to_owned()],
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(handler.destination().name(), Ok("orders"));
        let state = fixture.broker.state();
        assert_eq!(
            state.created_queues,
            vec![("orders".to_owned(), "orders-g1".to_owned())]
        );
        assert!(state.settings_updates().is_empty());
    }
}
