//! Broker connection supervisor.
//!
//! Owns the connection and channel, declares topology, consumes with a
//! prefetch of one, and reconnects after a fixed delay when the
//! connection is lost. The lifecycle follows [`crate::state::transition`].

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use lapin::options::{BasicConsumeOptions, BasicQosOptions, ConfirmSelectOptions};
use lapin::types::FieldTable;
use lapin::{Channel, Connection, ConnectionProperties, Consumer};
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::config::BrokerConfig;
use crate::delivery::InboundMessage;
use crate::dispatch::{drive, ConsumeExit, MessageHandler};
use crate::error::{QueueError, QueueResult};
use crate::metrics;
use crate::publisher::{PublishTarget, ResultPublisher};
use crate::state::{transition, ConnectionEvent, ConnectionState, RetryPolicy};
use crate::topology::Topology;

/// Unacknowledged deliveries the broker may push to this consumer.
pub const PREFETCH_COUNT: u16 = 1;

struct Session {
    connection: Connection,
    channel: Channel,
}

impl Session {
    async fn close(self) {
        if let Err(e) = self.channel.close(200, "closing").await {
            warn!("Channel close failed: {}", e);
        }
        if let Err(e) = self.connection.close(200, "closing").await {
            warn!("Connection close failed: {}", e);
        }
    }
}

/// Drives the broker connection lifecycle for one worker process.
pub struct ConnectionSupervisor {
    config: BrokerConfig,
    topology: Topology,
    policy: RetryPolicy,
    service: String,
    handler: Arc<dyn MessageHandler>,
    shutdown: watch::Receiver<bool>,
}

impl ConnectionSupervisor {
    pub fn new(
        config: BrokerConfig,
        service: impl Into<String>,
        handler: Arc<dyn MessageHandler>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            topology: Topology::from_config(&config),
            policy: config.retry_policy(),
            service: service.into(),
            config,
            handler,
            shutdown,
        }
    }

    fn publish_target(&self) -> PublishTarget {
        PublishTarget {
            exchange: self.config.publish_exchange.clone(),
            routing_key: self.config.publish_routing_key.clone(),
            service: self.service.clone(),
        }
    }

    /// Run until shutdown (`Ok`) or until the retry budget is exhausted.
    pub async fn run(mut self) -> QueueResult<()> {
        let mut state = ConnectionState::initial();
        let mut session: Option<Session> = None;
        let mut consumer: Option<Consumer> = None;

        info!(
            broker = %self.config.redacted_uri(),
            queue = %self.config.consume_queue,
            "Starting connection supervisor"
        );

        loop {
            let event = match state {
                ConnectionState::Disconnected { failures } => {
                    let delay = self.policy.delay_before(failures);
                    if !delay.is_zero() {
                        info!(
                            failures,
                            max_retries = self.policy.max_retries,
                            "Reconnecting in {}s",
                            delay.as_secs()
                        );
                    }
                    if self.sleep_or_shutdown(delay).await {
                        ConnectionEvent::ShutdownRequested
                    } else {
                        ConnectionEvent::Dial
                    }
                }

                ConnectionState::Connecting { failures } => {
                    let mut shutdown = self.shutdown.clone();
                    let attempt = tokio::select! {
                        result = self.connect() => Some(result),
                        _ = wait_for_stop(&mut shutdown) => None,
                    };
                    match attempt {
                        None => ConnectionEvent::ShutdownRequested,
                        Some(Ok(opened)) => {
                            if failures > 0 {
                                metrics::record_reconnect();
                                info!(after_failures = failures, "Reconnected to broker");
                            }
                            session = Some(opened);
                            ConnectionEvent::Connected
                        }
                        Some(Err(e)) => {
                            warn!(attempt = failures + 1, "Broker connection failed: {}", e);
                            ConnectionEvent::Lost
                        }
                    }
                }

                ConnectionState::Declaring => match session.as_ref() {
                    Some(open) => match self.prepare(&open.channel).await {
                        Ok(registered) => {
                            consumer = Some(registered);
                            ConnectionEvent::Declared
                        }
                        Err(e) => {
                            warn!("Broker setup failed: {}", e);
                            close(&mut session).await;
                            ConnectionEvent::Lost
                        }
                    },
                    None => ConnectionEvent::Lost,
                },

                ConnectionState::Consuming => {
                    let exit = match (session.as_ref(), consumer.take()) {
                        (Some(open), Some(registered)) => {
                            info!(queue = %self.config.consume_queue, "Waiting for tasks");
                            let publisher = ResultPublisher::new(
                                Arc::new(open.channel.clone()),
                                self.publish_target(),
                            );
                            let stream = Box::pin(registered.map(|d| d.map(InboundMessage::from)));
                            drive(
                                stream,
                                self.handler.as_ref(),
                                &publisher,
                                &open.channel,
                                &mut self.shutdown,
                            )
                            .await
                        }
                        _ => ConsumeExit::StreamEnded,
                    };

                    match exit {
                        ConsumeExit::Shutdown => ConnectionEvent::ShutdownRequested,
                        lost => {
                            warn!(reason = ?lost, "Broker connection lost");
                            close(&mut session).await;
                            ConnectionEvent::Lost
                        }
                    }
                }

                ConnectionState::ShuttingDown => {
                    info!("Shutting down broker connection");
                    close(&mut session).await;
                    return Ok(());
                }

                ConnectionState::Failed { failures } => {
                    error!(
                        failures,
                        max_retries = self.policy.max_retries,
                        "Broker retry budget exhausted"
                    );
                    close(&mut session).await;
                    return Err(QueueError::RetriesExhausted { attempts: failures });
                }
            };

            state = transition(state, event, &self.policy);
        }
    }

    async fn connect(&self) -> QueueResult<Session> {
        let connection = Connection::connect(
            &self.config.amqp_uri(),
            ConnectionProperties::default()
                .with_connection_name(format!("tonework-{}", self.service).into()),
        )
        .await
        .map_err(|e| QueueError::connection_failed(format!("RabbitMQ connection failed: {}", e)))?;

        let channel = connection
            .create_channel()
            .await
            .map_err(|e| QueueError::connection_failed(format!("RabbitMQ channel creation failed: {}", e)))?;

        info!(broker = %self.config.redacted_uri(), "Connected to broker");
        Ok(Session { connection, channel })
    }

    /// Declare topology, enable confirms, set prefetch and register the consumer.
    async fn prepare(&self, channel: &Channel) -> QueueResult<Consumer> {
        self.topology.declare(channel).await?;

        channel
            .confirm_select(ConfirmSelectOptions::default())
            .await
            .map_err(|e| QueueError::connection_failed(format!("confirm_select failed: {}", e)))?;

        channel
            .basic_qos(PREFETCH_COUNT, BasicQosOptions::default())
            .await
            .map_err(|e| QueueError::connection_failed(format!("Failed to set QoS: {}", e)))?;

        let consumer = channel
            .basic_consume(
                &self.config.consume_queue,
                &format!("tonework-{}", self.service),
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| QueueError::connection_failed(format!("basic_consume failed: {}", e)))?;

        Ok(consumer)
    }

    /// Sleep for `delay`; returns true if shutdown was requested.
    async fn sleep_or_shutdown(&self, delay: Duration) -> bool {
        let mut shutdown = self.shutdown.clone();
        if *shutdown.borrow() {
            return true;
        }
        if delay.is_zero() {
            return false;
        }
        tokio::select! {
            _ = tokio::time::sleep(delay) => *shutdown.borrow(),
            _ = wait_for_stop(&mut shutdown) => true,
        }
    }
}

async fn close(session: &mut Option<Session>) {
    if let Some(open) = session.take() {
        open.close().await;
    }
}

/// Resolves once the stop flag is set or its sender is gone.
async fn wait_for_stop(shutdown: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow() {
            return;
        }
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}
