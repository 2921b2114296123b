//! Exchange, queue and binding declarations.
//!
//! Every declaration is durable and safe to repeat: redeclaring an
//! existing entity with the same attributes is a no-op on the broker,
//! so the supervisor declares the full topology on every reconnect.

use lapin::options::{ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions};
use lapin::types::FieldTable;
use lapin::Channel;
use tracing::{debug, info};

use crate::config::{BrokerConfig, ExchangeType};
use crate::error::{QueueError, QueueResult};

/// One broker-side declaration.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Declaration {
    Exchange { name: String, kind: ExchangeType },
    Queue { name: String },
    Binding { queue: String, exchange: String, routing_key: String },
}

/// Inbound and outbound topology of one worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topology {
    pub exchange_type: ExchangeType,
    pub consume_exchange: String,
    pub consume_queue: String,
    pub consume_routing_key: String,
    pub publish_exchange: String,
    pub publish_routing_key: String,
    pub results_queue: Option<String>,
}

impl Topology {
    pub fn from_config(config: &BrokerConfig) -> Self {
        Self {
            exchange_type: config.exchange_type,
            consume_exchange: config.consume_exchange.clone(),
            consume_queue: config.consume_queue.clone(),
            consume_routing_key: config.consume_routing_key.clone(),
            publish_exchange: config.publish_exchange.clone(),
            publish_routing_key: config.publish_routing_key.clone(),
            results_queue: config.results_queue.clone(),
        }
    }

    /// Declarations in the order they must be applied.
    ///
    /// The default exchange (empty name) is never declared or bound.
    pub fn declarations(&self) -> Vec<Declaration> {
        let mut out = Vec::new();

        if !self.consume_exchange.is_empty() {
            out.push(Declaration::Exchange {
                name: self.consume_exchange.clone(),
                kind: self.exchange_type,
            });
        }
        out.push(Declaration::Queue {
            name: self.consume_queue.clone(),
        });
        if !self.consume_exchange.is_empty() {
            out.push(Declaration::Binding {
                queue: self.consume_queue.clone(),
                exchange: self.consume_exchange.clone(),
                routing_key: self.consume_routing_key.clone(),
            });
        }

        if !self.publish_exchange.is_empty() && self.publish_exchange != self.consume_exchange {
            out.push(Declaration::Exchange {
                name: self.publish_exchange.clone(),
                kind: self.exchange_type,
            });
        }
        if let Some(queue) = &self.results_queue {
            out.push(Declaration::Queue { name: queue.clone() });
            if !self.publish_exchange.is_empty() {
                out.push(Declaration::Binding {
                    queue: queue.clone(),
                    exchange: self.publish_exchange.clone(),
                    routing_key: self.publish_routing_key.clone(),
                });
            }
        }

        out
    }

    /// Apply every declaration on `channel`.
    pub async fn declare(&self, channel: &Channel) -> QueueResult<()> {
        for declaration in self.declarations() {
            debug!(?declaration, "Declaring");
            apply(channel, &declaration).await?;
        }
        info!(
            queue = %self.consume_queue,
            exchange = %self.consume_exchange,
            routing_key = %self.consume_routing_key,
            "Topology declared"
        );
        Ok(())
    }
}

async fn apply(channel: &Channel, declaration: &Declaration) -> QueueResult<()> {
    match declaration {
        Declaration::Exchange { name, kind } => channel
            .exchange_declare(
                name,
                kind.kind(),
                ExchangeDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| QueueError::topology_failed(format!("exchange {}: {}", name, e))),
        Declaration::Queue { name } => channel
            .queue_declare(
                name,
                QueueDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map(|_| ())
            .map_err(|e| QueueError::topology_failed(format!("queue {}: {}", name, e))),
        Declaration::Binding {
            queue,
            exchange,
            routing_key,
        } => channel
            .queue_bind(
                queue,
                exchange,
                routing_key,
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| {
                QueueError::topology_failed(format!(
                    "bind {} -> {} ({}): {}",
                    exchange, queue, routing_key, e
                ))
            }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{HashMap, HashSet};

    /// Broker model with AMQP redeclare semantics: same attributes is a
    /// no-op, a different exchange type is a precondition failure.
    #[derive(Debug, Default, PartialEq)]
    struct BrokerModel {
        exchanges: HashMap<String, ExchangeType>,
        queues: HashSet<String>,
        bindings: HashSet<(String, String, String)>,
    }

    impl BrokerModel {
        fn apply(&mut self, declaration: &Declaration) -> Result<(), String> {
            match declaration {
                Declaration::Exchange { name, kind } => match self.exchanges.get(name) {
                    Some(existing) if existing != kind => Err(format!("PRECONDITION_FAILED {}", name)),
                    _ => {
                        self.exchanges.insert(name.clone(), *kind);
                        Ok(())
                    }
                },
                Declaration::Queue { name } => {
                    self.queues.insert(name.clone());
                    Ok(())
                }
                Declaration::Binding { queue, exchange, routing_key } => {
                    if !self.queues.contains(queue) || !self.exchanges.contains_key(exchange) {
                        return Err(format!("NOT_FOUND {} / {}", queue, exchange));
                    }
                    self.bindings
                        .insert((queue.clone(), exchange.clone(), routing_key.clone()));
                    Ok(())
                }
            }
        }
    }

    fn topology() -> Topology {
        Topology::from_config(&BrokerConfig::for_tool("demucs"))
    }

    #[test]
    fn test_declaration_order_is_valid() {
        let mut broker = BrokerModel::default();
        for d in topology().declarations() {
            broker.apply(&d).unwrap();
        }
        assert_eq!(broker.exchanges.len(), 2);
        assert!(broker.bindings.contains(&(
            "demucs_tasks_queue".to_string(),
            "audio_processing_exchange".to_string(),
            "demucs.task".to_string()
        )));
        assert!(broker.bindings.contains(&(
            "demucs_results_default_queue".to_string(),
            "results_exchange".to_string(),
            "task.result.demucs".to_string()
        )));
    }

    #[test]
    fn test_declaration_is_idempotent() {
        let topology = topology();
        let mut once = BrokerModel::default();
        for d in topology.declarations() {
            once.apply(&d).unwrap();
        }

        let mut twice = BrokerModel::default();
        for _ in 0..2 {
            for d in topology.declarations() {
                twice.apply(&d).unwrap();
            }
        }
        assert_eq!(once, twice);
    }

    #[test]
    fn test_default_exchange_is_skipped() {
        let mut config = BrokerConfig::for_tool("whisper");
        config.consume_exchange = String::new();
        config.publish_exchange = String::new();
        config.results_queue = None;
        let decls = Topology::from_config(&config).declarations();

        assert_eq!(
            decls,
            vec![Declaration::Queue {
                name: "whisper_tasks_queue".to_string()
            }]
        );
    }
}
