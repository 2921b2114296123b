//! Broker configuration.

use std::str::FromStr;
use std::time::Duration;

use lapin::ExchangeKind;
use serde::{Deserialize, Serialize};

use crate::error::{QueueError, QueueResult};
use crate::state::RetryPolicy;

/// Exchange type shared by the inbound and outbound exchanges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExchangeType {
    #[default]
    Direct,
    Topic,
    Fanout,
}

impl ExchangeType {
    pub fn kind(&self) -> ExchangeKind {
        match self {
            ExchangeType::Direct => ExchangeKind::Direct,
            ExchangeType::Topic => ExchangeKind::Topic,
            ExchangeType::Fanout => ExchangeKind::Fanout,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ExchangeType::Direct => "direct",
            ExchangeType::Topic => "topic",
            ExchangeType::Fanout => "fanout",
        }
    }
}

impl FromStr for ExchangeType {
    type Err = QueueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "direct" => Ok(ExchangeType::Direct),
            "topic" => Ok(ExchangeType::Topic),
            "fanout" => Ok(ExchangeType::Fanout),
            other => Err(QueueError::config(format!("unknown exchange type '{}'", other))),
        }
    }
}

/// Broker connection and topology settings.
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub vhost: String,
    pub heartbeat_secs: u16,

    pub consume_exchange: String,
    pub consume_queue: String,
    pub consume_routing_key: String,

    pub publish_exchange: String,
    pub publish_routing_key: String,
    /// Queue bound to the publish exchange so results are kept even when
    /// no consumer is attached yet. `None` leaves routing to other bindings.
    pub results_queue: Option<String>,

    pub exchange_type: ExchangeType,

    /// Delay between reconnect attempts
    pub reconnect_delay: Duration,
    /// Consecutive failures tolerated before giving up; 0 = unlimited
    pub max_retries: u32,
}

impl BrokerConfig {
    /// Defaults for a worker running `tool`.
    pub fn for_tool(tool: &str) -> Self {
        Self {
            host: "rabbitmq".to_string(),
            port: 5672,
            user: "user".to_string(),
            password: "password".to_string(),
            vhost: "/".to_string(),
            heartbeat_secs: 600,
            consume_exchange: "audio_processing_exchange".to_string(),
            consume_queue: format!("{}_tasks_queue", tool),
            consume_routing_key: format!("{}.task", tool),
            publish_exchange: "results_exchange".to_string(),
            publish_routing_key: format!("task.result.{}", tool),
            results_queue: Some(format!("{}_results_default_queue", tool)),
            exchange_type: ExchangeType::Direct,
            reconnect_delay: Duration::from_secs(5),
            max_retries: 0,
        }
    }

    /// Create config from environment variables.
    pub fn from_env(tool: &str) -> QueueResult<Self> {
        let d = Self::for_tool(tool);

        Ok(Self {
            host: var_or("RABBITMQ_HOST", d.host),
            port: parse_var("RABBITMQ_PORT", d.port)?,
            user: var_or("RABBITMQ_USER", d.user),
            password: var_or("RABBITMQ_PASS", d.password),
            vhost: var_or("RABBITMQ_VHOST", d.vhost),
            heartbeat_secs: parse_var("RABBITMQ_HEARTBEAT_SECS", d.heartbeat_secs)?,
            consume_exchange: var_or("RABBITMQ_CONSUME_EXCHANGE", d.consume_exchange),
            consume_queue: var_or("RABBITMQ_CONSUME_QUEUE", d.consume_queue),
            consume_routing_key: var_or("RABBITMQ_CONSUME_ROUTING_KEY", d.consume_routing_key),
            publish_exchange: var_or("RABBITMQ_PUBLISH_EXCHANGE", d.publish_exchange),
            publish_routing_key: var_or("RABBITMQ_PUBLISH_ROUTING_KEY", d.publish_routing_key),
            results_queue: match std::env::var("RABBITMQ_RESULTS_QUEUE") {
                Ok(v) if v.trim().eq_ignore_ascii_case("none") => None,
                Ok(v) if !v.trim().is_empty() => Some(v.trim().to_string()),
                _ => d.results_queue,
            },
            exchange_type: match std::env::var("RABBITMQ_EXCHANGE_TYPE") {
                Ok(v) if !v.trim().is_empty() => v.parse()?,
                _ => d.exchange_type,
            },
            reconnect_delay: Duration::from_secs(parse_var(
                "RECONNECT_DELAY_SECONDS",
                d.reconnect_delay.as_secs(),
            )?),
            max_retries: parse_var("MAX_RETRIES_RABBITMQ", d.max_retries)?,
        })
    }

    /// AMQP URI with percent-encoded credentials and vhost.
    pub fn amqp_uri(&self) -> String {
        format!(
            "amqp://{}:{}@{}:{}/{}?heartbeat={}",
            urlencoding::encode(&self.user),
            urlencoding::encode(&self.password),
            self.host,
            self.port,
            urlencoding::encode(&self.vhost),
            self.heartbeat_secs
        )
    }

    /// URI with the password masked, for logs.
    pub fn redacted_uri(&self) -> String {
        format!(
            "amqp://{}:***@{}:{}/{}",
            self.user,
            self.host,
            self.port,
            urlencoding::encode(&self.vhost)
        )
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.reconnect_delay, self.max_retries)
    }
}

fn var_or(key: &str, default: String) -> String {
    std::env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or(default)
}

fn parse_var<T: FromStr>(key: &str, default: T) -> QueueResult<T> {
    match std::env::var(key) {
        Ok(v) if !v.trim().is_empty() => v
            .trim()
            .parse()
            .map_err(|_| QueueError::config(format!("{} has invalid value '{}'", key, v))),
        _ => Ok(default),
    }
}
