//! Application configuration loaded from environment variables.

use std::time::Duration;

use saga::OrchestratorConfig;
use thiserror::Error;

/// A variable was set to something that cannot be parsed.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid value {value:?} for {name}: {reason}")]
pub struct ConfigError {
    pub name: &'static str,
    pub value: String,
    pub reason: String,
}

/// Process configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST` (default `"0.0.0.0"`), `PORT` (default `8080`), `RUST_LOG` (default `"info"`)
/// - `DATABASE_URL`: PostgreSQL order store; unset keeps orders in memory
/// - `KAFKA_BROKERS`: comma-separated brokers; unset runs an in-process broker
///   with the assembly and notification consumers inside this process
/// - `ORDER_PAID_TOPIC_NAME`, `ORDER_ASSEMBLED_TOPIC_NAME`
/// - `ORDER_ASSEMBLED_CONSUMER_GROUP_ID`, `ASSEMBLY_CONSUMER_GROUP_ID`,
///   `NOTIFICATION_ORDER_PAID_CONSUMER_GROUP_ID`,
///   `NOTIFICATION_ORDER_ASSEMBLED_CONSUMER_GROUP_ID`: one group per
///   service and topic
/// - `INVENTORY_TIMEOUT_MS`, `PAYMENT_TIMEOUT_MS`, `SHUTDOWN_TIMEOUT_MS`,
///   `ASSEMBLY_BUILD_TIME_SECS`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub database_url: Option<String>,
    pub kafka_brokers: Option<Vec<String>>,
    pub order_paid_topic: String,
    pub order_assembled_topic: String,
    pub order_assembled_group_id: String,
    pub assembly_group_id: String,
    pub notification_paid_group_id: String,
    pub notification_assembled_group_id: String,
    pub inventory_timeout: Duration,
    pub payment_timeout: Duration,
    pub shutdown_timeout: Duration,
    pub assembly_build_time: Duration,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Loads configuration through `lookup`, which returns a variable's value
    /// if it is set.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let string = |name: &str, default: String| lookup(name).unwrap_or(default);
        let millis = |name: &'static str, default: Duration| {
            parse(&lookup, name).map(|v| v.map(Duration::from_millis).unwrap_or(default))
        };

        Ok(Self {
            host: string("HOST", defaults.host),
            port: parse(&lookup, "PORT")?.unwrap_or(defaults.port),
            log_level: string("RUST_LOG", defaults.log_level),
            database_url: lookup("DATABASE_URL").filter(|url| !url.is_empty()),
            kafka_brokers: lookup("KAFKA_BROKERS")
                .map(|list| {
                    list.split(',')
                        .map(str::trim)
                        .filter(|b| !b.is_empty())
                        .map(String::from)
                        .collect::<Vec<_>>()
                })
                .filter(|brokers| !brokers.is_empty()),
            order_paid_topic: string("ORDER_PAID_TOPIC_NAME", defaults.order_paid_topic),
            order_assembled_topic: string(
                "ORDER_ASSEMBLED_TOPIC_NAME",
                defaults.order_assembled_topic,
            ),
            order_assembled_group_id: string(
                "ORDER_ASSEMBLED_CONSUMER_GROUP_ID",
                defaults.order_assembled_group_id,
            ),
            assembly_group_id: string("ASSEMBLY_CONSUMER_GROUP_ID", defaults.assembly_group_id),
            notification_paid_group_id: string(
                "NOTIFICATION_ORDER_PAID_CONSUMER_GROUP_ID",
                defaults.notification_paid_group_id,
            ),
            notification_assembled_group_id: string(
                "NOTIFICATION_ORDER_ASSEMBLED_CONSUMER_GROUP_ID",
                defaults.notification_assembled_group_id,
            ),
            inventory_timeout: millis("INVENTORY_TIMEOUT_MS", defaults.inventory_timeout)?,
            payment_timeout: millis("PAYMENT_TIMEOUT_MS", defaults.payment_timeout)?,
            shutdown_timeout: millis("SHUTDOWN_TIMEOUT_MS", defaults.shutdown_timeout)?,
            assembly_build_time: parse(&lookup, "ASSEMBLY_BUILD_TIME_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.assembly_build_time),
        })
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn orchestrator(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            inventory_timeout: self.inventory_timeout,
            payment_timeout: self.payment_timeout,
        }
    }
}

fn parse<T>(
    lookup: impl Fn(&str) -> Option<String>,
    name: &'static str,
) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let Some(value) = lookup(name) else {
        return Ok(None);
    };
    let parsed = value.trim().parse::<T>();
    match parsed {
        Ok(v) => Ok(Some(v)),
        Err(e) => Err(ConfigError {
            name,
            reason: e.to_string(),
            value,
        }),
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            log_level: "info".to_string(),
            database_url: None,
            kafka_brokers: None,
            order_paid_topic: "order.paid".to_string(),
            order_assembled_topic: "order.assembled".to_string(),
            order_assembled_group_id: "order-service".to_string(),
            assembly_group_id: "assembly-service".to_string(),
            notification_paid_group_id: "notification-service-order-paid".to_string(),
            notification_assembled_group_id: "notification-service-order-assembled".to_string(),
            inventory_timeout: Duration::from_secs(3),
            payment_timeout: Duration::from_secs(5),
            shutdown_timeout: Duration::from_secs(5),
            assembly_build_time: Duration::from_secs(10),
        }
    }
}
