use serde::Deserialize;

/// Top-level configuration settings for the application.
///
/// Groups the broker connection with the defaults of each session direction.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct Settings {
    pub broker: BrokerSettings,
    pub consume: ConsumeSettings,
    pub publish: PublishSettings,
    pub logging: LoggingSettings,
}

/// Where to connect.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct BrokerSettings {
    pub url: String,
}

/// Defaults for the consume direction.
///
/// `indent` zero switches the output to one compact envelope per line.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct ConsumeSettings {
    pub indent: usize,
    pub queue_expiry_ms: u64,
    pub ack_flush_delay_ms: u64,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct PublishSettings {
    pub correlation_id: String,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct LoggingSettings {
    pub level: String,
}

/// Partial configuration settings loaded from files or environment.
///
/// Allows partial specification of settings. Missing values are filled from
/// `Settings::default()`.
#[derive(Debug, Default, Deserialize)]
pub struct PartialSettings {
    pub broker: Option<PartialBrokerSettings>,
    pub consume: Option<PartialConsumeSettings>,
    pub publish: Option<PartialPublishSettings>,
    pub logging: Option<PartialLoggingSettings>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PartialBrokerSettings {
    pub url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PartialConsumeSettings {
    pub indent: Option<usize>,
    pub queue_expiry_ms: Option<u64>,
    pub ack_flush_delay_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PartialPublishSettings {
    pub correlation_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PartialLoggingSettings {
    pub level: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            broker: BrokerSettings {
                url: "amqp://127.0.0.1:5672/%2f".to_string(),
            },
            consume: ConsumeSettings {
                indent: 2,
                queue_expiry_ms: 10_000,
                ack_flush_delay_ms: 500,
            },
            publish: PublishSettings {
                correlation_id: String::new(),
            },
            logging: LoggingSettings {
                level: "warn".to_string(),
            },
        }
    }
}

impl PartialSettings {
    /// Fills every missing value from `defaults`.
    pub fn merge_onto(self, defaults: Settings) -> Settings {
        let broker = self.broker.unwrap_or_default();
        let consume = self.consume.unwrap_or_default();
        let publish = self.publish.unwrap_or_default();
        let logging = self.logging.unwrap_or_default();

        Settings {
            broker: BrokerSettings {
                url: broker.url.unwrap_or(defaults.broker.url),
            },
            consume: ConsumeSettings {
                indent: consume.indent.unwrap_or(defaults.consume.indent),
                queue_expiry_ms: consume
                    .queue_expiry_ms
                    .unwrap_or(defaults.consume.queue_expiry_ms),
                ack_flush_delay_ms: consume
                    .ack_flush_delay_ms
                    .unwrap_or(defaults.consume.ack_flush_delay_ms),
            },
            publish: PublishSettings {
                correlation_id: publish
                    .correlation_id
                    .unwrap_or(defaults.publish.correlation_id),
            },
            logging: LoggingSettings {
                level: logging.level.unwrap_or(defaults.logging.level),
            },
        }
    }
}
