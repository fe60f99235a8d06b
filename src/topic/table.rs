use super::pattern::{TopicPattern, TopicPatternError};
use crate::stream::SensorKind;
use serde::Deserialize;
use std::collections::HashMap;

/// Topic configuration
#[derive(Clone, Debug, Deserialize)]
pub struct TopicConfig {
    /// First level shared by every participant (e.g. "m2ccm")
    #[serde(default = "default_prefix")]
    pub prefix: String,
    /// Owner/device levels of the device this bridge follows
    #[serde(default = "default_device")]
    pub device: String,
}

fn default_prefix() -> String {
    "m2ccm".to_string()
}

fn default_device() -> String {
    "noa/g22315333".to_string()
}

impl Default for TopicConfig {
    fn default() -> Self {
        Self {
            prefix: default_prefix(),
            device: default_device(),
        }
    }
}

/// Controllable actuators, one command topic each
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandTopic {
    Led,
    DataTransmission,
    Servo,
    Message,
}

impl CommandTopic {
    pub const ALL: [CommandTopic; 4] = [
        CommandTopic::Led,
        CommandTopic::DataTransmission,
        CommandTopic::Servo,
        CommandTopic::Message,
    ];

    fn level(self) -> &'static str {
        match self {
            CommandTopic::Led => "led",
            CommandTopic::DataTransmission => "data_transmission",
            CommandTopic::Servo => "servo",
            CommandTopic::Message => "message",
        }
    }
}

/// What a concrete topic means to us
#[derive(Debug, Clone, PartialEq)]
pub enum TopicClass {
    /// Retained online/offline device status
    Status,
    /// Fixed data topic of the followed device
    Sensor(SensorKind),
    /// Dynamically named source; `name` is the second topic level
    Source { name: String },
    /// Actuator command topic
    Command(CommandTopic),
}

/// Fixed topic set plus the wildcard pattern for discovered sources
#[derive(Debug, Clone)]
pub struct TopicTable {
    base: String,
    status: String,
    exact: HashMap<String, TopicClass>,
    source_pattern: TopicPattern,
}

impl TopicTable {
    /// Build the table for `{prefix}/{device}`.
    ///
    /// ```
    /// use beacon::topic::{TopicClass, TopicTable};
    ///
    /// let table = TopicTable::new("m2ccm", "noa/g22315333").unwrap();
    /// assert_eq!(table.status(), "m2ccm/noa/g22315333/statut");
    /// assert_eq!(
    ///     table.classify("m2ccm/bob/x1/temp"),
    ///     Some(TopicClass::Source { name: "bob".to_string() })
    /// );
    /// ```
    pub fn new(prefix: &str, device: &str) -> Result<Self, TopicPatternError> {
        let base = format!("{}/{}", prefix, device.trim_matches('/'));
        let status = format!("{}/statut", base);

        let mut exact = HashMap::new();
        exact.insert(status.clone(), TopicClass::Status);
        for kind in SensorKind::PUBLISHED {
            exact.insert(format!("{}/data/{}", base, kind), TopicClass::Sensor(kind));
        }
        for command in CommandTopic::ALL {
            exact.insert(
                format!("{}/command/{}", base, command.level()),
                TopicClass::Command(command),
            );
        }

        let source_pattern = TopicPattern::parse(&format!("{}/+/+/temp", prefix))?;

        Ok(Self {
            base,
            status,
            exact,
            source_pattern,
        })
    }

    pub fn from_config(config: &TopicConfig) -> Result<Self, TopicPatternError> {
        Self::new(&config.prefix, &config.device)
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    pub fn status(&self) -> &str {
        &self.status
    }

    /// Data topic for a published kind; humidity rides on the temperature topic.
    pub fn sensor(&self, kind: SensorKind) -> Option<String> {
        SensorKind::PUBLISHED
            .contains(&kind)
            .then(|| format!("{}/data/{}", self.base, kind))
    }

    pub fn command(&self, command: CommandTopic) -> String {
        format!("{}/command/{}", self.base, command.level())
    }

    pub fn source_pattern(&self) -> &TopicPattern {
        &self.source_pattern
    }

    /// Everything the bridge subscribes to after connecting.
    pub fn subscriptions(&self) -> Vec<String> {
        let mut topics: Vec<String> = SensorKind::PUBLISHED
            .iter()
            .filter_map(|kind| self.sensor(*kind))
            .collect();
        topics.push(self.status.clone());
        topics.push(self.source_pattern.as_str().to_string());
        topics
    }

    /// Classify a concrete topic. Exact fixed topics win over the wildcard.
    pub fn classify(&self, topic: &str) -> Option<TopicClass> {
        if let Some(class) = self.exact.get(topic) {
            return Some(class.clone());
        }

        let captured = self.source_pattern.captures(topic)?;
        let name = captured.first().filter(|name| !name.is_empty())?;
        Some(TopicClass::Source {
            name: name.to_string(),
        })
    }
}
