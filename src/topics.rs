//! Broker topic derivation
//!
//! Computed once at startup from the node name and immutable afterwards.

use crate::{BoardError, config};
use core::fmt::Write;
use heapless::String;

/// Capacity of a derived topic
pub const MAX_TOPIC_LEN: usize = 64;

pub type Topic = String<MAX_TOPIC_LEN>;

/// Longest accepted node name
pub const MAX_NODE_NAME_LEN: usize = 32;

/// Topics used by one node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topics {
    node_name: String<MAX_NODE_NAME_LEN>,
    command: Topic,
    response: Topic,
}

impl Topics {
    /// `servers/<NAME>/command` in, `servers/<NAME>/response` out
    pub fn new(node_name: &str) -> Result<Self, BoardError> {
        let mut response = Topic::new();
        write!(response, "servers/{}/response", node_name).map_err(|_| BoardError::ConfigError)?;
        Self::with_response(node_name, response)
    }

    /// Same subscriptions, but every reply goes to the shared legacy test topic
    pub fn legacy(node_name: &str) -> Result<Self, BoardError> {
        let mut response = Topic::new();
        response
            .push_str(config::LEGACY_TEST_TOPIC)
            .map_err(|_| BoardError::ConfigError)?;
        Self::with_response(node_name, response)
    }

    /// Select the topic layout from the build configuration
    pub fn from_config() -> Result<Self, BoardError> {
        if config::LEGACY_TOPICS == "1" {
            Self::legacy(config::NODE_NAME)
        } else {
            Self::new(config::NODE_NAME)
        }
    }

    fn with_response(node_name: &str, response: Topic) -> Result<Self, BoardError> {
        validate_node_name(node_name)?;

        let mut name = String::new();
        name.push_str(node_name).map_err(|_| BoardError::ConfigError)?;

        let mut command = Topic::new();
        write!(command, "servers/{}/command", node_name).map_err(|_| BoardError::ConfigError)?;

        Ok(Self {
            node_name: name,
            command,
            response,
        })
    }

    pub fn node_name(&self) -> &str {
        &self.node_name
    }

    /// Command topic shared by all nodes
    pub fn broadcast_command(&self) -> &str {
        config::BROADCAST_COMMAND_TOPIC
    }

    /// This node's private command topic
    pub fn command(&self) -> &str {
        &self.command
    }

    /// Topic every reply is published to
    pub fn response(&self) -> &str {
        &self.response
    }

    /// Topics subscribed on every broker connect
    pub fn subscriptions(&self) -> [&str; 2] {
        [self.broadcast_command(), self.command()]
    }
}

fn validate_node_name(name: &str) -> Result<(), BoardError> {
    let valid = !name.is_empty()
        && !name.contains(['/', '+', '#'])
        && !name.chars().any(char::is_control);

    if valid {
        Ok(())
    } else {
        log::error!("[CONFIG] Invalid node name: {:?}", name);
        Err(BoardError::ConfigError)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derives_node_topics() {
        let topics = Topics::new("BRAVO").unwrap();
        assert_eq!(topics.node_name(), "BRAVO");
        assert_eq!(topics.command(), "servers/BRAVO/command");
        assert_eq!(topics.response(), "servers/BRAVO/response");
        assert_eq!(
            topics.subscriptions(),
            ["servers/ALL/command", "servers/BRAVO/command"]
        );
    }

    #[test]
    fn legacy_layout_replies_on_shared_topic() {
        let topics = Topics::legacy("BRAVO").unwrap();
        assert_eq!(topics.response(), "home/testing");
        assert_eq!(
            topics.subscriptions(),
            ["servers/ALL/command", "servers/BRAVO/command"]
        );
    }

    #[test]
    fn rejects_unusable_names() {
        for name in ["", "a/b", "node+", "#", "line\nbreak"] {
            assert_eq!(Topics::new(name), Err(BoardError::ConfigError), "{:?}", name);
        }
    }

    #[test]
    fn rejects_names_that_overflow_topics() {
        let long = "N".repeat(31);
        assert!(Topics::new(&long).is_ok());

        let too_long = "N".repeat(60);
        assert_eq!(Topics::new(&too_long), Err(BoardError::ConfigError));
    }
}
