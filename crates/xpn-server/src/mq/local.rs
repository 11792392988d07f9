use dashmap::DashMap;

use super::{MqBridge, MqError, PubSub};

/// In-process broker feeding an [`MqBridge`].
///
/// Keeps the dispatcher's subscriptions and only forwards publications
/// whose topic one of them covers. Filters ending in `/#` match the prefix
/// itself and everything below it; other filters match exactly.
pub struct LocalBroker {
    filters: DashMap<String, u8>,
    bridge: MqBridge,
}

impl LocalBroker {
    pub fn new(bridge: MqBridge) -> Self {
        Self {
            filters: DashMap::new(),
            bridge,
        }
    }

    pub fn bridge(&self) -> &MqBridge {
        &self.bridge
    }

    pub fn subscriptions(&self) -> usize {
        self.filters.len()
    }

    /// Deliver a publication. Returns whether any subscription took it.
    pub fn publish(&self, topic: &str, payload: &[u8]) -> Result<bool, MqError> {
        let matched = self
            .filters
            .iter()
            .any(|entry| filter_matches(entry.key(), topic));
        if !matched {
            tracing::trace!(%topic, "publication without subscriber");
            return Ok(false);
        }
        self.bridge.on_message(topic, payload)?;
        Ok(true)
    }

    /// Stop taking publications; queued ones are still written.
    pub fn close(&self) {
        self.bridge.close();
    }
}

impl PubSub for LocalBroker {
    fn subscribe(&self, topic: &str, qos: u8) -> Result<(), MqError> {
        self.filters.insert(topic.to_string(), qos);
        Ok(())
    }

    fn unsubscribe(&self, topic: &str) -> Result<(), MqError> {
        self.filters.remove(topic);
        Ok(())
    }
}

fn filter_matches(filter: &str, topic: &str) -> bool {
    match filter.strip_suffix("/#") {
        Some(prefix) => {
            topic == prefix
                || topic
                    .strip_prefix(prefix)
                    .is_some_and(|rest| rest.starts_with('/'))
        }
        None => filter == topic,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MqConfig;
    use std::sync::Arc;
    use xpn_fs::MemFilesystem;

    #[test]
    fn test_filter_matching() {
        assert!(filter_matches("/a/#", "/a"));
        assert!(filter_matches("/a/#", "/a/4/0"));
        assert!(!filter_matches("/a/#", "/ab/4/0"));
        assert!(filter_matches("/a", "/a"));
        assert!(!filter_matches("/a", "/a/1"));
    }

    #[test]
    fn test_only_subscribed_topics_reach_disk() {
        let fs = Arc::new(MemFilesystem::new());
        let config = MqConfig {
            enabled: true,
            workers: 2,
            ..Default::default()
        };
        let broker = LocalBroker::new(MqBridge::new(fs.clone(), &config).unwrap());

        broker.subscribe("/f/#", 0).unwrap();
        assert!(broker.publish("/f/3/0", b"abc").unwrap());
        assert!(!broker.publish("/g/3/0", b"xyz").unwrap());
        broker.unsubscribe("/f/#").unwrap();
        assert!(!broker.publish("/f/3/3", b"def").unwrap());
        assert_eq!(broker.subscriptions(), 0);

        broker.close();
        assert!(matches!(
            broker.bridge().on_message("/f", b"late"),
            Err(MqError::QueueClosed)
        ));
        drop(broker);

        assert_eq!(fs.contents("/f").unwrap(), b"abc");
        assert!(fs.contents("/g").is_none());
    }
}
