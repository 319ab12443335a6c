// SPDX-License-Identifier: MIT

//! Cached topic metadata in front of the Kafka admin client.
//!
//! Two caches with independent policies: the topic-name set refreshes every
//! 10 seconds, per-topic descriptions every 30 minutes. Remote failures are
//! wrapped as upstream-unavailable; previously fetched values keep being
//! served per the cache staleness contract.

use crate::cache::{CacheConfig, CachedValue};
use crate::error::{AppError, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use futures_util::FutureExt;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

/// Bounded wait for a single remote admin call.
const ADMIN_TIMEOUT: Duration = Duration::from_secs(3);

const LIST_CACHE_CONFIG: CacheConfig = CacheConfig {
    refresh: Duration::from_secs(10),
    retry: Duration::from_secs(2),
    max_simultaneous_compute: 3,
};

const DESCRIBE_CACHE_CONFIG: CacheConfig = CacheConfig {
    refresh: Duration::from_secs(30 * 60),
    retry: Duration::from_secs(2),
    max_simultaneous_compute: 2,
};

/// Partition metadata for one topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TopicInfo {
    pub name: String,
    pub partitions: Vec<TopicPartitionInfo>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TopicPartitionInfo {
    pub partition: i32,
}

/// Remote cluster-admin surface, bounded waits included.
#[async_trait]
pub trait ClusterAdmin: Send + Sync {
    /// All topic names in broker discovery order.
    async fn list_topic_names(&self) -> anyhow::Result<Vec<String>>;

    /// Partition metadata for one topic.
    async fn describe_topic(&self, topic: &str) -> anyhow::Result<TopicInfo>;
}

/// Admin client backed by a librdkafka consumer's metadata requests.
pub struct KafkaClusterAdmin {
    consumer: Arc<rdkafka::consumer::BaseConsumer>,
}

impl KafkaClusterAdmin {
    pub fn new(bootstrap_servers: &str) -> anyhow::Result<Self> {
        let consumer: rdkafka::consumer::BaseConsumer = rdkafka::config::ClientConfig::new()
            .set("bootstrap.servers", bootstrap_servers)
            .create()?;
        Ok(Self {
            consumer: Arc::new(consumer),
        })
    }
}

#[async_trait]
impl ClusterAdmin for KafkaClusterAdmin {
    async fn list_topic_names(&self) -> anyhow::Result<Vec<String>> {
        use rdkafka::consumer::Consumer;

        let consumer = self.consumer.clone();
        let names = tokio::task::spawn_blocking(move || {
            let metadata = consumer.fetch_metadata(None, ADMIN_TIMEOUT)?;
            anyhow::Ok(
                metadata
                    .topics()
                    .iter()
                    .map(|topic| topic.name().to_string())
                    .collect::<Vec<_>>(),
            )
        })
        .await??;
        Ok(names)
    }

    async fn describe_topic(&self, topic: &str) -> anyhow::Result<TopicInfo> {
        use rdkafka::consumer::Consumer;

        let consumer = self.consumer.clone();
        let topic = topic.to_string();
        let info = tokio::task::spawn_blocking(move || {
            let metadata = consumer.fetch_metadata(Some(&topic), ADMIN_TIMEOUT)?;
            let described = metadata
                .topics()
                .iter()
                .find(|t| t.name() == topic)
                .ok_or_else(|| anyhow::anyhow!("topic {topic} missing from metadata"))?;
            if let Some(err) = described.error() {
                anyhow::bail!("describe {topic} failed: {:?}", err);
            }
            anyhow::Ok(TopicInfo {
                name: described.name().to_string(),
                partitions: described
                    .partitions()
                    .iter()
                    .map(|p| TopicPartitionInfo { partition: p.id() })
                    .collect(),
            })
        })
        .await??;
        Ok(info)
    }
}

/// Kafka topic metadata service with name and per-topic description caches.
pub struct KafkaAdminService {
    admin: Arc<dyn ClusterAdmin>,
    topic_names: CachedValue<Vec<String>>,
    topic_info: DashMap<String, Arc<CachedValue<TopicInfo>>>,
    describe_config: CacheConfig,
    /// Bounds concurrent describe computes across all topics.
    describe_permits: Arc<tokio::sync::Semaphore>,
}

impl KafkaAdminService {
    pub fn new(admin: Arc<dyn ClusterAdmin>) -> Self {
        Self::with_configs(admin, LIST_CACHE_CONFIG, DESCRIBE_CACHE_CONFIG)
    }

    /// Build with explicit cache policies (tests use short intervals).
    pub fn with_configs(
        admin: Arc<dyn ClusterAdmin>,
        list_config: CacheConfig,
        describe_config: CacheConfig,
    ) -> Self {
        let list_admin = admin.clone();
        let topic_names = CachedValue::new(list_config, move || {
            let admin = list_admin.clone();
            async move {
                let names = admin.list_topic_names().await.map_err(|e| {
                    tracing::error!(error = %e, "Failed to list Kafka topics");
                    AppError::ServiceUnavailable(format!("kafka_unavailable: {e}"))
                })?;
                // Internal topics carry a reserved leading underscore.
                Ok(names
                    .into_iter()
                    .filter(|name| !name.starts_with('_'))
                    .collect::<Vec<String>>())
            }
            .boxed()
        });

        Self {
            admin,
            topic_names,
            topic_info: DashMap::new(),
            describe_permits: describe_config.shared_semaphore(),
            describe_config,
        }
    }

    pub async fn contains_topic(&self, topic: &str) -> Result<bool> {
        Ok(self.topic_names.get().await?.iter().any(|name| name == topic))
    }

    /// Topic names in broker discovery order, reserved names excluded.
    pub async fn list_topics(&self) -> Result<Vec<String>> {
        self.topic_names.get().await
    }

    pub async fn topic_info(&self, topic: &str) -> Result<TopicInfo> {
        if !self.contains_topic(topic).await? {
            return Err(AppError::NotFound(format!("Topic {topic} does not exist")));
        }

        let cache = self
            .topic_info
            .entry(topic.to_string())
            .or_insert_with(|| {
                let admin = self.admin.clone();
                let topic = topic.to_string();
                Arc::new(CachedValue::with_semaphore(
                    self.describe_config,
                    self.describe_permits.clone(),
                    move || {
                        let admin = admin.clone();
                        let topic = topic.clone();
                        async move {
                            admin.describe_topic(&topic).await.map_err(|e| {
                                tracing::error!(topic = %topic, error = %e, "Failed to describe topic");
                                AppError::ServiceUnavailable(format!("kafka_unavailable: {e}"))
                            })
                        }
                        .boxed()
                    },
                ))
            })
            .clone();

        cache.get().await
    }
}
