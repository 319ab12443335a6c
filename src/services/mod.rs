// SPDX-License-Identifier: MIT

//! Services module - business logic layer.

pub mod backfill;
pub mod directory;
pub mod garmin;
pub mod kafka;
pub mod signature;

pub use backfill::{BackfillRequestGenerator, BackfillRoute, RestRequest};
pub use directory::{DirectoryEvent, UserDirectory};
pub use garmin::{GarminUserRepository, UserRepository};
pub use kafka::{ClusterAdmin, KafkaAdminService, KafkaClusterAdmin, TopicInfo};
pub use signature::{OauthSignature, SignRequestParams};
