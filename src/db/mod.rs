pub mod models;
pub mod redis;
pub mod repositories;

pub mod prelude {
    pub use crate::db::models::agent::{
        Agent, AgentId, AgentMedia, AgentRecord, BonusTier, CampaignAssignment,
    };
    pub use crate::db::models::lead::Lead;
    pub use crate::db::models::leaderboard::{DateRange, Leaderboard, LeaderboardId, TimePeriod};
    pub use crate::db::models::settings::SlideshowConfig;

    pub use crate::db::redis::redis_pool::{RedisErr, RedisResult, redis_pool};
    pub use crate::db::repositories::Repository; // + trait to provide base methods
    pub use crate::db::repositories::RedisStore;
}
