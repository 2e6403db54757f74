use redis::aio::ConnectionManager;
use tracing::instrument;

use crate::db::prelude::{Leaderboard, LeaderboardId, RedisResult, Repository};
use crate::db::redis::redis_pool::{RedisKey, RedisPool};

#[derive(Debug, Clone, Copy)]
pub struct LeaderboardRepository {
    pool: &'static RedisPool,
}

impl Repository for LeaderboardRepository {
    type Ident = LeaderboardId;
    type Output = Leaderboard;

    const INDEX: RedisKey = RedisKey::Leaderboards;

    fn new(pool: &'static RedisPool) -> Self {
        Self { pool }
    }

    fn conn(&self) -> ConnectionManager {
        self.pool.conn()
    }

    fn record_key(id: &LeaderboardId) -> String {
        RedisKey::Leaderboard(id.0).to_string()
    }

    fn ident_of(item: &Leaderboard) -> LeaderboardId {
        item.id
    }
}

impl LeaderboardRepository {
    #[instrument(skip(self))]
    pub async fn list(&self) -> RedisResult<Vec<Leaderboard>> {
        let mut boards = self.get_all().await?;
        sort_for_display(&mut boards);

        Ok(boards)
    }

    /// Boards in the display rotation, by display order then id.
    #[instrument(skip(self))]
    pub async fn list_active(&self) -> RedisResult<Vec<Leaderboard>> {
        let mut boards = self.list().await?;
        boards.retain(|b| b.is_active);

        Ok(boards)
    }
}

fn sort_for_display(boards: &mut [Leaderboard]) {
    boards.sort_by_key(|b| (b.display_order, b.id));
}
