//! Periodic refresh of every active leaderboard.
//!
//! Each tick reads the settings and active boards, runs one pass per board against that board's
//! own [`MilestoneTracker`], publishes the standings for the HTTP layer and broadcasts any
//! notifications to websocket subscribers.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local, NaiveDate, Utc};
use serde::Serialize;
use tokio::sync::{Mutex, RwLock, broadcast};
use tokio::time::MissedTickBehavior;
use tracing::instrument;

use crate::db::prelude::{DateRange, Lead, Leaderboard, LeaderboardId, SlideshowConfig};
use crate::engine::prelude::{MilestoneTracker, Notification, Standings, run_pass};

pub mod source;

use source::{LeadSource, RosterSource, SourceResult};

const NOTIFICATION_CAPACITY: usize = 64;
const MIN_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Latest standings for one board
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishedBoard {
    pub leaderboard: Leaderboard,
    pub date_range: DateRange,
    pub standings: Standings,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BoardNotification {
    pub leaderboard_id: LeaderboardId,
    #[serde(flatten)]
    pub notification: Notification,
}

/// What the poller publishes and the HTTP layer reads.
#[derive(Debug)]
pub struct BoardState {
    boards: RwLock<HashMap<LeaderboardId, PublishedBoard>>,
    notify: broadcast::Sender<BoardNotification>,
}

impl Default for BoardState {
    fn default() -> Self {
        Self::new()
    }
}

impl BoardState {
    pub fn new() -> Self {
        let (notify, _) = broadcast::channel(NOTIFICATION_CAPACITY);

        Self {
            boards: RwLock::new(HashMap::new()),
            notify,
        }
    }

    pub async fn published(&self, id: LeaderboardId) -> Option<PublishedBoard> {
        self.boards.read().await.get(&id).cloned()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BoardNotification> {
        self.notify.subscribe()
    }

    async fn publish(&self, board: PublishedBoard) {
        self.boards.write().await.insert(board.leaderboard.id, board);
    }

    async fn retain_boards(&self, active: &[LeaderboardId]) {
        self.boards.write().await.retain(|id, _| active.contains(id));
    }

    fn broadcast(&self, notification: BoardNotification) {
        // no receivers is not an error
        if self.notify.send(notification).is_err() {
            tracing::debug!("no notification subscribers");
        }
    }
}

pub struct Poller {
    leads: Arc<dyn LeadSource>,
    roster: Arc<dyn RosterSource>,
    sessions: Mutex<HashMap<LeaderboardId, MilestoneTracker>>,
    state: Arc<BoardState>,
}

impl Poller {
    pub fn new(
        leads: Arc<dyn LeadSource>,
        roster: Arc<dyn RosterSource>,
        state: Arc<BoardState>,
    ) -> Self {
        Self {
            leads,
            roster,
            sessions: Mutex::new(HashMap::new()),
            state,
        }
    }

    /// Runs one refresh of every active board as of `today`.
    ///
    /// A board whose roster or leads cannot be fetched is skipped for this tick and keeps its
    /// previous publication and snapshot. Trackers of boards that are no longer active are
    /// dropped.
    #[instrument(skip(self))]
    pub async fn tick(&self, today: NaiveDate) -> SourceResult<Vec<BoardNotification>> {
        let config = self.roster.slideshow_config().await?;
        let boards = self.roster.active_leaderboards().await?;

        let active: Vec<LeaderboardId> = boards.iter().map(|b| b.id).collect();
        let mut sessions = self.sessions.lock().await;
        sessions.retain(|id, _| active.contains(id));
        self.state.retain_boards(&active).await;

        let mut lead_cache: HashMap<DateRange, Vec<Lead>> = HashMap::new();
        let mut sent = Vec::new();

        for board in &boards {
            let tracker = sessions.entry(board.id).or_default();
            match self
                .refresh(board, today, &config, tracker, &mut lead_cache)
                .await
            {
                Ok(notifications) => sent.extend(notifications),
                Err(e) => {
                    tracing::error!(leaderboard_id = %board.id, error = %e, "skipping leaderboard this tick")
                }
            }
        }

        tracing::info!(
            board_count = boards.len(),
            notification_count = sent.len(),
            "tick complete"
        );
        Ok(sent)
    }

    #[instrument(skip_all, fields(leaderboard_id = %board.id, period = %board.time_period))]
    async fn refresh(
        &self,
        board: &Leaderboard,
        today: NaiveDate,
        config: &SlideshowConfig,
        tracker: &mut MilestoneTracker,
        lead_cache: &mut HashMap<DateRange, Vec<Lead>>,
    ) -> SourceResult<Vec<BoardNotification>> {
        let date_range = DateRange::for_leaderboard(board, today);
        let agents = self.roster.agents(board.group_id).await?;

        // boards sharing a range share one fetch per tick
        if !lead_cache.contains_key(&date_range) {
            let fetched = self.leads.fetch_leads(date_range).await?;
            lead_cache.insert(date_range, fetched);
        }
        let leads = lead_cache.get(&date_range).map(Vec::as_slice).unwrap_or(&[]);

        let outcome = run_pass(leads, &agents, board.time_period, config, tracker);

        self.state
            .publish(PublishedBoard {
                leaderboard: board.clone(),
                date_range,
                standings: outcome.standings,
                updated_at: Utc::now(),
            })
            .await;

        let notifications: Vec<BoardNotification> = outcome
            .notifications
            .into_iter()
            .map(|notification| BoardNotification {
                leaderboard_id: board.id,
                notification,
            })
            .collect();

        for notification in &notifications {
            tracing::info!(
                user_id = %notification.notification.user_id,
                total = %notification.notification.total_earnings,
                "milestone reached"
            );
            self.state.broadcast(notification.clone());
        }

        Ok(notifications)
    }

    /// Ticks forever on `interval` (at least one second), using the local calendar date.
    pub async fn run(self: Arc<Self>, interval: Duration) {
        if interval < MIN_POLL_INTERVAL {
            tracing::warn!(?interval, "poll interval below minimum, using one second");
        }

        let mut ticker = tokio::time::interval(interval.max(MIN_POLL_INTERVAL));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;

            let today = Local::now().date_naive();
            if let Err(e) = self.tick(today).await {
                tracing::error!(error = %e, "poll tick failed");
            }
        }
    }
}
