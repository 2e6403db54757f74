use std::sync::Arc;

use axum::Json;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::response::Response;
use http::StatusCode;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tracing::instrument;

use crate::api::server::{AppState, JsonResult, RouteError};
use crate::db::prelude::{
    Agent, AgentId, AgentMedia, AgentRecord, BonusTier, CampaignAssignment, Leaderboard,
    LeaderboardId, Repository, SlideshowConfig, TimePeriod,
};
use crate::poller::{BoardNotification, PublishedBoard};
use crate::util::adversus::AdversusErr;

#[derive(Debug, Serialize)]
pub struct Health {
    status: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncSummary {
    synced: usize,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardFilter {
    #[serde(default)]
    active_only: bool,
}

/// Body of `POST /agents/{id}/bonuses`. Tiers, when given, replace the campaign's schedule.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignBonus {
    campaign_name: String,
    #[serde(default)]
    bonus_tiers: Option<Vec<BonusTier>>,
}

pub async fn health() -> Json<Health> {
    Json(Health { status: "ok" })
}

/// Every board by display order, or only the boards in the rotation with `?activeOnly=true`.
#[instrument(skip(state))]
pub async fn list_leaderboards(
    State(state): State<Arc<AppState>>,
    Query(filter): Query<LeaderboardFilter>,
) -> JsonResult<Vec<Leaderboard>> {
    let repo = state.store.leaderboard_repo();
    let boards = match filter.active_only {
        true => repo.list_active().await?,
        false => repo.list().await?,
    };

    Ok(Json(boards))
}

#[instrument(skip(state))]
pub async fn get_leaderboard(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> JsonResult<Leaderboard> {
    let id = parse_id::<LeaderboardId>(&id)?;

    match state.store.leaderboard_repo().get_by_id(&id).await? {
        Some(board) => Ok(Json(board)),
        None => Err(RouteError::NotFound(format!("leaderboard {id}"))),
    }
}

#[instrument(skip(state), fields(leaderboard_id = %board.id))]
pub async fn put_leaderboard(
    State(state): State<Arc<AppState>>,
    Json(board): Json<Leaderboard>,
) -> JsonResult<Leaderboard> {
    validate_leaderboard(&board)?;
    state.store.leaderboard_repo().insert(&board).await?;

    Ok(Json(board))
}

#[instrument(skip(state))]
pub async fn delete_leaderboard(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, RouteError> {
    let id = parse_id::<LeaderboardId>(&id)?;

    match state.store.leaderboard_repo().delete(&id).await? {
        true => Ok(StatusCode::NO_CONTENT),
        false => Err(RouteError::NotFound(format!("leaderboard {id}"))),
    }
}

/// Latest published standings for a board. Boards that have not completed a pass yet are not
/// found.
#[instrument(skip(state))]
pub async fn leaderboard_stats(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> JsonResult<PublishedBoard> {
    let id = parse_id::<LeaderboardId>(&id)?;

    match state.boards.published(id).await {
        Some(board) => Ok(Json(board)),
        None => Err(RouteError::NotFound(format!("standings for leaderboard {id}"))),
    }
}

#[instrument(skip(state))]
pub async fn list_agents(State(state): State<Arc<AppState>>) -> JsonResult<Vec<Agent>> {
    Ok(Json(state.store.roster(None).await?))
}

#[instrument(skip(state))]
pub async fn get_agent(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> JsonResult<Agent> {
    let id = parse_id::<AgentId>(&id)?;

    match state.store.agent(id).await? {
        Some(agent) => Ok(Json(agent)),
        None => Err(RouteError::NotFound(format!("agent {id}"))),
    }
}

/// Pulls one user from the CRM into the agent store, keeping stored media urls.
#[instrument(skip(state))]
pub async fn sync_agent(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> JsonResult<AgentRecord> {
    let id = parse_id::<AgentId>(&id)?;
    let user = state
        .crm
        .fetch_user(id)
        .await
        .map_err(|e| crm_lookup_error(id, e))?;

    Ok(Json(state.store.agent_repo().upsert(user).await?))
}

/// Sets or clears the agent's profile image and personal sound urls.
#[instrument(skip(state, media))]
pub async fn put_agent_media(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(media): Json<AgentMedia>,
) -> JsonResult<AgentRecord> {
    let id = parse_id::<AgentId>(&id)?;

    match state.store.agent_repo().set_media(id, &media).await? {
        Some(record) => Ok(Json(record)),
        None => Err(RouteError::NotFound(format!("agent {id}"))),
    }
}

#[instrument(skip(state))]
pub async fn agent_bonuses(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> JsonResult<Vec<CampaignAssignment>> {
    let id = parse_id::<AgentId>(&id)?;

    let agent_repo = state.store.agent_repo();
    if !agent_repo.exists(&id).await? {
        return Err(RouteError::NotFound(format!("agent {id}")));
    }

    let campaigns = agent_repo.campaigns(id).await?;
    Ok(Json(state.store.tier_repo().assignments(campaigns).await?))
}

/// Pulls every user from the CRM into the agent store, keeping stored media urls.
#[instrument(skip(state))]
pub async fn sync_agents(State(state): State<Arc<AppState>>) -> JsonResult<SyncSummary> {
    let users = state.crm.fetch_all_users().await?;
    let synced = state.store.sync_agents(users).await?;

    Ok(Json(SyncSummary { synced }))
}

#[instrument(skip(state, body), fields(campaign = %body.campaign_name))]
pub async fn assign_bonus(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<AssignBonus>,
) -> JsonResult<CampaignAssignment> {
    let id = parse_id::<AgentId>(&id)?;
    let campaign = normalize_campaign(&body.campaign_name)?;

    let agent_repo = state.store.agent_repo();
    if !agent_repo.exists(&id).await? {
        return Err(RouteError::NotFound(format!("agent {id}")));
    }

    let tier_repo = state.store.tier_repo();
    if let Some(tiers) = &body.bonus_tiers {
        validate_tiers(tiers)?;
        tier_repo.upsert(campaign, tiers).await?;
    }

    agent_repo.assign_campaign(id, campaign).await?;

    Ok(Json(CampaignAssignment {
        campaign_name: campaign.to_string(),
        bonus_tiers: tier_repo.tiers(campaign).await?,
    }))
}

#[instrument(skip(state))]
pub async fn unassign_bonus(
    State(state): State<Arc<AppState>>,
    Path((id, campaign)): Path<(String, String)>,
) -> Result<StatusCode, RouteError> {
    let id = parse_id::<AgentId>(&id)?;
    let campaign = normalize_campaign(&campaign)?;

    match state.store.agent_repo().unassign_campaign(id, campaign).await? {
        true => Ok(StatusCode::NO_CONTENT),
        false => Err(RouteError::NotFound(format!(
            "campaign '{campaign}' on agent {id}"
        ))),
    }
}

#[instrument(skip(state))]
pub async fn list_bonus_tiers(
    State(state): State<Arc<AppState>>,
) -> JsonResult<Vec<CampaignAssignment>> {
    Ok(Json(state.store.tier_repo().all().await?))
}

#[instrument(skip(state))]
pub async fn bonus_tiers(
    State(state): State<Arc<AppState>>,
    Path(campaign): Path<String>,
) -> JsonResult<CampaignAssignment> {
    let campaign = normalize_campaign(&campaign)?;
    let bonus_tiers = state.store.tier_repo().tiers(campaign).await?;

    Ok(Json(CampaignAssignment {
        campaign_name: campaign.to_string(),
        bonus_tiers,
    }))
}

#[instrument(skip(state, body), fields(campaign = %body.campaign_name))]
pub async fn put_bonus_tiers(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CampaignAssignment>,
) -> JsonResult<CampaignAssignment> {
    let campaign = normalize_campaign(&body.campaign_name)?;

    validate_tiers(&body.bonus_tiers)?;
    state
        .store
        .tier_repo()
        .upsert(campaign, &body.bonus_tiers)
        .await?;

    Ok(Json(CampaignAssignment {
        campaign_name: campaign.to_string(),
        bonus_tiers: body.bonus_tiers,
    }))
}

/// Drops a campaign's tier schedule. Agents stay assigned to the campaign.
#[instrument(skip(state))]
pub async fn delete_bonus_tiers(
    State(state): State<Arc<AppState>>,
    Path(campaign): Path<String>,
) -> Result<StatusCode, RouteError> {
    let campaign = normalize_campaign(&campaign)?;

    match state.store.tier_repo().delete(campaign).await? {
        true => Ok(StatusCode::NO_CONTENT),
        false => Err(RouteError::NotFound(format!("tiers for campaign '{campaign}'"))),
    }
}

#[instrument(skip(state))]
pub async fn get_settings(State(state): State<Arc<AppState>>) -> JsonResult<SlideshowConfig> {
    Ok(Json(state.store.settings_repo().get().await?))
}

#[instrument(skip(state, config))]
pub async fn put_settings(
    State(state): State<Arc<AppState>>,
    Json(config): Json<SlideshowConfig>,
) -> JsonResult<SlideshowConfig> {
    if config.milestone_threshold.is_sign_negative() {
        return Err(RouteError::BadRequest(String::from(
            "milestone threshold cannot be negative",
        )));
    }

    state.store.settings_repo().update(&config).await?;
    Ok(Json(config))
}

/// Upgrades to a websocket that streams every milestone notification as a JSON text frame.
pub async fn notifications(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> Response {
    let rx = state.boards.subscribe();
    ws.on_upgrade(move |socket| stream_notifications(socket, rx))
}

#[instrument(skip_all)]
async fn stream_notifications(mut socket: WebSocket, mut rx: broadcast::Receiver<BoardNotification>) {
    tracing::debug!("notification subscriber connected");

    loop {
        tokio::select! {
            received = rx.recv() => match received {
                Ok(notification) => {
                    let json = match serde_json::to_string(&notification) {
                        Ok(json) => json,
                        Err(e) => {
                            tracing::error!(error = ?e, "unable to serialize notification");
                            continue;
                        }
                    };

                    if socket.send(Message::Text(json.into())).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "notification subscriber lagged");
                }
                Err(RecvError::Closed) => break,
            },

            incoming = socket.recv() => match incoming {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }

    tracing::debug!("notification subscriber disconnected");
}

fn parse_id<T>(raw: &str) -> Result<T, RouteError>
where
    T: std::str::FromStr,
{
    raw.parse::<T>()
        .map_err(|_| RouteError::InvalidId(raw.to_string()))
}

/// Campaign names are stored trimmed; every route that takes one goes through here.
fn normalize_campaign(raw: &str) -> Result<&str, RouteError> {
    match raw.trim() {
        "" => Err(RouteError::BadRequest(String::from("campaign name is required"))),
        campaign => Ok(campaign),
    }
}

/// A user the CRM does not know is a missing agent, not an upstream failure.
fn crm_lookup_error(id: AgentId, err: AdversusErr) -> RouteError {
    match err {
        AdversusErr::FetchErr { status, .. } if status == StatusCode::NOT_FOUND => {
            RouteError::NotFound(format!("crm user {id}"))
        }
        other => RouteError::AdversusError(other),
    }
}

fn validate_leaderboard(board: &Leaderboard) -> Result<(), RouteError> {
    if board.name.trim().is_empty() {
        return Err(RouteError::BadRequest(String::from("leaderboard name is required")));
    }

    if board.time_period == TimePeriod::Custom
        && let (Some(start), Some(end)) = (board.custom_start_date, board.custom_end_date)
        && start > end
    {
        return Err(RouteError::BadRequest(format!(
            "custom range starts after it ends ({start} > {end})"
        )));
    }

    Ok(())
}

fn validate_tiers(tiers: &[BonusTier]) -> Result<(), RouteError> {
    for tier in tiers {
        if tier.deals_required == 0 {
            return Err(RouteError::BadRequest(String::from(
                "a tier must require at least one deal",
            )));
        }

        if tier.bonus_per_deal < Decimal::ZERO {
            return Err(RouteError::BadRequest(format!(
                "negative bonus for the {}-deal tier",
                tier.deals_required
            )));
        }
    }

    let mut counts: Vec<u32> = tiers.iter().map(|t| t.deals_required).collect();
    counts.sort_unstable();
    if counts.windows(2).any(|pair| pair[0] == pair[1]) {
        return Err(RouteError::BadRequest(String::from(
            "tiers must have distinct deal counts",
        )));
    }

    Ok(())
}
