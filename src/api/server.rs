use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;

use axum::extract::{MatchedPath, Request};
use axum::middleware::{Next, from_fn};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post, put};
use axum::{Json, Router};
use http::StatusCode;
use serde::Serialize;
use thiserror::Error;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::instrument;

use crate::api::handler::*;
use crate::db::prelude::{RedisErr, RedisStore};
use crate::poller::BoardState;
use crate::util::adversus::{AdversusClient, AdversusErr};

pub type JsonResult<T> = core::result::Result<Json<T>, RouteError>;

#[derive(Debug, Clone)]
pub struct AppState {
    pub store: RedisStore,
    pub crm: AdversusClient,
    pub boards: Arc<BoardState>,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        //
        // leaderboards
        .route("/leaderboards", get(list_leaderboards).put(put_leaderboard))
        .route("/leaderboards/{id}", get(get_leaderboard).delete(delete_leaderboard))
        .route("/leaderboards/{id}/stats", get(leaderboard_stats))
        //
        // agents and bonus schedules
        .route("/agents", get(list_agents))
        .route("/agents/sync", post(sync_agents))
        .route("/agents/{id}", get(get_agent))
        .route("/agents/{id}/sync", post(sync_agent))
        .route("/agents/{id}/media", put(put_agent_media))
        .route("/agents/{id}/bonuses", get(agent_bonuses).post(assign_bonus))
        .route("/agents/{id}/bonuses/{campaign}", delete(unassign_bonus))
        .route("/bonus-tiers", get(list_bonus_tiers).put(put_bonus_tiers))
        .route("/bonus-tiers/{campaign}", get(bonus_tiers).delete(delete_bonus_tiers))
        //
        // display
        .route("/settings", get(get_settings).put(put_settings))
        .route("/notifications", get(notifications))
        .layer(
            TraceLayer::new_for_http().make_span_with(|req: &axum::http::Request<_>| {
                let method = req.method();
                let uri = req.uri();

                let matched_path = req
                    .extensions()
                    .get::<MatchedPath>()
                    .map(|matched| matched.as_str());

                tracing::debug_span!("api_request", ?method, ?uri, ?matched_path)
            }),
        )
        .layer(from_fn(log_route_errors))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[instrument(skip(request, next), fields(uri = request.uri().to_string()))]
async fn log_route_errors(request: Request, next: Next) -> Response {
    let res = next.run(request).await;
    if let Some(err) = res.extensions().get::<Arc<RouteError>>() {
        tracing::error!(error = ?err, "error occurred inside route handler");
    }

    res
}

/// Binds on all interfaces and serves until the listener fails.
#[instrument(skip(state))]
pub async fn start_server(state: Arc<AppState>, port: u16) -> std::io::Result<()> {
    let socket_addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port);
    let listener = tokio::net::TcpListener::bind(socket_addr).await?;

    tracing::info!(
        server_url = &format!("http://127.0.0.1:{}", socket_addr.port()),
        "server ready"
    );

    axum::serve(listener, router(state)).await
}

#[derive(Debug, Error)]
pub enum RouteError {
    #[error(transparent)]
    RedisError(#[from] RedisErr),

    #[error(transparent)]
    AdversusError(#[from] AdversusErr),

    #[error("invalid id '{0}'")]
    InvalidId(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("{0}")]
    BadRequest(String),
}

impl IntoResponse for RouteError {
    fn into_response(self) -> Response {
        #[derive(Serialize)]
        struct ErrorResponse {
            message: String,
        }

        let (status, message, err) = match &self {
            RouteError::RedisError(error) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                error.to_string(),
                Some(self),
            ),

            RouteError::AdversusError(adversus_err) => match adversus_err {
                AdversusErr::FetchErr { status, message } => (
                    StatusCode::BAD_GATEWAY,
                    format!("crm responded {status}: {message}"),
                    Some(self),
                ),
                AdversusErr::MalformedUser(_) => (
                    StatusCode::BAD_GATEWAY,
                    adversus_err.to_string(),
                    Some(self),
                ),
                AdversusErr::ReqwestError(error) => (
                    StatusCode::BAD_GATEWAY,
                    error.to_string(),
                    Some(self),
                ),
                AdversusErr::InvalidApiKey | AdversusErr::EnvError(_) => (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    adversus_err.to_string(),
                    Some(self),
                ),
            },

            RouteError::InvalidId(ident) => (
                StatusCode::BAD_REQUEST,
                format!("invalid id '{ident}'"),
                None,
            ),

            RouteError::NotFound(what) => (StatusCode::NOT_FOUND, format!("{what} not found"), None),

            RouteError::BadRequest(reason) => (StatusCode::BAD_REQUEST, reason.clone(), None),
        };

        let mut response = (status, Json(ErrorResponse { message })).into_response();
        if let Some(err) = err {
            response.extensions_mut().insert(Arc::new(err));
        }

        response
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_route_error_status() {
        let cases = [
            (RouteError::InvalidId(String::from("abc")), StatusCode::BAD_REQUEST),
            (RouteError::NotFound(String::from("leaderboard 4")), StatusCode::NOT_FOUND),
            (RouteError::BadRequest(String::from("no")), StatusCode::BAD_REQUEST),
            (
                RouteError::AdversusError(AdversusErr::FetchErr {
                    status: StatusCode::UNAUTHORIZED,
                    message: String::from("invalid token"),
                }),
                StatusCode::BAD_GATEWAY,
            ),
            (
                RouteError::AdversusError(AdversusErr::MalformedUser(String::from("9"))),
                StatusCode::BAD_GATEWAY,
            ),
            (
                RouteError::RedisError(RedisErr::BadValue(String::from("x"))),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (err, status) in cases {
            assert_eq!(err.into_response().status(), status);
        }
    }

    #[test]
    fn test_server_errors_are_attached_for_logging() {
        let logged = RouteError::RedisError(RedisErr::NotFound(String::from("agent:1")))
            .into_response();
        assert!(logged.extensions().get::<Arc<RouteError>>().is_some());

        let quiet = RouteError::NotFound(String::from("agent 1")).into_response();
        assert!(quiet.extensions().get::<Arc<RouteError>>().is_none());
    }
}
