use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use thiserror::Error;

use crate::api::server::{AppState, start_server};
use crate::db::prelude::{RedisErr, RedisStore, redis_pool};
use crate::poller::{BoardState, Poller};
use crate::util::adversus::{AdversusClient, AdversusErr};
use crate::util::env::{self, EnvErr};
use crate::util::telemetry;

mod api;
mod args;
mod db;
mod engine;
mod poller;
mod util;

#[derive(Debug, Error)]
enum RunnerErr {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Std(#[from] Box<dyn std::error::Error>),

    #[error(transparent)]
    Env(#[from] EnvErr),

    #[error(transparent)]
    Redis(#[from] RedisErr),

    #[error(transparent)]
    Adversus(#[from] AdversusErr),
}

type Result<T> = core::result::Result<T, RunnerErr>;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = args::parse_cli_args();
    let telemetry_registry = telemetry::Telemetry::new().await?.register();

    tracing::info!("starting scoreboard server");

    let env = env::env().await?;
    let store = RedisStore::new(redis_pool().await?);
    let crm = AdversusClient::from_env().await?;

    if cli.sync_agents {
        let users = crm.fetch_all_users().await?;
        store.sync_agents(users).await?;
    }

    let boards = Arc::new(BoardState::new());
    let poller = Arc::new(Poller::new(
        Arc::new(crm.clone()),
        Arc::new(store),
        boards.clone(),
    ));

    let interval = Duration::from_secs(cli.poll_interval.unwrap_or(env.poll_interval_secs));
    let port = cli.port.unwrap_or(env.server_api_port);
    let state = Arc::new(AppState { store, crm, boards });

    tracing::info!(poll_interval = ?interval, port, "spawning poller and api");

    let handles = vec![
        tokio::task::spawn(poller.run(interval)),
        tokio::task::spawn(async move {
            if let Err(e) = start_server(state, port).await {
                tracing::error!(error = ?e, "api server stopped");
            }
        }),
    ];

    _ = join_all(handles).await;

    telemetry_registry.shutdown();
    Ok(())
}
