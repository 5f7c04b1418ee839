mod origin;
mod password;
mod problem;
mod realtime;
mod router;
mod routes;
mod startup;
mod telemetry;

use std::sync::Arc;

use tracing::info;

use bone_gateway_core::OriginPolicy;
use bone_gateway_util::{load_env_file, AppConfig};

use crate::origin::OriginGate;
use crate::router::{AppState, RouteGroups};
use crate::startup::{exit_code, LiveDependencies, Orchestrator, StartupError};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    load_env_file();
    let config = AppConfig::from_env()?;

    telemetry::init_tracing(&config)?;

    // Fatal errors were already logged by the orchestrator with their stage.
    let result = run(&config).await;
    std::process::exit(exit_code(&result))
}

async fn run(config: &AppConfig) -> Result<(), StartupError> {
    let policy = Arc::new(OriginPolicy::from_config(config));
    info!(
        stage = "origin",
        env = %config.environment.as_str(),
        allow_list = ?policy.allow_list().iter().collect::<Vec<_>>(),
        "origin policy loaded"
    );
    let gate = OriginGate::new(policy);

    let mut orchestrator = Orchestrator::new(config);
    let booted = orchestrator
        .boot(&LiveDependencies::new(config), config.bind_addr)
        .await?;

    let state = AppState::new(booted.database.clone(), gate.clone(), config.environment);
    let app = realtime::attach(router::compose(state, RouteGroups::standard()), gate);

    orchestrator.serve(booted, app).await
}
