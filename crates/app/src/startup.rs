use std::{borrow::Cow, net::SocketAddr};

use axum::Router;
use chrono::Utc;
use thiserror::Error;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use bone_gateway_core::{StageTracker, StageTransitionError, StartupStage};
use bone_gateway_storage::{AdminSeedOutcome, Database, NewAdmin, StorageError, UserError};
use bone_gateway_util::{AdminSeedConfig, AppConfig, Environment};

use crate::password::{generate_password, generate_salt, hash_password};

/// Exit status for any failure while booting.
pub const FATAL_EXIT_CODE: i32 = 1;

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("database connection failed: {0}")]
    DbConnect(#[source] StorageError),
    #[error("admin seeding failed: {0}")]
    AdminSeed(#[source] UserError),
    #[error("failed to bind listener on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
    #[error("server stopped with error: {0}")]
    Serve(#[source] std::io::Error),
    #[error(transparent)]
    Transition(#[from] StageTransitionError),
}

pub fn exit_code<T>(result: &Result<T, StartupError>) -> i32 {
    match result {
        Ok(_) => 0,
        Err(_) => FATAL_EXIT_CODE,
    }
}

/// External collaborators the boot sequence waits on.
pub(crate) trait BootDependencies {
    /// Acquires a confirmed-reachable persistence handle.
    async fn connect(&self) -> Result<Database, StartupError>;

    /// Creates the default admin account; a no-op when it already exists.
    async fn seed_admin(&self, database: &Database) -> Result<AdminSeedOutcome, StartupError>;
}

/// Production collaborators backed by SQLite.
pub struct LiveDependencies {
    database_url: String,
    admin: AdminSeedConfig,
}

impl LiveDependencies {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            database_url: config.database_url.clone(),
            admin: config.admin.clone(),
        }
    }
}

impl BootDependencies for LiveDependencies {
    async fn connect(&self) -> Result<Database, StartupError> {
        let database = Database::connect(&self.database_url)
            .await
            .map_err(StartupError::DbConnect)?;
        database.ping().await.map_err(StartupError::DbConnect)?;
        database
            .run_migrations()
            .await
            .map_err(StartupError::DbConnect)?;
        Ok(database)
    }

    async fn seed_admin(&self, database: &Database) -> Result<AdminSeedOutcome, StartupError> {
        let password = match &self.admin.password {
            Some(password) => Cow::Borrowed(password.as_str()),
            None => Cow::Owned(generate_password()),
        };
        let salt = generate_salt();
        let outcome = database
            .users()
            .ensure_admin(NewAdmin {
                email: Cow::Borrowed(&self.admin.email),
                name: Cow::Borrowed(&self.admin.name),
                password_hash: Cow::Owned(hash_password(&password, &salt)),
                password_salt: Cow::Owned(salt),
                created_at: Utc::now(),
            })
            .await
            .map_err(StartupError::AdminSeed)?;

        if outcome == AdminSeedOutcome::Created && self.admin.password.is_none() {
            warn!(
                stage = "startup",
                email = %self.admin.email,
                "ADMIN_PASSWORD not set; admin account was created with a random password"
            );
        }
        Ok(outcome)
    }
}

/// Bound listener plus the persistence handle confirmed during boot.
pub struct Booted {
    pub listener: TcpListener,
    pub database: Database,
}

/// Owns the process-wide startup stage. Each step settles before the next
/// begins and any error moves straight to `Failed`.
pub struct Orchestrator {
    tracker: StageTracker,
    environment: Environment,
    service_url: Option<String>,
}

impl Orchestrator {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            tracker: StageTracker::new(),
            environment: config.environment,
            service_url: config.service_url(),
        }
    }

    #[cfg(test)]
    pub fn stage(&self) -> StartupStage {
        self.tracker.current()
    }

    #[cfg(test)]
    pub fn history(&self) -> &[StartupStage] {
        self.tracker.history()
    }

    pub(crate) async fn boot<D: BootDependencies>(
        &mut self,
        deps: &D,
        bind_addr: SocketAddr,
    ) -> Result<Booted, StartupError> {
        self.advance(StartupStage::DbConnecting)?;
        info!(stage = "startup", "initializing database connection");
        let database = deps.connect().await.map_err(|err| self.fail(err))?;
        self.advance(StartupStage::DbConnected)?;
        info!(stage = "startup", "database connection established");

        self.advance(StartupStage::SeedingAdmin)?;
        let outcome = deps
            .seed_admin(&database)
            .await
            .map_err(|err| self.fail(err))?;
        self.advance(StartupStage::Seeded)?;
        info!(stage = "startup", outcome = ?outcome, "admin user ensured");

        let listener = TcpListener::bind(bind_addr)
            .await
            .map_err(|source| self.fail(StartupError::Bind { addr: bind_addr, source }))?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| self.fail(StartupError::Bind { addr: bind_addr, source }))?;
        self.advance(StartupStage::Listening)?;

        info!(stage = "startup", port = local_addr.port(), %local_addr, "server started");
        info!(stage = "startup", env = %self.environment.as_str(), "environment");
        if let Some(url) = &self.service_url {
            info!(stage = "startup", service_url = %url, "service url");
        }

        Ok(Booted { listener, database })
    }

    /// Serves `app` on the listener acquired by [`Orchestrator::boot`] until the process exits.
    pub async fn serve(&mut self, booted: Booted, app: Router) -> Result<(), StartupError> {
        axum::serve(booted.listener, app)
            .await
            .map_err(|err| self.fail(StartupError::Serve(err)))
    }

    fn advance(&mut self, next: StartupStage) -> Result<(), StartupError> {
        match self.tracker.advance(next) {
            Ok(_) => Ok(()),
            Err(err) => Err(self.fail(err.into())),
        }
    }

    fn fail(&mut self, err: StartupError) -> StartupError {
        let from = self.tracker.current();
        self.tracker.fail();
        error!(stage = "startup", failed_stage = %from, error = %err, "startup failed");
        err
    }
}
