use std::fmt;

use thiserror::Error;

/// Boot progress of the gateway process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StartupStage {
    NotStarted,
    DbConnecting,
    DbConnected,
    SeedingAdmin,
    Seeded,
    Listening,
    Failed,
}

impl StartupStage {
    pub fn ordinal(self) -> u8 {
        match self {
            Self::NotStarted => 0,
            Self::DbConnecting => 1,
            Self::DbConnected => 2,
            Self::SeedingAdmin => 3,
            Self::Seeded => 4,
            Self::Listening => 5,
            Self::Failed => 6,
        }
    }

    /// `Failed` is the only terminal stage; `Listening` stays live until exit
    /// but has no successor.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Failed)
    }

    pub fn can_advance_to(self, next: StartupStage) -> bool {
        use StartupStage::*;
        match (self, next) {
            (NotStarted, DbConnecting)
            | (DbConnecting, DbConnected)
            | (DbConnected, SeedingAdmin)
            | (SeedingAdmin, Seeded)
            | (Seeded, Listening) => true,
            (current, Failed) => !current.is_terminal(),
            _ => false,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotStarted => "not_started",
            Self::DbConnecting => "db_connecting",
            Self::DbConnected => "db_connected",
            Self::SeedingAdmin => "seeding_admin",
            Self::Seeded => "seeded",
            Self::Listening => "listening",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for StartupStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("illegal startup transition {from} -> {to}")]
pub struct StageTransitionError {
    pub from: StartupStage,
    pub to: StartupStage,
}

/// Single owner of the process-wide startup stage, with its full history.
#[derive(Debug, Clone)]
pub struct StageTracker {
    history: Vec<StartupStage>,
}

impl Default for StageTracker {
    fn default() -> Self {
        Self {
            history: vec![StartupStage::NotStarted],
        }
    }
}

impl StageTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> StartupStage {
        self.history
            .last()
            .copied()
            .unwrap_or(StartupStage::NotStarted)
    }

    pub fn advance(&mut self, next: StartupStage) -> Result<StartupStage, StageTransitionError> {
        let current = self.current();
        if !current.can_advance_to(next) {
            return Err(StageTransitionError { from: current, to: next });
        }
        self.history.push(next);
        Ok(next)
    }

    /// Moves to `Failed` unless already there.
    pub fn fail(&mut self) -> StartupStage {
        if !self.current().is_terminal() {
            self.history.push(StartupStage::Failed);
        }
        StartupStage::Failed
    }

    pub fn history(&self) -> &[StartupStage] {
        &self.history
    }

    pub fn reached(&self, stage: StartupStage) -> bool {
        self.history.contains(&stage)
    }
}
