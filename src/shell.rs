use std::sync::Arc;

use once_cell::sync::Lazy;

use crate::{
    cmd::Command,
    config::ShellConfig,
    error::ConfigError,
    parse::{parse_pipeline, ParseError},
};

static DEFAULT_SHELL: Lazy<Shell> = Lazy::new(|| {
    Shell::from_env().unwrap_or_else(|err| {
        warn!(%err, "ignoring invalid shell environment");
        Shell::default()
    })
});

/// Factory for [`Command`]s sharing one [`ShellConfig`].
#[derive(Debug, Clone, Default)]
pub struct Shell {
    config: Arc<ShellConfig>,
}

impl Shell {
    pub fn new(config: ShellConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        ShellConfig::from_env().map(Self::new)
    }

    pub fn config(&self) -> &ShellConfig {
        &self.config
    }

    /// A command for `program` with no arguments yet.
    pub fn command(&self, program: impl Into<String>) -> Command {
        Command::new(program, self.config.clone())
    }

    /// Builds a command chain from a pipeline expression, see
    /// [`parse`](crate::parse).
    pub fn parse(&self, expr: &str) -> Result<Command, ParseError> {
        parse_pipeline(self, expr)
    }
}

/// A command for `program` using the process-wide default shell, configured
/// from the `SHELLCHAIN_*` environment variables on first use.
pub fn command(program: impl Into<String>) -> Command {
    DEFAULT_SHELL.command(program)
}
