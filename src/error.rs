use std::io;

use thiserror::Error;

pub type Result<T, E = CommandError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("no running process for `{0}`")]
    ProcessNotFound(String),
    #[error("unsupported operand: {0}")]
    UnsupportedOperand(String),
    #[error("`{0}` has not been started")]
    NotStarted(String),
    #[error("`{0}` has already been run")]
    AlreadyStarted(String),
    #[error("failed to spawn `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("`{program}` failed to launch: {reason}")]
    Launch { program: String, reason: String },
    #[error("upstream command `{upstream}` of `{program}` failed: {reason}")]
    Upstream {
        program: String,
        upstream: String,
        reason: String,
    },
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Read(#[from] io::Error),
    #[error("invalid config: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("invalid value `{value}` for {var}")]
    InvalidEnv { var: &'static str, value: String },
}
