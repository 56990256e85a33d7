//! Compose external processes into chains: pipe one command's output into
//! another, sequence commands, run them in the background and read their
//! output line by line while they run.

#[macro_use]
extern crate tracing;

pub mod cmd;
pub mod config;
pub mod error;
pub mod parse;
pub mod prelude;
pub mod process;
pub mod shell;

pub use cmd::{Command, Lines, Operand, RunMode, State};
pub use config::ShellConfig;
pub use error::{CommandError, ConfigError, Result};
pub use parse::ParseError;
pub use process::{read::StreamLine, status::ExitState, Channel};
pub use shell::{command, Shell};
