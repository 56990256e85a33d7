use std::{collections::BTreeMap, path::PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

pub const SHELL_VAR: &str = "SHELLCHAIN_SHELL";
pub const SHELL_FLAG_VAR: &str = "SHELLCHAIN_SHELL_FLAG";
pub const DIRECT_VAR: &str = "SHELLCHAIN_DIRECT";

/// How commands built by a [`Shell`](crate::Shell) are launched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ShellConfig {
    /// Interpreter that receives the joined command line.
    pub interpreter: String,
    /// Flag telling the interpreter to run its next argument.
    pub interpreter_flag: String,
    /// Execute programs directly, one argument per word, without a shell.
    pub direct: bool,
    pub working_dir: Option<PathBuf>,
    pub env: BTreeMap<String, String>,
}

impl Default for ShellConfig {
    fn default() -> Self {
        #[cfg(windows)]
        let (interpreter, interpreter_flag) = ("cmd", "/C");
        #[cfg(not(windows))]
        let (interpreter, interpreter_flag) = ("sh", "-c");

        Self {
            interpreter: interpreter.into(),
            interpreter_flag: interpreter_flag.into(),
            direct: false,
            working_dir: None,
            env: BTreeMap::new(),
        }
    }
}

impl ShellConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(s)?)
    }

    pub fn from_toml_file(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.into())?;
        Self::from_toml_str(&contents)
    }

    /// Defaults overridden by the `SHELLCHAIN_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().with_overrides(|var| std::env::var(var).ok())
    }

    /// Applies overrides looked up through `lookup`, keyed by variable name.
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&'static str) -> Option<String>,
    {
        if let Some(shell) = lookup(SHELL_VAR) {
            self.interpreter = shell;
        }

        if let Some(flag) = lookup(SHELL_FLAG_VAR) {
            self.interpreter_flag = flag;
        }

        if let Some(direct) = lookup(DIRECT_VAR) {
            self.direct = match direct.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => true,
                "0" | "false" | "no" | "off" | "" => false,
                _ => {
                    return Err(ConfigError::InvalidEnv {
                        var: DIRECT_VAR,
                        value: direct,
                    })
                }
            };
        }

        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = ShellConfig::from_toml_str(
            r#"
            interpreter = "bash"

            [env]
            GREETING = "hi"
            "#,
        )
        .unwrap();

        assert_eq!(config.interpreter, "bash");
        assert_eq!(config.interpreter_flag, ShellConfig::default().interpreter_flag);
        assert!(!config.direct);
        assert_eq!(config.env.get("GREETING").map(String::as_str), Some("hi"));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = ShellConfig::from_toml_str("shell = \"zsh\"").unwrap_err();
        assert!(matches!(err, ConfigError::Toml(_)));
    }

    #[test]
    fn overrides_win_over_file_values() {
        let config = ShellConfig::from_toml_str("interpreter = \"bash\"")
            .unwrap()
            .with_overrides(|var| match var {
                SHELL_VAR => Some("zsh".into()),
                DIRECT_VAR => Some("yes".into()),
                _ => None,
            })
            .unwrap();

        assert_eq!(config.interpreter, "zsh");
        assert!(config.direct);
    }

    #[test]
    fn bad_direct_value_is_an_error() {
        let err = ShellConfig::default()
            .with_overrides(|var| (var == DIRECT_VAR).then(|| "sometimes".to_string()))
            .unwrap_err();

        assert!(matches!(err, ConfigError::InvalidEnv { var: DIRECT_VAR, .. }));
    }
}
