use std::{collections::HashSet, fmt};

use super::Command;
use crate::{prelude::*, process::Channel};

/// Whether `run` blocks until the process exits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RunMode {
    #[default]
    Sequential,
    Concurrent,
}

/// Lifecycle of a node. Only ever moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    NotStarted,
    Running,
    Finished,
}

/// Where a node's stdin comes from.
#[derive(Clone)]
pub(crate) enum Input {
    Literal(Vec<u8>),
    Pipe { source: Command, channel: Channel },
}

impl fmt::Debug for Input {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Literal(bytes) => write!(f, "Literal({} bytes)", bytes.len()),
            Self::Pipe { source, channel } => {
                write!(f, "Pipe({} -> {channel})", source.program())
            }
        }
    }
}

/// Everything a node needs to know before it can launch. Frozen when the
/// node starts running.
#[derive(Debug, Clone, Default)]
pub(crate) struct ExecutionPlan {
    pub args: Vec<String>,
    pub input: Option<Input>,
    pub predecessor: Option<Command>,
    pub mode: RunMode,
}

impl ExecutionPlan {
    pub(crate) fn upstream(&self) -> impl Iterator<Item = &Command> {
        let piped = match &self.input {
            Some(Input::Pipe { source, .. }) => Some(source),
            _ => None,
        };

        piped.into_iter().chain(self.predecessor.as_ref())
    }
}

/// Right-hand side of a pipe or sequence: another command or a fixed payload.
#[derive(Debug, Clone)]
pub enum Operand {
    Command(Command),
    Bytes(Vec<u8>),
}

impl From<Command> for Operand {
    fn from(value: Command) -> Self {
        Self::Command(value)
    }
}

impl From<&Command> for Operand {
    fn from(value: &Command) -> Self {
        Self::Command(value.clone())
    }
}

impl From<Vec<u8>> for Operand {
    fn from(value: Vec<u8>) -> Self {
        Self::Bytes(value)
    }
}

impl From<&[u8]> for Operand {
    fn from(value: &[u8]) -> Self {
        Self::Bytes(value.to_vec())
    }
}

impl<const N: usize> From<&[u8; N]> for Operand {
    fn from(value: &[u8; N]) -> Self {
        Self::Bytes(value.to_vec())
    }
}

impl From<&str> for Operand {
    fn from(value: &str) -> Self {
        Self::Bytes(value.as_bytes().to_vec())
    }
}

impl From<String> for Operand {
    fn from(value: String) -> Self {
        Self::Bytes(value.into_bytes())
    }
}

/// Fails if `target` is reachable from `from` through pipes or sequencing,
/// i.e. if wiring `from` upstream of `target` would close a loop.
pub(crate) fn check_acyclic(target: &Command, from: &Command) -> Result<()> {
    let mut seen = HashSet::new();
    let mut stack = vec![from.clone()];

    while let Some(node) = stack.pop() {
        if node.same_node(target) {
            return Err(CommandError::UnsupportedOperand(format!(
                "wiring `{}` upstream of `{}` would create a cycle",
                from.program(),
                target.program()
            )));
        }

        if !seen.insert(node.node_id()) {
            continue;
        }

        stack.extend(node.plan().upstream().cloned());
    }

    Ok(())
}
