use std::process::ExitStatus;

/// Final status of a launched process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitState(ExitStatus);

impl From<ExitStatus> for ExitState {
    fn from(value: ExitStatus) -> Self {
        Self(value)
    }
}

impl ExitState {
    /// Exit code, `None` if the process was terminated by a signal.
    pub fn code(&self) -> Option<i32> {
        self.0.code()
    }

    #[cfg(unix)]
    pub fn signal(&self) -> Option<i32> {
        use std::os::unix::process::ExitStatusExt;

        self.0.signal()
    }

    #[cfg(not(unix))]
    pub fn signal(&self) -> Option<i32> {
        None
    }

    /// Exit code, or the negated signal number for signal-terminated
    /// processes.
    pub fn return_code(&self) -> i32 {
        match (self.code(), self.signal()) {
            (Some(code), _) => code,
            (None, Some(signal)) => -signal,
            (None, None) => -1,
        }
    }

    pub fn success(&self) -> bool {
        self.0.success()
    }
}
