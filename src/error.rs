use std::ffi::OsString;
use std::io;

use nix::errno::Errno;

use crate::ptracer::Pid;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Could not launch {program:?}")]
    Spawn {
        program: OsString,
        source: io::Error,
    },

    #[error("Unexpected initial stop for tracee = {pid}, raw wait status = {status:#x}")]
    UnexpectedStop { pid: Pid, status: i32 },

    #[error("Could not set trace options on tracee = {pid}")]
    Options { pid: Pid, source: nix::Error },

    #[error("Could not restart tracee = {pid}")]
    Restart { pid: Pid, source: nix::Error },

    #[error("Tracee = {pid} died while stopped")]
    TraceeDied { pid: Pid, source: nix::Error },

    #[error("Input/output error")]
    IO(#[from] io::Error),

    #[error("OS error")]
    OS(#[from] nix::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// True if the error means the tracee vanished out from under us.
    ///
    /// A tracee can be killed at any moment, even while it is in a ptrace-stop, so every
    /// ptrace request may fail with `ESRCH`.
    pub fn tracee_died(&self) -> bool {
        match self {
            Error::TraceeDied { .. } => true,
            Error::Restart { source, .. } => *source == Errno::ESRCH,
            _ => false,
        }
    }
}

pub(crate) trait ResultExt<T> {
    fn died_if_esrch(self, pid: Pid) -> Result<T>;
}

impl<T> ResultExt<T> for nix::Result<T> {
    fn died_if_esrch(self, pid: Pid) -> Result<T> {
        self.map_err(|source| match source {
            Errno::ESRCH => Error::TraceeDied { pid, source },
            source => Error::OS(source),
        })
    }
}

macro_rules! internal_error {
    ($msg: expr) => {
        return Err($crate::error::Error::Internal($msg.into()))
    };
}

pub(crate) use internal_error;
