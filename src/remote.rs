//! Best-effort reads of a tracee's memory, descriptor table, and working directory.
//!
//! Nothing here is fatal. A tracee may exit, unmap a buffer, or close a descriptor at any
//! moment, so every lookup yields `None` on failure and the caller drops the observation.

use std::ffi::OsString;
use std::fs;
use std::mem;
use std::os::unix::ffi::OsStringExt;
use std::path::PathBuf;

use nix::sys::ptrace;
use tracing::trace;

use crate::ptracer::Pid;

/// Longest C string we will read out of a tracee, including the NUL.
pub const STRING_WINDOW: usize = 4096;

const WORD: usize = mem::size_of::<libc::c_long>();

/// Source of the raw facts needed to turn syscall arguments into paths.
pub trait Resolver {
    /// NUL-terminated string at `addr` in the tracee, without the NUL.
    fn read_string(&self, addr: u64) -> Option<PathBuf>;

    /// Path that the open descriptor `fd` refers to.
    fn fd_path(&self, fd: i32) -> Option<PathBuf>;

    /// Current working directory.
    fn cwd(&self) -> Option<PathBuf>;
}

/// A live tracee, introspected via ptrace and `/proc`.
///
/// String reads require that the tracee is in a ptrace-stop.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Process {
    pid: Pid,
}

impl Process {
    pub fn new(pid: Pid) -> Self {
        Self { pid }
    }

    pub fn pid(&self) -> Pid {
        self.pid
    }

    /// Path of the program image the process is running.
    pub fn exe(&self) -> Option<PathBuf> {
        self.proc_link("exe")
    }

    fn proc_link(&self, name: &str) -> Option<PathBuf> {
        let link = format!("/proc/{}/{}", self.pid, name);

        match fs::read_link(&link) {
            Ok(path) => Some(path),
            Err(err) => {
                trace!(%link, %err, "unreadable proc link");
                None
            },
        }
    }

    fn peek(&self, addr: u64) -> Option<[u8; WORD]> {
        match ptrace::read(self.pid, addr as ptrace::AddressType) {
            Ok(word) => Some(word.to_ne_bytes()),
            Err(errno) => {
                trace!(pid = self.pid.as_raw(), addr, %errno, "unable to peek tracee memory");
                None
            },
        }
    }
}

impl Resolver for Process {
    fn read_string(&self, addr: u64) -> Option<PathBuf> {
        // Peek whole aligned words so that a read never straddles into an unmapped page
        // beyond the one holding the terminating NUL.
        let skip = (addr % WORD as u64) as usize;
        let start = addr - skip as u64;

        let mut bytes = Vec::new();

        for offset in (0..STRING_WINDOW).step_by(WORD) {
            let word = self.peek(start + offset as u64)?;
            let word = if offset == 0 { &word[skip..] } else { &word[..] };

            if let Some(nul) = word.iter().position(|&b| b == 0) {
                bytes.extend_from_slice(&word[..nul]);
                return Some(PathBuf::from(OsString::from_vec(bytes)));
            }

            bytes.extend_from_slice(word);
        }

        trace!(pid = self.pid.as_raw(), addr, "no NUL within string window");

        None
    }

    fn fd_path(&self, fd: i32) -> Option<PathBuf> {
        if fd < 0 {
            return None;
        }

        let path = self.proc_link(&format!("fd/{}", fd))?;

        // Sockets, pipes, and the like are named `type:[inode]`, not by a path.
        if path.is_absolute() {
            Some(path)
        } else {
            trace!(pid = self.pid.as_raw(), fd, ?path, "descriptor not backed by a path");
            None
        }
    }

    fn cwd(&self) -> Option<PathBuf> {
        self.proc_link("cwd")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn this_process() -> Process {
        Process::new(nix::unistd::getpid())
    }

    #[test]
    fn test_cwd() {
        let cwd = std::env::current_dir().unwrap();
        assert_eq!(this_process().cwd(), Some(cwd));
    }

    #[test]
    fn test_exe() {
        let exe = std::env::current_exe().unwrap();
        assert_eq!(this_process().exe(), Some(exe));
    }

    #[test]
    fn test_fd_path() {
        use std::os::unix::io::AsRawFd;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().canonicalize().unwrap().join("data.txt");
        let file = fs::File::create(&path).unwrap();

        let proc = this_process();
        assert_eq!(proc.fd_path(file.as_raw_fd()), Some(path));
        assert_eq!(proc.fd_path(-1), None);
        assert_eq!(proc.fd_path(libc::AT_FDCWD), None);
    }

    #[test]
    fn test_fd_path_socket() {
        use std::os::unix::io::AsRawFd;
        use std::os::unix::net::UnixDatagram;

        let (sock, _) = UnixDatagram::pair().unwrap();
        assert_eq!(this_process().fd_path(sock.as_raw_fd()), None);
    }

    #[test]
    fn test_missing_process() {
        // Larger than the kernel's `PID_MAX_LIMIT`.
        let proc = Process::new(Pid::from_raw(i32::MAX));

        assert_eq!(proc.cwd(), None);
        assert_eq!(proc.exe(), None);
        assert_eq!(proc.fd_path(0), None);
        assert_eq!(proc.read_string(0x1000), None);
    }

    #[test]
    fn test_read_string_from_tracee() {
        use std::os::unix::ffi::OsStrExt;

        use crate::ptracer::tests::{fork_traceme, kill_and_reap, wait_stopped};

        // The child inherits a copy of `buf` at the same addresses.
        let mut buf = vec![b'x'; 3 * STRING_WINDOW];
        let base = buf.as_ptr() as usize;

        // 4090 bytes starting 3 bytes past a word boundary.
        let long = (0..WORD).find(|i| (base + i) % WORD == 3).unwrap();
        buf[long..long + 4090].fill(b'a');
        buf[long + 4090] = 0;

        let short = 4200;
        buf[short..short + 3].copy_from_slice(b"/ab");
        buf[short + 3] = 0;

        // No NUL for the rest of the buffer, well over one window.
        let unterminated = 4300;

        let child = fork_traceme(libc::SIGSTOP);
        assert_eq!(wait_stopped(child), libc::SIGSTOP);

        let proc = Process::new(child);

        let read = |offset: usize| proc.read_string((base + offset) as u64);

        let path = read(long).unwrap();
        assert_eq!(path.as_os_str().len(), 4090);
        assert!(path.as_os_str().as_bytes().iter().all(|&b| b == b'a'));

        assert_eq!(read(short), Some(PathBuf::from("/ab")));
        assert_eq!(read(unterminated), None);

        // Never mapped.
        assert_eq!(proc.read_string(8), None);

        kill_and_reap(child);
    }

    #[test]
    fn test_read_string_untraced() {
        // We are not our own tracer, and never a tracee here, so peeks are refused.
        assert_eq!(this_process().read_string(0), None);
    }
}
