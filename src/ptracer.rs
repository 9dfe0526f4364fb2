//! Types for launching a tracee, following its descendants, and interpreting tracing events.

use std::collections::BTreeMap;
use std::io;
use std::marker::PhantomData;
use std::mem::{self, MaybeUninit};
use std::os::unix::process::CommandExt;
use std::process::Command;

use nix::{errno::Errno, sys::ptrace};
use tracing::{debug, info, trace};

use crate::abi::HostRegisters;
use crate::error::{internal_error, Error, Result, ResultExt};

pub use nix::unistd::Pid;
pub use nix::sys::ptrace::Options;

/// Raw signal number.
///
/// Real-time signals have no named constant, but must be forwarded like any other, so we
/// don't use `nix::sys::signal::Signal` here.
pub type Signo = libc::c_int;

/// Linux constant defined in `include/uapi/linux/elf.h`.
const NT_PRSTATUS: usize = 1;

/// A _ptrace-stop_, a tracee state in which it is stopped and ready to accept ptrace
/// commands.
///
/// Lifecycle stops carry data obtained via an additional request to `PTRACE_GETEVENTMSG`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Stop {
    // The first stop of an auto-attached child.
    Attach,

    // signal-delivery-stop
    SignalDelivery { signal: Signo },

    /// group-stop.
    ///
    /// The tracee is always restarted with `PTRACE_SYSCALL`, so a job-control stop does not
    /// keep it stopped: e.g. `kill -STOP $$` in a traced shell returns right away.
    Group { signal: Signo },

    // syscall-stops
    SyscallEnter,
    SyscallExit,

    // ptrace-event-stops
    Clone { new: Pid },
    Fork { new: Pid },
    Vfork { new: Pid },
    Exec { old: Pid },
}

impl Stop {
    /// True for stops reporting a new task or program image.
    pub fn is_lifecycle(&self) -> bool {
        matches!(
            self,
            Stop::Clone { .. } | Stop::Fork { .. } | Stop::Vfork { .. } | Stop::Exec { .. }
        )
    }
}

/// Tracee task in ptrace-stop, with an optional pending signal.
///
/// **Warning:** the underlying tracee is not guaranteed to exist, and
/// operations on it may fail between calls to [`Ptracer::wait()`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Tracee {
    pid: Pid,
    pending: Option<Signo>,
    stop: Stop,

    #[doc(hidden)]
    _not_send: PhantomData<*const ()>,
}

impl Tracee {
    pub fn new(pid: Pid, pending: impl Into<Option<Signo>>, stop: Stop) -> Self {
        let pending = pending.into();
        let _not_send = PhantomData;

        Self { pid, pending, stop, _not_send }
    }

    pub fn pid(&self) -> Pid {
        self.pid
    }

    pub fn pending_signal(&self) -> Option<Signo> {
        self.pending
    }

    pub fn stop(&self) -> Stop {
        self.stop
    }

    /// Read the tracee's general-purpose registers.
    ///
    /// Uses `PTRACE_GETREGSET`, which has the same shape on every architecture.
    pub fn registers(&self) -> Result<HostRegisters> {
        let mut data = MaybeUninit::<HostRegisters>::uninit();
        let mut iov = libc::iovec {
            iov_base: data.as_mut_ptr() as *mut libc::c_void,
            iov_len: mem::size_of::<HostRegisters>(),
        };

        let res = unsafe {
            libc::ptrace(
                libc::PTRACE_GETREGSET,
                self.pid.as_raw(),
                NT_PRSTATUS as *mut libc::c_void,
                &mut iov as *mut libc::iovec as *mut libc::c_void,
            )
        };

        Errno::result(res).died_if_esrch(self.pid)?;

        // The kernel shrinks `iov_len` to the size it wrote.
        if iov.iov_len != mem::size_of::<HostRegisters>() {
            internal_error!(format!("short register set: {} bytes", iov.iov_len));
        }

        // SAFETY: the kernel wrote every byte of `data`, and all bit patterns are valid for
        // a struct of integers.
        Ok(unsafe { data.assume_init() })
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum State {
    // Auto-attached via a ptrace-event-stop, expecting a SIGSTOP.
    Attaching,

    // Outside of any syscall.
    Running,

    // After a syscall-enter-stop, or an exec ptrace-event-stop.
    Syscalling,
}

/// Decoded `wait(2)` status.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Status {
    Exited { pid: Pid, code: i32 },
    Signaled { pid: Pid, signal: Signo },
    Stopped { pid: Pid, signal: Signo },
    Event { pid: Pid, event: i32 },
    Syscall { pid: Pid },
}

impl Status {
    fn parse(pid: Pid, status: i32) -> Result<Self> {
        let parsed = if libc::WIFEXITED(status) {
            Status::Exited { pid, code: libc::WEXITSTATUS(status) }
        } else if libc::WIFSIGNALED(status) {
            Status::Signaled { pid, signal: libc::WTERMSIG(status) }
        } else if libc::WIFSTOPPED(status) {
            let signal = libc::WSTOPSIG(status);

            // The `PTRACE_EVENT_*` code, if any, lives in bits 16..24.
            let event = (status >> 16) & 0xff;

            if signal == libc::SIGTRAP | 0x80 {
                // Only possible with `PTRACE_O_TRACESYSGOOD`.
                Status::Syscall { pid }
            } else if event != 0 {
                Status::Event { pid, event }
            } else {
                Status::Stopped { pid, signal }
            }
        } else {
            // Assume `!WCONTINUED`.
            internal_error!(format!("unreachable wait status {:#x}", status))
        };

        Ok(parsed)
    }
}

/// Tracer for a Linux process tree.
///
/// A spawned tracee is followed through calls to `fork()`, `vfork()`, `clone()`, and
/// `exec()`, tracing every child task (both threads and processes).
///
/// The kernel ties tracees to the thread that attached to them, so a `Ptracer` must stay on
/// the thread that created it. It is not `Send`.
#[derive(Debug)]
pub struct Ptracer {
    /// Known tracees, and their state.
    tracees: BTreeMap<i32, State>,

    _not_send: PhantomData<*const ()>,
}

/// Ptrace options set on the spawned tracee, and inherited by its descendants.
///
/// Follow every descendant, report syscall-stops distinctly, and kill all tracees if we die.
/// Per-tracee state tracking depends on `PTRACE_O_TRACESYSGOOD` and `PTRACE_O_TRACEEXEC`.
pub const OPTIONS: Options = Options::empty()
    .union(Options::PTRACE_O_TRACESYSGOOD)
    .union(Options::PTRACE_O_TRACEFORK)
    .union(Options::PTRACE_O_TRACEVFORK)
    .union(Options::PTRACE_O_TRACECLONE)
    .union(Options::PTRACE_O_TRACEEXEC)
    .union(Options::PTRACE_O_EXITKILL);

impl Default for Ptracer {
    fn default() -> Self {
        Self::new()
    }
}

impl Ptracer {
    pub fn new() -> Self {
        let tracees = BTreeMap::new();
        let _not_send = PhantomData;

        Self { tracees, _not_send }
    }

    /// Number of tasks currently traced.
    pub fn tracee_count(&self) -> usize {
        self.tracees.len()
    }

    /// Spawn `cmd` for tracing, and wait for it to stop after its `execve()`.
    ///
    /// The command will be configured to request `PTRACE_TRACEME` after `fork()` and
    /// pre-`exec()`. The kernel then stops it with a `SIGTRAP` as soon as the new program is
    /// loaded, before it runs a single instruction.
    pub fn spawn(&mut self, mut cmd: Command) -> Result<Tracee> {
        // On fork, request `PTRACE_TRACEME`.
        unsafe {
            cmd.pre_exec(|| ptrace::traceme().map_err(|err| io::Error::from_raw_os_error(err as i32)))
        };

        let child = cmd.spawn().map_err(|source| Error::Spawn {
            program: cmd.get_program().to_owned(),
            source,
        })?;

        // We never `Child::wait()`: like every other tracee, it is reaped by `wait()`.
        let pid = Pid::from_raw(child.id() as i32);

        self.handshake(pid)
    }

    // Confirm the initial `SIGTRAP` of a fresh `PTRACE_TRACEME` child, and set options.
    fn handshake(&mut self, pid: Pid) -> Result<Tracee> {
        let (_, status) = waitpid(Some(pid))?;

        match Status::parse(pid, status)? {
            Status::Stopped { signal: libc::SIGTRAP, .. } => {},
            Status::Stopped { .. } => {
                // Don't leave a stopped tracee or a zombie behind.
                let _ = nix::sys::signal::kill(pid, nix::sys::signal::Signal::SIGKILL);
                let _ = waitpid(Some(pid));

                return Err(Error::UnexpectedStop { pid, status });
            },
            _ => {
                // Already reaped.
                return Err(Error::UnexpectedStop { pid, status });
            },
        }

        // Auto-attached tracees from fork, clone, and exec will inherit these.
        ptrace::setoptions(pid, OPTIONS).map_err(|source| Error::Options { pid, source })?;

        info!(pid = pid.as_raw(), "spawned tracee");

        self.set_tracee_state(pid, State::Running);

        Ok(Tracee::new(pid, None, Stop::SyscallExit))
    }

    /// Resume the stopped tracee until its next syscall-stop, delivering any pending signal.
    pub fn restart(&mut self, tracee: Tracee) -> Result<()> {
        let Tracee { pid, pending, .. } = tracee;

        let signal = pending.unwrap_or(0) as libc::c_long;

        // Not `ptrace::syscall()`, which only takes named signals.
        let res = unsafe {
            libc::ptrace(
                libc::PTRACE_SYSCALL,
                pid.as_raw(),
                std::ptr::null_mut::<libc::c_void>(),
                signal as *mut libc::c_void,
            )
        };

        Errno::result(res).map_err(|source| Error::Restart { pid, source })?;

        Ok(())
    }

    /// Wait for some tracee to stop.
    ///
    /// Exits are consumed silently. If there are no tracees left, returns `None`.
    pub fn wait(&mut self) -> Result<Option<Tracee>> {
        loop {
            let (pid, status) = match waitpid(None) {
                Ok(res) => res,
                Err(Errno::ECHILD) => {
                    debug!("no tracees to wait on");
                    self.tracees.clear();

                    return Ok(None);
                },
                Err(errno) => return Err(errno.into()),
            };

            let status = Status::parse(pid, status)?;
            trace!(?status, "wait status");

            if let Some(tracee) = self.interpret(status)? {
                return Ok(Some(tracee));
            }
        }
    }

    /// Drive every tracee to completion, starting from the spawned `root`.
    ///
    /// `on_syscall` is called at each syscall-enter-stop, with the registers decoded for the
    /// host ABI. Genuine signals are forwarded. Returns once no tracees remain.
    pub fn run<F>(&mut self, root: Tracee, mut on_syscall: F) -> Result<()>
    where
        F: FnMut(&Tracee, &HostRegisters),
    {
        // Nothing else can happen until the root is running.
        self.restart(root)?;

        loop {
            let tracee = match self.wait() {
                Ok(Some(tracee)) => tracee,
                Ok(None) => break,
                Err(err) if err.tracee_died() => {
                    debug!(%err, "tracee died while stopped");
                    continue;
                },
                Err(err) => return Err(err),
            };

            let pid = tracee.pid().as_raw();

            match tracee.stop() {
                Stop::SyscallEnter => match tracee.registers() {
                    Ok(regs) => on_syscall(&tracee, &regs),
                    Err(err) => debug!(pid, %err, "unable to read registers"),
                },
                stop if stop.is_lifecycle() => match stop {
                    Stop::Exec { old } => {
                        info!(pid, old = old.as_raw(), "process executed new program");
                    },
                    Stop::Fork { new } | Stop::Vfork { new } | Stop::Clone { new } => {
                        info!(pid, new = new.as_raw(), "process created new process");
                    },
                    _ => {},
                },
                Stop::SignalDelivery { signal } => {
                    debug!(pid, signal, "forwarding signal");
                },
                Stop::Group { signal } => {
                    debug!(pid, signal, "group-stop");
                },
                _ => {},
            }

            if let Err(err) = self.restart(tracee) {
                if !err.tracee_died() {
                    return Err(err);
                }

                debug!(pid, "tracee died before restart");
            }
        }

        Ok(())
    }

    // Update tracee state for a wait status. Returns `None` for terminations.
    fn interpret(&mut self, status: Status) -> Result<Option<Tracee>> {
        let tracee = match status {
            Status::Exited { pid, code } => {
                debug!(pid = pid.as_raw(), code, "tracee exited");
                self.remove_tracee(pid);

                return Ok(None);
            },
            Status::Signaled { pid, signal } => {
                debug!(pid = pid.as_raw(), signal, "tracee killed");
                self.remove_tracee(pid);

                return Ok(None);
            },
            Status::Stopped { pid, signal } => self.signal_stop(pid, signal)?,
            Status::Event { pid, event } => self.event_stop(pid, event)?,
            Status::Syscall { pid } => self.syscall_stop(pid),
        };

        Ok(Some(tracee))
    }

    fn signal_stop(&mut self, pid: Pid, signal: Signo) -> Result<Tracee> {
        if signal == libc::SIGSTOP {
            if let Some(state) = self.tracee_state_mut(pid) {
                if *state == State::Attaching {
                    *state = State::Running;
                    return Ok(Tracee::new(pid, None, Stop::Attach));
                }
            } else {
                // We may see an attach-stop out-of-order, before the ptrace-event-stop
                // which would otherwise have us mark it as `Attaching`. Since `Attaching`
                // only exists to let us know that the next stop (i.e. this stop) is an
                // attach-stop, we can directly initialize this tracee as `Running`.
                self.set_tracee_state(pid, State::Running);
                return Ok(Tracee::new(pid, None, Stop::Attach));
            }
        }

        self.ensure_tracee(pid);

        let tracee = if is_group_stop(pid, signal)? {
            // Injecting a signal at a group-stop has no effect.
            Tracee::new(pid, None, Stop::Group { signal })
        } else {
            Tracee::new(pid, signal, Stop::SignalDelivery { signal })
        };

        Ok(tracee)
    }

    fn event_stop(&mut self, pid: Pid, event: i32) -> Result<Tracee> {
        self.ensure_tracee(pid);

        let stop = match event {
            libc::PTRACE_EVENT_FORK |
            libc::PTRACE_EVENT_VFORK |
            libc::PTRACE_EVENT_CLONE => {
                let evt_data = ptrace::getevent(pid).died_if_esrch(pid)?;
                let new = Pid::from_raw(evt_data as u32 as i32);

                // When we return, `new` will start as a tracee, but will be delivered a
                // `SIGSTOP`. Mark it so we can recognize the `SIGSTOP` as an attach-stop.
                self.mark_tracee(new);

                match event {
                    libc::PTRACE_EVENT_FORK => Stop::Fork { new },
                    libc::PTRACE_EVENT_VFORK => Stop::Vfork { new },
                    _ => Stop::Clone { new },
                }
            },
            libc::PTRACE_EVENT_EXEC => {
                // The exec has either occurred on the main thread of the thread group, or
                // not. In either case, the new tid of the execing thread is equal to the
                // tgid. In the off-main case, the old tid is gone for good.
                let evt_data = ptrace::getevent(pid).died_if_esrch(pid)?;
                let old = Pid::from_raw(evt_data as u32 as i32);

                if old != pid {
                    self.remove_tracee(old);
                }

                // We are still inside `execve()`, so the next syscall-stop is an exit-stop.
                self.set_tracee_state(pid, State::Syscalling);

                Stop::Exec { old }
            },
            _ => {
                // We only set options that can deliver the events above.
                internal_error!(format!("unexpected ptrace-event-stop code {}", event))
            },
        };

        Ok(Tracee::new(pid, None, stop))
    }

    // Syscall-enter-stop and syscall-exit-stop are indistinguishable from each other by the
    // tracer, so we track the sequence per tracee. From the manual:
    //
    //     In general, a syscall-enter-stop is always followed by syscall-exit-stop,
    //     PTRACE_EVENT stop, or the tracee's death; no other kinds of ptrace-stop can
    //     occur in between.
    //
    // We don't enable seccomp stops, which are the exception.
    fn syscall_stop(&mut self, pid: Pid) -> Tracee {
        let state = self.tracees.entry(pid.as_raw()).or_insert_with(|| {
            debug!(pid = pid.as_raw(), "syscall-stop for unregistered tracee");
            State::Running
        });

        let stop = match *state {
            State::Syscalling => {
                *state = State::Running;
                Stop::SyscallExit
            },
            State::Running | State::Attaching => {
                *state = State::Syscalling;
                Stop::SyscallEnter
            },
        };

        Tracee::new(pid, None, stop)
    }

    fn remove_tracee(&mut self, pid: Pid) -> Option<State> {
        debug!(pid = pid.as_raw(), "removing tracee");
        self.tracees.remove(&pid.as_raw())
    }

    fn set_tracee_state(&mut self, pid: Pid, state: State) {
        trace!(pid = pid.as_raw(), ?state, "setting tracee state");

        self.tracees.insert(pid.as_raw(), state);
    }

    fn tracee_state_mut(&mut self, pid: Pid) -> Option<&mut State> {
        self.tracees.get_mut(&pid.as_raw())
    }

    // Mark `pid` as a new tracee pending attach-stop, if it isn't already known.
    fn mark_tracee(&mut self, pid: Pid) {
        if !self.tracees.contains_key(&pid.as_raw()) {
            debug!(pid = pid.as_raw(), "attaching to new tracee");
        }

        self.tracees.entry(pid.as_raw()).or_insert(State::Attaching);
    }

    // Register a tracee first seen mid-flight as running.
    fn ensure_tracee(&mut self, pid: Pid) {
        self.tracees.entry(pid.as_raw()).or_insert(State::Running);
    }
}

// Wait for a stop or exit of `pid`, or of any tracee.
//
// `__WNOTHREAD` keeps us from consuming events of tracees owned by other threads, which could
// not act on them anyway.
fn waitpid(pid: Option<Pid>) -> nix::Result<(Pid, i32)> {
    let pid = pid.map_or(-1, Pid::as_raw);
    let flags = libc::__WALL | libc::__WNOTHREAD;
    let mut status = 0;

    loop {
        let res = unsafe { libc::waitpid(pid, &mut status, flags) };

        match Errno::result(res) {
            Ok(pid) => return Ok((Pid::from_raw(pid), status)),
            Err(Errno::EINTR) => continue,
            Err(errno) => return Err(errno),
        }
    }
}

// Check if a wait stop with signal delivery is a group-stop.
//
// Assumes attach-stop has already been ruled out.
fn is_group_stop(pid: Pid, signal: Signo) -> Result<bool> {
    match signal {
        libc::SIGSTOP | libc::SIGTSTP | libc::SIGTTIN | libc::SIGTTOU => {
            // Possible group-stop. Check `siginfo` to disambiguate.
            //
            // From the manual:
            //
            //     If PTRACE_GETSIGINFO fails with EINVAL, then it is definitely a
            //     group-stop.  (Other failure codes are possible, such as ESRCH
            //     ("no such process") if a SIGKILL killed the tracee.)
            //
            match ptrace::getsiginfo(pid) {
                Err(Errno::EINVAL) =>
                    Ok(true),
                Err(err) =>
                    Err::<bool, _>(err).died_if_esrch(pid),
                Ok(_) =>
                    Ok(false)
            }
        },
        _ => {
            // Definitely not a group-stop: only these four signals are stopping signals.
            Ok(false)
        },
    }
}
