//! Recovering the paths named by syscalls, and collecting them over a whole trace.

use std::path::PathBuf;
use std::process::Command;

use tracing::{debug, info};

use crate::abi::{Abi, Arg, HostAbi, Registers, Shape, Syscall, AT_FDCWD};
use crate::error::Result;
use crate::path::absolutize;
use crate::paths::{IgnoreRoots, PathSet};
use crate::ptracer::Ptracer;
use crate::remote::{Process, Resolver};

/// Recover the absolute path named by the syscall whose entry `regs` describes.
///
/// Returns `None` for syscalls that name no path, and whenever any part of the recovery
/// fails. Nothing here is an error: the observation is simply dropped.
pub fn syscall_path<A, R>(regs: &A::Registers, resolver: &R) -> Option<(&'static Syscall, PathBuf)>
where
    A: Abi,
    R: Resolver,
{
    let syscall = A::lookup(regs.syscall_number())?;

    let path = match syscall.shape {
        Shape::Ignored => return None,
        Shape::Path => {
            let candidate = resolver.read_string(regs.arg_addr(Arg::First))?;
            absolutize(&candidate, || resolver.cwd())?
        },
        Shape::Fd => resolver.fd_path(regs.arg_int(Arg::First))?,
        Shape::FdPath => {
            let dirfd = regs.arg_int(Arg::First);
            let candidate = resolver.read_string(regs.arg_addr(Arg::Second))?;

            absolutize(&candidate, || {
                if dirfd == AT_FDCWD {
                    return resolver.cwd();
                }

                // An unresolvable `dirfd` falls back to the working directory.
                resolver.fd_path(dirfd).or_else(|| resolver.cwd())
            })?
        },
    };

    Some((syscall, path))
}

/// Run `cmd` to completion under tracing, and report the existing paths it touched outside
/// of `ignore`, sorted bytewise.
pub fn discover(cmd: Command, ignore: &IgnoreRoots) -> Result<Vec<PathBuf>> {
    let mut tracer = Ptracer::new();
    let root = tracer.spawn(cmd)?;

    let mut paths = PathSet::new();

    // The root's own `execve()` completed before we could see it.
    if let Some(exe) = Process::new(root.pid()).exe() {
        record(&mut paths, root.pid().as_raw(), "exe", exe);
    }

    tracer.run(root, |tracee, regs| {
        let process = Process::new(tracee.pid());

        if let Some((syscall, path)) = syscall_path::<HostAbi, _>(regs, &process) {
            record(&mut paths, tracee.pid().as_raw(), syscall.name, path);
        }
    })?;

    debug!(observed = paths.len(), "trace complete");

    Ok(paths.finish(ignore))
}

fn record(paths: &mut PathSet, pid: i32, syscall: &str, path: PathBuf) {
    if paths.insert(path.clone()) {
        info!(pid, syscall, ?path, "discovered path");
    }
}
