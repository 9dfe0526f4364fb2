#![allow(unused)]

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::Result;
use pathtrace::{Pid, Ptracer, Stop, Tracee};

/// Send library logs to the test harness, so they show up for failing tests.
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Trace `cmd` to completion, restarting every stop as-is, and return every stop seen.
pub fn trace_events(cmd: Command) -> Result<Vec<Tracee>> {
    init_logging();

    let mut tracer = Ptracer::new();
    let tracee = tracer.spawn(cmd)?;
    tracer.restart(tracee)?;

    let mut events = vec![];

    while let Some(tracee) = tracer.wait()? {
        eprintln!("{}: {:?}", tracee.pid(), tracee.stop());

        events.push(tracee);

        tracer.restart(tracee)?;
    }

    assert_eq!(tracer.tracee_count(), 0);

    Ok(events)
}

/// Group stops by tracee, preserving order.
pub fn stops_by_pid(events: &[Tracee]) -> BTreeMap<Pid, Vec<Stop>> {
    let mut map: BTreeMap<Pid, Vec<Stop>> = BTreeMap::new();

    for tracee in events {
        map.entry(tracee.pid()).or_default().push(tracee.stop());
    }

    map
}

/// Pids reported as created by a fork, vfork, or clone.
pub fn new_pids(events: &[Tracee]) -> Vec<Pid> {
    events
        .iter()
        .filter_map(|tracee| match tracee.stop() {
            Stop::Fork { new } | Stop::Vfork { new } | Stop::Clone { new } => Some(new),
            _ => None,
        })
        .collect()
}

/// Create an empty file at `dir/rel`, with any missing parents.
pub fn touch(dir: &Path, rel: &str) -> Result<PathBuf> {
    let path = dir.join(rel);

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    fs::write(&path, b"contents\n")?;

    Ok(path)
}

pub fn sh(script: &str) -> Command {
    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg(script);
    cmd
}
