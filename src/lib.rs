//! Discover the files a command touches, by tracing it and its descendants with `ptrace(2)`.
//!
//! The [`ptracer`] module drives the tracees. Each syscall-entry stop is decoded with the
//! host [`abi`], and any path it names is recovered via [`remote`] and [`path`], then
//! collected in a [`paths::PathSet`]. [`discover::discover()`] ties these together.

pub mod aarch64;
pub mod abi;
pub mod cli;
pub mod discover;
pub mod error;
pub mod path;
pub mod paths;
pub mod ptracer;
pub mod remote;
pub mod x86;
pub mod x86_64;

pub use abi::{Abi, HostAbi, HostRegisters, Registers, Shape, Syscall};
pub use discover::{discover, syscall_path};
pub use error::Error;
pub use paths::{IgnoreRoots, PathSet};
pub use ptracer::{Pid, Ptracer, Stop, Tracee};
pub use remote::{Process, Resolver};
