//! Architecture-neutral view of syscall-stop register state.
//!
//! Each supported architecture supplies a register struct implementing [`Registers`] and a
//! syscall table, tied together by an [`Abi`] impl. The rest of the crate only sees these
//! traits, never a physical register name.

use std::fmt;

#[cfg(not(any(target_arch = "x86_64", target_arch = "x86", target_arch = "aarch64")))]
compile_error!("pathtrace supports x86_64, x86 and aarch64 hosts only");

/// The ABI of the architecture we were built for.
#[cfg(target_arch = "x86_64")]
pub type HostAbi = crate::x86_64::X86_64;

/// The ABI of the architecture we were built for.
#[cfg(target_arch = "x86")]
pub type HostAbi = crate::x86::X86;

/// The ABI of the architecture we were built for.
#[cfg(target_arch = "aarch64")]
pub type HostAbi = crate::aarch64::Aarch64;

/// Register state of a tracee on the host architecture.
pub type HostRegisters = <HostAbi as Abi>::Registers;

/// Positional syscall argument.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Arg {
    First,
    Second,
    Third,
}

/// How a syscall's leading arguments name a file.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Shape {
    /// Names no file we care about.
    Ignored,

    /// `f(const char *path, ...)`
    Path,

    /// `f(int fd, ...)`, where the descriptor's own path is wanted.
    Fd,

    /// `f(int dirfd, const char *path, ...)`, where a relative `path` is resolved under
    /// `dirfd`, or the working directory if `dirfd == AT_FDCWD`.
    FdPath,
}

/// Syscall table entry.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Syscall {
    pub nr: i64,
    pub name: &'static str,
    pub shape: Shape,
}

impl Syscall {
    pub const fn new(nr: i64, name: &'static str, shape: Shape) -> Self {
        Self { nr, name, shape }
    }
}

impl fmt::Display for Syscall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.name, self.nr)
    }
}

/// Register snapshot taken at a syscall-stop.
///
/// Decoding is total: every snapshot has a syscall number and three argument slots, even
/// if they hold garbage for the syscall actually being made.
pub trait Registers: Copy + fmt::Debug {
    fn syscall_number(&self) -> i64;

    /// Argument as a tracee address, e.g. a `const char *`.
    fn arg_addr(&self, arg: Arg) -> u64;

    /// Argument as a C `int`, e.g. a file descriptor. Only the low 32 bits are significant.
    fn arg_int(&self, arg: Arg) -> i32;
}

/// Syscall calling convention and numbering of one architecture.
pub trait Abi {
    type Registers: Registers;

    const NAME: &'static str;

    /// Known path-related syscalls, sorted by number.
    fn syscalls() -> &'static [Syscall];

    fn lookup(nr: i64) -> Option<&'static Syscall> {
        let table = Self::syscalls();
        table
            .binary_search_by_key(&nr, |sc| sc.nr)
            .ok()
            .map(|i| &table[i])
    }

    fn classify(nr: i64) -> Shape {
        Self::lookup(nr).map_or(Shape::Ignored, |sc| sc.shape)
    }
}

/// Value of `AT_FDCWD`, as passed in the low 32 bits of a `dirfd` argument.
pub const AT_FDCWD: i32 = libc::AT_FDCWD;
