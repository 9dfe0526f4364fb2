use crate::abi::{Abi, Arg, Registers, Shape, Syscall};

/// Defined in [`arch/arm64/include/uapi/asm/ptrace.h`](https://android.googlesource.com/kernel/common/+/refs/heads/android-mainline/arch/arm64/include/uapi/asm/ptrace.h#88).
#[allow(non_camel_case_types)]
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct user_pt_regs {
    pub regs: [u64; 31],
    pub sp: u64,
    pub pc: u64,
    pub pstate: u64,
}

impl user_pt_regs {
    // Syscall arguments are passed in `x0`..`x5`, and the number in `x8`.
    //
    // Note that `x0` is clobbered by the return value at syscall-exit-stop.
    fn arg(&self, arg: Arg) -> u64 {
        match arg {
            Arg::First => self.regs[0],
            Arg::Second => self.regs[1],
            Arg::Third => self.regs[2],
        }
    }

    #[cfg(test)]
    pub(crate) fn syscall(nr: u64, args: [u64; 3]) -> Self {
        let mut regs = Self::default();
        regs.regs[..3].copy_from_slice(&args);
        regs.regs[8] = nr;
        regs
    }
}

impl Registers for user_pt_regs {
    fn syscall_number(&self) -> i64 {
        self.regs[8] as i64
    }

    fn arg_addr(&self, arg: Arg) -> u64 {
        self.arg(arg)
    }

    fn arg_int(&self, arg: Arg) -> i32 {
        self.arg(arg) as u32 as i32
    }
}

#[derive(Clone, Copy, Debug)]
pub struct Aarch64;

impl Abi for Aarch64 {
    type Registers = user_pt_regs;

    const NAME: &'static str = "aarch64";

    fn syscalls() -> &'static [Syscall] {
        SYSCALLS
    }
}

use Shape::*;

/// From [`include/uapi/asm-generic/unistd.h`](https://github.com/torvalds/linux/blob/v6.6/include/uapi/asm-generic/unistd.h).
///
/// The generic table has no legacy path calls such as `open()` or `stat()`; libc implements
/// them with the `*at()` family.
const SYSCALLS: &[Syscall] = &[
    Syscall::new(5, "setxattr", Path),
    Syscall::new(6, "lsetxattr", Path),
    Syscall::new(8, "getxattr", Path),
    Syscall::new(9, "lgetxattr", Path),
    Syscall::new(11, "listxattr", Path),
    Syscall::new(12, "llistxattr", Path),
    Syscall::new(14, "removexattr", Path),
    Syscall::new(15, "lremovexattr", Path),
    Syscall::new(25, "fcntl", Fd),
    Syscall::new(33, "mknodat", FdPath),
    Syscall::new(34, "mkdirat", FdPath),
    Syscall::new(35, "unlinkat", FdPath),
    Syscall::new(37, "linkat", FdPath),
    Syscall::new(43, "statfs", Path),
    Syscall::new(45, "truncate", Path),
    Syscall::new(48, "faccessat", FdPath),
    Syscall::new(49, "chdir", Path),
    Syscall::new(50, "fchdir", Fd),
    Syscall::new(51, "chroot", Path),
    Syscall::new(53, "fchmodat", FdPath),
    Syscall::new(54, "fchownat", FdPath),
    Syscall::new(56, "openat", FdPath),
    Syscall::new(78, "readlinkat", FdPath),
    Syscall::new(79, "newfstatat", FdPath),
    Syscall::new(88, "utimensat", FdPath),
    Syscall::new(221, "execve", Path),
    Syscall::new(264, "name_to_handle_at", FdPath),
    Syscall::new(276, "renameat2", FdPath),
    Syscall::new(281, "execveat", FdPath),
    Syscall::new(291, "statx", FdPath),
    Syscall::new(437, "openat2", FdPath),
    Syscall::new(439, "faccessat2", FdPath),
    Syscall::new(452, "fchmodat2", FdPath),
];
