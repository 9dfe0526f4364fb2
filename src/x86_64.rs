use crate::abi::{Abi, Arg, Registers, Shape, Syscall};

/// Defined in [`arch/x86/include/asm/user_64.h`](https://github.com/torvalds/linux/blob/v6.6/arch/x86/include/asm/user_64.h#L69).
///
/// This is the `NT_PRSTATUS` register set of a 64-bit tracee.
#[allow(non_camel_case_types)]
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct user_regs_struct {
    pub r15: u64,
    pub r14: u64,
    pub r13: u64,
    pub r12: u64,
    pub rbp: u64,
    pub rbx: u64,
    pub r11: u64,
    pub r10: u64,
    pub r9: u64,
    pub r8: u64,
    pub rax: u64,
    pub rcx: u64,
    pub rdx: u64,
    pub rsi: u64,
    pub rdi: u64,
    pub orig_rax: u64,
    pub rip: u64,
    pub cs: u64,
    pub eflags: u64,
    pub rsp: u64,
    pub ss: u64,
    pub fs_base: u64,
    pub gs_base: u64,
    pub ds: u64,
    pub es: u64,
    pub fs: u64,
    pub gs: u64,
}

impl user_regs_struct {
    fn arg(&self, arg: Arg) -> u64 {
        match arg {
            Arg::First => self.rdi,
            Arg::Second => self.rsi,
            Arg::Third => self.rdx,
        }
    }

    #[cfg(test)]
    pub(crate) fn syscall(nr: u64, args: [u64; 3]) -> Self {
        Self {
            orig_rax: nr,
            // At syscall-enter-stop, the kernel has already set the return value to `-ENOSYS`.
            rax: -(libc::ENOSYS as i64) as u64,
            rdi: args[0],
            rsi: args[1],
            rdx: args[2],
            ..Self::default()
        }
    }
}

impl Registers for user_regs_struct {
    fn syscall_number(&self) -> i64 {
        self.orig_rax as i64
    }

    fn arg_addr(&self, arg: Arg) -> u64 {
        self.arg(arg)
    }

    fn arg_int(&self, arg: Arg) -> i32 {
        self.arg(arg) as u32 as i32
    }
}

#[derive(Clone, Copy, Debug)]
pub struct X86_64;

impl Abi for X86_64 {
    type Registers = user_regs_struct;

    const NAME: &'static str = "x86_64";

    fn syscalls() -> &'static [Syscall] {
        SYSCALLS
    }
}

use Shape::*;

/// From [`arch/x86/entry/syscalls/syscall_64.tbl`](https://github.com/torvalds/linux/blob/v6.6/arch/x86/entry/syscalls/syscall_64.tbl).
const SYSCALLS: &[Syscall] = &[
    Syscall::new(2, "open", Path),
    Syscall::new(4, "stat", Path),
    Syscall::new(6, "lstat", Path),
    Syscall::new(21, "access", Path),
    Syscall::new(59, "execve", Path),
    Syscall::new(72, "fcntl", Fd),
    Syscall::new(76, "truncate", Path),
    Syscall::new(80, "chdir", Path),
    Syscall::new(81, "fchdir", Fd),
    Syscall::new(82, "rename", Path),
    Syscall::new(83, "mkdir", Path),
    Syscall::new(84, "rmdir", Path),
    Syscall::new(85, "creat", Path),
    Syscall::new(86, "link", Path),
    Syscall::new(87, "unlink", Path),
    Syscall::new(88, "symlink", Path),
    Syscall::new(89, "readlink", Path),
    Syscall::new(90, "chmod", Path),
    Syscall::new(92, "chown", Path),
    Syscall::new(94, "lchown", Path),
    Syscall::new(132, "utime", Path),
    Syscall::new(133, "mknod", Path),
    Syscall::new(137, "statfs", Path),
    Syscall::new(161, "chroot", Path),
    Syscall::new(188, "setxattr", Path),
    Syscall::new(189, "lsetxattr", Path),
    Syscall::new(191, "getxattr", Path),
    Syscall::new(192, "lgetxattr", Path),
    Syscall::new(194, "listxattr", Path),
    Syscall::new(195, "llistxattr", Path),
    Syscall::new(197, "removexattr", Path),
    Syscall::new(198, "lremovexattr", Path),
    Syscall::new(235, "utimes", Path),
    Syscall::new(257, "openat", FdPath),
    Syscall::new(258, "mkdirat", FdPath),
    Syscall::new(259, "mknodat", FdPath),
    Syscall::new(260, "fchownat", FdPath),
    Syscall::new(261, "futimesat", FdPath),
    Syscall::new(262, "newfstatat", FdPath),
    Syscall::new(263, "unlinkat", FdPath),
    Syscall::new(264, "renameat", FdPath),
    Syscall::new(265, "linkat", FdPath),
    Syscall::new(267, "readlinkat", FdPath),
    Syscall::new(268, "fchmodat", FdPath),
    Syscall::new(269, "faccessat", FdPath),
    Syscall::new(280, "utimensat", FdPath),
    Syscall::new(303, "name_to_handle_at", FdPath),
    Syscall::new(316, "renameat2", FdPath),
    Syscall::new(322, "execveat", FdPath),
    Syscall::new(332, "statx", FdPath),
    Syscall::new(437, "openat2", FdPath),
    Syscall::new(439, "faccessat2", FdPath),
    Syscall::new(452, "fchmodat2", FdPath),
];

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abi::tests::{assert_has, assert_table_invariants};

    #[test]
    fn test_table() {
        assert_table_invariants::<X86_64>();

        for name in ["open", "creat", "unlink", "mkdir", "rmdir", "stat", "lstat", "access",
                     "chdir", "link", "symlink", "truncate", "utimes", "statfs", "readlink",
                     "execve"] {
            assert_has::<X86_64>(name, Path);
        }

        for name in ["fchdir", "fcntl"] {
            assert_has::<X86_64>(name, Fd);
        }

        for name in ["openat", "mkdirat", "unlinkat", "fchownat", "fchmodat", "faccessat",
                     "linkat", "mknodat", "readlinkat"] {
            assert_has::<X86_64>(name, FdPath);
        }

        assert_eq!(X86_64::lookup(257).map(|sc| sc.name), Some("openat"));
        assert_eq!(X86_64::classify(0), Ignored); // read
        assert_eq!(X86_64::classify(3), Ignored); // close
    }

    #[test]
    fn test_decode() {
        let mut regs = user_regs_struct::syscall(257, [0xffff_ff9c, 0x5555_5555_8000, 0o644]);
        regs.rbx = 0xdead;

        assert_eq!(regs.syscall_number(), 257);
        assert_eq!(regs.arg_int(Arg::First), libc::AT_FDCWD);
        assert_eq!(regs.arg_addr(Arg::Second), 0x5555_5555_8000);
        assert_eq!(regs.arg_int(Arg::Third), 0o644);
    }

    #[test]
    fn test_arg_int_ignores_high_bits() {
        let regs = user_regs_struct::syscall(72, [0xffff_ffff_0000_0003, 0, 0]);
        assert_eq!(regs.arg_int(Arg::First), 3);
    }

    #[test]
    fn test_layout_matches_kernel() {
        assert_eq!(std::mem::size_of::<user_regs_struct>(), 27 * 8);
    }
}
