use crate::abi::{Abi, Arg, Registers, Shape, Syscall};

/// Defined in [`arch/x86/include/asm/user_32.h`](https://github.com/torvalds/linux/blob/v6.6/arch/x86/include/asm/user_32.h#L75).
///
/// This is the `NT_PRSTATUS` register set of a 32-bit tracee.
#[allow(non_camel_case_types)]
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct user_regs_struct {
    pub ebx: u32,
    pub ecx: u32,
    pub edx: u32,
    pub esi: u32,
    pub edi: u32,
    pub ebp: u32,
    pub eax: u32,
    pub xds: u32,
    pub xes: u32,
    pub xfs: u32,
    pub xgs: u32,
    pub orig_eax: u32,
    pub eip: u32,
    pub xcs: u32,
    pub eflags: u32,
    pub esp: u32,
    pub xss: u32,
}

impl user_regs_struct {
    fn arg(&self, arg: Arg) -> u32 {
        match arg {
            Arg::First => self.ebx,
            Arg::Second => self.ecx,
            Arg::Third => self.edx,
        }
    }

    #[cfg(test)]
    pub(crate) fn syscall(nr: u32, args: [u32; 3]) -> Self {
        Self {
            orig_eax: nr,
            eax: -libc::ENOSYS as u32,
            ebx: args[0],
            ecx: args[1],
            edx: args[2],
            ..Self::default()
        }
    }
}

impl Registers for user_regs_struct {
    fn syscall_number(&self) -> i64 {
        // `orig_eax` is a signed `long`.
        self.orig_eax as i32 as i64
    }

    fn arg_addr(&self, arg: Arg) -> u64 {
        self.arg(arg) as u64
    }

    fn arg_int(&self, arg: Arg) -> i32 {
        self.arg(arg) as i32
    }
}

#[derive(Clone, Copy, Debug)]
pub struct X86;

impl Abi for X86 {
    type Registers = user_regs_struct;

    const NAME: &'static str = "x86";

    fn syscalls() -> &'static [Syscall] {
        SYSCALLS
    }
}

use Shape::*;

/// From [`arch/x86/entry/syscalls/syscall_32.tbl`](https://github.com/torvalds/linux/blob/v6.6/arch/x86/entry/syscalls/syscall_32.tbl).
const SYSCALLS: &[Syscall] = &[
    Syscall::new(5, "open", Path),
    Syscall::new(8, "creat", Path),
    Syscall::new(9, "link", Path),
    Syscall::new(10, "unlink", Path),
    Syscall::new(11, "execve", Path),
    Syscall::new(12, "chdir", Path),
    Syscall::new(14, "mknod", Path),
    Syscall::new(15, "chmod", Path),
    Syscall::new(16, "lchown", Path),
    Syscall::new(30, "utime", Path),
    Syscall::new(33, "access", Path),
    Syscall::new(38, "rename", Path),
    Syscall::new(39, "mkdir", Path),
    Syscall::new(40, "rmdir", Path),
    Syscall::new(55, "fcntl", Fd),
    Syscall::new(61, "chroot", Path),
    Syscall::new(83, "symlink", Path),
    Syscall::new(85, "readlink", Path),
    Syscall::new(92, "truncate", Path),
    Syscall::new(99, "statfs", Path),
    Syscall::new(106, "stat", Path),
    Syscall::new(107, "lstat", Path),
    Syscall::new(133, "fchdir", Fd),
    Syscall::new(182, "chown", Path),
    Syscall::new(193, "truncate64", Path),
    Syscall::new(195, "stat64", Path),
    Syscall::new(196, "lstat64", Path),
    Syscall::new(198, "lchown32", Path),
    Syscall::new(212, "chown32", Path),
    Syscall::new(221, "fcntl64", Fd),
    Syscall::new(226, "setxattr", Path),
    Syscall::new(227, "lsetxattr", Path),
    Syscall::new(229, "getxattr", Path),
    Syscall::new(230, "lgetxattr", Path),
    Syscall::new(232, "listxattr", Path),
    Syscall::new(233, "llistxattr", Path),
    Syscall::new(235, "removexattr", Path),
    Syscall::new(236, "lremovexattr", Path),
    Syscall::new(268, "statfs64", Path),
    Syscall::new(271, "utimes", Path),
    Syscall::new(295, "openat", FdPath),
    Syscall::new(296, "mkdirat", FdPath),
    Syscall::new(297, "mknodat", FdPath),
    Syscall::new(298, "fchownat", FdPath),
    Syscall::new(299, "futimesat", FdPath),
    Syscall::new(300, "fstatat64", FdPath),
    Syscall::new(301, "unlinkat", FdPath),
    Syscall::new(302, "renameat", FdPath),
    Syscall::new(303, "linkat", FdPath),
    Syscall::new(305, "readlinkat", FdPath),
    Syscall::new(306, "fchmodat", FdPath),
    Syscall::new(307, "faccessat", FdPath),
    Syscall::new(320, "utimensat", FdPath),
    Syscall::new(341, "name_to_handle_at", FdPath),
    Syscall::new(353, "renameat2", FdPath),
    Syscall::new(358, "execveat", FdPath),
    Syscall::new(383, "statx", FdPath),
    Syscall::new(437, "openat2", FdPath),
    Syscall::new(439, "faccessat2", FdPath),
    Syscall::new(452, "fchmodat2", FdPath),
];
