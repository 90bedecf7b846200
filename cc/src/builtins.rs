//! Identifier-to-syscall-id resolution, backed by the VM's own builtin
//! table so both sides of the ABI stay in lockstep.

use drift_vm::syscall;

pub fn lookup(name: &str) -> Option<u32> {
    syscall::BUILTINS.iter().find(|(n, _)| *n == name).map(|(_, id)| *id)
}

pub fn arg_count(id: u32) -> usize {
    syscall::arg_count(id)
}
