//! Bytecode interpreter for `drift-cc` output: a 64 KB linear memory, a
//! bounded stack, and a syscall table covering I/O, memory, strings, math
//! and graphics. Every memory-touching opcode and syscall is bounds-checked
//! so a wayward program cannot reach outside its own sandbox.

#![no_std]

mod graphics;
mod interp;
pub mod opcode;
pub mod syscall;

pub use interp::run;

/// Loads a compiled program from the filesystem and runs it. Returns
/// `false` if the path cannot be opened or the file is not a valid image.
pub fn run_file(path: &[u8]) -> bool {
    let Ok(mut handle) = drift_fs::vfs_open(path, false) else {
        return false;
    };
    let size = handle.size() as usize;
    if size == 0 || size > opcode::MEMORY_SIZE {
        return false;
    }

    let mut buf = [0u8; opcode::MEMORY_SIZE];
    let Ok(read) = handle.read(&mut buf[..size]) else {
        return false;
    };
    run(&buf[..read])
}
