//! Code buffer plus the string-pool relocation pass ("the link step").
//!
//! String literals are pushed with `PUSH_PTR <pool-relative offset>` during
//! code generation (before the pool's final address is known), then after
//! the code is fully emitted, `relocate_strings` appends the pool and
//! rewrites every `PUSH_PTR` into a plain `IMM` carrying the absolute
//! address.

extern crate alloc;

use alloc::vec::Vec;

use drift_vm::opcode::{Opcode, HEADER_LEN, MAGIC, VERSION};

/// A forward-reference patch site: the byte offset of a 4-byte operand
/// that needs filling in once its target address is known.
pub struct Patch(pub usize);

pub struct Emitter {
    code: Vec<u8>,
    pool: Vec<u8>,
    push_ptr_sites: Vec<usize>,
}

impl Emitter {
    pub fn new() -> Self {
        Self { code: Vec::new(), pool: Vec::new(), push_ptr_sites: Vec::new() }
    }

    pub fn here(&self) -> usize {
        HEADER_LEN + self.code.len()
    }

    fn push_u8(&mut self, b: u8) {
        self.code.push(b);
    }

    fn push_u32(&mut self, v: u32) {
        self.code.extend_from_slice(&v.to_le_bytes());
    }

    pub fn op(&mut self, op: Opcode) {
        self.push_u8(op as u8);
    }

    pub fn op_addr(&mut self, op: Opcode, addr: u32) {
        self.push_u8(op as u8);
        self.push_u32(addr);
    }

    pub fn imm(&mut self, value: i32) {
        self.push_u8(Opcode::Imm as u8);
        self.push_u32(value as u32);
    }

    /// Emits a placeholder jump, returning a patch site for its operand.
    pub fn jump_placeholder(&mut self, op: Opcode) -> Patch {
        self.push_u8(op as u8);
        let site = self.code.len();
        self.push_u32(0);
        Patch(site)
    }

    /// Fills in a previously emitted placeholder with `self.here()`.
    pub fn patch_to_here(&mut self, patch: Patch) {
        let target = self.here() as u32;
        self.code[patch.0..patch.0 + 4].copy_from_slice(&target.to_le_bytes());
    }

    pub fn jump_to(&mut self, op: Opcode, target: usize) {
        self.push_u8(op as u8);
        self.push_u32(target as u32);
    }

    /// Interns a string literal. Emits `IMM <pool-relative offset>` now;
    /// the offset is rewritten to an absolute address by
    /// [`relocate_strings`] once code generation finishes.
    pub fn push_string(&mut self, s: &[u8]) {
        let pool_offset = self.pool.len() as u32;
        self.pool.extend_from_slice(s);
        self.pool.push(0);

        self.push_u8(Opcode::Imm as u8);
        self.push_ptr_sites.push(self.code.len());
        self.push_u32(pool_offset);
    }

    /// Appends the string pool after the code and rewrites every
    /// `push_string` site from a pool-relative offset to an absolute
    /// address. Returns the finished image (magic + version + code + pool).
    pub fn finish(mut self) -> Vec<u8> {
        let pool_start = (HEADER_LEN + self.code.len()) as u32;
        for &site in &self.push_ptr_sites {
            let rel = u32::from_le_bytes(self.code[site..site + 4].try_into().unwrap());
            let abs = pool_start + rel;
            self.code[site..site + 4].copy_from_slice(&abs.to_le_bytes());
        }

        let mut out = Vec::with_capacity(HEADER_LEN + self.code.len() + self.pool.len());
        out.extend_from_slice(&MAGIC);
        out.push(VERSION);
        out.extend_from_slice(&self.code);
        out.extend_from_slice(&self.pool);
        out
    }
}
