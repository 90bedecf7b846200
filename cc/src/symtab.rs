//! Flat, function-level symbol table. Every variable gets a fixed address
//! in the VM's data segment; there are no nested scopes.

extern crate alloc;

use alloc::string::String;
use alloc::vec::Vec;

use drift_vm::opcode::DATA_SEGMENT_START;

const STRIDE: u32 = 4;

struct Symbol {
    name: String,
    addr: u32,
    is_array: bool,
}

pub struct SymbolTable {
    symbols: Vec<Symbol>,
    next_addr: u32,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self { symbols: Vec::new(), next_addr: DATA_SEGMENT_START }
    }

    /// Declares `name` and returns its address, or `None` if already declared.
    pub fn declare(&mut self, name: &str, array_len: Option<u32>) -> Option<u32> {
        if self.symbols.iter().any(|s| s.name == name) {
            return None;
        }
        let addr = self.next_addr;
        let words = array_len.unwrap_or(1).max(1);
        self.next_addr += words * STRIDE;
        self.symbols.push(Symbol { name: String::from(name), addr, is_array: array_len.is_some() });
        Some(addr)
    }

    pub fn lookup(&self, name: &str) -> Option<(u32, bool)> {
        self.symbols.iter().find(|s| s.name == name).map(|s| (s.addr, s.is_array))
    }
}
