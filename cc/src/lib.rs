//! One-pass compiler for the small C-like scripting language that targets
//! the stack-machine bytecode format consumed by `drift-vm`.

#![no_std]

extern crate alloc;

mod builtins;
mod emit;
mod lexer;
mod symtab;
mod parser;

use alloc::vec::Vec;

pub use parser::CompileError;

/// Compiles `source` into a `drift-vm` bytecode image, or `Err` with a line
/// number and message on the first lexical or syntax error encountered. No
/// partial image is ever returned on failure.
pub fn compile(source: &str) -> Result<Vec<u8>, CompileError> {
    let tokens = lexer::tokenize(source)?;
    parser::Parser::new(tokens).parse_program()
}
