//! One-pass recursive-descent parser: no intermediate AST, every production
//! emits bytecode as it recognizes it. Forward jumps (`if`/`while`) are
//! patched once their target address is known.

extern crate alloc;

use alloc::string::String;
use alloc::vec::Vec;

use drift_vm::opcode::Opcode;
use drift_vm::syscall;

use crate::builtins;
use crate::emit::Emitter;
use crate::lexer::{LexError, Token, TokKind};
use crate::symtab::SymbolTable;

pub struct CompileError {
    pub line: u32,
    pub message: String,
}

impl From<LexError> for CompileError {
    fn from(e: LexError) -> Self {
        Self { line: e.line, message: String::from(e.message) }
    }
}

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    emitter: Emitter,
    symtab: SymbolTable,
}

type PResult<T> = Result<T, CompileError>;

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Self { tokens, pos: 0, emitter: Emitter::new(), symtab: SymbolTable::new() }
    }

    fn err(&self, message: &str) -> CompileError {
        CompileError { line: self.line(), message: String::from(message) }
    }

    fn line(&self) -> u32 {
        self.tokens[self.pos].line
    }

    fn peek(&self) -> &TokKind {
        &self.tokens[self.pos].kind
    }

    fn advance(&mut self) -> TokKind {
        let kind = self.tokens[self.pos].kind.clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        kind
    }

    fn expect(&mut self, kind: &TokKind) -> PResult<()> {
        if core::mem::discriminant(self.peek()) == core::mem::discriminant(kind) {
            self.advance();
            Ok(())
        } else {
            Err(self.err("unexpected token"))
        }
    }

    pub fn parse_program(mut self) -> PResult<Vec<u8>> {
        match self.peek() {
            TokKind::KwInt | TokKind::KwVoid => {
                self.advance();
            }
            _ => return Err(self.err("expected 'int' or 'void'")),
        }
        self.expect(&TokKind::KwMain)?;
        self.expect(&TokKind::LParen)?;
        self.expect(&TokKind::RParen)?;
        self.block()?;
        self.emitter.op(Opcode::Halt);
        Ok(self.emitter.finish())
    }

    fn block(&mut self) -> PResult<()> {
        self.expect(&TokKind::LBrace)?;
        while *self.peek() != TokKind::RBrace {
            self.statement()?;
        }
        self.expect(&TokKind::RBrace)?;
        Ok(())
    }

    fn statement(&mut self) -> PResult<()> {
        match self.peek().clone() {
            TokKind::KwInt | TokKind::KwChar => self.declaration(),
            TokKind::LBrace => self.block(),
            TokKind::KwIf => self.if_stmt(),
            TokKind::KwWhile => self.while_stmt(),
            TokKind::Ident(name) => self.ident_statement(&name),
            _ => Err(self.err("expected statement")),
        }
    }

    fn declaration(&mut self) -> PResult<()> {
        self.advance(); // int | char
        let name = self.expect_ident()?;

        if *self.peek() == TokKind::LBracket {
            self.advance();
            let len = match self.advance() {
                TokKind::IntLit(n) => n as u32,
                _ => return Err(self.err("expected array length")),
            };
            self.expect(&TokKind::RBracket)?;
            self.symtab
                .declare(&name, Some(len))
                .ok_or_else(|| self.err("duplicate declaration"))?;
            self.expect(&TokKind::Semi)?;
            return Ok(());
        }

        let addr = self.symtab.declare(&name, None).ok_or_else(|| self.err("duplicate declaration"))?;
        if *self.peek() == TokKind::Assign {
            self.advance();
            self.expression()?;
            self.emitter.op_addr(Opcode::Store, addr);
        }
        self.expect(&TokKind::Semi)?;
        Ok(())
    }

    fn ident_statement(&mut self, name: &str) -> PResult<()> {
        self.advance(); // ident
        match self.peek() {
            TokKind::LBracket => {
                self.advance();
                self.emit_array_address(name)?;
                self.expect(&TokKind::RBracket)?;
                self.expect(&TokKind::Assign)?;
                self.expression()?;
                self.emitter.op_addr(Opcode::Syscall, syscall::POKE);
                self.emitter.op(Opcode::Pop);
                self.expect(&TokKind::Semi)?;
                Ok(())
            }
            TokKind::Assign => {
                self.advance();
                let (addr, is_array) = self.symtab.lookup(name).ok_or_else(|| self.err("undeclared variable"))?;
                if is_array {
                    return Err(self.err("cannot assign directly to an array"));
                }
                self.expression()?;
                self.emitter.op_addr(Opcode::Store, addr);
                self.expect(&TokKind::Semi)?;
                Ok(())
            }
            TokKind::LParen => {
                self.compile_call(name)?;
                self.emitter.op(Opcode::Pop);
                self.expect(&TokKind::Semi)?;
                Ok(())
            }
            _ => Err(self.err("expected '=' or '(' after identifier")),
        }
    }

    fn if_stmt(&mut self) -> PResult<()> {
        self.advance();
        self.expect(&TokKind::LParen)?;
        self.expression()?;
        self.expect(&TokKind::RParen)?;
        let else_patch = self.emitter.jump_placeholder(Opcode::Jz);
        self.block()?;

        if *self.peek() == TokKind::KwElse {
            let end_patch = self.emitter.jump_placeholder(Opcode::Jmp);
            self.emitter.patch_to_here(else_patch);
            self.advance();
            self.block()?;
            self.emitter.patch_to_here(end_patch);
        } else {
            self.emitter.patch_to_here(else_patch);
        }
        Ok(())
    }

    fn while_stmt(&mut self) -> PResult<()> {
        self.advance();
        let loop_top = self.emitter.here();
        self.expect(&TokKind::LParen)?;
        self.expression()?;
        self.expect(&TokKind::RParen)?;
        let exit_patch = self.emitter.jump_placeholder(Opcode::Jz);
        self.block()?;
        self.emitter.jump_to(Opcode::Jmp, loop_top);
        self.emitter.patch_to_here(exit_patch);
        Ok(())
    }

    fn expression(&mut self) -> PResult<()> {
        self.relation()
    }

    fn relation(&mut self) -> PResult<()> {
        self.additive()?;
        let op = match self.peek() {
            TokKind::EqEq => Some(Opcode::Eq),
            TokKind::NotEq => Some(Opcode::Neq),
            TokKind::Lt => Some(Opcode::Lt),
            TokKind::Gt => Some(Opcode::Gt),
            TokKind::LtEq => Some(Opcode::Le),
            TokKind::GtEq => Some(Opcode::Ge),
            _ => None,
        };
        if let Some(op) = op {
            self.advance();
            self.additive()?;
            self.emitter.op(op);
        }
        Ok(())
    }

    fn additive(&mut self) -> PResult<()> {
        self.term()?;
        loop {
            let op = match self.peek() {
                TokKind::Plus => Opcode::Add,
                TokKind::Minus => Opcode::Sub,
                _ => break,
            };
            self.advance();
            self.term()?;
            self.emitter.op(op);
        }
        Ok(())
    }

    fn term(&mut self) -> PResult<()> {
        self.factor()?;
        loop {
            let op = match self.peek() {
                TokKind::Star => Opcode::Mul,
                TokKind::Slash => Opcode::Div,
                _ => break,
            };
            self.advance();
            self.factor()?;
            self.emitter.op(op);
        }
        Ok(())
    }

    fn factor(&mut self) -> PResult<()> {
        match self.peek().clone() {
            TokKind::IntLit(v) => {
                self.advance();
                self.emitter.imm(v);
                Ok(())
            }
            TokKind::CharLit(c) => {
                self.advance();
                self.emitter.imm(c as i32);
                Ok(())
            }
            TokKind::StrLit(s) => {
                self.advance();
                self.emitter.push_string(s.as_bytes());
                Ok(())
            }
            TokKind::Minus => {
                self.advance();
                self.emitter.imm(0);
                self.factor()?;
                self.emitter.op(Opcode::Sub);
                Ok(())
            }
            TokKind::LParen => {
                self.advance();
                self.expression()?;
                self.expect(&TokKind::RParen)?;
                Ok(())
            }
            TokKind::Ident(name) => {
                self.advance();
                match self.peek() {
                    TokKind::LBracket => {
                        self.advance();
                        self.emit_array_address(&name)?;
                        self.expect(&TokKind::RBracket)?;
                        self.emitter.op_addr(Opcode::Syscall, syscall::PEEK);
                        Ok(())
                    }
                    TokKind::LParen => self.compile_call(&name),
                    _ => {
                        let (addr, is_array) =
                            self.symtab.lookup(&name).ok_or_else(|| self.err("undeclared variable"))?;
                        if is_array {
                            return Err(self.err("array used without an index"));
                        }
                        self.emitter.op_addr(Opcode::Load, addr);
                        Ok(())
                    }
                }
            }
            _ => Err(self.err("expected expression")),
        }
    }

    /// Emits code that leaves `base_addr + index*4` on the stack.
    fn emit_array_address(&mut self, name: &str) -> PResult<()> {
        let (addr, is_array) = self.symtab.lookup(name).ok_or_else(|| self.err("undeclared variable"))?;
        if !is_array {
            return Err(self.err("indexing a non-array variable"));
        }
        self.emitter.imm(addr as i32);
        self.expression()?;
        self.emitter.imm(4);
        self.emitter.op(Opcode::Mul);
        self.emitter.op(Opcode::Add);
        Ok(())
    }

    fn compile_call(&mut self, name: &str) -> PResult<()> {
        self.advance(); // consumes the '(' the caller peeked at
        let id = builtins::lookup(name).ok_or_else(|| self.err("unknown function"))?;

        let mut argc = 0;
        if *self.peek() != TokKind::RParen {
            loop {
                self.expression()?;
                argc += 1;
                if *self.peek() == TokKind::Comma {
                    self.advance();
                } else {
                    break;
                }
            }
        }
        self.expect(&TokKind::RParen)?;

        if argc != builtins::arg_count(id) {
            return Err(self.err("wrong number of arguments"));
        }

        self.emitter.op_addr(Opcode::Syscall, id);
        Ok(())
    }

    fn expect_ident(&mut self) -> PResult<String> {
        match self.advance() {
            TokKind::Ident(name) => Ok(name),
            _ => Err(self.err("expected identifier")),
        }
    }
}
