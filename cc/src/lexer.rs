//! Whitespace-skipping lexer: decimal/hex integers, character and string
//! literals with C-style escapes, identifiers/keywords, and the small
//! operator set the language needs.

extern crate alloc;

use alloc::string::String;
use alloc::vec::Vec;

#[derive(Clone, Debug, PartialEq)]
pub enum TokKind {
    IntLit(i32),
    CharLit(u8),
    StrLit(String),
    Ident(String),
    KwIf,
    KwElse,
    KwWhile,
    KwInt,
    KwChar,
    KwVoid,
    KwMain,
    EqEq,
    NotEq,
    LtEq,
    GtEq,
    Lt,
    Gt,
    Plus,
    Minus,
    Star,
    Slash,
    Assign,
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Semi,
    Comma,
    Eof,
}

#[derive(Clone, Debug)]
pub struct Token {
    pub kind: TokKind,
    pub line: u32,
}

pub struct LexError {
    pub line: u32,
    pub message: &'static str,
}

fn keyword(ident: &str) -> Option<TokKind> {
    Some(match ident {
        "if" => TokKind::KwIf,
        "else" => TokKind::KwElse,
        "while" => TokKind::KwWhile,
        "int" => TokKind::KwInt,
        "char" => TokKind::KwChar,
        "void" => TokKind::KwVoid,
        "main" => TokKind::KwMain,
        _ => return None,
    })
}

fn escape_char(c: u8) -> u8 {
    match c {
        b'n' => b'\n',
        b't' => b'\t',
        b'0' => 0,
        b'\\' => b'\\',
        b'\'' => b'\'',
        b'"' => b'"',
        other => other,
    }
}

pub fn tokenize(source: &str) -> Result<Vec<Token>, LexError> {
    let bytes = source.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0usize;
    let mut line = 1u32;

    while i < bytes.len() {
        let c = bytes[i];
        match c {
            b' ' | b'\t' | b'\r' => i += 1,
            b'\n' => {
                line += 1;
                i += 1;
            }
            b'/' if bytes.get(i + 1) == Some(&b'/') => {
                while i < bytes.len() && bytes[i] != b'\n' {
                    i += 1;
                }
            }
            b'0'..=b'9' => {
                let start = i;
                if c == b'0' && bytes.get(i + 1) == Some(&b'x') {
                    i += 2;
                    let hex_start = i;
                    while i < bytes.len() && bytes[i].is_ascii_hexdigit() {
                        i += 1;
                    }
                    let value = i32::from_str_radix(&source[hex_start..i], 16).unwrap_or(0);
                    tokens.push(Token { kind: TokKind::IntLit(value), line });
                } else {
                    while i < bytes.len() && bytes[i].is_ascii_digit() {
                        i += 1;
                    }
                    let value: i32 = source[start..i].parse().unwrap_or(0);
                    tokens.push(Token { kind: TokKind::IntLit(value), line });
                }
            }
            b'\'' => {
                i += 1;
                let value = if bytes.get(i) == Some(&b'\\') {
                    let esc = escape_char(bytes[i + 1]);
                    i += 2;
                    esc
                } else {
                    let v = bytes[i];
                    i += 1;
                    v
                };
                if bytes.get(i) != Some(&b'\'') {
                    return Err(LexError { line, message: "unterminated character literal" });
                }
                i += 1;
                tokens.push(Token { kind: TokKind::CharLit(value), line });
            }
            b'"' => {
                i += 1;
                let mut s = String::new();
                while i < bytes.len() && bytes[i] != b'"' {
                    if bytes[i] == b'\\' {
                        s.push(escape_char(bytes[i + 1]) as char);
                        i += 2;
                    } else {
                        s.push(bytes[i] as char);
                        i += 1;
                    }
                }
                if bytes.get(i) != Some(&b'"') {
                    return Err(LexError { line, message: "unterminated string literal" });
                }
                i += 1;
                tokens.push(Token { kind: TokKind::StrLit(s), line });
            }
            b'a'..=b'z' | b'A'..=b'Z' | b'_' => {
                let start = i;
                while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_') {
                    i += 1;
                }
                let ident = &source[start..i];
                let kind = keyword(ident).unwrap_or_else(|| TokKind::Ident(String::from(ident)));
                tokens.push(Token { kind, line });
            }
            b'=' if bytes.get(i + 1) == Some(&b'=') => {
                tokens.push(Token { kind: TokKind::EqEq, line });
                i += 2;
            }
            b'!' if bytes.get(i + 1) == Some(&b'=') => {
                tokens.push(Token { kind: TokKind::NotEq, line });
                i += 2;
            }
            b'<' if bytes.get(i + 1) == Some(&b'=') => {
                tokens.push(Token { kind: TokKind::LtEq, line });
                i += 2;
            }
            b'>' if bytes.get(i + 1) == Some(&b'=') => {
                tokens.push(Token { kind: TokKind::GtEq, line });
                i += 2;
            }
            b'<' => {
                tokens.push(Token { kind: TokKind::Lt, line });
                i += 1;
            }
            b'>' => {
                tokens.push(Token { kind: TokKind::Gt, line });
                i += 1;
            }
            b'+' => {
                tokens.push(Token { kind: TokKind::Plus, line });
                i += 1;
            }
            b'-' => {
                tokens.push(Token { kind: TokKind::Minus, line });
                i += 1;
            }
            b'*' => {
                tokens.push(Token { kind: TokKind::Star, line });
                i += 1;
            }
            b'/' => {
                tokens.push(Token { kind: TokKind::Slash, line });
                i += 1;
            }
            b'=' => {
                tokens.push(Token { kind: TokKind::Assign, line });
                i += 1;
            }
            b'(' => {
                tokens.push(Token { kind: TokKind::LParen, line });
                i += 1;
            }
            b')' => {
                tokens.push(Token { kind: TokKind::RParen, line });
                i += 1;
            }
            b'[' => {
                tokens.push(Token { kind: TokKind::LBracket, line });
                i += 1;
            }
            b']' => {
                tokens.push(Token { kind: TokKind::RBracket, line });
                i += 1;
            }
            b'{' => {
                tokens.push(Token { kind: TokKind::LBrace, line });
                i += 1;
            }
            b'}' => {
                tokens.push(Token { kind: TokKind::RBrace, line });
                i += 1;
            }
            b';' => {
                tokens.push(Token { kind: TokKind::Semi, line });
                i += 1;
            }
            b',' => {
                tokens.push(Token { kind: TokKind::Comma, line });
                i += 1;
            }
            _ => return Err(LexError { line, message: "unexpected character" }),
        }
    }

    tokens.push(Token { kind: TokKind::Eof, line });
    Ok(tokens)
}
