//! The bytecode opcode table. Values are the wire format shared with the
//! compiler crate — do not renumber without touching both sides.

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[repr(u8)]
pub enum Opcode {
    Halt = 0,
    Imm = 1,
    Load = 2,
    Load8 = 3,
    Store = 4,
    Store8 = 5,
    Add = 6,
    Sub = 7,
    Mul = 8,
    Div = 9,
    Eq = 10,
    Neq = 11,
    Lt = 12,
    Gt = 13,
    Le = 14,
    Ge = 15,
    Jmp = 16,
    Jz = 17,
    Pop = 18,
    Syscall = 19,
}

impl Opcode {
    pub fn from_byte(b: u8) -> Option<Self> {
        use Opcode::*;
        Some(match b {
            0 => Halt,
            1 => Imm,
            2 => Load,
            3 => Load8,
            4 => Store,
            5 => Store8,
            6 => Add,
            7 => Sub,
            8 => Mul,
            9 => Div,
            10 => Eq,
            11 => Neq,
            12 => Lt,
            13 => Gt,
            14 => Le,
            15 => Ge,
            16 => Jmp,
            17 => Jz,
            18 => Pop,
            19 => Syscall,
            _ => return None,
        })
    }
}

pub const MAGIC: [u8; 7] = *b"BREWEXE";
pub const VERSION: u8 = 1;
pub const HEADER_LEN: usize = 8;
pub const MEMORY_SIZE: usize = 65536;
pub const STACK_SIZE: usize = 256;
pub const HEAP_START: u32 = 8192;
pub const DATA_SEGMENT_START: u32 = 4096;
