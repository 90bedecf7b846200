//! Syscall ids, shared with the compiler's builtin table so that a name
//! resolves to the same id on both sides of the wire format.

pub const PRINT_INT: u32 = 0;
pub const PRINT_CHAR: u32 = 1;
pub const PRINT_STR: u32 = 2;
pub const GETCHAR: u32 = 3;
pub const CLS: u32 = 4;
pub const NEWLINE: u32 = 5;
pub const KB_HIT: u32 = 6;
pub const SLEEP: u32 = 7;

pub const MALLOC: u32 = 8;
pub const FREE: u32 = 9;
pub const PEEK: u32 = 10;
pub const POKE: u32 = 11;
pub const MEMSET: u32 = 12;
pub const MEMCPY: u32 = 13;
pub const MEMMOVE: u32 = 14;

pub const STRLEN: u32 = 15;
pub const STRCMP: u32 = 16;
pub const STRCPY: u32 = 17;
pub const STRNCMP: u32 = 18;
pub const STRNCPY: u32 = 19;
pub const STRNCAT: u32 = 20;
pub const STRSTR: u32 = 21;
pub const STRRCHR: u32 = 22;
pub const ISALNUM: u32 = 23;
pub const ISALPHA: u32 = 24;
pub const ISDIGIT: u32 = 25;
pub const TOLOWER: u32 = 26;
pub const TOUPPER: u32 = 27;

pub const ABS: u32 = 28;
pub const MIN: u32 = 29;
pub const MAX: u32 = 30;
pub const POW: u32 = 31;
pub const SQRT: u32 = 32;
pub const RAND: u32 = 33;
pub const SRAND: u32 = 34;

pub const DRAW_PIXEL: u32 = 35;
pub const DRAW_RECT: u32 = 36;
pub const DRAW_LINE: u32 = 37;
pub const DRAW_TEXT: u32 = 38;
pub const GET_WIDTH: u32 = 39;
pub const GET_HEIGHT: u32 = 40;

/// `(name, syscall id)` pairs the compiler's builtin table is built from.
pub const BUILTINS: &[(&str, u32)] = &[
    ("print_int", PRINT_INT),
    ("print_char", PRINT_CHAR),
    ("print_str", PRINT_STR),
    ("getchar", GETCHAR),
    ("cls", CLS),
    ("nl", NEWLINE),
    ("newline", NEWLINE),
    ("kb_hit", KB_HIT),
    ("sleep", SLEEP),
    ("malloc", MALLOC),
    ("free", FREE),
    ("peek", PEEK),
    ("poke", POKE),
    ("memset", MEMSET),
    ("memcpy", MEMCPY),
    ("memmove", MEMMOVE),
    ("strlen", STRLEN),
    ("strcmp", STRCMP),
    ("strcpy", STRCPY),
    ("strncmp", STRNCMP),
    ("strncpy", STRNCPY),
    ("strncat", STRNCAT),
    ("strstr", STRSTR),
    ("strrchr", STRRCHR),
    ("isalnum", ISALNUM),
    ("isalpha", ISALPHA),
    ("isdigit", ISDIGIT),
    ("tolower", TOLOWER),
    ("toupper", TOUPPER),
    ("abs", ABS),
    ("min", MIN),
    ("max", MAX),
    ("pow", POW),
    ("sqrt", SQRT),
    ("rand", RAND),
    ("srand", SRAND),
    ("draw_pixel", DRAW_PIXEL),
    ("draw_rect", DRAW_RECT),
    ("draw_line", DRAW_LINE),
    ("draw_text", DRAW_TEXT),
    ("get_width", GET_WIDTH),
    ("get_height", GET_HEIGHT),
];

/// Number of arguments each syscall pops, in push order (left-to-right on
/// the source side, so the interpreter pops them right-to-left and reverses).
pub fn arg_count(id: u32) -> usize {
    match id {
        GETCHAR | CLS | NEWLINE | KB_HIT | RAND | GET_WIDTH | GET_HEIGHT => 0,
        PRINT_INT | PRINT_CHAR | PRINT_STR | SLEEP | MALLOC | STRLEN | ABS | SQRT | SRAND
        | STRRCHR | PEEK | TOLOWER | TOUPPER | ISALNUM | ISALPHA | ISDIGIT | FREE => 1,
        POKE | STRCMP | STRCPY | MIN | MAX | STRSTR => 2,
        MEMSET | POW | MEMCPY | MEMMOVE | STRNCMP | STRNCPY | STRNCAT | DRAW_PIXEL => 3,
        DRAW_TEXT => 4,
        DRAW_RECT | DRAW_LINE => 5,
        _ => 0,
    }
}
