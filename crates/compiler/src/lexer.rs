//! Tokenizer for Slate source text.
//!
//! Tokenization is greedy and whitespace-insensitive: a two-character
//! operator always wins over the one-character prefix it starts with.
//! There is no comment syntax. Every token records the 1-based line its
//! first character was read on.

use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Eof,
    // single-character tokens
    Plus,
    Minus,
    Star,
    Slash,
    Semi,
    Comma,
    Amp,
    Colon,
    Dot,
    Assign,
    Gt,
    Lt,
    Not,
    Pipe,
    Caret,
    Tilde,
    Question,
    LParen,
    RParen,
    LBrack,
    RBrack,
    LBrace,
    RBrace,
    // two-character tokens
    Arrow,
    EqEq,
    Neq,
    Gte,
    Lte,
    AndAnd,
    OrOr,
    Inc,
    Dec,
    // literals and names
    IntLit(u64),
    StrLit(String),
    Ident(String),
    // keywords
    Asm,
    Return,
    While,
    If,
    Else,
    For,
    Fn,
    Var,
    Sizeof,
    Goto,
    Label,
    Typedef,
    Struct,
    Union,
    Public,
    Extern,
    Int8,
    Int16,
    Int32,
    Int64,
    Uint8,
    Uint16,
    Uint32,
    Uint64,
    Float32,
    Float64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    /// 1-based source line of the token's first character.
    pub line: u32,
}

fn keyword(ident: &str) -> Option<TokenKind> {
    let kind = match ident {
        "asm" => TokenKind::Asm,
        "return" => TokenKind::Return,
        "while" => TokenKind::While,
        "if" => TokenKind::If,
        "else" => TokenKind::Else,
        "for" => TokenKind::For,
        "fn" => TokenKind::Fn,
        "var" => TokenKind::Var,
        "sizeof" => TokenKind::Sizeof,
        "goto" => TokenKind::Goto,
        "label" => TokenKind::Label,
        "typedef" => TokenKind::Typedef,
        "struct" => TokenKind::Struct,
        "union" => TokenKind::Union,
        "public" => TokenKind::Public,
        "extern" => TokenKind::Extern,
        "int8" => TokenKind::Int8,
        "int16" => TokenKind::Int16,
        "int32" => TokenKind::Int32,
        "int64" => TokenKind::Int64,
        "uint8" => TokenKind::Uint8,
        "uint16" => TokenKind::Uint16,
        "uint32" => TokenKind::Uint32,
        "uint64" => TokenKind::Uint64,
        "float32" => TokenKind::Float32,
        "float64" => TokenKind::Float64,
        _ => return None,
    };
    Some(kind)
}

/// Parse an integer literal run: `0x` prefix is hex, a leading `0` with
/// more digits is octal, anything else is decimal.
fn parse_int(text: &str, line: u32) -> Result<u64, String> {
    let (digits, base) = if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        (hex, 16)
    } else if text.len() > 1 && text.starts_with('0') {
        (&text[1..], 8)
    } else {
        (text, 10)
    };
    u64::from_str_radix(digits, base)
        .map_err(|_| format!("line {}: invalid integer literal '{}'", line, text))
}

/// Tokenize a whole source file, appending a final `Eof` token.
pub fn tokenize(source: &str) -> Result<Vec<Token>, String> {
    let mut tokens = Vec::new();
    let mut chars = source.chars().peekable();
    let mut line: u32 = 1;

    while let Some(c) = chars.next() {
        if c == '\n' {
            line += 1;
            continue;
        }
        if c.is_whitespace() {
            continue;
        }

        let tok_line = line;
        let kind = match c {
            '+' => {
                if chars.next_if_eq(&'+').is_some() {
                    TokenKind::Inc
                } else {
                    TokenKind::Plus
                }
            }
            '-' => {
                if chars.next_if_eq(&'-').is_some() {
                    TokenKind::Dec
                } else if chars.next_if_eq(&'>').is_some() {
                    TokenKind::Arrow
                } else {
                    TokenKind::Minus
                }
            }
            '=' => {
                if chars.next_if_eq(&'=').is_some() {
                    TokenKind::EqEq
                } else {
                    TokenKind::Assign
                }
            }
            '!' => {
                if chars.next_if_eq(&'=').is_some() {
                    TokenKind::Neq
                } else {
                    TokenKind::Not
                }
            }
            '>' => {
                if chars.next_if_eq(&'=').is_some() {
                    TokenKind::Gte
                } else {
                    TokenKind::Gt
                }
            }
            '<' => {
                if chars.next_if_eq(&'=').is_some() {
                    TokenKind::Lte
                } else {
                    TokenKind::Lt
                }
            }
            '&' => {
                if chars.next_if_eq(&'&').is_some() {
                    TokenKind::AndAnd
                } else {
                    TokenKind::Amp
                }
            }
            '|' => {
                if chars.next_if_eq(&'|').is_some() {
                    TokenKind::OrOr
                } else {
                    TokenKind::Pipe
                }
            }
            '*' => TokenKind::Star,
            '/' => TokenKind::Slash,
            ';' => TokenKind::Semi,
            ',' => TokenKind::Comma,
            ':' => TokenKind::Colon,
            '.' => TokenKind::Dot,
            '^' => TokenKind::Caret,
            '~' => TokenKind::Tilde,
            '?' => TokenKind::Question,
            '(' => TokenKind::LParen,
            ')' => TokenKind::RParen,
            '[' => TokenKind::LBrack,
            ']' => TokenKind::RBrack,
            '{' => TokenKind::LBrace,
            '}' => TokenKind::RBrace,
            '"' => {
                let mut s = String::new();
                loop {
                    match chars.next() {
                        None => {
                            return Err(format!(
                                "line {}: unterminated string literal",
                                tok_line
                            ));
                        }
                        Some('"') => break,
                        Some('\\') => match chars.next() {
                            Some('n') => s.push('\n'),
                            Some('t') => s.push('\t'),
                            Some('r') => s.push('\r'),
                            Some('0') => s.push('\0'),
                            Some('\\') => s.push('\\'),
                            Some('"') => s.push('"'),
                            Some(other) => {
                                return Err(format!(
                                    "line {}: unknown escape sequence '\\{}'",
                                    line, other
                                ));
                            }
                            None => {
                                return Err(format!(
                                    "line {}: unterminated string literal",
                                    tok_line
                                ));
                            }
                        },
                        Some('\n') => {
                            line += 1;
                            s.push('\n');
                        }
                        Some(other) => s.push(other),
                    }
                }
                TokenKind::StrLit(s)
            }
            c if c.is_ascii_digit() => {
                let mut text = String::new();
                text.push(c);
                while let Some(&n) = chars.peek() {
                    if n.is_ascii_alphanumeric() {
                        text.push(n);
                        chars.next();
                    } else {
                        break;
                    }
                }
                TokenKind::IntLit(parse_int(&text, tok_line)?)
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let mut text = String::new();
                text.push(c);
                while let Some(&n) = chars.peek() {
                    if n.is_ascii_alphanumeric() || n == '_' {
                        text.push(n);
                        chars.next();
                    } else {
                        break;
                    }
                }
                keyword(&text).unwrap_or(TokenKind::Ident(text))
            }
            c => {
                return Err(format!("line {}: unrecognized character '{}'", line, c));
            }
        };
        tokens.push(Token {
            kind,
            line: tok_line,
        });
    }

    tokens.push(Token {
        kind: TokenKind::Eof,
        line,
    });
    Ok(tokens)
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TokenKind::Eof => "EOF",
            TokenKind::Plus => "+",
            TokenKind::Minus => "-",
            TokenKind::Star => "*",
            TokenKind::Slash => "/",
            TokenKind::Semi => ";",
            TokenKind::Comma => ",",
            TokenKind::Amp => "&",
            TokenKind::Colon => ":",
            TokenKind::Dot => ".",
            TokenKind::Assign => "=",
            TokenKind::Gt => ">",
            TokenKind::Lt => "<",
            TokenKind::Not => "!",
            TokenKind::Pipe => "|",
            TokenKind::Caret => "^",
            TokenKind::Tilde => "~",
            TokenKind::Question => "?",
            TokenKind::LParen => "(",
            TokenKind::RParen => ")",
            TokenKind::LBrack => "[",
            TokenKind::RBrack => "]",
            TokenKind::LBrace => "{",
            TokenKind::RBrace => "}",
            TokenKind::Arrow => "->",
            TokenKind::EqEq => "==",
            TokenKind::Neq => "!=",
            TokenKind::Gte => ">=",
            TokenKind::Lte => "<=",
            TokenKind::AndAnd => "&&",
            TokenKind::OrOr => "||",
            TokenKind::Inc => "++",
            TokenKind::Dec => "--",
            TokenKind::IntLit(_) => "int literal",
            TokenKind::StrLit(_) => "string literal",
            TokenKind::Ident(_) => "identifier",
            TokenKind::Asm => "asm",
            TokenKind::Return => "return",
            TokenKind::While => "while",
            TokenKind::If => "if",
            TokenKind::Else => "else",
            TokenKind::For => "for",
            TokenKind::Fn => "fn",
            TokenKind::Var => "var",
            TokenKind::Sizeof => "sizeof",
            TokenKind::Goto => "goto",
            TokenKind::Label => "label",
            TokenKind::Typedef => "typedef",
            TokenKind::Struct => "struct",
            TokenKind::Union => "union",
            TokenKind::Public => "public",
            TokenKind::Extern => "extern",
            TokenKind::Int8 => "int8",
            TokenKind::Int16 => "int16",
            TokenKind::Int32 => "int32",
            TokenKind::Int64 => "int64",
            TokenKind::Uint8 => "uint8",
            TokenKind::Uint16 => "uint16",
            TokenKind::Uint32 => "uint32",
            TokenKind::Uint64 => "uint64",
            TokenKind::Float32 => "float32",
            TokenKind::Float64 => "float64",
        };
        write!(f, "{}", s)
    }
}
