//! Slate Compiler Library
//!
//! Provides compilation from Slate source text to x86-64 assembly in
//! GNU/AT&T syntax, ready for an external assembler and linker.
//!
//! The pipeline is strictly linear: the lexer produces the complete
//! token vector, the parser consumes it in one pass into a typed AST
//! (checking types and scopes as it goes), and the code generator walks
//! that AST once, appending assembly text. No stage re-enters a
//! previous one, and compilation is a pure function of the source text.
//!
//! ```rust,ignore
//! let asm = slatec::compile_to_asm("fn public main() -> int32 { return 0; }")?;
//! assert!(asm.contains(".global main"));
//! ```

pub mod ast;
pub mod codegen;
pub mod config;
pub mod lexer;
pub mod parser;
pub mod symtab;
pub mod types;

pub use ast::Program;
pub use codegen::{Codegen, CodegenError};
pub use config::{ColorMode, DriverConfig};
pub use lexer::{tokenize, Token, TokenKind};
pub use parser::Parser;

use std::fs;
use std::path::Path;

/// Compile Slate source text to assembly text.
pub fn compile_to_asm(source: &str) -> Result<String, String> {
    let tokens = lexer::tokenize(source)?;
    let program = Parser::new(tokens).parse()?;
    Codegen::new(&program.symtab)
        .generate(&program)
        .map_err(|e| e.to_string())
}

/// Parse and type-check source text without generating code.
pub fn check_source(source: &str) -> Result<(), String> {
    let tokens = lexer::tokenize(source)?;
    Parser::new(tokens).parse().map(|_| ())
}

/// Compile a source file, writing the assembly to `output`.
pub fn compile_file(input: &Path, output: &Path) -> Result<(), String> {
    let source = fs::read_to_string(input)
        .map_err(|e| format!("failed to read {}: {}", input.display(), e))?;
    let asm = compile_to_asm(&source)?;
    fs::write(output, asm).map_err(|e| format!("failed to write {}: {}", output.display(), e))?;
    Ok(())
}
