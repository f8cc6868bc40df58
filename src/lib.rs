//! A self-hosting compiler for a substantial subset of C11, translating C
//! source into GNU-style x86-64 System V assembly text.
//!
//! The pipeline is a straight line: [`file`] feeds [`lexer`], [`lexer`]
//! feeds [`parser`], [`parser`] produces a typed [`ast`], and [`codegen`]
//! lowers that AST into assembly. [`compile`] wires the four stages
//! together; everything else is a library for callers (the CLI in
//! `main.rs`, or `tests/end_to_end.rs`) that want finer-grained access.

pub mod ast;
pub mod codegen;
pub mod diagnostics;
pub mod file;
pub mod lexer;
pub mod parser;
pub mod token;
pub mod types;
pub mod util;

use std::rc::Rc;

use diagnostics::{CResult, Warning};
use file::FileStack;
use lexer::Lexer;
use parser::Parser;

/// Runs the lex+parse stages only, returning the translation unit's AST
/// alongside accumulated warnings. Split out from [`compile`] so callers
/// (the `--emit-ast` CLI flag, or tests inspecting the AST directly) don't
/// need to pay for a second parse.
pub fn parse(source: impl Into<String>, filename: impl Into<Rc<str>>) -> CResult<(Vec<ast::Node>, Vec<Warning>)> {
    let mut files = FileStack::new();
    files.push_string(source, filename);
    let lexer = Lexer::new(files);
    let parser = Parser::new(lexer);
    parser.parse_translation_unit()
}

/// Runs the whole pipeline over `source` (already preprocessed C11-subset
/// text) and returns the generated assembly plus any accumulated warnings.
/// `filename` is used only for diagnostic positions.
pub fn compile(source: impl Into<String>, filename: impl Into<Rc<str>>) -> CResult<(String, Vec<Warning>)> {
    let (translation_unit, warnings) = parse(source, filename)?;
    let asm = codegen::generate(&translation_unit)?;
    Ok((asm, warnings))
}
