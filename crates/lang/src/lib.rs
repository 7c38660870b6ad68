// Path: crates/lang/src/lib.rs
#![cfg_attr(
    not(test),
    deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)
)]

//! Lexer, parser, and AST for the `axs` source language.
//!
//! `axs` is the small, JS-flavored function language the pipeline compiles:
//! one function per source, scalar-typed parameters (annotations optional,
//! defaulting to `f64`), `let`/assignment, `if`/`else`, `while`, `return`,
//! arithmetic and boolean expressions, and calls to a small set of
//! recognized math builtins. Comments are `//` and `/* */`.

/// The typed syntax tree.
pub mod ast;
/// Recursive-descent parser.
pub mod parser;
/// The token stream and lexer.
pub mod token;

pub use ast::{BinaryOp, Expr, Function, Param, Stmt, UnaryOp};
pub use parser::parse_function;
pub use token::tokenize;

use thiserror::Error;

/// Language tag carried by artifacts built from this parser.
pub const LANG_TAG: &str = "axs";

/// Calls recognized as pure math; they do not reduce the purity scalar and
/// compile to native WASM instructions.
pub const PURE_MATH_CALLS: &[&str] = &["sqrt", "abs", "min", "max", "floor", "ceil"];

/// Whether `callee` names a recognized pure-math builtin, with or without a
/// `math.` namespace prefix.
pub fn is_pure_math_call(callee: &str) -> bool {
    let base = callee.rsplit('.').next().unwrap_or(callee);
    PURE_MATH_CALLS.contains(&base)
}

/// Errors from lexing or parsing `axs` source.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    /// A character outside the language's alphabet.
    #[error("unexpected character {found:?} at offset {offset}")]
    UnexpectedChar {
        /// The offending character.
        found: char,
        /// Byte offset into the source.
        offset: usize,
    },
    /// A numeric literal that does not parse.
    #[error("invalid number literal {lexeme:?}")]
    InvalidNumber {
        /// The literal text.
        lexeme: String,
    },
    /// A block comment left open.
    #[error("unterminated block comment")]
    UnterminatedComment,
    /// The token stream ended mid-production.
    #[error("unexpected end of source; expected {expected}")]
    UnexpectedEof {
        /// What the parser was looking for.
        expected: &'static str,
    },
    /// A token that does not fit the grammar at this position.
    #[error("unexpected token {found}; expected {expected}")]
    UnexpectedToken {
        /// Display form of the found token.
        found: String,
        /// What the parser was looking for.
        expected: &'static str,
    },
}

/// Renders source into its canonical form: comments stripped, every token
/// separated by exactly one space.
///
/// Two sources that differ only in whitespace or comments normalize to the
/// same text, which is what makes builds and structural hashes insensitive
/// to trivial reformatting.
pub fn normalize_source(source: &str) -> Result<String, ParseError> {
    let tokens = tokenize(source)?;
    let lexemes: Vec<String> = tokens.iter().map(|t| t.lexeme()).collect();
    Ok(lexemes.join(" "))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalization_is_whitespace_and_comment_insensitive() {
        let a = "export function add(a, b) { return a + b }";
        let b = "export  function add( a,b )\n{\n  // sum\n  return a + b\n}";
        assert_eq!(normalize_source(a).unwrap(), normalize_source(b).unwrap());
    }

    #[test]
    fn pure_math_recognition_handles_namespacing() {
        assert!(is_pure_math_call("sqrt"));
        assert!(is_pure_math_call("math.sqrt"));
        assert!(!is_pure_math_call("fetch"));
    }
}
