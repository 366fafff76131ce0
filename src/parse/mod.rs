//! Formula parsing: lexing, reference extraction, dynamic resolution.

pub mod extractor;
pub mod resolver;
pub mod tokenizer;

pub use extractor::{extract, ParsedFormula, RefTarget, Reference};
pub use resolver::{resolve_dynamics, ResolveOutcome};
pub use tokenizer::{tokenize, Token, TokenKind, Tokenized};

/// Functions whose references may need dynamic resolution.
pub const DYNAMIC_FUNCTIONS: &[&str] = &["INDIRECT", "OFFSET", "INDEX"];

/// The one complexity definition: count of structural operator tokens.
///
/// Counts `+ - * / ^` operators, parentheses, argument commas, and one per
/// range colon.
pub fn operator_complexity(tokens: &Tokenized) -> u32 {
    tokens
        .tokens
        .iter()
        .map(|t| match t.kind {
            TokenKind::Op => u32::from(matches!(t.text.as_str(), "+" | "-" | "*" | "/" | "^")),
            TokenKind::LParen | TokenKind::RParen | TokenKind::Comma => 1,
            TokenKind::RangeRef => 1,
            _ => 0,
        })
        .sum()
}
