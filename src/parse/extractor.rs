//! Reference extraction from token streams.
//!
//! Walks the lexed formula tracking parenthesis depth and the nearest
//! enclosing function so each reference carries the context the dynamic
//! resolver needs. Ranges are not flattened here; range membership stays a
//! distinct edge kind in the graph builder.

use crate::core::addr::{parse_cell_body, CellAddress, CellRange};
use crate::core::types::EdgeKind;
use crate::parse::tokenizer::{tokenize, Token, TokenKind, Tokenized};
use crate::parse::{operator_complexity, DYNAMIC_FUNCTIONS};

/// What a reference points at.
#[derive(Debug, Clone, PartialEq)]
pub enum RefTarget {
    Cell(CellAddress),
    Range(CellRange),
    Name(String),
}

/// A symbolic pointer extracted from one formula.
#[derive(Debug, Clone, PartialEq)]
pub struct Reference {
    pub kind: EdgeKind,
    pub target: RefTarget,
    /// Uppercased name of the nearest enclosing call, when inside one.
    pub in_function: Option<String>,
}

/// Everything the later stages need to know about one formula.
#[derive(Debug, Clone)]
pub struct ParsedFormula {
    pub tokens: Tokenized,
    pub references: Vec<Reference>,
    pub functions: Vec<String>,
    pub complexity: u32,
    /// Lexing hit an unrecognized character; the cell is flagged broken.
    pub parse_error: bool,
    /// The formula spells out `#REF!` or `#NAME?` literally.
    pub has_error_literal: bool,
    /// An `INDIRECT`/`OFFSET`/`INDEX` call is present.
    pub uses_dynamic_functions: bool,
}

/// Tokenize `formula` and extract its references relative to `home_sheet`.
pub fn extract(formula: &str, home_sheet: &str) -> ParsedFormula {
    let tokens = tokenize(formula);
    let mut references = Vec::new();
    let mut functions = Vec::new();
    let mut has_error_literal = false;

    let significant: Vec<&Token> = tokens.significant().collect();
    let mut call_stack: Vec<Option<String>> = Vec::new();
    let mut pending_func: Option<String> = None;
    let mut pending_sheet: Option<String> = None;

    for token in significant {
        let sheet_for_ref = pending_sheet.take();
        match token.kind {
            TokenKind::SheetRef => {
                pending_sheet = Some(token.text.clone());
            }
            TokenKind::CellRef => {
                if let Some((col, row)) = parse_cell_body(&token.text) {
                    let sheet = sheet_for_ref.unwrap_or_else(|| home_sheet.to_string());
                    references.push(Reference {
                        kind: EdgeKind::Direct,
                        target: RefTarget::Cell(CellAddress::new(sheet, row, col)),
                        in_function: enclosing(&call_stack),
                    });
                }
            }
            TokenKind::RangeRef => {
                if let Some(range) = parse_range_token(&token.text, sheet_for_ref, home_sheet) {
                    references.push(Reference {
                        kind: EdgeKind::Direct,
                        target: RefTarget::Range(range),
                        in_function: enclosing(&call_stack),
                    });
                }
            }
            TokenKind::Name => {
                references.push(Reference {
                    kind: EdgeKind::Named,
                    target: RefTarget::Name(token.text.clone()),
                    in_function: enclosing(&call_stack),
                });
            }
            TokenKind::Func => {
                functions.push(token.text.clone());
                pending_func = Some(token.text.clone());
            }
            TokenKind::LParen => {
                call_stack.push(pending_func.take());
            }
            TokenKind::RParen => {
                call_stack.pop();
            }
            TokenKind::Error => {
                if token.text == "#REF!" || token.text == "#NAME?" {
                    has_error_literal = true;
                }
            }
            _ => {}
        }
    }

    let uses_dynamic_functions = functions
        .iter()
        .any(|f| DYNAMIC_FUNCTIONS.contains(&f.as_str()));
    let complexity = operator_complexity(&tokens);
    let parse_error = tokens.had_invalid;

    ParsedFormula {
        tokens,
        references,
        functions,
        complexity,
        parse_error,
        has_error_literal,
        uses_dynamic_functions,
    }
}

fn enclosing(call_stack: &[Option<String>]) -> Option<String> {
    call_stack.iter().rev().find_map(Clone::clone)
}

/// Parse the body of a `A1:B2` token, binding both corners to one sheet.
pub(crate) fn parse_range_token(
    text: &str,
    sheet: Option<String>,
    home_sheet: &str,
) -> Option<CellRange> {
    let (a, b) = text.split_once(':')?;
    let (ac, ar) = parse_cell_body(a)?;
    let (bc, br) = parse_cell_body(b)?;
    let sheet = sheet.unwrap_or_else(|| home_sheet.to_string());
    CellRange::new(
        CellAddress::new(sheet.clone(), ar, ac),
        CellAddress::new(sheet, br, bc),
    )
    .ok()
}
