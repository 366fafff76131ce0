//! Best-effort resolution of `INDIRECT`, `OFFSET`, and `INDEX` references.
//!
//! Only arguments that are statically resolvable — literal strings and
//! numbers, or references to cells whose values are known constants — are
//! reduced. Resolution is single-pass; anything else is preserved as
//! extracted and the cell is annotated for the anomaly detector.

use crate::core::addr::{CellAddress, CellRange, MAX_COL, MAX_ROW};
use crate::core::types::{EdgeKind, Value};
use crate::parse::extractor::{parse_range_token, ParsedFormula, RefTarget, Reference};
use crate::parse::tokenizer::{Token, TokenKind};
use std::collections::BTreeMap;

/// Final references for one formula after dynamic resolution.
#[derive(Debug, Clone)]
pub struct ResolveOutcome {
    pub references: Vec<Reference>,
    /// A dynamic call could not be reduced; feeds `dynamic_unresolved`.
    pub unresolved_dynamic: bool,
}

/// Resolve the dynamic calls of `parsed`, consulting `literals` (the
/// immutable map of constant cell values) for indirect lookups.
pub fn resolve_dynamics(
    parsed: &ParsedFormula,
    home_sheet: &str,
    literals: &BTreeMap<CellAddress, Value>,
    fold_string_concat: bool,
) -> ResolveOutcome {
    if !parsed.uses_dynamic_functions {
        return ResolveOutcome {
            references: parsed.references.clone(),
            unresolved_dynamic: false,
        };
    }

    let significant: Vec<&Token> = parsed.tokens.significant().collect();
    let mut resolved: Vec<Reference> = Vec::new();
    let mut consumed: Vec<(String, RefTarget)> = Vec::new();
    let mut unresolved = false;

    let mut i = 0;
    while i < significant.len() {
        let token = significant[i];
        if token.kind == TokenKind::Func
            && matches!(token.text.as_str(), "INDIRECT" | "OFFSET" | "INDEX")
        {
            match collect_args(&significant, i + 1, home_sheet) {
                Some(args) => {
                    let outcome = match token.text.as_str() {
                        "INDIRECT" => {
                            resolve_indirect(&args, home_sheet, literals, fold_string_concat)
                        }
                        "OFFSET" => resolve_offset(&args),
                        "INDEX" => resolve_index(&args),
                        _ => unreachable!(),
                    };
                    match outcome {
                        Some(Resolution { target, consumes }) => {
                            resolved.push(Reference {
                                kind: EdgeKind::Dynamic,
                                target,
                                in_function: Some(token.text.clone()),
                            });
                            if let Some(consumed_target) = consumes {
                                consumed.push((token.text.clone(), consumed_target));
                            }
                        }
                        None => unresolved = true,
                    }
                }
                None => unresolved = true,
            }
        }
        i += 1;
    }

    let mut references: Vec<Reference> = parsed
        .references
        .iter()
        .filter(|r| {
            !consumed.iter().any(|(func, target)| {
                r.in_function.as_deref() == Some(func.as_str()) && r.target == *target
            })
        })
        .cloned()
        .collect();
    references.extend(resolved);

    ResolveOutcome {
        references,
        unresolved_dynamic: unresolved,
    }
}

struct Resolution {
    target: RefTarget,
    /// Statically-extracted reference superseded by the resolved one.
    consumes: Option<RefTarget>,
}

/// One argument of a call, classified for the policies below.
#[derive(Debug, Clone, PartialEq)]
enum Arg {
    Str(String),
    /// String concatenation of literals; usable only when folding is enabled.
    Concat(String),
    Int(i64),
    Cell(CellAddress),
    Range(CellRange),
    Other,
}

/// Split the token stream after a dynamic `FUNC` into classified arguments.
/// Returns `None` when the parenthesis structure is broken.
fn collect_args(tokens: &[&Token], lparen_at: usize, home_sheet: &str) -> Option<Vec<Arg>> {
    if tokens.get(lparen_at)?.kind != TokenKind::LParen {
        return None;
    }
    let mut args = Vec::new();
    let mut current: Vec<&Token> = Vec::new();
    let mut depth = 1usize;
    for token in &tokens[lparen_at + 1..] {
        match token.kind {
            TokenKind::LParen => {
                depth += 1;
                current.push(token);
            }
            TokenKind::RParen => {
                depth -= 1;
                if depth == 0 {
                    args.push(classify_arg(&current, home_sheet));
                    return Some(args);
                }
                current.push(token);
            }
            TokenKind::Comma if depth == 1 => {
                args.push(classify_arg(&current, home_sheet));
                current.clear();
            }
            _ => current.push(token),
        }
    }
    None
}

fn classify_arg(tokens: &[&Token], home_sheet: &str) -> Arg {
    match tokens {
        [t] if t.kind == TokenKind::Str => Arg::Str(unquote(&t.text)),
        [t] if t.kind == TokenKind::Number => match parse_int(&t.text) {
            Some(n) => Arg::Int(n),
            None => Arg::Other,
        },
        [minus, t] if is_op(minus, "-") && t.kind == TokenKind::Number => {
            match parse_int(&t.text) {
                Some(n) => Arg::Int(-n),
                None => Arg::Other,
            }
        }
        [t] if t.kind == TokenKind::CellRef => cell_arg(&t.text, None, home_sheet),
        [s, t] if s.kind == TokenKind::SheetRef && t.kind == TokenKind::CellRef => {
            cell_arg(&t.text, Some(s.text.clone()), home_sheet)
        }
        [t] if t.kind == TokenKind::RangeRef => range_arg(&t.text, None, home_sheet),
        [s, t] if s.kind == TokenKind::SheetRef && t.kind == TokenKind::RangeRef => {
            range_arg(&t.text, Some(s.text.clone()), home_sheet)
        }
        _ => classify_concat(tokens).unwrap_or(Arg::Other),
    }
}

fn cell_arg(text: &str, sheet: Option<String>, home_sheet: &str) -> Arg {
    match crate::core::addr::parse_cell_body(text) {
        Some((col, row)) => Arg::Cell(CellAddress::new(
            sheet.unwrap_or_else(|| home_sheet.to_string()),
            row,
            col,
        )),
        None => Arg::Other,
    }
}

fn range_arg(text: &str, sheet: Option<String>, home_sheet: &str) -> Arg {
    match parse_range_token(text, sheet, home_sheet) {
        Some(range) => Arg::Range(range),
        None => Arg::Other,
    }
}

/// Match `"a" & "b" [& "c" …]` so INDIRECT can fold it when allowed.
fn classify_concat(tokens: &[&Token]) -> Option<Arg> {
    if tokens.len() < 3 || tokens.len() % 2 == 0 {
        return None;
    }
    let mut joined = String::new();
    for (i, token) in tokens.iter().enumerate() {
        if i % 2 == 0 {
            if token.kind != TokenKind::Str {
                return None;
            }
            joined.push_str(&unquote(&token.text));
        } else if !is_op(token, "&") {
            return None;
        }
    }
    Some(Arg::Concat(joined))
}

fn is_op(t: &Token, text: &str) -> bool {
    t.kind == TokenKind::Op && t.text == text
}

fn parse_int(text: &str) -> Option<i64> {
    let n: f64 = text.parse().ok()?;
    if n.fract() == 0.0 && n.abs() < i64::MAX as f64 {
        Some(n as i64)
    } else {
        None
    }
}

fn unquote(text: &str) -> String {
    let inner = text
        .strip_prefix('"')
        .and_then(|t| t.strip_suffix('"'))
        .unwrap_or(text);
    inner.replace("\"\"", "\"")
}

fn resolve_indirect(
    args: &[Arg],
    home_sheet: &str,
    literals: &BTreeMap<CellAddress, Value>,
    fold_string_concat: bool,
) -> Option<Resolution> {
    let first = args.first()?;
    match first {
        Arg::Str(text) => parse_address_text(text, home_sheet).map(|target| Resolution {
            target,
            consumes: None,
        }),
        Arg::Concat(text) if fold_string_concat => {
            parse_address_text(text, home_sheet).map(|target| Resolution {
                target,
                consumes: None,
            })
        }
        Arg::Cell(addr) => match literals.get(addr) {
            Some(Value::Text(text)) => {
                parse_address_text(text, home_sheet).map(|target| Resolution {
                    target,
                    // The read of the pointer cell itself remains a real edge.
                    consumes: None,
                })
            }
            _ => None,
        },
        _ => None,
    }
}

fn resolve_offset(args: &[Arg]) -> Option<Resolution> {
    if args.len() < 3 || args.len() > 5 {
        return None;
    }
    let base = match &args[0] {
        Arg::Cell(addr) => CellRange::single(addr.clone()),
        Arg::Range(range) => range.clone(),
        _ => return None,
    };
    let rows = match args[1] {
        Arg::Int(n) => n,
        _ => return None,
    };
    let cols = match args[2] {
        Arg::Int(n) => n,
        _ => return None,
    };
    let height = match args.get(3) {
        Some(Arg::Int(n)) if *n >= 1 => *n as u64,
        Some(_) => return None,
        None => base.rows() as u64,
    };
    let width = match args.get(4) {
        Some(Arg::Int(n)) if *n >= 1 => *n as u64,
        Some(_) => return None,
        None => base.cols() as u64,
    };

    let top_row = base.top_left().row as i64 + rows;
    let top_col = base.top_left().col as i64 + cols;
    let bottom_row = top_row + height as i64 - 1;
    let bottom_col = top_col + width as i64 - 1;
    if top_row < 1 || top_col < 1 || bottom_row > MAX_ROW as i64 || bottom_col > MAX_COL as i64 {
        return None;
    }

    let sheet = base.sheet().to_string();
    let consumes = Some(if base.len() == 1 {
        RefTarget::Cell(base.top_left().clone())
    } else {
        RefTarget::Range(base.clone())
    });
    let target = if height == 1 && width == 1 {
        RefTarget::Cell(CellAddress::new(sheet, top_row as u32, top_col as u32))
    } else {
        RefTarget::Range(
            CellRange::new(
                CellAddress::new(sheet.clone(), top_row as u32, top_col as u32),
                CellAddress::new(sheet, bottom_row as u32, bottom_col as u32),
            )
            .ok()?,
        )
    };
    Some(Resolution { target, consumes })
}

fn resolve_index(args: &[Arg]) -> Option<Resolution> {
    if args.len() < 2 || args.len() > 3 {
        return None;
    }
    let range = match &args[0] {
        Arg::Range(range) => range.clone(),
        _ => return None,
    };
    let first = match args[1] {
        Arg::Int(n) if n >= 1 => n as u32,
        _ => return None,
    };
    let (row, col) = match args.get(2) {
        Some(Arg::Int(n)) if *n >= 1 => (first, *n as u32),
        Some(_) => return None,
        // With two arguments, a single-row range indexes along its columns.
        None if range.rows() == 1 => (1, first),
        None => (first, 1),
    };
    let cell = range.cell_at(row, col)?;
    Some(Resolution {
        target: RefTarget::Cell(cell),
        consumes: Some(RefTarget::Range(range)),
    })
}

fn parse_address_text(text: &str, home_sheet: &str) -> Option<RefTarget> {
    let text = text.trim();
    if text.contains(':') {
        CellRange::parse_range_in(text, home_sheet)
            .ok()
            .map(RefTarget::Range)
    } else {
        CellAddress::parse_a1_in(text, home_sheet)
            .ok()
            .map(RefTarget::Cell)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::extract;

    fn resolve(formula: &str, fold: bool) -> ResolveOutcome {
        resolve_dynamics(&extract(formula, "S"), "S", &BTreeMap::new(), fold)
    }

    fn cell_targets(outcome: &ResolveOutcome) -> Vec<(String, EdgeKind)> {
        outcome
            .references
            .iter()
            .filter_map(|r| match &r.target {
                RefTarget::Cell(a) => Some((a.to_a1(), r.kind)),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn indirect_literal_string_resolves() {
        let out = resolve("=INDIRECT(\"Data!A1\")", false);
        assert!(!out.unresolved_dynamic);
        assert_eq!(cell_targets(&out), [("Data!A1".to_string(), EdgeKind::Dynamic)]);
    }

    #[test]
    fn indirect_unqualified_string_uses_home_sheet() {
        let out = resolve("=INDIRECT(\"B2\")", false);
        assert_eq!(cell_targets(&out), [("S!B2".to_string(), EdgeKind::Dynamic)]);
    }

    #[test]
    fn indirect_concat_is_unresolved_by_default() {
        let out = resolve("=INDIRECT(\"S!B\"&\"2\")", false);
        assert!(out.unresolved_dynamic);
        assert!(out.references.is_empty());
    }

    #[test]
    fn indirect_concat_folds_when_enabled() {
        let out = resolve("=INDIRECT(\"S!B\"&\"2\")", true);
        assert!(!out.unresolved_dynamic);
        assert_eq!(cell_targets(&out), [("S!B2".to_string(), EdgeKind::Dynamic)]);
    }

    #[test]
    fn indirect_through_constant_cell() {
        let parsed = extract("=INDIRECT(B1)", "S");
        let mut literals = BTreeMap::new();
        literals.insert(
            CellAddress::parse_a1("S!B1").unwrap(),
            Value::Text("C7".to_string()),
        );
        let out = resolve_dynamics(&parsed, "S", &literals, false);
        assert!(!out.unresolved_dynamic);
        let targets = cell_targets(&out);
        // Both the pointer read and the resolved target are edges.
        assert!(targets.contains(&("S!B1".to_string(), EdgeKind::Direct)));
        assert!(targets.contains(&("S!C7".to_string(), EdgeKind::Dynamic)));
    }

    #[test]
    fn offset_shifts_a_cell() {
        let out = resolve("=OFFSET(B2,2,-1)", false);
        assert!(!out.unresolved_dynamic);
        assert_eq!(cell_targets(&out), [("S!A4".to_string(), EdgeKind::Dynamic)]);
    }

    #[test]
    fn offset_with_dims_yields_a_range() {
        let out = resolve("=SUM(OFFSET(A1,1,0,3,2))", false);
        assert!(!out.unresolved_dynamic);
        let ranges: Vec<String> = out
            .references
            .iter()
            .filter_map(|r| match &r.target {
                RefTarget::Range(range) => Some(range.to_a1()),
                _ => None,
            })
            .collect();
        assert_eq!(ranges, ["S!A2:B4"]);
    }

    #[test]
    fn offset_out_of_bounds_is_unresolved() {
        let out = resolve("=OFFSET(A1,-5,0)", false);
        assert!(out.unresolved_dynamic);
        // The static base reference is preserved as-is.
        assert_eq!(cell_targets(&out), [("S!A1".to_string(), EdgeKind::Direct)]);
    }

    #[test]
    fn offset_non_literal_shift_is_unresolved() {
        let out = resolve("=OFFSET(A1,C1,0)", false);
        assert!(out.unresolved_dynamic);
        let targets = cell_targets(&out);
        assert!(targets.contains(&("S!A1".to_string(), EdgeKind::Direct)));
        assert!(targets.contains(&("S!C1".to_string(), EdgeKind::Direct)));
    }

    #[test]
    fn index_selects_from_range() {
        let out = resolve("=INDEX(B2:B9,3)", false);
        assert!(!out.unresolved_dynamic);
        assert_eq!(cell_targets(&out), [("S!B4".to_string(), EdgeKind::Dynamic)]);
        assert!(out
            .references
            .iter()
            .all(|r| !matches!(r.target, RefTarget::Range(_))));
    }

    #[test]
    fn index_row_and_column() {
        let out = resolve("=INDEX(A1:C5,2,3)", false);
        assert_eq!(cell_targets(&out), [("S!C2".to_string(), EdgeKind::Dynamic)]);
    }

    #[test]
    fn index_out_of_range_keeps_the_range() {
        let out = resolve("=INDEX(A1:B2,9,9)", false);
        assert!(out.unresolved_dynamic);
        let ranges: Vec<String> = out
            .references
            .iter()
            .filter_map(|r| match &r.target {
                RefTarget::Range(range) => Some(range.to_a1()),
                _ => None,
            })
            .collect();
        assert_eq!(ranges, ["S!A1:B2"]);
    }

    #[test]
    fn non_dynamic_formula_passes_through() {
        let out = resolve("=A1+SUM(B1:B3)", false);
        assert!(!out.unresolved_dynamic);
        assert_eq!(out.references.len(), 2);
    }
}
