//! Formula lexer.
//!
//! Turns a formula string (leading `=` stripped) into a flat token stream.
//! The grammar is deliberately forgiving: unknown function names lex as
//! ordinary calls, and an unrecognized character yields a single invalid
//! token after which scanning resumes at the next top-level `,` or `)` so
//! partial references can still be extracted.

use crate::core::addr::parse_cell_body;
use crate::core::types::ERROR_LITERALS;

/// The type of a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    Number,
    Str,
    Bool,
    /// A workbook error literal such as `#REF!`.
    Error,
    /// Function name; always immediately followed by `LParen`.
    Func,
    CellRef,
    RangeRef,
    /// Sheet qualifier including the trailing `!`; binds the next reference.
    SheetRef,
    /// Named-range candidate.
    Name,
    Op,
    LParen,
    RParen,
    Comma,
    Semicolon,
    LBrace,
    RBrace,
    Whitespace,
    /// Unrecognized input; flags the formula and triggers recovery.
    Invalid,
}

/// A token with its source text and byte offset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    pub pos: usize,
}

impl Token {
    fn new(kind: TokenKind, text: impl Into<String>, pos: usize) -> Self {
        Self {
            kind,
            text: text.into(),
            pos,
        }
    }
}

/// Lexer output: the token stream plus provenance counters.
#[derive(Debug, Clone, Default)]
pub struct Tokenized {
    pub tokens: Vec<Token>,
    /// Count of whitespace characters seen (whitespace tokens are discarded
    /// before reference extraction but counted here).
    pub whitespace_count: usize,
    /// True when scanning hit an unrecognized character.
    pub had_invalid: bool,
}

impl Tokenized {
    /// Tokens with whitespace stripped, for the extraction walk.
    pub fn significant(&self) -> impl Iterator<Item = &Token> {
        self.tokens
            .iter()
            .filter(|t| t.kind != TokenKind::Whitespace)
    }
}

/// Lex a formula. A leading `=` is stripped if present.
pub fn tokenize(formula: &str) -> Tokenized {
    let src = formula.strip_prefix('=').unwrap_or(formula);
    let mut out = Tokenized::default();
    let mut cursor = Cursor {
        src,
        bytes: src.as_bytes(),
        pos: 0,
    };

    while let Some(b) = cursor.peek() {
        let start = cursor.pos;
        match b {
            b'"' => scan_string(&mut cursor, &mut out),
            b'#' => scan_error_literal(&mut cursor, &mut out),
            b'0'..=b'9' => scan_number(&mut cursor, &mut out),
            b'.' if cursor.peek_at(1).is_some_and(|c| c.is_ascii_digit()) => {
                scan_number(&mut cursor, &mut out)
            }
            b'\'' => scan_quoted_sheet(&mut cursor, &mut out),
            b'$' | b'_' => scan_word(&mut cursor, &mut out),
            b'<' | b'>' => {
                let two = cursor.slice(start, (start + 2).min(src.len()));
                if matches!(two, "<=" | ">=" | "<>") {
                    cursor.advance(2);
                    out.tokens.push(Token::new(TokenKind::Op, two, start));
                } else {
                    cursor.advance(1);
                    out.tokens
                        .push(Token::new(TokenKind::Op, &src[start..start + 1], start));
                }
            }
            b'+' | b'-' | b'*' | b'/' | b'^' | b'&' | b'=' | b'%' => {
                cursor.advance(1);
                out.tokens
                    .push(Token::new(TokenKind::Op, &src[start..start + 1], start));
            }
            b'(' => {
                cursor.advance(1);
                out.tokens.push(Token::new(TokenKind::LParen, "(", start));
            }
            b')' => {
                cursor.advance(1);
                out.tokens.push(Token::new(TokenKind::RParen, ")", start));
            }
            b',' => {
                cursor.advance(1);
                out.tokens.push(Token::new(TokenKind::Comma, ",", start));
            }
            b';' => {
                cursor.advance(1);
                out.tokens.push(Token::new(TokenKind::Semicolon, ";", start));
            }
            b'{' => {
                cursor.advance(1);
                out.tokens.push(Token::new(TokenKind::LBrace, "{", start));
            }
            b'}' => {
                cursor.advance(1);
                out.tokens.push(Token::new(TokenKind::RBrace, "}", start));
            }
            b' ' | b'\t' | b'\r' | b'\n' => {
                while cursor
                    .peek()
                    .is_some_and(|c| matches!(c, b' ' | b'\t' | b'\r' | b'\n'))
                {
                    cursor.advance(1);
                }
                let text = cursor.slice(start, cursor.pos);
                out.whitespace_count += text.len();
                out.tokens.push(Token::new(TokenKind::Whitespace, text, start));
            }
            _ if b.is_ascii_alphabetic() => scan_word(&mut cursor, &mut out),
            _ => recover(&mut cursor, &mut out),
        }
    }

    out
}

struct Cursor<'a> {
    src: &'a str,
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.bytes.get(self.pos + offset).copied()
    }

    fn advance(&mut self, n: usize) {
        self.pos += n;
    }

    fn slice(&self, start: usize, end: usize) -> &'a str {
        // Callers only slice at ASCII boundaries.
        self.src.get(start..end).unwrap_or("")
    }
}

/// `"…"` with `""` as an embedded quote.
fn scan_string(cursor: &mut Cursor, out: &mut Tokenized) {
    let start = cursor.pos;
    cursor.advance(1);
    loop {
        match cursor.peek() {
            Some(b'"') => {
                if cursor.peek_at(1) == Some(b'"') {
                    cursor.advance(2);
                } else {
                    cursor.advance(1);
                    out.tokens.push(Token::new(
                        TokenKind::Str,
                        cursor.slice(start, cursor.pos),
                        start,
                    ));
                    return;
                }
            }
            Some(_) => cursor.advance(1),
            None => {
                // Unterminated string literal.
                out.had_invalid = true;
                out.tokens.push(Token::new(
                    TokenKind::Invalid,
                    cursor.slice(start, cursor.pos),
                    start,
                ));
                return;
            }
        }
    }
}

fn scan_error_literal(cursor: &mut Cursor, out: &mut Tokenized) {
    let start = cursor.pos;
    let rest = cursor.slice(start, cursor.src.len());
    let hit = ERROR_LITERALS
        .iter()
        .filter(|lit| rest.starts_with(**lit))
        .max_by_key(|lit| lit.len());
    match hit {
        Some(lit) => {
            cursor.advance(lit.len());
            out.tokens.push(Token::new(TokenKind::Error, *lit, start));
        }
        None => recover(cursor, out),
    }
}

fn scan_number(cursor: &mut Cursor, out: &mut Tokenized) {
    let start = cursor.pos;
    while cursor.peek().is_some_and(|c| c.is_ascii_digit()) {
        cursor.advance(1);
    }
    if cursor.peek() == Some(b'.') && cursor.peek_at(1).is_some_and(|c| c.is_ascii_digit()) {
        cursor.advance(1);
        while cursor.peek().is_some_and(|c| c.is_ascii_digit()) {
            cursor.advance(1);
        }
    }
    if matches!(cursor.peek(), Some(b'e') | Some(b'E')) {
        let mut probe = 1;
        if matches!(cursor.peek_at(1), Some(b'+') | Some(b'-')) {
            probe = 2;
        }
        if cursor.peek_at(probe).is_some_and(|c| c.is_ascii_digit()) {
            cursor.advance(probe);
            while cursor.peek().is_some_and(|c| c.is_ascii_digit()) {
                cursor.advance(1);
            }
        }
    }
    out.tokens.push(Token::new(
        TokenKind::Number,
        cursor.slice(start, cursor.pos),
        start,
    ));
}

/// `'Sheet Name'!` with `''` as an embedded quote; the trailing `!` is
/// required for the qualifier to mean anything.
fn scan_quoted_sheet(cursor: &mut Cursor, out: &mut Tokenized) {
    let start = cursor.pos;
    let mut name = Vec::new();
    cursor.advance(1);
    loop {
        match cursor.peek() {
            Some(b'\'') => {
                if cursor.peek_at(1) == Some(b'\'') {
                    name.push(b'\'');
                    cursor.advance(2);
                } else if cursor.peek_at(1) == Some(b'!') {
                    cursor.advance(2);
                    let name = String::from_utf8_lossy(&name).into_owned();
                    out.tokens.push(Token::new(TokenKind::SheetRef, name, start));
                    return;
                } else {
                    cursor.advance(1);
                    out.had_invalid = true;
                    out.tokens.push(Token::new(
                        TokenKind::Invalid,
                        cursor.slice(start, cursor.pos),
                        start,
                    ));
                    recover_tail(cursor, out);
                    return;
                }
            }
            Some(b) => {
                name.push(b);
                cursor.advance(1);
            }
            None => {
                out.had_invalid = true;
                out.tokens.push(Token::new(
                    TokenKind::Invalid,
                    cursor.slice(start, cursor.pos),
                    start,
                ));
                return;
            }
        }
    }
}

fn is_word_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b'_' | b'.' | b'$')
}

/// True for unquoted sheet qualifiers: `[A-Za-z_][A-Za-z0-9_]*`.
fn is_plain_ident(word: &str) -> bool {
    let mut chars = word.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Disambiguate sheet qualifiers, cell/range references, calls, booleans,
/// and names, in that priority order.
fn scan_word(cursor: &mut Cursor, out: &mut Tokenized) {
    let start = cursor.pos;
    while cursor.peek().is_some_and(is_word_byte) {
        cursor.advance(1);
    }
    let word = cursor.slice(start, cursor.pos).to_string();

    if cursor.peek() == Some(b'!') && is_plain_ident(&word) {
        cursor.advance(1);
        out.tokens.push(Token::new(TokenKind::SheetRef, word, start));
        return;
    }

    if parse_cell_body(&word).is_some() {
        if cursor.peek() == Some(b':') {
            let second_start = cursor.pos + 1;
            let mut end = second_start;
            while cursor.peek_at(end - cursor.pos).is_some_and(is_word_byte) {
                end += 1;
            }
            let second = cursor.slice(second_start, end);
            if parse_cell_body(second).is_some() {
                cursor.advance(end - cursor.pos);
                out.tokens.push(Token::new(
                    TokenKind::RangeRef,
                    cursor.slice(start, end),
                    start,
                ));
                return;
            }
        }
        out.tokens.push(Token::new(TokenKind::CellRef, word, start));
        return;
    }

    if cursor.peek() == Some(b'(') {
        out.tokens
            .push(Token::new(TokenKind::Func, word.to_ascii_uppercase(), start));
        return;
    }

    if word.eq_ignore_ascii_case("TRUE") || word.eq_ignore_ascii_case("FALSE") {
        out.tokens
            .push(Token::new(TokenKind::Bool, word.to_ascii_uppercase(), start));
        return;
    }

    out.tokens.push(Token::new(TokenKind::Name, word, start));
}

/// Emit a single invalid token and skip ahead so scanning resumes at the
/// next `,` or `)` at the current nesting level.
fn recover(cursor: &mut Cursor, out: &mut Tokenized) {
    let start = cursor.pos;
    // Consume the offending character whole (it may be multi-byte).
    let ch_len = cursor
        .src
        .get(start..)
        .and_then(|s| s.chars().next())
        .map_or(1, char::len_utf8);
    cursor.advance(ch_len);
    recover_to(cursor, start, out);
}

/// Recovery variant when the invalid token was already pushed.
fn recover_tail(cursor: &mut Cursor, out: &mut Tokenized) {
    let start = cursor.pos;
    recover_to(cursor, start, out);
    // Drop the zero-length tail if nothing was skipped.
    if let Some(last) = out.tokens.last() {
        if last.kind == TokenKind::Invalid && last.text.is_empty() {
            out.tokens.pop();
        }
    }
}

fn recover_to(cursor: &mut Cursor, start: usize, out: &mut Tokenized) {
    out.had_invalid = true;
    let mut local_depth = 0usize;
    while let Some(b) = cursor.peek() {
        match b {
            b'"' => {
                cursor.advance(1);
                while let Some(c) = cursor.peek() {
                    cursor.advance(1);
                    if c == b'"' && cursor.peek() != Some(b'"') {
                        break;
                    }
                }
            }
            b'(' => {
                local_depth += 1;
                cursor.advance(1);
            }
            b')' if local_depth == 0 => break,
            b')' => {
                local_depth -= 1;
                cursor.advance(1);
            }
            b',' if local_depth == 0 => break,
            _ => cursor.advance(1),
        }
    }
    out.tokens.push(Token::new(
        TokenKind::Invalid,
        cursor.slice(start, cursor.pos),
        start,
    ));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(formula: &str) -> Vec<TokenKind> {
        tokenize(formula).significant().map(|t| t.kind).collect()
    }

    #[test]
    fn lexes_simple_arithmetic() {
        use TokenKind::*;
        assert_eq!(kinds("=A1+B2*3"), vec![CellRef, Op, CellRef, Op, Number]);
    }

    #[test]
    fn lexes_function_call_with_range() {
        use TokenKind::*;
        assert_eq!(
            kinds("=SUM(Data!B2:B4)"),
            vec![Func, LParen, SheetRef, RangeRef, RParen]
        );
        let t = tokenize("=sum(A1:A2)");
        let func = t.tokens.iter().find(|t| t.kind == Func).unwrap();
        assert_eq!(func.text, "SUM");
    }

    #[test]
    fn lexes_quoted_sheet() {
        let t = tokenize("='My Sheet'!A1");
        let sheet = t.tokens.iter().find(|t| t.kind == TokenKind::SheetRef).unwrap();
        assert_eq!(sheet.text, "My Sheet");
        assert_eq!(t.tokens.last().unwrap().kind, TokenKind::CellRef);
    }

    #[test]
    fn doubled_quote_escapes_in_strings_and_sheets() {
        let t = tokenize(r#"="he said ""hi"""#);
        assert_eq!(t.tokens[0].kind, TokenKind::Str);
        assert_eq!(t.tokens[0].text, r#""he said ""hi"""#);

        let t = tokenize("='O''Brien'!B2");
        assert_eq!(t.tokens[0].text, "O'Brien");
    }

    #[test]
    fn lexes_error_literals() {
        for lit in ERROR_LITERALS {
            let t = tokenize(&format!("={lit}"));
            assert_eq!(t.tokens[0].kind, TokenKind::Error, "literal {lit}");
            assert_eq!(t.tokens[0].text, *lit);
        }
        // #NUM! must not shadow #NULL!.
        assert_eq!(tokenize("#NULL!").tokens[0].text, "#NULL!");
    }

    #[test]
    fn lexes_numbers() {
        use TokenKind::*;
        assert_eq!(kinds("1.5e-3+.25+2E8"), vec![Number, Op, Number, Op, Number]);
        let t = tokenize("1.5e-3");
        assert_eq!(t.tokens[0].text, "1.5e-3");
    }

    #[test]
    fn longest_operator_wins() {
        let t = tokenize("A1<=B1");
        let op = t.tokens.iter().find(|t| t.kind == TokenKind::Op).unwrap();
        assert_eq!(op.text, "<=");
        let t = tokenize("A1<>B1");
        let op = t.tokens.iter().find(|t| t.kind == TokenKind::Op).unwrap();
        assert_eq!(op.text, "<>");
    }

    #[test]
    fn booleans_and_names() {
        use TokenKind::*;
        assert_eq!(kinds("TRUE"), vec![Bool]);
        assert_eq!(kinds("TaxRate*2"), vec![Name, Op, Number]);
        // A call named TRUE is still a call.
        assert_eq!(kinds("TRUE()"), vec![Func, LParen, RParen]);
    }

    #[test]
    fn oversized_reference_is_a_name() {
        use TokenKind::*;
        // Row beyond 1,048,576 cannot be a cell.
        assert_eq!(kinds("A1048577"), vec![Name]);
        assert_eq!(kinds("XFE1"), vec![Name]);
    }

    #[test]
    fn absolute_markers_lex_as_references() {
        use TokenKind::*;
        assert_eq!(kinds("$A$1+A$2"), vec![CellRef, Op, CellRef]);
        assert_eq!(kinds("$A$1:$B$2"), vec![RangeRef]);
    }

    #[test]
    fn whitespace_is_counted_but_separable() {
        let t = tokenize("= A1 +  B2");
        assert_eq!(t.whitespace_count, 4);
        let sig: Vec<_> = t.significant().map(|t| t.kind).collect();
        assert_eq!(sig, vec![TokenKind::CellRef, TokenKind::Op, TokenKind::CellRef]);
    }

    #[test]
    fn unknown_char_recovers_at_argument_boundary() {
        let t = tokenize("=SUM(@bad, A1)");
        assert!(t.had_invalid);
        // The reference after the recovery point survives.
        assert!(t.tokens.iter().any(|tok| tok.kind == TokenKind::CellRef));
        assert!(t.tokens.iter().any(|tok| tok.kind == TokenKind::Invalid));
    }

    #[test]
    fn recovery_respects_nested_parens() {
        let t = tokenize("=IF(@(A1,B1), C1, D1)");
        assert!(t.had_invalid);
        let refs: Vec<_> = t
            .tokens
            .iter()
            .filter(|t| t.kind == TokenKind::CellRef)
            .map(|t| t.text.as_str())
            .collect();
        // The skip swallows the nested group, resuming at the top-level comma.
        assert_eq!(refs, vec!["C1", "D1"]);
    }

    #[test]
    fn unterminated_string_flags_formula() {
        let t = tokenize("=\"oops");
        assert!(t.had_invalid);
    }

    #[test]
    fn sheet_qualified_cell() {
        use TokenKind::*;
        assert_eq!(kinds("Data!A1"), vec![SheetRef, CellRef]);
    }
}
