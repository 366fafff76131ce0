//! Cell address model: A1-style parsing, canonical emission, range expansion.

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use thiserror::Error;

/// Highest row a workbook cell may occupy (Excel-compatible).
pub const MAX_ROW: u32 = 1_048_576;
/// Highest column a workbook cell may occupy (Excel-compatible, `XFD`).
pub const MAX_COL: u32 = 16_384;

/// Errors produced while parsing A1-style addresses and ranges.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressParseError {
    #[error("empty address")]
    Empty,
    #[error("invalid character in address: {0:?}")]
    InvalidChar(char),
    #[error("missing sheet qualifier in {0:?}")]
    MissingSheet(String),
    #[error("row or column is zero in {0:?}")]
    ZeroIndex(String),
    #[error("row exceeds {MAX_ROW} or column exceeds {MAX_COL} in {0:?}")]
    OutOfBounds(String),
    #[error("malformed range {0:?}")]
    MalformedRange(String),
    #[error("range bounds are on different sheets in {0:?}")]
    MismatchedSheets(String),
}

/// Absolute position of one cell: `(sheet, row, col)`, both indices 1-based.
///
/// Equality, ordering, and hashing follow the `(sheet, row, col)` tuple.
/// The canonical string form is `Sheet!A1`; sheet names that do not match
/// `[A-Za-z_][A-Za-z0-9_ ]*` are emitted single-quoted.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CellAddress {
    pub sheet: String,
    pub row: u32,
    pub col: u32,
}

impl CellAddress {
    pub fn new(sheet: impl Into<String>, row: u32, col: u32) -> Self {
        Self {
            sheet: sheet.into(),
            row,
            col,
        }
    }

    /// Canonical `Sheet!A1` form.
    pub fn to_a1(&self) -> String {
        format!("{}!{}{}", quote_sheet(&self.sheet), column_label(self.col), self.row)
    }

    /// Parse a sheet-qualified address (`Sheet!A1` or `'My Sheet'!A1`).
    pub fn parse_a1(s: &str) -> Result<Self, AddressParseError> {
        match parse_a1_components(s)? {
            (Some(sheet), row, col) => Ok(Self { sheet, row, col }),
            (None, ..) => Err(AddressParseError::MissingSheet(s.to_string())),
        }
    }

    /// Parse an address that may omit the sheet qualifier, defaulting to `home`.
    pub fn parse_a1_in(s: &str, home: &str) -> Result<Self, AddressParseError> {
        let (sheet, row, col) = parse_a1_components(s)?;
        Ok(Self {
            sheet: sheet.unwrap_or_else(|| home.to_string()),
            row,
            col,
        })
    }
}

impl fmt::Display for CellAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_a1())
    }
}

impl Serialize for CellAddress {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_a1())
    }
}

impl<'de> Deserialize<'de> for CellAddress {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        CellAddress::parse_a1(&s).map_err(de::Error::custom)
    }
}

/// Rectangular block of cells on a single sheet.
///
/// `top_left <= bottom_right` componentwise; a single-cell range is allowed.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CellRange {
    top_left: CellAddress,
    bottom_right: CellAddress,
}

impl CellRange {
    /// Build a range from two corners, normalizing their order componentwise.
    pub fn new(a: CellAddress, b: CellAddress) -> Result<Self, AddressParseError> {
        if a.sheet != b.sheet {
            return Err(AddressParseError::MismatchedSheets(format!("{a}:{b}")));
        }
        let top_left = CellAddress::new(a.sheet.clone(), a.row.min(b.row), a.col.min(b.col));
        let bottom_right = CellAddress::new(a.sheet, a.row.max(b.row), a.col.max(b.col));
        Ok(Self {
            top_left,
            bottom_right,
        })
    }

    pub fn single(addr: CellAddress) -> Self {
        Self {
            top_left: addr.clone(),
            bottom_right: addr,
        }
    }

    /// Parse `Sheet!A1:B2` (the qualifier binds both corners).
    pub fn parse_range(s: &str) -> Result<Self, AddressParseError> {
        parse_range_components(s, None)
    }

    /// Parse a range that may omit the sheet qualifier, defaulting to `home`.
    pub fn parse_range_in(s: &str, home: &str) -> Result<Self, AddressParseError> {
        parse_range_components(s, Some(home))
    }

    pub fn sheet(&self) -> &str {
        &self.top_left.sheet
    }

    pub fn top_left(&self) -> &CellAddress {
        &self.top_left
    }

    pub fn bottom_right(&self) -> &CellAddress {
        &self.bottom_right
    }

    pub fn rows(&self) -> u32 {
        self.bottom_right.row - self.top_left.row + 1
    }

    pub fn cols(&self) -> u32 {
        self.bottom_right.col - self.top_left.col + 1
    }

    /// Number of cells covered.
    pub fn len(&self) -> u64 {
        self.rows() as u64 * self.cols() as u64
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn contains(&self, addr: &CellAddress) -> bool {
        addr.sheet == *self.sheet()
            && (self.top_left.row..=self.bottom_right.row).contains(&addr.row)
            && (self.top_left.col..=self.bottom_right.col).contains(&addr.col)
    }

    /// Cell at the given 1-based offsets within the range, if in bounds.
    pub fn cell_at(&self, row: u32, col: u32) -> Option<CellAddress> {
        if row == 0 || col == 0 || row > self.rows() || col > self.cols() {
            return None;
        }
        Some(CellAddress::new(
            self.sheet().to_string(),
            self.top_left.row + row - 1,
            self.top_left.col + col - 1,
        ))
    }

    /// Lazily expand to member addresses in row-major order.
    pub fn cells(&self) -> RangeCells {
        RangeCells {
            range: self.clone(),
            next_row: self.top_left.row,
            next_col: self.top_left.col,
        }
    }

    pub fn to_a1(&self) -> String {
        format!(
            "{}!{}{}:{}{}",
            quote_sheet(self.sheet()),
            column_label(self.top_left.col),
            self.top_left.row,
            column_label(self.bottom_right.col),
            self.bottom_right.row
        )
    }
}

impl fmt::Display for CellRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_a1())
    }
}

/// Row-major iterator over the cells of a [`CellRange`].
pub struct RangeCells {
    range: CellRange,
    next_row: u32,
    next_col: u32,
}

impl Iterator for RangeCells {
    type Item = CellAddress;

    fn next(&mut self) -> Option<CellAddress> {
        if self.next_row > self.range.bottom_right.row {
            return None;
        }
        let addr = CellAddress::new(
            self.range.sheet().to_string(),
            self.next_row,
            self.next_col,
        );
        if self.next_col == self.range.bottom_right.col {
            self.next_col = self.range.top_left.col;
            self.next_row += 1;
        } else {
            self.next_col += 1;
        }
        Some(addr)
    }
}

/// Base-26 column label: `1 -> A`, `26 -> Z`, `27 -> AA`.
pub fn column_label(col: u32) -> String {
    debug_assert!(col >= 1);
    let mut n = col;
    let mut out = Vec::new();
    while n > 0 {
        let rem = ((n - 1) % 26) as u8;
        out.push(b'A' + rem);
        n = (n - 1) / 26;
    }
    out.reverse();
    String::from_utf8(out).unwrap_or_default()
}

/// Inverse of [`column_label`]; rejects empty and out-of-range labels.
pub fn column_index(label: &str) -> Option<u32> {
    if label.is_empty() {
        return None;
    }
    let mut n: u64 = 0;
    for c in label.chars() {
        let c = c.to_ascii_uppercase();
        if !c.is_ascii_uppercase() {
            return None;
        }
        n = n * 26 + (c as u64 - 'A' as u64 + 1);
        if n > MAX_COL as u64 {
            return None;
        }
    }
    Some(n as u32)
}

/// Parse the `$A$1` body of a reference, ignoring absolute markers.
///
/// Returns `(col, row)` on success; `None` when the text is not a cell
/// reference or exceeds the grid bounds (such text is a name candidate).
pub fn parse_cell_body(s: &str) -> Option<(u32, u32)> {
    let mut rest = s.strip_prefix('$').unwrap_or(s);
    let split = rest.find(|c: char| !c.is_ascii_alphabetic())?;
    if split == 0 {
        return None;
    }
    let col = column_index(&rest[..split])?;
    rest = &rest[split..];
    rest = rest.strip_prefix('$').unwrap_or(rest);
    if rest.is_empty() || !rest.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let row: u64 = rest.parse().ok()?;
    if row == 0 || row > MAX_ROW as u64 {
        return None;
    }
    Some((col, row as u32))
}

/// True when the sheet name round-trips without quoting.
fn sheet_is_plain(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == ' ')
}

fn quote_sheet(name: &str) -> String {
    if sheet_is_plain(name) {
        name.to_string()
    } else {
        format!("'{}'", name.replace('\'', "''"))
    }
}

/// Split `Sheet!rest` / `'Sheet Name'!rest` into `(sheet?, rest)`.
fn split_sheet(s: &str) -> Result<(Option<String>, &str), AddressParseError> {
    if let Some(stripped) = s.strip_prefix('\'') {
        // Quoted sheet; '' is an embedded quote.
        let mut name = String::new();
        let mut chars = stripped.char_indices();
        while let Some((i, c)) = chars.next() {
            if c == '\'' {
                if stripped[i + 1..].starts_with('\'') {
                    name.push('\'');
                    chars.next();
                } else {
                    let rest = &stripped[i + 1..];
                    let rest = rest
                        .strip_prefix('!')
                        .ok_or_else(|| AddressParseError::MalformedRange(s.to_string()))?;
                    return Ok((Some(name), rest));
                }
            } else {
                name.push(c);
            }
        }
        Err(AddressParseError::MalformedRange(s.to_string()))
    } else if let Some(bang) = s.rfind('!') {
        let name = &s[..bang];
        if name.is_empty() {
            return Err(AddressParseError::Empty);
        }
        if let Some(c) = name
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || *c == '_' || *c == ' '))
        {
            return Err(AddressParseError::InvalidChar(c));
        }
        Ok((Some(name.to_string()), &s[bang + 1..]))
    } else {
        Ok((None, s))
    }
}

fn parse_a1_components(s: &str) -> Result<(Option<String>, u32, u32), AddressParseError> {
    let s = s.trim();
    if s.is_empty() {
        return Err(AddressParseError::Empty);
    }
    let (sheet, body) = split_sheet(s)?;
    if body.is_empty() {
        return Err(AddressParseError::Empty);
    }
    match parse_cell_body(body) {
        Some((col, row)) => Ok((sheet, row, col)),
        None => classify_bad_body(s, body),
    }
}

/// Distinguish zero/out-of-bounds indices from plain garbage for error reporting.
fn classify_bad_body(
    whole: &str,
    body: &str,
) -> Result<(Option<String>, u32, u32), AddressParseError> {
    let stripped: String = body.chars().filter(|c| *c != '$').collect();
    let split = stripped
        .find(|c: char| !c.is_ascii_alphabetic())
        .unwrap_or(stripped.len());
    let (letters, digits) = stripped.split_at(split);
    if letters.is_empty()
        || digits.is_empty()
        || !digits.bytes().all(|b| b.is_ascii_digit())
        || !letters.bytes().all(|b| b.is_ascii_alphabetic())
    {
        let bad = body
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || *c == '$'))
            .unwrap_or('?');
        return Err(AddressParseError::InvalidChar(bad));
    }
    if digits.parse::<u64>() == Ok(0) {
        return Err(AddressParseError::ZeroIndex(whole.to_string()));
    }
    Err(AddressParseError::OutOfBounds(whole.to_string()))
}

fn parse_range_components(s: &str, home: Option<&str>) -> Result<CellRange, AddressParseError> {
    let s = s.trim();
    if s.is_empty() {
        return Err(AddressParseError::Empty);
    }
    let (sheet, body) = split_sheet(s)?;
    let sheet = match (sheet, home) {
        (Some(sheet), _) => sheet,
        (None, Some(home)) => home.to_string(),
        (None, None) => return Err(AddressParseError::MissingSheet(s.to_string())),
    };
    let (a, b) = match body.split_once(':') {
        Some(parts) => parts,
        None => {
            // A single-cell range is permitted.
            let addr = CellAddress::parse_a1_in(body, &sheet)?;
            return Ok(CellRange::single(addr));
        }
    };
    let (ac, ar) = parse_cell_body(a)
        .ok_or_else(|| AddressParseError::MalformedRange(s.to_string()))?;
    let (bc, br) = parse_cell_body(b)
        .ok_or_else(|| AddressParseError::MalformedRange(s.to_string()))?;
    CellRange::new(
        CellAddress::new(sheet.clone(), ar, ac),
        CellAddress::new(sheet, br, bc),
    )
}
