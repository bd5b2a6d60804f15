//! Line/column positions and ranges.
//!
//! Positions are 0-based internally and rendered 1-based (`line:col`) for
//! humans. Columns are byte offsets within the line. A column of `-1` marks an
//! invalid position, which is what an unset range start/end carries.

use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Position
// ============================================================================

/// A 0-based line/column location in a file.
///
/// Ordering is lexicographic: line first, then column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Position {
    /// 0-based line.
    pub line: u16,
    /// 0-based byte column; `-1` marks an invalid position.
    pub column: i16,
}

impl Position {
    /// The invalid position.
    pub const INVALID: Position = Position {
        line: 0,
        column: -1,
    };

    /// Create a new position.
    pub fn new(line: u16, column: i16) -> Self {
        Position { line, column }
    }

    /// Build a position from unbounded coordinates, saturating at the
    /// representable maximum.
    pub fn saturating(line: usize, column: usize) -> Self {
        Position {
            line: line.min(u16::MAX as usize) as u16,
            column: column.min(i16::MAX as usize) as i16,
        }
    }

    /// Whether this position is valid.
    pub fn is_valid(&self) -> bool {
        self.column >= 0
    }

    /// Parse a 1-based `line:col` string.
    pub fn parse(s: &str) -> Option<Self> {
        let (line, col) = s.trim().split_once(':')?;
        let line: usize = line.parse().ok()?;
        let col: usize = col.parse().ok()?;
        if line == 0 || col == 0 {
            return None;
        }
        Some(Position::saturating(line - 1, col - 1))
    }
}

impl Default for Position {
    fn default() -> Self {
        Position::INVALID
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line as u32 + 1, self.column as i32 + 1)
    }
}

// ============================================================================
// Range
// ============================================================================

/// A half-open `[start, end)` range.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct Range {
    pub start: Position,
    pub end: Position,
}

impl Range {
    /// Create a new range.
    pub fn new(start: Position, end: Position) -> Self {
        Range { start, end }
    }

    /// Shorthand for a range from `(l0, c0)` to `(l1, c1)`.
    pub fn from_coords(l0: u16, c0: i16, l1: u16, c1: i16) -> Self {
        Range::new(Position::new(l0, c0), Position::new(l1, c1))
    }

    /// Whether the start position is valid.
    pub fn is_valid(&self) -> bool {
        self.start.is_valid()
    }

    /// Whether `(line, column)` lies inside this range.
    pub fn contains(&self, line: usize, column: usize) -> bool {
        if line > u16::MAX as usize {
            return false;
        }
        let p = Position::saturating(line, column);
        p >= self.start && p < self.end
    }

    /// Whether `pos` lies inside this range.
    pub fn contains_position(&self, pos: Position) -> bool {
        pos.is_valid() && pos >= self.start && pos < self.end
    }

    /// Whether `other` lies entirely within this range.
    pub fn encloses(&self, other: &Range) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    /// Size key used to order ranges from narrowest to widest.
    pub fn extent_key(&self) -> (u32, i32) {
        (
            self.end.line as u32 - (self.start.line as u32).min(self.end.line as u32),
            self.end.column as i32 - self.start.column as i32,
        )
    }

    /// Parse a `line:col-line:col` string (1-based).
    pub fn parse(s: &str) -> Option<Self> {
        let (start, end) = s.split_once('-')?;
        Some(Range::new(Position::parse(start)?, Position::parse(end)?))
    }
}

impl fmt::Display for Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordering_is_lexicographic() {
        assert!(Position::new(1, 5) < Position::new(2, 0));
        assert!(Position::new(2, 0) < Position::new(2, 1));
        assert!(Range::from_coords(0, 0, 0, 5) < Range::from_coords(0, 1, 0, 2));
    }

    #[test]
    fn invalid_position() {
        assert!(!Position::INVALID.is_valid());
        assert!(!Range::default().is_valid());
        assert!(Position::new(0, 0).is_valid());
    }

    #[test]
    fn contains_is_half_open() {
        let r = Range::from_coords(2, 4, 2, 8);
        assert!(r.contains(2, 4));
        assert!(r.contains(2, 7));
        assert!(!r.contains(2, 8));
        assert!(!r.contains(1, 5));
        assert!(!r.contains(70_000, 0));
    }

    #[test]
    fn parse_and_display_are_one_based() {
        let p = Position::parse("3:7").unwrap();
        assert_eq!(p, Position::new(2, 6));
        assert_eq!(p.to_string(), "3:7");

        let r = Range::parse("1:1-1:4").unwrap();
        assert_eq!(r, Range::from_coords(0, 0, 0, 3));
        assert_eq!(r.to_string(), "1:1-1:4");

        assert!(Position::parse("0:1").is_none());
        assert!(Position::parse("abc").is_none());
    }

    #[test]
    fn encloses() {
        let outer = Range::from_coords(1, 0, 10, 0);
        let inner = Range::from_coords(2, 3, 2, 9);
        assert!(outer.encloses(&inner));
        assert!(!inner.encloses(&outer));
        assert!(inner.extent_key() < outer.extent_key());
    }
}
