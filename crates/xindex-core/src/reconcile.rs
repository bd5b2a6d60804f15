//! Position mapping between indexed and live document content.
//!
//! When a file is open for editing, the store still describes the content
//! that was last indexed. [`Reconciler`] maps positions between those
//! indexed lines and the current buffer lines:
//!
//! 1. **Anchors**: a line unique in both sequences is matched directly, then
//!    matches extend forward and backward over equal neighbors.
//! 2. **Ambiguous lines**: the window between the nearest anchors above and
//!    below is searched for the line with the smallest bounded Myers
//!    distance. Nothing within [`AlignConfig::max_diff`] means unresolvable.
//! 3. **Columns**: common prefix/suffix shift directly; the differing middle
//!    is split with forward/backward edit-distance vectors (one Hirschberg
//!    step). Long lines fall back to a proportional shift.
//!
//! Columns are byte offsets. A column outside its line passes through
//! unchanged.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

use crate::position::{Position, Range};

// ============================================================================
// Configuration & Errors
// ============================================================================

/// Caps for line matching and column alignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlignConfig {
    /// Largest Myers distance at which an ambiguous line still matches.
    pub max_diff: usize,
    /// Lines longer than this use a proportional column shift.
    pub max_column_align: usize,
}

impl Default for AlignConfig {
    fn default() -> Self {
        AlignConfig {
            max_diff: 20,
            max_column_align: 200,
        }
    }
}

/// Why a position could not be mapped.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum MappingError {
    /// The line does not exist on the source side.
    #[error("line {line} is outside a {len}-line document")]
    OutOfBounds { line: usize, len: usize },

    /// No candidate line is close enough.
    #[error("no line matches line {line} within edit distance {max_diff}")]
    NoCandidate { line: usize, max_diff: usize },
}

// ============================================================================
// Distance Primitives
// ============================================================================

/// Bounded Myers O(ND) edit distance (insertions + deletions).
///
/// Returns `threshold + 1` when the distance exceeds `threshold`.
pub fn myers_diff(a: &str, b: &str, threshold: usize) -> usize {
    let (a, b) = strip_common(a.as_bytes(), b.as_bytes());
    let n = a.len() as isize;
    let m = b.len() as isize;
    let max = threshold as isize;
    let offset = max + 1;
    let mut v = vec![0isize; (2 * max + 3) as usize];

    for d in 0..=max {
        let low = -d + 2 * (d - m).max(0);
        let high = d - 2 * (d - n).max(0);
        let mut k = low;
        while k <= high {
            let idx = (k + offset) as usize;
            let mut x = if k == -d || (k != d && v[idx - 1] < v[idx + 1]) {
                v[idx + 1]
            } else {
                v[idx - 1] + 1
            };
            let mut y = x - k;
            while x < n && y < m && a[x as usize] == b[y as usize] {
                x += 1;
                y += 1;
            }
            v[idx] = x;
            if x >= n && y >= m {
                return d as usize;
            }
            k += 2;
        }
    }
    threshold + 1
}

fn strip_common<'a>(mut a: &'a [u8], mut b: &'a [u8]) -> (&'a [u8], &'a [u8]) {
    while let (Some(x), Some(y)) = (a.first(), b.first()) {
        if x != y {
            break;
        }
        a = &a[1..];
        b = &b[1..];
    }
    while let (Some(x), Some(y)) = (a.last(), b.last()) {
        if x != y {
            break;
        }
        a = &a[..a.len() - 1];
        b = &b[..b.len() - 1];
    }
    (a, b)
}

/// Last row of the insert/delete edit-distance table between `a` and `b`:
/// `out[j]` is the cost of aligning all of `a` with `b[..j]`.
pub fn edit_distance_vector(a: &[u8], b: &[u8]) -> Vec<usize> {
    let mut d: Vec<usize> = (0..=b.len()).collect();
    for (i, ca) in a.iter().enumerate() {
        let mut diag = d[0];
        d[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let up = d[j + 1];
            d[j + 1] = if ca == cb {
                diag
            } else {
                d[j].min(d[j + 1]) + 1
            };
            diag = up;
        }
    }
    d
}

/// Find the column in `b` matching `column` in `a`.
///
/// `is_end` selects the tie rule: range starts take the earliest of equally
/// cheap splits, range ends the latest.
pub fn align_column(a: &str, column: i16, b: &str, is_end: bool, config: &AlignConfig) -> i16 {
    if column < 0 || column as usize > a.len() {
        return column;
    }
    let col = column as usize;
    let (a, b) = (a.as_bytes(), b.as_bytes());

    let mut head = 0;
    while head < a.len() && head < b.len() && a[head] == b[head] {
        head += 1;
    }
    if col < head {
        return column;
    }

    let mut tail = 0;
    while tail < a.len() - head && tail < b.len() - head && a[a.len() - 1 - tail] == b[b.len() - 1 - tail]
    {
        tail += 1;
    }
    if col >= a.len() - tail {
        return to_column(col + b.len() - a.len());
    }

    let a_mid = a.len() - tail - head;
    let b_mid = b.len() - tail - head;
    if a.len() > config.max_column_align || b.len() > config.max_column_align {
        return to_column(head + (col - head) * b_mid / a_mid.max(1));
    }

    let b_span = &b[head..b.len() - tail];
    let left = edit_distance_vector(&a[head..col], b_span);

    let a_rev: Vec<u8> = a[col..a.len() - tail].iter().rev().copied().collect();
    let b_rev: Vec<u8> = b_span.iter().rev().copied().collect();
    let mut right = edit_distance_vector(&a_rev, &b_rev);
    right.reverse();

    let mut best = 0;
    let mut best_cost = usize::MAX;
    for (i, (l, r)) in left.iter().zip(&right).enumerate() {
        let cost = l + r;
        if (is_end && cost <= best_cost) || (!is_end && cost < best_cost) {
            best_cost = cost;
            best = i;
        }
    }
    to_column(head + best)
}

fn to_column(col: usize) -> i16 {
    col.min(i16::MAX as usize) as i16
}

// ============================================================================
// Line Mapping
// ============================================================================

/// Anchor map between indexed lines and buffer lines.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LineMapping {
    pub index_to_buffer: Vec<Option<usize>>,
    pub buffer_to_index: Vec<Option<usize>>,
}

impl LineMapping {
    /// Compute anchors between `index` and `buffer` lines.
    pub fn compute<S: AsRef<str>>(index: &[S], buffer: &[S]) -> Self {
        let n = index.len();
        let m = buffer.len();

        let same = n == m && index.iter().zip(buffer).all(|(a, b)| a.as_ref() == b.as_ref());
        if same {
            let identity: Vec<Option<usize>> = (0..n).map(Some).collect();
            return LineMapping {
                index_to_buffer: identity.clone(),
                buffer_to_index: identity,
            };
        }

        let index_unique = unique_lines(index);
        let buffer_unique = unique_lines(buffer);

        let mut index_to_buffer: Vec<Option<usize>> = index
            .iter()
            .map(|line| {
                let line = line.as_ref();
                index_unique.get(line).copied().flatten()?;
                buffer_unique.get(line).copied().flatten()
            })
            .collect();

        for i in 0..n.saturating_sub(1) {
            if let Some(j) = index_to_buffer[i] {
                if j + 1 < m && index[i + 1].as_ref() == buffer[j + 1].as_ref() {
                    index_to_buffer[i + 1] = Some(j + 1);
                }
            }
        }
        for i in (1..n).rev() {
            if let Some(j) = index_to_buffer[i] {
                if j > 0 && index[i - 1].as_ref() == buffer[j - 1].as_ref() {
                    index_to_buffer[i - 1] = Some(j - 1);
                }
            }
        }

        let mut buffer_to_index = vec![None; m];
        for (i, j) in index_to_buffer.iter().enumerate() {
            if let Some(j) = j {
                buffer_to_index[*j] = Some(i);
            }
        }

        LineMapping {
            index_to_buffer,
            buffer_to_index,
        }
    }
}

/// Map from line content to its line number, `None` if the content repeats.
fn unique_lines<S: AsRef<str>>(lines: &[S]) -> HashMap<&str, Option<usize>> {
    let mut seen: HashMap<&str, Option<usize>> = HashMap::with_capacity(lines.len());
    for (i, line) in lines.iter().enumerate() {
        seen.entry(line.as_ref())
            .and_modify(|slot| *slot = None)
            .or_insert(Some(i));
    }
    seen
}

/// Map `line` of `from` to a line of `to`, using `anchors` (from -> to).
fn find_matching_line(
    from: &[String],
    anchors: &[Option<usize>],
    line: usize,
    to: &[String],
    config: &AlignConfig,
) -> Result<usize, MappingError> {
    if let Some(j) = anchors[line] {
        return Ok(j);
    }

    let up = anchors[..line].iter().rev().find_map(|a| *a);
    let down = anchors[line + 1..].iter().find_map(|a| *a);
    let start = up.map_or(0, |u| u + 1);
    let end = down.unwrap_or(to.len());

    let needle = &from[line];
    let mut best = None;
    let mut best_dist = config.max_diff + 1;
    for (i, candidate) in to.iter().enumerate().take(end).skip(start) {
        let dist = myers_diff(needle, candidate, config.max_diff);
        if dist < best_dist {
            best_dist = dist;
            best = Some(i);
        }
    }
    best.ok_or(MappingError::NoCandidate {
        line,
        max_diff: config.max_diff,
    })
}

// ============================================================================
// Reconciler
// ============================================================================

/// Bidirectional position mapping for one open document.
#[derive(Debug, Clone)]
pub struct Reconciler {
    index_lines: Vec<String>,
    buffer_lines: Vec<String>,
    mapping: LineMapping,
    config: AlignConfig,
}

impl Reconciler {
    /// Build the mapping between `indexed` and `buffer` content.
    pub fn new(indexed: &str, buffer: &str, config: AlignConfig) -> Self {
        let index_lines: Vec<String> = indexed.lines().map(str::to_string).collect();
        let buffer_lines: Vec<String> = buffer.lines().map(str::to_string).collect();
        let mapping = LineMapping::compute(&index_lines, &buffer_lines);
        Reconciler {
            index_lines,
            buffer_lines,
            mapping,
            config,
        }
    }

    pub fn mapping(&self) -> &LineMapping {
        &self.mapping
    }

    pub fn index_lines(&self) -> &[String] {
        &self.index_lines
    }

    pub fn buffer_lines(&self) -> &[String] {
        &self.buffer_lines
    }

    /// Map an indexed position into the buffer.
    pub fn index_to_buffer(&self, pos: Position, is_end: bool) -> Result<Position, MappingError> {
        map_position(
            &self.index_lines,
            &self.mapping.index_to_buffer,
            &self.buffer_lines,
            pos,
            is_end,
            &self.config,
        )
    }

    /// Map a buffer position back to indexed coordinates.
    pub fn buffer_to_index(&self, pos: Position, is_end: bool) -> Result<Position, MappingError> {
        map_position(
            &self.buffer_lines,
            &self.mapping.buffer_to_index,
            &self.index_lines,
            pos,
            is_end,
            &self.config,
        )
    }

    /// Map an indexed range into the buffer.
    pub fn index_range_to_buffer(&self, range: Range) -> Result<Range, MappingError> {
        Ok(Range::new(
            self.index_to_buffer(range.start, false)?,
            self.index_to_buffer(range.end, true)?,
        ))
    }

    /// Map a buffer range back to indexed coordinates.
    pub fn buffer_range_to_index(&self, range: Range) -> Result<Range, MappingError> {
        Ok(Range::new(
            self.buffer_to_index(range.start, false)?,
            self.buffer_to_index(range.end, true)?,
        ))
    }
}

fn map_position(
    from: &[String],
    anchors: &[Option<usize>],
    to: &[String],
    pos: Position,
    is_end: bool,
    config: &AlignConfig,
) -> Result<Position, MappingError> {
    let line = pos.line as usize;
    if line == from.len() && pos.column == 0 {
        return Ok(Position::saturating(to.len(), 0));
    }
    if line >= from.len() {
        return Err(MappingError::OutOfBounds {
            line,
            len: from.len(),
        });
    }

    let target = find_matching_line(from, anchors, line, to, config)?;
    let column = align_column(&from[line], pos.column, &to[target], is_end, config);
    Ok(Position::new(target.min(u16::MAX as usize) as u16, column))
}

// ============================================================================
// Tests
// ============================================================================
