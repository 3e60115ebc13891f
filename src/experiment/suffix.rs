//! Piece identity, directory suffixes and work splitting

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Range;

use crate::error::{Error, Result};

/// Which partition of the computation an experiment instance represents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Piece {
    /// The aggregate view over all pieces
    Merged,
    Index(usize),
}

impl Piece {
    pub fn is_merged(&self) -> bool {
        matches!(self, Piece::Merged)
    }

    pub fn index(&self) -> Option<usize> {
        match self {
            Piece::Merged => None,
            Piece::Index(i) => Some(*i),
        }
    }
}

impl fmt::Display for Piece {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Piece::Merged => write!(f, "merged"),
            Piece::Index(i) => write!(f, "{i}"),
        }
    }
}

fn digits(n: usize) -> usize {
    n.to_string().len()
}

/// Suffix appended to the results directory of a piece
///
/// Both numbers are zero-padded to the width of `num_pieces`, so suffixes of
/// the same run sort lexically in piece order. The merged view has no suffix.
pub fn generate_suffix(num_pieces: usize, piece: Piece) -> String {
    match piece {
        Piece::Merged => String::new(),
        Piece::Index(which) => {
            let width = digits(num_pieces);
            format!("_{which:0width$}_of_{num_pieces:0width$}")
        }
    }
}

/// Label used to prefix log lines of a piece
pub fn piece_label(num_pieces: usize, piece: Piece) -> String {
    match piece {
        Piece::Merged => "merged".to_string(),
        Piece::Index(which) => {
            let width = digits(num_pieces);
            format!("{which:>width$} / {num_pieces}")
        }
    }
}

pub fn validate_piece(num_pieces: usize, piece: Piece) -> Result<()> {
    if num_pieces == 0 {
        return Err(Error::config("num_pieces must be at least 1"));
    }
    if let Piece::Index(which) = piece {
        if which >= num_pieces {
            return Err(Error::config(format!(
                "which_piece {which} is out of range for {num_pieces} pieces"
            )));
        }
    }
    Ok(())
}

/// Contiguous share of `total` items handled by piece `which`
///
/// Earlier pieces take one extra item when `total` does not divide evenly.
pub fn piece_range(total: usize, num_pieces: usize, which: usize) -> Range<usize> {
    if num_pieces == 0 || which >= num_pieces {
        return 0..0;
    }
    let base = total / num_pieces;
    let extra = total % num_pieces;
    let start = which * base + which.min(extra);
    let len = base + usize::from(which < extra);
    start..start + len
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_merged_suffix_is_empty() {
        assert_eq!(generate_suffix(1, Piece::Merged), "");
        assert_eq!(generate_suffix(250, Piece::Merged), "");
    }

    #[test]
    fn test_suffix_is_zero_padded() {
        assert_eq!(generate_suffix(3, Piece::Index(1)), "_1_of_3");
        assert_eq!(generate_suffix(12, Piece::Index(3)), "_03_of_12");
        assert_eq!(generate_suffix(100, Piece::Index(7)), "_007_of_100");
    }

    #[test]
    fn test_suffixes_unique_and_sorted() {
        for num_pieces in [1, 2, 9, 10, 11, 101] {
            let suffixes: Vec<String> = (0..num_pieces)
                .map(|i| generate_suffix(num_pieces, Piece::Index(i)))
                .collect();
            let unique: HashSet<&String> = suffixes.iter().collect();
            assert_eq!(unique.len(), num_pieces);

            let mut sorted = suffixes.clone();
            sorted.sort();
            assert_eq!(sorted, suffixes);
            assert!(suffixes
                .iter()
                .all(|s| s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')));
        }
    }

    #[test]
    fn test_validate_piece() {
        assert!(validate_piece(3, Piece::Index(2)).is_ok());
        assert!(validate_piece(3, Piece::Merged).is_ok());
        assert!(validate_piece(3, Piece::Index(3)).unwrap_err().is_configuration());
        assert!(validate_piece(0, Piece::Merged).is_err());
    }

    #[test]
    fn test_piece_label_alignment() {
        assert_eq!(piece_label(12, Piece::Index(3)), " 3 / 12");
        assert_eq!(piece_label(12, Piece::Merged), "merged");
    }

    #[test]
    fn test_piece_ranges_cover_total() {
        for (total, num_pieces) in [(10, 3), (2, 5), (0, 4), (7, 7), (100, 1)] {
            let ranges: Vec<Range<usize>> = (0..num_pieces)
                .map(|which| piece_range(total, num_pieces, which))
                .collect();
            let mut next = 0;
            for range in &ranges {
                assert_eq!(range.start, next);
                next = range.end;
            }
            assert_eq!(next, total);

            let sizes: Vec<usize> = ranges.iter().map(|r| r.len()).collect();
            let max = sizes.iter().max().copied().unwrap_or(0);
            let min = sizes.iter().min().copied().unwrap_or(0);
            assert!(max - min <= 1);
        }
    }
}
