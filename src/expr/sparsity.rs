//! Nonzero-structure representation shared by the Hessian sparsity query and
//! the BLT sorter.

use std::collections::BTreeSet;

/// Structural nonzero pattern of a sparse matrix. Values are irrelevant;
/// only the positions of structurally nonzero entries are kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SparsityPattern {
    nrow: usize,
    ncol: usize,
    nz: BTreeSet<(usize, usize)>,
}

impl SparsityPattern {
    /// Create a pattern from a nonzero list. Entries outside the shape or
    /// duplicated are ignored.
    pub fn new<I>(nrow: usize, ncol: usize, nonzeros: I) -> Self
    where
        I: IntoIterator<Item = (usize, usize)>,
    {
        let nz = nonzeros
            .into_iter()
            .filter(|&(r, c)| r < nrow && c < ncol)
            .collect();
        Self { nrow, ncol, nz }
    }

    /// An empty pattern of the given shape.
    pub fn empty(nrow: usize, ncol: usize) -> Self {
        Self {
            nrow,
            ncol,
            nz: BTreeSet::new(),
        }
    }

    pub fn nrow(&self) -> usize {
        self.nrow
    }

    pub fn ncol(&self) -> usize {
        self.ncol
    }

    /// Number of structural nonzeros.
    pub fn nnz(&self) -> usize {
        self.nz.len()
    }

    /// Whether entry (row, col) is structurally nonzero.
    pub fn contains(&self, row: usize, col: usize) -> bool {
        self.nz.contains(&(row, col))
    }

    /// Iterate over nonzero (row, col) positions in row-major order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.nz.iter().copied()
    }

    /// The union of this pattern with its transpose; requires a square shape.
    pub fn symmetrized(&self) -> Self {
        debug_assert_eq!(self.nrow, self.ncol);
        let mut nz = self.nz.clone();
        for &(r, c) in &self.nz {
            nz.insert((c, r));
        }
        Self {
            nrow: self.nrow,
            ncol: self.ncol,
            nz,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_pattern() {
        let sp = SparsityPattern::new(2, 3, vec![(0, 0), (1, 2), (1, 2), (5, 0)]);
        assert_eq!(sp.nnz(), 2);
        assert!(sp.contains(0, 0));
        assert!(sp.contains(1, 2));
        assert!(!sp.contains(0, 1));
    }

    #[test]
    fn test_symmetrized() {
        let sp = SparsityPattern::new(3, 3, vec![(0, 1), (2, 2)]);
        let sym = sp.symmetrized();
        assert_eq!(sym.nnz(), 3);
        assert!(sym.contains(1, 0));
    }
}
