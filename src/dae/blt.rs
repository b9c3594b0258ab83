//! Block-lower-triangular structural decomposition.
//!
//! The sorter reads the nonzero structure of the implicit-equation Jacobian
//! with respect to the implicit states, runs a Dulmage-Mendelsohn bipartite
//! decomposition (maximum matching, then a strongly-connected-components
//! condensation of the matched pairing) and applies the resulting
//! permutations in place, so block k's equations structurally depend only on
//! variables in blocks <= k.

use std::collections::HashMap;

use petgraph::algo::{maximum_matching, tarjan_scc};
use petgraph::graph::{DiGraph, NodeIndex, UnGraph};
use tracing::debug;

use super::FlatDae;
use crate::error::{DaeOptError, Result};
use crate::expr::sparsity::SparsityPattern;
use crate::expr::{jac_sparsity, substitute_all, Expr, Symbol};

/// Coarse structural classification of a sparsity pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoarseDecomposition {
    /// Fewer equations than variables, all equations matched
    UnderDetermined,
    /// Perfect matching between equations and variables
    WellDetermined,
    /// More equations than variables, all variables matched
    OverDetermined,
    /// Structurally rank-deficient
    Singular,
}

/// Result of a Dulmage-Mendelsohn decomposition.
///
/// `rowperm`/`colperm` are bijections on the equation/variable index sets:
/// entry i of the permuted system is entry `rowperm[i]`/`colperm[i]` of the
/// original one. Blocks cover the matched square part; block k spans rows
/// `rowblock[k]..rowblock[k+1]` and columns `colblock[k]..colblock[k+1]`.
/// Unmatched rows and columns trail behind the last block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BltResult {
    pub rowperm: Vec<usize>,
    pub colperm: Vec<usize>,
    pub rowblock: Vec<usize>,
    pub colblock: Vec<usize>,
    pub nb: usize,
    pub coarse: CoarseDecomposition,
}

/// Dulmage-Mendelsohn decomposition of a sparsity pattern.
pub fn dulmage_mendelsohn(sp: &SparsityPattern) -> BltResult {
    let nrow = sp.nrow();
    let ncol = sp.ncol();

    // Bipartite graph: row nodes first, then column nodes.
    let mut graph: UnGraph<(), ()> = UnGraph::with_capacity(nrow + ncol, sp.nnz());
    let row_nodes: Vec<NodeIndex> = (0..nrow).map(|_| graph.add_node(())).collect();
    let col_nodes: Vec<NodeIndex> = (0..ncol).map(|_| graph.add_node(())).collect();
    for (r, c) in sp.iter() {
        graph.add_edge(row_nodes[r], col_nodes[c], ());
    }

    let matching = maximum_matching(&graph);

    // Matched (row, col) pairs in row order.
    let mut pairs: Vec<(usize, usize)> = Vec::new();
    for (r, node) in row_nodes.iter().enumerate() {
        if let Some(mate) = matching.mate(*node) {
            pairs.push((r, mate.index() - nrow));
        }
    }

    let unmatched_rows = nrow - pairs.len();
    let unmatched_cols = ncol - pairs.len();
    let coarse = if unmatched_rows == 0 && unmatched_cols == 0 {
        CoarseDecomposition::WellDetermined
    } else if nrow < ncol && unmatched_rows == 0 {
        CoarseDecomposition::UnderDetermined
    } else if nrow > ncol && unmatched_cols == 0 {
        CoarseDecomposition::OverDetermined
    } else {
        CoarseDecomposition::Singular
    };

    // Row-wise nonzeros for the dependency edges.
    let mut cols_of_row: Vec<Vec<usize>> = vec![Vec::new(); nrow];
    for (r, c) in sp.iter() {
        cols_of_row[r].push(c);
    }
    let pair_of_col: HashMap<usize, usize> = pairs
        .iter()
        .enumerate()
        .map(|(pi, (_, c))| (*c, pi))
        .collect();

    // Directed graph over matched pairs: an edge u -> v means u's equation
    // structurally depends on v's variable.
    let mut deps: DiGraph<(), ()> = DiGraph::with_capacity(pairs.len(), sp.nnz());
    let pair_nodes: Vec<NodeIndex> = pairs.iter().map(|_| deps.add_node(())).collect();
    for (pi, (r, _)) in pairs.iter().enumerate() {
        for c in &cols_of_row[*r] {
            if let Some(&pj) = pair_of_col.get(c) {
                if pj != pi {
                    deps.add_edge(pair_nodes[pi], pair_nodes[pj], ());
                }
            }
        }
    }

    // Strongly connected components arrive dependencies-first, which is
    // exactly the block-lower-triangular order.
    let sccs = tarjan_scc(&deps);

    let mut rowperm = Vec::with_capacity(nrow);
    let mut colperm = Vec::with_capacity(ncol);
    let mut rowblock = vec![0];
    let mut colblock = vec![0];
    for scc in &sccs {
        for node in scc {
            let (r, c) = pairs[node.index()];
            rowperm.push(r);
            colperm.push(c);
        }
        rowblock.push(rowperm.len());
        colblock.push(colperm.len());
    }
    let nb = sccs.len();

    // Unmatched rows/columns trail behind the blocks.
    let matched_rows: Vec<bool> = {
        let mut m = vec![false; nrow];
        for (r, _) in &pairs {
            m[*r] = true;
        }
        m
    };
    for (r, matched) in matched_rows.iter().enumerate() {
        if !matched {
            rowperm.push(r);
        }
    }
    let matched_cols: Vec<bool> = {
        let mut m = vec![false; ncol];
        for (_, c) in &pairs {
            m[*c] = true;
        }
        m
    };
    for (c, matched) in matched_cols.iter().enumerate() {
        if !matched {
            colperm.push(c);
        }
    }

    BltResult {
        rowperm,
        colperm,
        rowblock,
        colblock,
        nb,
        coarse,
    }
}

impl FlatDae {
    /// The symbol each implicit state is solved for: its derivative when one
    /// appears in the implicit residuals, otherwise the state itself.
    pub(crate) fn solve_symbols(&self) -> Vec<Symbol> {
        self.x
            .iter()
            .map(|name| {
                let der = Symbol::Der(name.clone());
                if self.equations.dae.iter().any(|e| e.depends_on(&der)) {
                    der
                } else {
                    Symbol::Var(name.clone())
                }
            })
            .collect()
    }

    /// Compute the block-lower-triangular ordering of the implicit equations
    /// and apply it in place to the residual and state lists.
    ///
    /// With `include_states`, each state occurrence is replaced by a
    /// synthetic `invtau * der(state)` surrogate before the sparsity is
    /// read, so the structure also reflects dependence through derivative
    /// terms.
    pub fn sort_blt(&mut self, include_states: bool) -> Result<&BltResult> {
        debug!("BLT sorting {} implicit equations", self.equations.dae.len());
        let syms = self.solve_symbols();

        let sp = if include_states {
            let mut map: HashMap<Symbol, Expr> = HashMap::new();
            for (name, sym) in self.x.iter().zip(syms.iter()) {
                if let Symbol::Der(_) = sym {
                    map.insert(
                        Symbol::Var(name.clone()),
                        Expr::var("invtau") * Expr::Der(name.clone()),
                    );
                }
            }
            let augmented = substitute_all(&self.equations.dae, &map);
            jac_sparsity(&augmented, &syms)
        } else {
            jac_sparsity(&self.equations.dae, &syms)
        };

        let result = dulmage_mendelsohn(&sp);
        if result.coarse != CoarseDecomposition::WellDetermined {
            return Err(DaeOptError::Modeling(format!(
                "Implicit equations are structurally {:?}; cannot BLT sort",
                result.coarse
            )));
        }

        // Permute equations and states in place.
        let dae_new: Vec<Expr> = result
            .rowperm
            .iter()
            .map(|&i| self.equations.dae[i].clone())
            .collect();
        self.equations.dae = dae_new;
        let x_new: Vec<String> = result
            .colperm
            .iter()
            .map(|&j| self.x[j].clone())
            .collect();
        self.x = x_new;

        debug!("BLT sorting complete: {} blocks", result.nb);
        self.blt = Some(result);
        self.sorted = true;
        match &self.blt {
            Some(blt) => Ok(blt),
            None => Err(DaeOptError::InvalidState(
                "BLT result missing after sort".to_string(),
            )),
        }
    }
}
