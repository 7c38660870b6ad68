// Path: crates/phash/src/spectral.rs
//! Laplacian spectrum extraction by power iteration with deflation.
//!
//! The matrices here are tiny (one node per syntactic construct), so a
//! dense representation and plain power iteration are sufficient. The
//! initial vectors come from a PRNG seeded by the graph size, which keeps
//! the whole computation reproducible across runs and hosts.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Iteration cap per eigenvalue.
const MAX_ITERATIONS: u32 = 50;
/// Convergence threshold on the Rayleigh quotient delta.
const CONVERGENCE_EPS: f64 = 1e-10;

/// Builds the Laplacian `L = D - A` of an undirected unit-weight graph.
pub fn laplacian(n: usize, edges: &[(usize, usize)]) -> Vec<Vec<f64>> {
    let mut l = vec![vec![0.0; n]; n];
    for &(a, b) in edges {
        if a >= n || b >= n || a == b {
            continue;
        }
        l[a][b] -= 1.0;
        l[b][a] -= 1.0;
        l[a][a] += 1.0;
        l[b][b] += 1.0;
    }
    l
}

/// Extracts the top `k` eigenvalues of a symmetric matrix by repeated
/// power iteration, deflating each converged component out of the matrix.
///
/// Degenerate inputs are defined, not panics: an empty matrix yields an
/// empty vector and a 1x1 matrix yields its single entry.
pub fn top_eigenvalues(mut m: Vec<Vec<f64>>, k: usize) -> Vec<f64> {
    let n = m.len();
    if n == 0 || k == 0 {
        return Vec::new();
    }
    let mut rng = StdRng::seed_from_u64(n as u64);
    let rounds = k.min(n);
    let mut values = Vec::with_capacity(rounds);

    for _ in 0..rounds {
        let mut v: Vec<f64> = (0..n).map(|_| rng.gen_range(-0.5..0.5)).collect();
        if normalize(&mut v) == 0.0 {
            values.push(0.0);
            continue;
        }

        let mut eigenvalue = 0.0;
        for _ in 0..MAX_ITERATIONS {
            let mut next = mat_vec(&m, &v);
            let norm = normalize(&mut next);
            if norm == 0.0 {
                // v is in the null space; its Rayleigh quotient is 0.
                eigenvalue = 0.0;
                break;
            }
            let candidate = rayleigh(&m, &next);
            let done = (candidate - eigenvalue).abs() < CONVERGENCE_EPS;
            eigenvalue = candidate;
            v = next;
            if done {
                break;
            }
        }

        values.push(eigenvalue);
        deflate(&mut m, eigenvalue, &v);
    }

    values.sort_by(|a, b| b.partial_cmp(a).unwrap_or(std::cmp::Ordering::Equal));
    values
}

/// Rounds each value onto a grid of `quant` levels, normalizing `-0.0`.
pub fn quantize(values: &[f64], quant: u32) -> Vec<f64> {
    let q = quant as f64;
    values
        .iter()
        .map(|v| {
            let r = (v * q).round() / q;
            if r == 0.0 {
                0.0
            } else {
                r
            }
        })
        .collect()
}

/// Cosine similarity of two eigenvalue vectors, zero-padded to equal
/// length. Two empty vectors are identical by convention.
pub fn cosine_similarity(a: &[f64], b: &[f64]) -> f64 {
    let len = a.len().max(b.len());
    if len == 0 {
        return 1.0;
    }
    let at = |s: &[f64], i: usize| s.get(i).copied().unwrap_or(0.0);
    let mut dot = 0.0;
    let mut na = 0.0;
    let mut nb = 0.0;
    for i in 0..len {
        let (x, y) = (at(a, i), at(b, i));
        dot += x * y;
        na += x * x;
        nb += y * y;
    }
    if na == 0.0 && nb == 0.0 {
        return 1.0;
    }
    if na == 0.0 || nb == 0.0 {
        return 0.0;
    }
    dot / (na.sqrt() * nb.sqrt())
}

fn mat_vec(m: &[Vec<f64>], v: &[f64]) -> Vec<f64> {
    m.iter()
        .map(|row| row.iter().zip(v).map(|(a, b)| a * b).sum())
        .collect()
}

fn rayleigh(m: &[Vec<f64>], v: &[f64]) -> f64 {
    let mv = mat_vec(m, v);
    v.iter().zip(&mv).map(|(a, b)| a * b).sum()
}

fn normalize(v: &mut [f64]) -> f64 {
    let norm: f64 = v.iter().map(|x| x * x).sum::<f64>().sqrt();
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
    norm
}

fn deflate(m: &mut [Vec<f64>], eigenvalue: f64, v: &[f64]) {
    let n = m.len();
    for i in 0..n {
        for j in 0..n {
            m[i][j] -= eigenvalue * v[i] * v[j];
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_and_single_node_graphs_are_defined() {
        assert!(top_eigenvalues(laplacian(0, &[]), 5).is_empty());
        let vals = top_eigenvalues(laplacian(1, &[]), 5);
        assert_eq!(vals.len(), 1);
        assert!(vals[0].abs() < 1e-9);
    }

    #[test]
    fn path_graph_spectrum_is_reproducible_and_correct() {
        // Path on 2 nodes: L = [[1,-1],[-1,1]], eigenvalues {2, 0}.
        let edges = [(0usize, 1usize)];
        let a = top_eigenvalues(laplacian(2, &edges), 5);
        let b = top_eigenvalues(laplacian(2, &edges), 5);
        assert_eq!(a, b, "seeded iteration must be reproducible");
        assert!((a[0] - 2.0).abs() < 1e-6);
        assert!(a[1].abs() < 1e-6);
    }

    #[test]
    fn star_graph_dominant_eigenvalue() {
        // Star K_{1,3}: Laplacian spectrum {4, 1, 1, 0}.
        let edges = [(0, 1), (0, 2), (0, 3)];
        let vals = top_eigenvalues(laplacian(4, &edges), 4);
        assert!((vals[0] - 4.0).abs() < 1e-5, "got {:?}", vals);
        assert!((vals[1] - 1.0).abs() < 1e-4);
    }

    #[test]
    fn quantization_rounds_onto_the_grid() {
        let q = quantize(&[1.23456, -0.0004, 0.0], 1000);
        assert_eq!(q, vec![1.235, 0.0, 0.0]);
    }

    #[test]
    fn cosine_similarity_pads_with_zeros() {
        assert!((cosine_similarity(&[1.0, 2.0], &[1.0, 2.0]) - 1.0).abs() < 1e-12);
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0]) - 1.0).abs() < 1e-12);
        assert_eq!(cosine_similarity(&[], &[]), 1.0);
        assert_eq!(cosine_similarity(&[1.0], &[]), 0.0);
    }
}
