use std::cmp::Ordering;

/// Cosine similarity between two vectors.
/// Uses f64 intermediate precision. Returns 0 if either vector has zero norm.
pub fn cosine_sim(a: &[f32], b: &[f32]) -> f32 {
    let mut dot: f64 = 0.0;
    let mut na: f64 = 0.0;
    let mut nb: f64 = 0.0;
    for (&x, &y) in a.iter().zip(b) {
        let ai = x as f64;
        let bi = y as f64;
        dot += ai * bi;
        na += ai * ai;
        nb += bi * bi;
    }
    let denom = na.sqrt() * nb.sqrt();
    if denom == 0.0 {
        return 0.0;
    }
    (dot / denom) as f32
}

/// Dense, symmetric matrix of pairwise cosine similarities.
///
/// Stored row-major in a single allocation of `n * n` f32 values.
/// The diagonal is exactly 1.0.
pub(crate) struct SimilarityMatrix {
    n: usize,
    data: Vec<f32>,
}

impl SimilarityMatrix {
    /// Builds the matrix for non-zero vectors of equal dimension.
    pub fn build(vectors: &[&[f32]]) -> Self {
        let n = vectors.len();
        let norms: Vec<f64> = vectors
            .iter()
            .map(|v| v.iter().map(|&x| (x as f64) * (x as f64)).sum::<f64>().sqrt())
            .collect();

        let mut data = vec![0.0f32; n * n];
        for i in 0..n {
            data[i * n + i] = 1.0;
            for j in (i + 1)..n {
                let dot: f64 = vectors[i]
                    .iter()
                    .zip(vectors[j])
                    .map(|(&a, &b)| (a as f64) * (b as f64))
                    .sum();
                let denom = norms[i] * norms[j];
                let sim = if denom == 0.0 { 0.0 } else { (dot / denom) as f32 };
                data[i * n + j] = sim;
                data[j * n + i] = sim;
            }
        }

        Self { n, data }
    }

    pub fn len(&self) -> usize {
        self.n
    }

    pub fn row(&self, i: usize) -> &[f32] {
        &self.data[i * self.n..(i + 1) * self.n]
    }
}

/// Descending by value; equal values keep ascending index order.
fn by_value_desc(a: &(usize, f32), b: &(usize, f32)) -> Ordering {
    b.1.total_cmp(&a.1).then(a.0.cmp(&b.0))
}

/// Returns the `k` largest entries of `row` as `(index, value)`, sorted by
/// value descending with ties broken by ascending index. `k` is clamped to
/// the row length.
pub(crate) fn top_k(row: &[f32], k: usize) -> Vec<(usize, f32)> {
    let k = k.min(row.len());
    if k == 0 {
        return Vec::new();
    }

    let mut entries: Vec<(usize, f32)> = row.iter().copied().enumerate().collect();
    if k < entries.len() {
        entries.select_nth_unstable_by(k - 1, by_value_desc);
        entries.truncate(k);
    }
    entries.sort_by(by_value_desc);
    entries
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cosine_sim_identical() {
        let sim = cosine_sim(&[1.0, 0.0, 0.0], &[1.0, 0.0, 0.0]);
        assert!((sim - 1.0).abs() < 1e-6, "identical vectors should have sim=1, got {sim}");
    }

    #[test]
    fn cosine_sim_orthogonal() {
        let sim = cosine_sim(&[1.0, 0.0, 0.0], &[0.0, 1.0, 0.0]);
        assert!(sim.abs() < 1e-6, "orthogonal vectors should have sim=0, got {sim}");
    }

    #[test]
    fn cosine_sim_opposite() {
        let sim = cosine_sim(&[1.0, 0.0, 0.0], &[-1.0, 0.0, 0.0]);
        assert!((sim + 1.0).abs() < 1e-6, "opposite vectors should have sim=-1, got {sim}");
    }

    #[test]
    fn cosine_sim_zero_vector() {
        assert_eq!(cosine_sim(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }

    #[test]
    fn matrix_is_symmetric_with_unit_diagonal() {
        let a = [1.0, 0.0, 0.0];
        let b = [0.6, 0.8, 0.0];
        let c = [3.0, 0.0, 4.0];
        let m = SimilarityMatrix::build(&[&a, &b, &c]);

        assert_eq!(m.len(), 3);
        for i in 0..3 {
            assert_eq!(m.row(i)[i], 1.0);
            for j in 0..3 {
                assert_eq!(m.row(i)[j], m.row(j)[i]);
            }
        }
        assert!((m.row(0)[1] - 0.6).abs() < 1e-6);
        assert!((m.row(0)[2] - 0.6).abs() < 1e-6);
    }

    #[test]
    fn matrix_matches_cosine_sim_exactly() {
        let a = [0.3, -1.2, 2.5, 0.01];
        let b = [1.7, 0.4, -0.9, 2.2];
        let m = SimilarityMatrix::build(&[&a, &b]);
        assert_eq!(m.row(0)[1], cosine_sim(&a, &b));
    }

    #[test]
    fn top_k_orders_by_value_then_index() {
        let row = [0.5, 0.9, 0.5, 1.0, 0.2];
        assert_eq!(top_k(&row, 3), vec![(3, 1.0), (1, 0.9), (0, 0.5)]);
        assert_eq!(top_k(&row, 4), vec![(3, 1.0), (1, 0.9), (0, 0.5), (2, 0.5)]);
    }

    #[test]
    fn top_k_clamps_to_row_length() {
        let row = [0.1, 0.3];
        assert_eq!(top_k(&row, 10), vec![(1, 0.3), (0, 0.1)]);
        assert!(top_k(&row, 0).is_empty());
        assert!(top_k(&[], 3).is_empty());
    }
}
