//! Levenshtein distance and the all-pairs handle distance matrix.
//!
//! The matrix is O(n² · L) in time and O(n²) in memory. That is fine for
//! the few hundred handles that survive date filtering and is the scaling
//! limit of the whole analysis.

use rayon::prelude::*;

/// Unit-cost edit distance over Unicode scalar values.
pub fn levenshtein(a: &str, b: &str) -> u32 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    levenshtein_chars(&a, &b)
}

fn levenshtein_chars(a: &[char], b: &[char]) -> u32 {
    if a.is_empty() {
        return b.len() as u32;
    }
    if b.is_empty() {
        return a.len() as u32;
    }

    // Two rolling rows of the DP table.
    let mut prev: Vec<u32> = (0..=b.len() as u32).collect();
    let mut curr = vec![0u32; b.len() + 1];
    for (i, &ca) in a.iter().enumerate() {
        curr[0] = i as u32 + 1;
        for (j, &cb) in b.iter().enumerate() {
            let substitution = prev[j] + u32::from(ca != cb);
            let deletion = prev[j + 1] + 1;
            let insertion = curr[j] + 1;
            curr[j + 1] = substitution.min(deletion).min(insertion);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

/// Symmetric n×n matrix of edit distances with a zero diagonal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DistanceMatrix {
    labels: Vec<String>,
    cells: Vec<u32>,
}

impl DistanceMatrix {
    /// Computes the upper triangle in parallel and mirrors it.
    pub fn compute(labels: &[String]) -> Self {
        let n = labels.len();
        let chars: Vec<Vec<char>> = labels.iter().map(|s| s.chars().collect()).collect();

        let upper: Vec<Vec<u32>> = (0..n)
            .into_par_iter()
            .map(|i| {
                ((i + 1)..n)
                    .map(|j| levenshtein_chars(&chars[i], &chars[j]))
                    .collect()
            })
            .collect();

        let mut cells = vec![0u32; n * n];
        for (i, row) in upper.iter().enumerate() {
            for (offset, &d) in row.iter().enumerate() {
                let j = i + 1 + offset;
                cells[i * n + j] = d;
                cells[j * n + i] = d;
            }
        }
        DistanceMatrix {
            labels: labels.to_vec(),
            cells,
        }
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn get(&self, i: usize, j: usize) -> u32 {
        self.cells[i * self.len() + j]
    }

    pub fn row(&self, i: usize) -> &[u32] {
        let n = self.len();
        &self.cells[i * n..(i + 1) * n]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn known_distances() {
        assert_eq!(levenshtein("kitten", "sitting"), 3);
        assert_eq!(levenshtein("abc123", "abd123"), 1);
        assert_eq!(levenshtein("abc123", "xyz999"), 6);
        assert_eq!(levenshtein("", "abc"), 3);
        assert_eq!(levenshtein("abc", ""), 3);
        assert_eq!(levenshtein("", ""), 0);
        assert_eq!(levenshtein("flaw", "lawn"), 2);
    }

    #[test]
    fn counts_characters_not_bytes() {
        assert_eq!(levenshtein("café", "cafe"), 1);
        assert_eq!(levenshtein("日本", "日本語"), 1);
    }

    #[test]
    fn matrix_layout() {
        let labels: Vec<String> = ["abc123", "abd123", "xyz999"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let m = DistanceMatrix::compute(&labels);
        assert_eq!(m.len(), 3);
        assert_eq!(m.row(0), &[0, 1, 6]);
        assert_eq!(m.row(1), &[1, 0, 6]);
        assert_eq!(m.row(2), &[6, 6, 0]);
    }

    #[test]
    fn empty_matrix() {
        let m = DistanceMatrix::compute(&[]);
        assert!(m.is_empty());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn matrix_is_symmetric_with_zero_diagonal(
            labels in proptest::collection::vec("[a-c0-2]{0,6}", 0..10),
        ) {
            let m = DistanceMatrix::compute(&labels);
            for i in 0..m.len() {
                prop_assert_eq!(m.get(i, i), 0);
                for j in 0..m.len() {
                    prop_assert_eq!(m.get(i, j), m.get(j, i));
                    prop_assert_eq!(m.get(i, j), levenshtein(&labels[i], &labels[j]));
                }
            }
        }
    }
}
