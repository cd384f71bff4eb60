//! Per-coefficient mean-centering of feature sequences.
//!
//! Template matching expects every column of a `[frame][coeff]` matrix to
//! have zero mean across the sequence; both the sliding window and enrolled
//! templates go through this before comparison.

/// Stateless helper for mean-centering.
pub struct FeatureNormalizer;

impl FeatureNormalizer {
    /// In-place mean-centre of `frames`. All frames must have the same
    /// coefficient count; an empty slice is a no-op.
    pub fn normalize(frames: &mut [Vec<f32>]) {
        if frames.is_empty() {
            return;
        }
        let coeffs = frames[0].len();
        let mut mean = vec![0f32; coeffs];

        for f in frames.iter() {
            debug_assert_eq!(f.len(), coeffs, "uneven coefficient counts");
            for (j, &v) in f.iter().enumerate() {
                mean[j] += v;
            }
        }
        let n_inv = 1.0 / frames.len() as f32;
        for m in &mut mean {
            *m *= n_inv;
        }
        for f in frames.iter_mut() {
            for (j, v) in f.iter_mut().enumerate() {
                *v -= mean[j];
            }
        }
    }

    /// Allocate-new variant: returns normalized frames, input untouched.
    pub fn normalized(frames: &[Vec<f32>]) -> Vec<Vec<f32>> {
        let mut out = frames.to_vec();
        Self::normalize(&mut out);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::FeatureNormalizer;

    #[test]
    fn column_means_become_zero() {
        let mut frames = vec![
            vec![1.0, 2.0, 3.0],
            vec![4.0, 5.0, 6.0],
            vec![7.0, 8.0, 9.0],
        ];
        FeatureNormalizer::normalize(&mut frames);

        let mut col_sum = vec![0f32; 3];
        for f in &frames {
            for (j, v) in f.iter().enumerate() {
                col_sum[j] += v;
            }
        }
        for s in col_sum {
            assert!(s.abs() < 1e-5);
        }
    }

    #[test]
    fn normalized_preserves_input() {
        let orig = vec![vec![1.0, 1.0], vec![3.0, 5.0]];
        let out = FeatureNormalizer::normalized(&orig);
        assert_eq!(orig, vec![vec![1.0, 1.0], vec![3.0, 5.0]]);
        assert!((out[0][0] + out[1][0]).abs() < 1e-5);
        assert!((out[0][1] + out[1][1]).abs() < 1e-5);
    }

    #[test]
    fn empty_input_is_a_no_op() {
        let mut frames: Vec<Vec<f32>> = Vec::new();
        FeatureNormalizer::normalize(&mut frames);
        assert!(frames.is_empty());
    }

    #[test]
    fn normalizing_twice_changes_nothing() {
        let mut frames = vec![vec![0.2, -0.4], vec![1.2, 0.8], vec![-0.6, 0.1]];
        FeatureNormalizer::normalize(&mut frames);
        let once = frames.clone();
        FeatureNormalizer::normalize(&mut frames);
        for (a, b) in once.iter().zip(&frames) {
            for (x, y) in a.iter().zip(b) {
                assert!((x - y).abs() < 1e-6);
            }
        }
    }
}
