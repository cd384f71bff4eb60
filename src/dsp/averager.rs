//! DTW-aligned template averaging.
//!
//! Folding all enrolled templates of a keyword into one representative
//! template makes each detection pass O(1) in the number of enrollments,
//! at a small documented accuracy cost. The shortest template is the
//! alignment origin, so the result always has the length of the shortest
//! enrollment.

use thiserror::Error;

use super::comparator::FeatureComparator;
use super::dtw::Dtw;

/// Errors that can arise while averaging templates.
#[derive(Debug, Error)]
pub enum AveragerError {
    #[error("no templates to average")]
    Empty,
    #[error("DTW produced no alignment path")]
    MissingPath,
}

pub struct TemplateAverager;

impl TemplateAverager {
    /// Fold `templates` (`[template][frame][coeff]`, all non-empty) into a
    /// single DTW-aligned average.
    ///
    /// Templates are sorted by length ascending and the shortest becomes
    /// the running origin. Each subsequent template is aligned to the
    /// current origin; every origin frame accumulates its own value plus
    /// the values of all frames the path maps to it, then takes the mean.
    /// A single template is returned unchanged.
    pub fn average(templates: &[Vec<Vec<f32>>]) -> Result<Vec<Vec<f32>>, AveragerError> {
        if templates.is_empty() {
            return Err(AveragerError::Empty);
        }

        let mut sorted: Vec<&Vec<Vec<f32>>> = templates.iter().collect();
        sorted.sort_by_key(|t| t.len());

        let mut origin: Vec<Vec<f32>> = sorted[0].clone();

        for tpl in &sorted[1..] {
            let refs_a: Vec<&[f32]> = origin.iter().map(Vec::as_slice).collect();
            let refs_b: Vec<&[f32]> = tpl.iter().map(Vec::as_slice).collect();

            let mut dtw = Dtw::new(FeatureComparator::distance);
            dtw.compute(&refs_a, &refs_b);
            let path = dtw.path().ok_or(AveragerError::MissingPath)?;

            // Seed each accumulator with the origin frame's own value, then
            // add every template frame the alignment maps onto it.
            let coeffs = origin[0].len();
            let mut sums: Vec<Vec<f32>> = origin.clone();
            let mut hits = vec![1usize; origin.len()];

            for [x, y] in path {
                for (c, v) in tpl[y].iter().enumerate().take(coeffs) {
                    sums[x][c] += *v;
                }
                hits[x] += 1;
            }

            for (frame, (sum, n)) in origin.iter_mut().zip(sums.iter().zip(&hits)) {
                for (c, v) in frame.iter_mut().enumerate() {
                    *v = sum[c] / *n as f32;
                }
            }
        }

        Ok(origin)
    }
}
