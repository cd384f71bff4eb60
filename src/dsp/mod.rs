//! Signal-processing core: DTW alignment, similarity scoring, feature
//! normalization, template averaging and the mel-cepstral front-end.

mod averager;
mod comparator;
mod dtw;
mod mfcc;
mod normalizer;

pub(crate) use averager::TemplateAverager;
pub(crate) use comparator::FeatureComparator;
pub(crate) use normalizer::FeatureNormalizer;

pub use averager::AveragerError;
pub use comparator::cosine_similarity;
pub use mfcc::{FeatureComputer, Mfcc, MfccError};
