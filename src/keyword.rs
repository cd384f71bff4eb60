//! Enrolled keyword templates.
//!
//! A keyword owns every feature sequence enrolled under its name. Unless
//! averaging is disabled, the matchable view is a single DTW-averaged
//! template recomputed synchronously on each enrollment; disabling
//! averaging trades detection-pass work for accuracy by matching every
//! raw template.

use log::debug;
use serde::{Deserialize, Serialize};

use crate::config::KeywordOptions;
use crate::dsp::{AveragerError, TemplateAverager};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Keyword {
    name: String,
    /// Participates in matching while set.
    pub enabled: bool,
    threshold: f32,
    disable_averaging: bool,
    templates: Vec<Vec<Vec<f32>>>,
    averaged: Vec<Vec<Vec<f32>>>,
}

impl Keyword {
    pub fn new(name: impl Into<String>, options: KeywordOptions) -> Self {
        Self {
            name: name.into(),
            enabled: true,
            threshold: options.threshold,
            disable_averaging: options.disable_averaging,
            templates: Vec::new(),
            averaged: Vec::new(),
        }
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Per-keyword threshold override; zero means "none".
    #[inline]
    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// Number of raw enrolled templates.
    #[inline]
    pub fn enrollments(&self) -> usize {
        self.templates.len()
    }

    /// Append an enrolled feature sequence and refresh the averaged
    /// template unless averaging is disabled.
    pub fn add_features(&mut self, features: Vec<Vec<f32>>) -> Result<(), AveragerError> {
        self.templates.push(features);
        if !self.disable_averaging {
            let merged = TemplateAverager::average(&self.templates)?;
            debug!(
                "keyword '{}': averaged {} enrollment(s) into {} frames",
                self.name,
                self.templates.len(),
                merged.len()
            );
            self.averaged = vec![merged];
        }
        Ok(())
    }

    /// The sequences a detection pass scores against: the single averaged
    /// template, or every raw enrollment when averaging is disabled.
    pub fn templates(&self) -> &[Vec<Vec<f32>>] {
        if self.disable_averaging {
            &self.templates
        } else {
            &self.averaged
        }
    }
}
