//! Relevance scoring functions
//!
//! The default is a tf-idf weighting with length normalization. Norms are
//! computed once at index time with [`Similarity::length_norm`]; everything
//! else runs while a query is weighted and scored.

use std::fmt::Debug;

/// Pluggable scoring function over term, document and collection statistics
pub trait Similarity: Send + Sync + Debug {
    /// Normalization factor for a field with `num_terms` tokens
    fn length_norm(&self, field: &str, num_terms: u32) -> f32;

    /// Makes scores from different queries comparable
    fn query_norm(&self, sum_of_squared_weights: f32) -> f32;

    /// Score factor for a term (or phrase) frequency within a document
    fn tf(&self, freq: f32) -> f32;

    /// Frequency contribution of a sloppy phrase match at edit distance `distance`
    fn sloppy_freq(&self, distance: u32) -> f32;

    fn idf(&self, doc_freq: u32, max_doc: u32) -> f32;

    /// Fraction of a boolean query's clauses matched by a document
    fn coord(&self, overlap: usize, max_overlap: usize) -> f32;

    /// Summed idf of the terms of a phrase
    fn idf_terms(&self, doc_freqs: &[u32], max_doc: u32) -> f32 {
        doc_freqs.iter().map(|&df| self.idf(df, max_doc)).sum()
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultSimilarity;

impl Similarity for DefaultSimilarity {
    fn length_norm(&self, _field: &str, num_terms: u32) -> f32 {
        (1.0 / (num_terms.max(1) as f64).sqrt()) as f32
    }

    fn query_norm(&self, sum_of_squared_weights: f32) -> f32 {
        if sum_of_squared_weights <= 0.0 {
            return 1.0;
        }
        (1.0 / (sum_of_squared_weights as f64).sqrt()) as f32
    }

    fn tf(&self, freq: f32) -> f32 {
        freq.sqrt()
    }

    fn sloppy_freq(&self, distance: u32) -> f32 {
        1.0 / (distance as f32 + 1.0)
    }

    fn idf(&self, doc_freq: u32, max_doc: u32) -> f32 {
        ((max_doc as f64 / (doc_freq as f64 + 1.0)).ln() + 1.0) as f32
    }

    fn coord(&self, overlap: usize, max_overlap: usize) -> f32 {
        if max_overlap == 0 {
            return 0.0;
        }
        overlap as f32 / max_overlap as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_similarity() {
        let sim = DefaultSimilarity;
        assert_eq!(sim.tf(4.0), 2.0);
        assert_eq!(sim.tf(0.0), 0.0);
        assert_eq!(sim.length_norm("f", 4), 0.5);
        assert_eq!(sim.length_norm("f", 0), 1.0);
        assert_eq!(sim.query_norm(4.0), 0.5);
        assert_eq!(sim.query_norm(0.0), 1.0);
        assert_eq!(sim.sloppy_freq(0), 1.0);
        assert_eq!(sim.sloppy_freq(3), 0.25);
        assert_eq!(sim.coord(1, 2), 0.5);
        assert_eq!(sim.coord(0, 0), 0.0);
    }

    #[test]
    fn test_idf_decreases_with_doc_freq() {
        let sim = DefaultSimilarity;
        assert!((sim.idf(0, 10) - ((10.0f64).ln() + 1.0) as f32).abs() < 1e-6);
        assert!(sim.idf(1, 100) > sim.idf(10, 100));
        assert_eq!(sim.idf_terms(&[1, 1], 100), 2.0 * sim.idf(1, 100));
    }

    #[test]
    fn test_idf_is_reproducible() {
        let sim = DefaultSimilarity;
        let a = sim.idf(7, 1234);
        let b = sim.idf(7, 1234);
        assert_eq!(a.to_bits(), b.to_bits());
    }
}
