//! Merge policies and merge bookkeeping
//!
//! A policy only chooses which segments to merge; it never affects what a
//! merge produces. Candidates are always contiguous runs of the segment
//! list so merged documents keep their relative order.

use std::fmt::Debug;

use super::manifest::SegmentInfo;
use crate::config::MergePolicyConfig;

/// Reason why segments should be merged
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MergeReason {
    /// Too many segments in a tier
    TierOverflow,
    /// A segment carries too many deleted documents
    HighDeleteRatio,
    /// Requested through `force_merge`/`optimize`
    Forced,
    /// Requested through `expunge_deletes`
    ExpungeDeletes,
}

/// A set of contiguous segments to merge into one
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MergeCandidate {
    pub segments: Vec<String>,
    /// Live documents the merged segment will hold
    pub doc_count: u64,
    pub reason: MergeReason,
}

impl MergeCandidate {
    fn from_run(run: &[SegmentInfo], reason: MergeReason) -> Self {
        Self {
            segments: run.iter().map(|s| s.name.clone()).collect(),
            doc_count: run.iter().map(|s| s.live_docs() as u64).sum(),
            reason,
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.segments.iter().any(|s| s == name)
    }
}

/// Chooses merges after a flush. Forced and expunge merges are explicit
/// requests and do not go through the policy.
pub trait MergePolicy: Send + Sync + Debug {
    /// Merges worth doing after a flush
    fn find_merges(&self, segments: &[SegmentInfo]) -> Vec<MergeCandidate>;
}

/// Merges that bring the index down to at most `max_segments` segments
pub fn forced_merges(segments: &[SegmentInfo], max_segments: usize) -> Vec<MergeCandidate> {
    let max_segments = max_segments.max(1);
    if segments.len() > max_segments {
        let tail = &segments[max_segments - 1..];
        return vec![MergeCandidate::from_run(tail, MergeReason::Forced)];
    }
    // A lone segment is rewritten only to drop its deletions
    match segments {
        [only] if max_segments == 1 && only.has_deletions() => {
            vec![MergeCandidate::from_run(segments, MergeReason::Forced)]
        }
        _ => Vec::new(),
    }
}

/// Merges that rewrite every segment carrying deletions
pub fn expunge_merges(segments: &[SegmentInfo]) -> Vec<MergeCandidate> {
    segments
        .iter()
        .filter(|s| s.has_deletions())
        .map(|s| MergeCandidate::from_run(std::slice::from_ref(s), MergeReason::ExpungeDeletes))
        .collect()
}

/// Size-tiered policy over live document counts
#[derive(Clone, Debug, Default)]
pub struct TieredMergePolicy {
    config: MergePolicyConfig,
}

impl TieredMergePolicy {
    pub fn new(config: MergePolicyConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &MergePolicyConfig {
        &self.config
    }

    /// Tier of a segment: 0 up to `floor * ratio` docs, 1 up to
    /// `floor * ratio^2`, and so on
    pub fn tier_of(&self, live_docs: u32) -> usize {
        let floor = self.config.floor_segment_docs.max(1) as u64;
        let ratio = self.config.segments_per_tier.max(2) as u64;
        let size = (live_docs as u64).max(floor);

        let mut tier_max = floor * ratio;
        let mut tier = 0;
        while size > tier_max && tier < 16 {
            tier += 1;
            tier_max = tier_max.saturating_mul(ratio);
        }
        tier
    }

    fn find_tiered_merges(&self, segments: &[SegmentInfo]) -> Vec<MergeCandidate> {
        let per_tier = self.config.segments_per_tier.max(2);
        let mut candidates = Vec::new();
        let mut start = 0;
        while start < segments.len() {
            let tier = self.tier_of(segments[start].live_docs());
            let mut end = start + 1;
            while end < segments.len() && self.tier_of(segments[end].live_docs()) == tier {
                end += 1;
            }

            let mut run_start = start;
            while end - run_start >= per_tier {
                let run = &segments[run_start..run_start + per_tier];
                let candidate = MergeCandidate::from_run(run, MergeReason::TierOverflow);
                if candidate.doc_count <= self.config.max_merged_segment_docs as u64 {
                    candidates.push(candidate);
                }
                run_start += per_tier;
            }
            start = end;
        }
        candidates
    }
}

impl MergePolicy for TieredMergePolicy {
    fn find_merges(&self, segments: &[SegmentInfo]) -> Vec<MergeCandidate> {
        let mut candidates = self.find_tiered_merges(segments);
        for segment in segments {
            let taken = candidates.iter().any(|c| c.contains(&segment.name));
            if !taken && segment.delete_ratio() > self.config.delete_ratio_threshold {
                candidates.push(MergeCandidate::from_run(
                    std::slice::from_ref(segment),
                    MergeReason::HighDeleteRatio,
                ));
            }
        }
        candidates
    }
}

/// Never merges on its own; `force_merge` and `expunge_deletes` still run
#[derive(Clone, Copy, Debug, Default)]
pub struct NoMergePolicy;

impl MergePolicy for NoMergePolicy {
    fn find_merges(&self, _segments: &[SegmentInfo]) -> Vec<MergeCandidate> {
        Vec::new()
    }
}

/// Tracks pending and running merges so no segment is merged twice
#[derive(Debug, Default)]
pub struct MergeQueue {
    pending: Vec<MergeCandidate>,
    running: Vec<Vec<String>>,
}

impl MergeQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue candidates, dropping any that overlap a queued or running merge
    pub fn add_candidates(&mut self, candidates: Vec<MergeCandidate>) {
        for candidate in candidates {
            let overlaps = self.is_merging_any(&candidate.segments)
                || self
                    .pending
                    .iter()
                    .any(|p| candidate.segments.iter().any(|s| p.contains(s)));
            if !overlaps {
                self.pending.push(candidate);
            }
        }
    }

    /// Next merge to execute, marked as running
    pub fn next_merge(&mut self) -> Option<MergeCandidate> {
        if self.pending.is_empty() {
            return None;
        }
        let candidate = self.pending.remove(0);
        self.running.push(candidate.segments.clone());
        Some(candidate)
    }

    pub fn complete_merge(&mut self, segments: &[String]) {
        self.running.retain(|running| running.as_slice() != segments);
    }

    pub fn is_merging(&self, segment: &str) -> bool {
        self.running.iter().any(|r| r.iter().any(|s| s == segment))
    }

    fn is_merging_any(&self, segments: &[String]) -> bool {
        segments.iter().any(|s| self.is_merging(s))
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    pub fn has_running(&self) -> bool {
        !self.running.is_empty()
    }

    pub fn running_count(&self) -> usize {
        self.running.len()
    }

    pub fn clear_pending(&mut self) {
        self.pending.clear();
    }
}
