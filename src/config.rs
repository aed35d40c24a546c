use serde::{Deserialize, Serialize};

use crate::error::{Result, SegdexError};

/// Tokenizer configuration
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TokenizerConfig {
    pub lowercase: bool,
    pub remove_stopwords: bool,
    pub stem: bool,
    pub min_token_length: usize,
    pub max_token_length: usize,
    pub language: String,
}

impl Default for TokenizerConfig {
    fn default() -> Self {
        Self {
            lowercase: true,
            remove_stopwords: false,
            stem: false,
            min_token_length: 1,
            max_token_length: 255,
            language: "english".to_string(),
        }
    }
}

impl TokenizerConfig {
    /// English analysis: stop words removed and terms stemmed
    pub fn english() -> Self {
        Self {
            remove_stopwords: true,
            stem: true,
            min_token_length: 2,
            ..Self::default()
        }
    }
}

/// How a writer treats an existing index at its location
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum OpenMode {
    /// Start from an empty index, discarding any existing commit
    Create,
    /// Require an existing commit
    Append,
    /// Append if a commit exists, otherwise create
    #[default]
    CreateOrAppend,
}

/// Where merges selected by the merge policy run
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum MergeSchedulerKind {
    /// Merge on the thread that triggered it
    #[default]
    Serial,
    /// Merge on a dedicated worker thread
    Background,
}

/// Configuration for the tiered merge policy
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MergePolicyConfig {
    /// Number of same-tier segments that triggers a merge
    pub segments_per_tier: usize,
    /// Segments smaller than this many docs are treated as this size
    pub floor_segment_docs: u32,
    /// Merges never produce segments above this many docs
    pub max_merged_segment_docs: u32,
    /// Delete ratio above which a lone segment is rewritten
    pub delete_ratio_threshold: f64,
}

impl Default for MergePolicyConfig {
    fn default() -> Self {
        Self {
            segments_per_tier: 10,
            floor_segment_docs: 10,
            max_merged_segment_docs: 1_000_000,
            delete_ratio_threshold: 0.3,
        }
    }
}

/// IndexWriter configuration
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IndexWriterConfig {
    pub open_mode: OpenMode,
    /// Buffered documents that trigger an automatic flush
    pub max_buffered_docs: usize,
    /// Tokens indexed per field; the rest are ignored
    pub max_field_length: usize,
    pub merge_policy: MergePolicyConfig,
    /// Disables automatic merging when false
    pub auto_merge: bool,
    pub merge_scheduler: MergeSchedulerKind,
    /// Upper bound on clauses produced by query rewriting
    pub max_clause_count: usize,
    pub tokenizer: TokenizerConfig,
}

impl Default for IndexWriterConfig {
    fn default() -> Self {
        Self {
            open_mode: OpenMode::default(),
            max_buffered_docs: 1_000,
            max_field_length: 10_000,
            merge_policy: MergePolicyConfig::default(),
            auto_merge: true,
            merge_scheduler: MergeSchedulerKind::default(),
            max_clause_count: 1_024,
            tokenizer: TokenizerConfig::default(),
        }
    }
}

impl IndexWriterConfig {
    pub fn with_open_mode(mut self, mode: OpenMode) -> Self {
        self.open_mode = mode;
        self
    }

    pub fn with_max_buffered_docs(mut self, docs: usize) -> Self {
        self.max_buffered_docs = docs.max(1);
        self
    }

    pub fn with_merge_policy(mut self, policy: MergePolicyConfig) -> Self {
        self.merge_policy = policy;
        self
    }

    pub fn with_auto_merge(mut self, enabled: bool) -> Self {
        self.auto_merge = enabled;
        self
    }

    pub fn with_merge_scheduler(mut self, scheduler: MergeSchedulerKind) -> Self {
        self.merge_scheduler = scheduler;
        self
    }

    pub fn with_tokenizer(mut self, tokenizer: TokenizerConfig) -> Self {
        self.tokenizer = tokenizer;
        self
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| SegdexError::InvalidRequest(format!("writer config: {}", e)))
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| SegdexError::Internal(e.to_string()))
    }
}

/// Configuration profiles for different workloads
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WriterProfile {
    LowLatency,
    Balanced,
    BulkLoad,
}

impl WriterProfile {
    /// Buffered documents before an automatic flush
    pub fn max_buffered_docs(&self) -> usize {
        match self {
            WriterProfile::LowLatency => 100,
            WriterProfile::Balanced => 1_000,
            WriterProfile::BulkLoad => 10_000,
        }
    }

    pub fn segments_per_tier(&self) -> usize {
        match self {
            WriterProfile::LowLatency => 5,
            WriterProfile::Balanced => 10,
            WriterProfile::BulkLoad => 30,
        }
    }

    pub fn merge_scheduler(&self) -> MergeSchedulerKind {
        match self {
            WriterProfile::LowLatency => MergeSchedulerKind::Background,
            WriterProfile::Balanced => MergeSchedulerKind::Serial,
            WriterProfile::BulkLoad => MergeSchedulerKind::Background,
        }
    }

    /// Apply this profile to an IndexWriterConfig
    pub fn apply_to(&self, config: &mut IndexWriterConfig) {
        config.max_buffered_docs = self.max_buffered_docs();
        config.merge_policy.segments_per_tier = self.segments_per_tier();
        config.merge_scheduler = self.merge_scheduler();
    }
}
