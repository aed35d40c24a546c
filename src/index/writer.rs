//! Adding, deleting and merging documents
//!
//! The writer owns the directory's write lock. Added documents collect in an
//! in-memory [`SegmentBuffer`] and become a segment on flush. Term and query
//! deletes are buffered and resolved at flush time; a delete only removes
//! buffered documents added before it. Nothing becomes visible to readers
//! until [`IndexWriter::commit`] writes the next `segments_<gen>` file.
//!
//! Merges run either on the calling thread or on a background worker that
//! receives candidates over a channel. Applying deletes waits for running
//! merges so a merge never drops a delete made while it ran.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;
use std::thread;

use crossbeam::channel::{self, Receiver, Sender};
use parking_lot::{Condvar, Mutex, MutexGuard};
use tracing::{debug, info, warn};

use super::file_deleter::FileDeleter;
use super::reader::IndexReader;
use crate::config::{IndexWriterConfig, MergeSchedulerKind, OpenMode};
use crate::document::{Document, Term};
use crate::error::{Result, SegdexError};
use crate::search::{DefaultSimilarity, IndexSearcher, Query, Similarity};
use crate::segment::{
    compound_file_name, expunge_merges, forced_merges, write_deletions, DocId, MergeCandidate,
    MergePolicy, MergeQueue, SegmentBuffer, SegmentInfo, SegmentInfos, SegmentInfosHolder,
    SegmentMerger, SegmentReader, SegmentWriter, TERMINATED,
};
use crate::store::{Directory, DirectoryLock, WRITE_LOCK_NAME};
use crate::tokenizer::Analyzer;
use crate::util::BitVector;

/// Which documents a delete removes
#[derive(Clone, Debug)]
pub enum DeleteSelector {
    /// Every document containing the term
    Term(Term),
    /// Every document the query matches
    Query(Query),
    /// One document, by its id in the writer's current view
    DocId(u32),
}

impl From<Term> for DeleteSelector {
    fn from(term: Term) -> Self {
        DeleteSelector::Term(term)
    }
}

impl From<Query> for DeleteSelector {
    fn from(query: Query) -> Self {
        DeleteSelector::Query(query)
    }
}

#[derive(Debug)]
struct BufferedDelete {
    selector: DeleteSelector,
    /// Buffered docs with a lower id were added before the delete
    buffer_limit: DocId,
}

struct WriterState {
    /// Working segment list, ahead of `committed`
    infos: SegmentInfos,
    committed: SegmentInfos,
    buffer: SegmentBuffer,
    deletes: Vec<BufferedDelete>,
    /// Buffered documents deleted by id
    buffer_doc_deletes: Vec<DocId>,
    /// Open segments carrying their latest deletions
    readers: HashMap<String, SegmentReader>,
    /// Segments whose deletions are not yet written
    dirty: BTreeSet<String>,
    merges: MergeQueue,
}

impl WriterState {
    fn has_pending_changes(&self) -> bool {
        !self.buffer.is_empty()
            || !self.deletes.is_empty()
            || !self.buffer_doc_deletes.is_empty()
            || !self.dirty.is_empty()
    }

    fn segment_reader(&mut self, directory: &dyn Directory, name: &str) -> Result<SegmentReader> {
        if let Some(reader) = self.readers.get(name) {
            return Ok(reader.clone());
        }
        let info = self
            .infos
            .get(name)
            .ok_or_else(|| SegdexError::Internal(format!("unknown segment {}", name)))?;
        let reader = SegmentReader::open(directory, info)?;
        self.readers.insert(name.to_string(), reader.clone());
        Ok(reader)
    }

    /// Mark docs deleted in the pooled reader of `segment`.
    /// Returns how many were newly deleted.
    fn mark_deleted(&mut self, segment: &str, docs: &[DocId]) -> u32 {
        let Some(reader) = self.readers.get(segment) else {
            return 0;
        };
        let mut bits = match reader.deletions() {
            Some(bits) => (**bits).clone(),
            None => BitVector::new(reader.max_doc()),
        };
        let before = bits.count();
        for &doc in docs {
            if doc < reader.max_doc() {
                bits.set(doc);
            }
        }
        let added = bits.count() - before;
        if added > 0 {
            let updated = reader.with_deletions(bits, reader.del_gen());
            self.readers.insert(segment.to_string(), updated);
            self.dirty.insert(segment.to_string());
        }
        added
    }
}

struct WriterShared {
    directory: Arc<dyn Directory>,
    deleter: Arc<FileDeleter>,
    analyzer: Arc<dyn Analyzer>,
    similarity: Arc<dyn Similarity>,
    policy: Arc<dyn MergePolicy>,
    config: IndexWriterConfig,
    state: Mutex<WriterState>,
    merges_done: Condvar,
    /// Working segment list as of the last checkpoint
    published: SegmentInfosHolder,
}

impl WriterShared {
    fn wait_for_merges(&self, state: &mut MutexGuard<'_, WriterState>) {
        while state.merges.has_running() {
            self.merges_done.wait(state);
        }
    }

    /// Move the working references to the current segment list
    fn checkpoint(&self, state: &WriterState, old_files: &[String]) {
        self.deleter.swap_refs(old_files, &state.infos.files());
        self.published.store(state.infos.clone());
    }

    fn discard_file(&self, name: &str) {
        if !self.directory.exists(name) {
            return;
        }
        if let Err(e) = self.directory.delete_file(name) {
            warn!(file = %name, error = %e, "could not remove partial file");
        }
    }

    /// Write buffered docs as a new segment, then apply and write deletes.
    /// Returns false when there was nothing to flush.
    fn flush_locked(&self, guard: &mut MutexGuard<'_, WriterState>) -> Result<bool> {
        if !guard.has_pending_changes() {
            return Ok(false);
        }
        if !guard.deletes.is_empty() {
            self.wait_for_merges(guard);
        }
        let state: &mut WriterState = guard;
        let old_files = state.infos.files();

        let mut new_segment = None;
        if !state.buffer.is_empty() {
            let name = state.infos.next_segment_name();
            let buffered = state.buffer.take();
            let written = SegmentWriter::new(self.directory.as_ref(), name.clone())
                .write_buffered(buffered)
                .and_then(|info| {
                    SegmentReader::open(self.directory.as_ref(), &info).map(|r| (info, r))
                });
            match written {
                Ok((info, reader)) => {
                    debug!(segment = %name, docs = info.doc_count, "flushed segment");
                    state.readers.insert(name.clone(), reader);
                    state.infos.push(info);
                    new_segment = Some(name);
                }
                Err(e) => {
                    self.discard_file(&compound_file_name(&name));
                    state.buffer_doc_deletes.clear();
                    for delete in &mut state.deletes {
                        delete.buffer_limit = 0;
                    }
                    warn!(segment = %name, error = %e, "flush failed, buffered documents dropped");
                    return Err(e);
                }
            }
        }

        self.apply_deletes(state, new_segment.as_deref())?;
        self.write_dirty_deletions(state)?;
        self.checkpoint(state, &old_files);
        Ok(true)
    }

    fn apply_deletes(&self, state: &mut WriterState, new_segment: Option<&str>) -> Result<()> {
        let deletes = std::mem::take(&mut state.deletes);
        let doc_deletes = std::mem::take(&mut state.buffer_doc_deletes);
        if deletes.is_empty() && doc_deletes.is_empty() {
            return Ok(());
        }

        let names: Vec<String> = state.infos.iter().map(|info| info.name.clone()).collect();
        let mut readers = Vec::with_capacity(names.len());
        for name in &names {
            readers.push(state.segment_reader(self.directory.as_ref(), name)?);
        }

        let mut doomed: BTreeMap<&str, Vec<DocId>> = BTreeMap::new();
        if let Some(segment) = new_segment {
            doomed.entry(segment).or_default().extend(doc_deletes);
        }

        let searcher = if deletes.iter().any(|d| matches!(d.selector, DeleteSelector::Query(_))) {
            let reader = IndexReader::from_segments(readers.clone());
            Some(
                IndexSearcher::new(Arc::new(reader))
                    .with_similarity(Arc::clone(&self.similarity))
                    .with_max_clause_count(self.config.max_clause_count),
            )
        } else {
            None
        };

        for delete in &deletes {
            let limit_for = |name: &str| {
                if Some(name) == new_segment {
                    delete.buffer_limit
                } else {
                    TERMINATED
                }
            };
            match &delete.selector {
                DeleteSelector::Term(term) => {
                    for (name, reader) in names.iter().zip(&readers) {
                        let Some(mut postings) = reader.postings(term)? else {
                            continue;
                        };
                        let limit = limit_for(name);
                        let docs = doomed.entry(name.as_str()).or_default();
                        let mut doc = postings.doc();
                        while doc != TERMINATED && doc < limit {
                            docs.push(doc);
                            doc = postings.advance()?;
                        }
                    }
                }
                DeleteSelector::Query(query) => {
                    let Some(searcher) = &searcher else {
                        continue;
                    };
                    let weight = query.weight(searcher)?;
                    for (name, reader) in names.iter().zip(&readers) {
                        let Some(mut scorer) = weight.scorer(reader)? else {
                            continue;
                        };
                        let limit = limit_for(name);
                        let docs = doomed.entry(name.as_str()).or_default();
                        let mut doc = scorer.doc();
                        while doc != TERMINATED && doc < limit {
                            docs.push(doc);
                            doc = scorer.advance()?;
                        }
                    }
                }
                // resolved when the delete was made
                DeleteSelector::DocId(_) => {}
            }
        }

        let mut deleted = 0;
        for (segment, docs) in &doomed {
            deleted += state.mark_deleted(segment, docs);
        }
        debug!(deletes = deletes.len(), deleted, "applied buffered deletes");
        Ok(())
    }

    fn write_dirty_deletions(&self, state: &mut WriterState) -> Result<()> {
        let dirty: Vec<String> = state.dirty.iter().cloned().collect();
        for name in dirty {
            let reader = state.readers.get(&name).cloned();
            let (Some(reader), Some(info)) = (reader, state.infos.get_mut(&name)) else {
                state.dirty.remove(&name);
                continue;
            };
            let bits = match reader.deletions() {
                Some(bits) => (**bits).clone(),
                None => BitVector::new(info.doc_count),
            };
            let del_gen = info.del_gen + 1;
            write_deletions(self.directory.as_ref(), &name, del_gen, &bits)?;
            info.del_gen = del_gen;
            info.del_count = bits.count();
            state.readers.insert(name.clone(), reader.with_deletions(bits, del_gen));
            state.dirty.remove(&name);
        }
        Ok(())
    }

    /// Queue candidates the policy finds in the working segment list
    fn queue_merges<F>(&self, state: &mut WriterState, find: F)
    where
        F: FnOnce(&dyn MergePolicy, &[SegmentInfo]) -> Vec<MergeCandidate>,
    {
        let candidates = find(self.policy.as_ref(), &state.infos.segments);
        if !candidates.is_empty() {
            debug!(candidates = candidates.len(), "queued merges");
        }
        state.merges.add_candidates(candidates);
    }

    /// Next queued merge, first asking the policy for more when automatic
    /// merging is on
    fn next_cascading_merge(&self) -> Option<MergeCandidate> {
        let mut state = self.state.lock();
        if self.config.auto_merge && !state.merges.has_pending() {
            self.queue_merges(&mut state, |policy, segments| policy.find_merges(segments));
        }
        state.merges.next_merge()
    }

    /// Execute one merge that `next_merge` marked as running
    fn run_merge(&self, candidate: MergeCandidate) -> Result<()> {
        let merged = self.merge_segments(&candidate);
        let mut state = self.state.lock();
        state.merges.complete_merge(&candidate.segments);
        let outcome = match merged {
            Ok((name, info)) => self.install_merge(&mut state, &candidate, &name, info),
            Err(e) => Err(e),
        };
        self.merges_done.notify_all();
        if let Err(e) = &outcome {
            warn!(segments = ?candidate.segments, error = %e, "merge failed");
        }
        outcome
    }

    fn merge_segments(&self, candidate: &MergeCandidate) -> Result<(String, Option<SegmentInfo>)> {
        let (name, readers) = {
            let mut state = self.state.lock();
            let mut readers = Vec::with_capacity(candidate.segments.len());
            for segment in &candidate.segments {
                readers.push(state.segment_reader(self.directory.as_ref(), segment)?);
            }
            (state.infos.next_segment_name(), readers)
        };

        let mut merger = SegmentMerger::new(self.directory.as_ref(), name.clone());
        for reader in readers {
            merger.add(reader);
        }
        match merger.merge() {
            Ok(info) => Ok((name, info)),
            Err(e) => {
                self.discard_file(&compound_file_name(&name));
                Err(e)
            }
        }
    }

    fn install_merge(
        &self,
        state: &mut WriterState,
        candidate: &MergeCandidate,
        name: &str,
        merged: Option<SegmentInfo>,
    ) -> Result<()> {
        let old_files = state.infos.files();
        let docs = merged.as_ref().map_or(0, |info| info.doc_count);
        if let Err(e) = state.infos.replace(&candidate.segments, merged.clone()) {
            self.discard_file(&compound_file_name(name));
            return Err(e);
        }
        for segment in &candidate.segments {
            state.readers.remove(segment);
            state.dirty.remove(segment);
        }
        if let Some(info) = &merged {
            let reader = SegmentReader::open(self.directory.as_ref(), info)?;
            state.readers.insert(info.name.clone(), reader);
        }
        self.checkpoint(state, &old_files);
        info!(
            segments = ?candidate.segments,
            into = %name,
            docs,
            reason = ?candidate.reason,
            "merged segments"
        );
        Ok(())
    }
}

struct MergeWorker {
    tx: Sender<MergeCandidate>,
    join: thread::JoinHandle<()>,
}

fn spawn_merge_worker(shared: Arc<WriterShared>) -> Result<MergeWorker> {
    let (tx, rx): (Sender<MergeCandidate>, Receiver<MergeCandidate>) = channel::unbounded();
    let join = thread::Builder::new()
        .name("segdex-merge".to_string())
        .spawn(move || {
            while let Ok(candidate) = rx.recv() {
                let mut next = Some(candidate);
                while let Some(candidate) = next.take() {
                    // failures are logged by run_merge; the last commit stays intact
                    let _ = shared.run_merge(candidate);
                    next = shared.next_cascading_merge();
                }
            }
            debug!("merge worker stopped");
        })?;
    Ok(MergeWorker { tx, join })
}

/// Adds, updates and deletes documents of one index
///
/// Holds the directory's write lock until dropped. All methods take `&self`
/// and may be called from several threads.
pub struct IndexWriter {
    shared: Arc<WriterShared>,
    merge_worker: Option<MergeWorker>,
    closed: bool,
    _lock: DirectoryLock,
}

impl fmt::Debug for IndexWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IndexWriter")
            .field("directory", &self.shared.directory)
            .field("segments", &self.segment_count())
            .field("background_merges", &self.merge_worker.is_some())
            .finish()
    }
}

impl IndexWriter {
    /// Open a writer on `directory`, taking its write lock
    ///
    /// A directory without any commit receives an empty first commit so
    /// readers can open it right away.
    pub fn open(
        directory: Arc<dyn Directory>,
        deleter: Arc<FileDeleter>,
        config: IndexWriterConfig,
        analyzer: Arc<dyn Analyzer>,
        policy: Arc<dyn MergePolicy>,
    ) -> Result<Self> {
        let lock = directory.obtain_lock(WRITE_LOCK_NAME)?;
        let latest = SegmentInfos::read_latest(directory.as_ref())?;
        let (mut infos, mut committed) = match (config.open_mode, latest) {
            (OpenMode::Append, None) => {
                return Err(SegdexError::IndexNotFound(format!(
                    "no commit to append to in {:?}",
                    directory
                )))
            }
            (OpenMode::Create, Some(previous)) => {
                let mut fresh = SegmentInfos::new();
                fresh.generation = previous.generation;
                fresh.counter = previous.counter;
                (fresh, previous)
            }
            (_, Some(previous)) => (previous.clone(), previous),
            (_, None) => (SegmentInfos::new(), SegmentInfos::new()),
        };

        if committed.generation == 0 {
            let segments_file = infos.commit(directory.as_ref())?;
            committed = infos.clone();
            deleter.checkpoint_commit(vec![segments_file]);
        } else {
            let mut files = committed.files();
            files.push(committed.segments_file());
            deleter.checkpoint_commit(files);
        }
        deleter.inc_ref(&infos.files());
        deleter.delete_unreferenced()?;

        info!(
            mode = ?config.open_mode,
            generation = committed.generation,
            segments = infos.len(),
            scheduler = ?config.merge_scheduler,
            "opened index writer"
        );

        let scheduler = config.merge_scheduler;
        let shared = Arc::new(WriterShared {
            published: SegmentInfosHolder::new(infos.clone()),
            state: Mutex::new(WriterState {
                infos,
                committed,
                buffer: SegmentBuffer::new(),
                deletes: Vec::new(),
                buffer_doc_deletes: Vec::new(),
                readers: HashMap::new(),
                dirty: BTreeSet::new(),
                merges: MergeQueue::new(),
            }),
            merges_done: Condvar::new(),
            directory,
            deleter,
            analyzer,
            similarity: Arc::new(DefaultSimilarity),
            policy,
            config,
        });
        let merge_worker = match scheduler {
            MergeSchedulerKind::Background => Some(spawn_merge_worker(Arc::clone(&shared))?),
            MergeSchedulerKind::Serial => None,
        };

        Ok(Self {
            shared,
            merge_worker,
            closed: false,
            _lock: lock,
        })
    }

    pub fn config(&self) -> &IndexWriterConfig {
        &self.shared.config
    }

    pub fn analyzer(&self) -> &Arc<dyn Analyzer> {
        &self.shared.analyzer
    }

    /// Buffer a document, flushing once `max_buffered_docs` are buffered
    pub fn add_document(&self, doc: Document) -> Result<()> {
        let flushed = {
            let mut state = self.shared.state.lock();
            self.buffer_document(&mut state, &doc)?
        };
        if flushed && self.shared.config.auto_merge {
            self.maybe_merge()?;
        }
        Ok(())
    }

    /// Delete every document containing `term`, then add `doc`, atomically
    /// with respect to flushes and commits
    pub fn update_document(&self, term: Term, doc: Document) -> Result<()> {
        let flushed = {
            let mut state = self.shared.state.lock();
            let buffer_limit = state.buffer.doc_count();
            state.deletes.push(BufferedDelete {
                selector: DeleteSelector::Term(term),
                buffer_limit,
            });
            self.buffer_document(&mut state, &doc)?
        };
        if flushed && self.shared.config.auto_merge {
            self.maybe_merge()?;
        }
        Ok(())
    }

    fn buffer_document(&self, state: &mut MutexGuard<'_, WriterState>, doc: &Document) -> Result<bool> {
        let shared = &self.shared;
        state.buffer.add_document(
            doc,
            shared.analyzer.as_ref(),
            shared.similarity.as_ref(),
            shared.config.max_field_length,
        )?;
        if state.buffer.doc_count() as usize >= shared.config.max_buffered_docs {
            return shared.flush_locked(state);
        }
        Ok(false)
    }

    /// Delete matching documents. Deleting something that does not exist is
    /// not an error.
    pub fn delete_documents(&self, selector: impl Into<DeleteSelector>) -> Result<()> {
        let mut state = self.shared.state.lock();
        match selector.into() {
            DeleteSelector::DocId(doc) => {
                self.shared.wait_for_merges(&mut state);
                self.delete_by_id(&mut state, doc)
            }
            selector => {
                let buffer_limit = state.buffer.doc_count();
                state.deletes.push(BufferedDelete {
                    selector,
                    buffer_limit,
                });
                Ok(())
            }
        }
    }

    fn delete_by_id(&self, state: &mut WriterState, doc: u32) -> Result<()> {
        let mut base = 0u32;
        let mut target = None;
        for info in state.infos.iter() {
            if doc < base + info.doc_count {
                target = Some((info.name.clone(), doc - base));
                break;
            }
            base += info.doc_count;
        }
        match target {
            Some((segment, local)) => {
                state.segment_reader(self.shared.directory.as_ref(), &segment)?;
                state.mark_deleted(&segment, &[local]);
            }
            None => {
                let local = doc - base;
                if local < state.buffer.doc_count() && !state.buffer_doc_deletes.contains(&local) {
                    state.buffer_doc_deletes.push(local);
                }
            }
        }
        Ok(())
    }

    /// Write buffered documents and deletes to the directory without
    /// committing them
    pub fn flush(&self) -> Result<()> {
        let flushed = {
            let mut state = self.shared.state.lock();
            self.shared.flush_locked(&mut state)?
        };
        if flushed && self.shared.config.auto_merge {
            self.maybe_merge()?;
        }
        Ok(())
    }

    /// Flush, wait for merges and publish the working segment list as the
    /// next commit
    pub fn commit(&self) -> Result<()> {
        self.flush()?;
        let mut guard = self.shared.state.lock();
        self.shared.flush_locked(&mut guard)?;
        self.shared.wait_for_merges(&mut guard);

        let state: &mut WriterState = &mut guard;
        let segments_file = state.infos.commit(self.shared.directory.as_ref())?;
        let mut files = state.infos.files();
        files.push(segments_file);
        self.shared.deleter.checkpoint_commit(files);
        state.committed = state.infos.clone();
        self.shared.published.store(state.infos.clone());
        info!(
            generation = state.infos.generation,
            segments = state.infos.len(),
            docs = state.infos.num_docs(),
            "committed index"
        );
        Ok(())
    }

    /// Discard everything since the last commit
    pub fn rollback(&self) -> Result<()> {
        let mut guard = self.shared.state.lock();
        guard.merges.clear_pending();
        self.shared.wait_for_merges(&mut guard);

        let state: &mut WriterState = &mut guard;
        let old_files = state.infos.files();
        let counter = state.infos.counter;
        state.infos = state.committed.clone();
        // names handed out since the commit are never reused
        state.infos.counter = state.infos.counter.max(counter);
        state.buffer = SegmentBuffer::new();
        state.deletes.clear();
        state.buffer_doc_deletes.clear();
        state.readers.clear();
        state.dirty.clear();
        self.shared.checkpoint(state, &old_files);
        info!(generation = state.committed.generation, "rolled back index writer");
        Ok(())
    }

    /// Ask the merge policy for merges and run them
    pub fn maybe_merge(&self) -> Result<()> {
        {
            let mut state = self.shared.state.lock();
            self.shared
                .queue_merges(&mut state, |policy, segments| policy.find_merges(segments));
        }
        self.dispatch_pending()
    }

    fn dispatch_pending(&self) -> Result<()> {
        match &self.merge_worker {
            Some(worker) => {
                let mut state = self.shared.state.lock();
                while let Some(candidate) = state.merges.next_merge() {
                    if let Err(e) = worker.tx.send(candidate) {
                        state.merges.complete_merge(&e.0.segments);
                        return Err(SegdexError::Internal("merge worker stopped".to_string()));
                    }
                }
                Ok(())
            }
            None => {
                loop {
                    let next = self.shared.next_cascading_merge();
                    let Some(candidate) = next else {
                        return Ok(());
                    };
                    self.shared.run_merge(candidate)?;
                }
            }
        }
    }

    /// Block until no merge is running
    pub fn wait_for_merges(&self) {
        let mut state = self.shared.state.lock();
        self.shared.wait_for_merges(&mut state);
    }

    /// Merge until at most `max_segments` segments remain
    pub fn force_merge(&self, max_segments: usize) -> Result<()> {
        self.flush()?;
        self.merge_until_stable(|_, segments| forced_merges(segments, max_segments))
    }

    /// Merge the whole index into a single segment without deletions
    pub fn optimize(&self) -> Result<()> {
        self.force_merge(1)
    }

    /// Rewrite segments that carry deletions
    pub fn expunge_deletes(&self) -> Result<()> {
        self.flush()?;
        self.merge_until_stable(|_, segments| expunge_merges(segments))
    }

    fn merge_until_stable<F>(&self, find: F) -> Result<()>
    where
        F: Fn(&dyn MergePolicy, &[SegmentInfo]) -> Vec<MergeCandidate>,
    {
        loop {
            let version = {
                let mut state = self.shared.state.lock();
                self.shared.wait_for_merges(&mut state);
                let before = state.merges.has_pending();
                self.shared.queue_merges(&mut state, &find);
                if !before && !state.merges.has_pending() {
                    return Ok(());
                }
                state.infos.version
            };
            self.dispatch_pending()?;

            let mut state = self.shared.state.lock();
            self.shared.wait_for_merges(&mut state);
            if state.infos.version == version {
                return Ok(());
            }
        }
    }

    /// Live documents, including buffered ones; deletes count once flushed
    pub fn num_docs(&self) -> u64 {
        let state = self.shared.state.lock();
        state.infos.num_docs() + state.buffer.doc_count() as u64
    }

    pub fn max_doc(&self) -> u64 {
        let state = self.shared.state.lock();
        state.infos.max_doc() + state.buffer.doc_count() as u64
    }

    pub fn buffered_docs(&self) -> u32 {
        self.shared.state.lock().buffer.doc_count()
    }

    /// Flushed segments in the working view
    pub fn segment_count(&self) -> usize {
        self.shared.published.load().len()
    }

    /// Working segment list as of the last flush or merge
    pub fn segment_infos(&self) -> Arc<SegmentInfos> {
        self.shared.published.load()
    }

    /// Commit and release the write lock
    pub fn close(mut self) -> Result<()> {
        self.commit()?;
        self.shutdown();
        Ok(())
    }

    fn shutdown(&mut self) {
        if let Some(worker) = self.merge_worker.take() {
            drop(worker.tx);
            if worker.join.join().is_err() {
                warn!("merge worker panicked");
            }
        }
        let files = self.shared.state.lock().infos.files();
        self.shared.deleter.dec_ref(&files);
        self.closed = true;
    }
}

impl Drop for IndexWriter {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        let pending = self.shared.state.lock().has_pending_changes();
        if pending {
            warn!("index writer dropped without close, uncommitted changes are discarded");
        }
        self.shared.state.lock().merges.clear_pending();
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MergePolicyConfig;
    use crate::document::Field;
    use crate::segment::{NoMergePolicy, TieredMergePolicy};
    use crate::store::RamDirectory;
    use crate::tokenizer::Tokenizer;

    fn writer_with(
        dir: &Arc<RamDirectory>,
        config: IndexWriterConfig,
        policy: Arc<dyn MergePolicy>,
    ) -> (IndexWriter, Arc<FileDeleter>) {
        let directory: Arc<dyn Directory> = dir.clone();
        let deleter = Arc::new(FileDeleter::new(Arc::clone(&directory)));
        let writer = IndexWriter::open(
            directory,
            Arc::clone(&deleter),
            config,
            Arc::new(Tokenizer::default()),
            policy,
        )
        .unwrap();
        (writer, deleter)
    }

    fn writer(dir: &Arc<RamDirectory>) -> IndexWriter {
        writer_with(dir, IndexWriterConfig::default(), Arc::new(NoMergePolicy)).0
    }

    fn doc(id: &str, body: &str) -> Document {
        Document::new()
            .add_field(Field::keyword("id", id))
            .add_field(Field::text("body", body))
    }

    fn open_reader(dir: &Arc<RamDirectory>) -> IndexReader {
        IndexReader::open(dir.clone(), None).unwrap()
    }

    #[test]
    fn test_new_index_gets_empty_commit() {
        let dir = Arc::new(RamDirectory::new());
        let _writer = writer(&dir);
        let reader = open_reader(&dir);
        assert_eq!(reader.max_doc(), 0);
        assert_eq!(reader.generation(), 1);
    }

    #[test]
    fn test_second_writer_hits_lock() {
        let dir = Arc::new(RamDirectory::new());
        let _writer = writer(&dir);
        let directory: Arc<dyn Directory> = dir.clone();
        let deleter = Arc::new(FileDeleter::new(Arc::clone(&directory)));
        let err = IndexWriter::open(
            directory,
            deleter,
            IndexWriterConfig::default(),
            Arc::new(Tokenizer::default()),
            Arc::new(NoMergePolicy),
        )
        .unwrap_err();
        assert!(matches!(err, SegdexError::LockContention(_)));
    }

    #[test]
    fn test_append_requires_commit() {
        let dir = Arc::new(RamDirectory::new());
        let directory: Arc<dyn Directory> = dir.clone();
        let deleter = Arc::new(FileDeleter::new(Arc::clone(&directory)));
        let err = IndexWriter::open(
            directory,
            deleter,
            IndexWriterConfig::default().with_open_mode(OpenMode::Append),
            Arc::new(Tokenizer::default()),
            Arc::new(NoMergePolicy),
        )
        .unwrap_err();
        assert!(matches!(err, SegdexError::IndexNotFound(_)));
    }

    #[test]
    fn test_uncommitted_docs_are_invisible() {
        let dir = Arc::new(RamDirectory::new());
        let writer = writer(&dir);
        writer.add_document(doc("1", "hello world")).unwrap();
        writer.flush().unwrap();
        assert_eq!(writer.segment_count(), 1);
        assert_eq!(open_reader(&dir).max_doc(), 0);

        writer.commit().unwrap();
        assert_eq!(open_reader(&dir).max_doc(), 1);
    }

    #[test]
    fn test_auto_flush_at_buffer_limit() {
        let dir = Arc::new(RamDirectory::new());
        let (writer, _) = writer_with(
            &dir,
            IndexWriterConfig::default().with_max_buffered_docs(2),
            Arc::new(NoMergePolicy),
        );
        for i in 0..5 {
            writer.add_document(doc(&i.to_string(), "text")).unwrap();
        }
        assert_eq!(writer.segment_count(), 2);
        assert_eq!(writer.buffered_docs(), 1);
        assert_eq!(writer.max_doc(), 5);
    }

    #[test]
    fn test_delete_term_spares_later_buffered_docs() {
        let dir = Arc::new(RamDirectory::new());
        let writer = writer(&dir);
        writer.add_document(doc("1", "old")).unwrap();
        writer.delete_documents(Term::new("id", "1")).unwrap();
        writer.add_document(doc("1", "new")).unwrap();
        writer.commit().unwrap();

        let reader = open_reader(&dir);
        assert_eq!(reader.max_doc(), 2);
        assert_eq!(reader.num_docs(), 1);
        assert!(reader.is_deleted(0));
        let kept = reader.document(1).unwrap().unwrap();
        assert_eq!(kept.get("body"), Some("new"));
    }

    #[test]
    fn test_update_document_replaces_committed_doc() {
        let dir = Arc::new(RamDirectory::new());
        let writer = writer(&dir);
        writer.add_document(doc("a", "first version")).unwrap();
        writer.commit().unwrap();
        writer
            .update_document(Term::new("id", "a"), doc("a", "second version"))
            .unwrap();
        writer.commit().unwrap();

        let reader = open_reader(&dir);
        assert_eq!(reader.num_docs(), 1);
        let live: Vec<u32> = (0..reader.max_doc()).filter(|&d| !reader.is_deleted(d)).collect();
        assert_eq!(live.len(), 1);
        let doc = reader.document(live[0]).unwrap().unwrap();
        assert_eq!(doc.get("body"), Some("second version"));
    }

    #[test]
    fn test_delete_by_query_and_doc_id() {
        let dir = Arc::new(RamDirectory::new());
        let writer = writer(&dir);
        writer.add_document(doc("1", "red apple")).unwrap();
        writer.add_document(doc("2", "green apple")).unwrap();
        writer.add_document(doc("3", "red cherry")).unwrap();
        writer.flush().unwrap();
        writer.add_document(doc("4", "blue berry")).unwrap();

        writer.delete_documents(Query::term("body", "red")).unwrap();
        // buffered doc, id 3 in the writer's view
        writer.delete_documents(DeleteSelector::DocId(3)).unwrap();
        // out of range ids are ignored
        writer.delete_documents(DeleteSelector::DocId(99)).unwrap();
        writer.commit().unwrap();

        let reader = open_reader(&dir);
        assert_eq!(reader.max_doc(), 4);
        assert_eq!(reader.num_docs(), 1);
        assert!(!reader.is_deleted(1));
    }

    #[test]
    fn test_rollback_discards_uncommitted_work() {
        let dir = Arc::new(RamDirectory::new());
        let writer = writer(&dir);
        writer.add_document(doc("1", "kept")).unwrap();
        writer.commit().unwrap();
        writer.add_document(doc("2", "lost")).unwrap();
        writer.flush().unwrap();
        writer.delete_documents(Term::new("id", "1")).unwrap();
        writer.rollback().unwrap();

        assert_eq!(writer.segment_count(), 1);
        assert_eq!(writer.num_docs(), 1);
        writer.commit().unwrap();
        let reader = open_reader(&dir);
        assert_eq!(reader.num_docs(), 1);
        assert_eq!(reader.document(0).unwrap().unwrap().get("body"), Some("kept"));
        // the rolled back segment's file is gone
        assert!(!dir.exists("_1.cfs"));
    }

    #[test]
    fn test_drop_without_close_keeps_last_commit() {
        let dir = Arc::new(RamDirectory::new());
        {
            let writer = writer(&dir);
            writer.add_document(doc("1", "committed")).unwrap();
            writer.commit().unwrap();
            writer.add_document(doc("2", "dropped")).unwrap();
            writer.flush().unwrap();
        }
        let reader = open_reader(&dir);
        assert_eq!(reader.num_docs(), 1);
        // the lock was released
        let _again = writer(&dir);
    }

    #[test]
    fn test_force_merge_to_one_segment() {
        let dir = Arc::new(RamDirectory::new());
        let (writer, _) = writer_with(
            &dir,
            IndexWriterConfig::default()
                .with_max_buffered_docs(2)
                .with_auto_merge(false),
            Arc::new(TieredMergePolicy::new(MergePolicyConfig::default())),
        );
        for i in 0..7 {
            writer.add_document(doc(&i.to_string(), "merge me")).unwrap();
        }
        writer.delete_documents(Term::new("id", "3")).unwrap();
        writer.commit().unwrap();
        assert!(writer.segment_count() > 1);

        writer.optimize().unwrap();
        writer.commit().unwrap();
        assert_eq!(writer.segment_count(), 1);

        let reader = open_reader(&dir);
        assert_eq!(reader.max_doc(), 6);
        assert_eq!(reader.num_docs(), 6);
        assert!(!reader.has_deletions());
    }

    #[test]
    fn test_explicit_merges_ignore_no_merge_policy() {
        let dir = Arc::new(RamDirectory::new());
        let (writer, _) = writer_with(
            &dir,
            IndexWriterConfig::default().with_max_buffered_docs(2),
            Arc::new(NoMergePolicy),
        );
        for i in 0..6 {
            writer.add_document(doc(&i.to_string(), "explicit")).unwrap();
        }
        writer.delete_documents(Term::new("id", "1")).unwrap();
        writer.commit().unwrap();
        assert_eq!(writer.segment_count(), 3);

        writer.expunge_deletes().unwrap();
        writer.commit().unwrap();
        assert_eq!(writer.segment_count(), 3);
        assert!(!open_reader(&dir).has_deletions());

        writer.optimize().unwrap();
        writer.commit().unwrap();
        assert_eq!(writer.segment_count(), 1);
        assert_eq!(open_reader(&dir).max_doc(), 5);
    }

    #[test]
    fn test_auto_merge_with_background_worker() {
        let dir = Arc::new(RamDirectory::new());
        let policy = TieredMergePolicy::new(MergePolicyConfig {
            segments_per_tier: 2,
            floor_segment_docs: 1,
            ..Default::default()
        });
        let (writer, _) = writer_with(
            &dir,
            IndexWriterConfig::default()
                .with_max_buffered_docs(1)
                .with_merge_scheduler(MergeSchedulerKind::Background),
            Arc::new(policy),
        );
        for i in 0..8 {
            writer.add_document(doc(&i.to_string(), "background")).unwrap();
        }
        writer.commit().unwrap();
        assert!(writer.segment_count() < 8);
        writer.close().unwrap();

        let reader = open_reader(&dir);
        assert_eq!(reader.num_docs(), 8);
    }

    #[test]
    fn test_close_releases_working_refs() {
        let dir = Arc::new(RamDirectory::new());
        let (writer, deleter) =
            writer_with(&dir, IndexWriterConfig::default(), Arc::new(NoMergePolicy));
        writer.add_document(doc("1", "x")).unwrap();
        writer.close().unwrap();
        // only the commit reference remains
        assert_eq!(deleter.ref_count("_0.cfs"), 1);
    }

    #[test]
    fn test_create_mode_replaces_index_on_commit() {
        let dir = Arc::new(RamDirectory::new());
        {
            let writer = writer(&dir);
            writer.add_document(doc("1", "old index")).unwrap();
            writer.close().unwrap();
        }
        let (writer, _) = writer_with(
            &dir,
            IndexWriterConfig::default().with_open_mode(OpenMode::Create),
            Arc::new(NoMergePolicy),
        );
        assert_eq!(writer.num_docs(), 0);
        // previous commit still visible until the new one lands
        assert_eq!(open_reader(&dir).num_docs(), 1);
        writer.add_document(doc("2", "new index")).unwrap();
        writer.close().unwrap();

        let reader = open_reader(&dir);
        assert_eq!(reader.num_docs(), 1);
        assert_eq!(reader.document(0).unwrap().unwrap().get("id"), Some("2"));
        assert!(!dir.exists("_0.cfs"));
    }
}
