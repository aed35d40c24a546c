//! Term dictionary using FST (Finite State Transducer)
//!
//! Keys are encoded terms (`field 0x00 text`), values index into a parallel
//! array of [`TermInfo`]. Byte order of keys is (field, text) order, so a
//! field's terms form one contiguous range of the FST.

use fst::{IntoStreamer, Map, MapBuilder, Streamer};

use super::codec::{decode_record, encode_record};
use super::types::TermInfo;
use crate::document::{decode_term_key, encode_term_key, field_key_end, Term};
use crate::error::{Result, SegdexError};
use crate::store::FileSlice;

/// Immutable term dictionary of one segment
pub struct TermDictionary {
    fst: Map<FileSlice>,
    infos: Vec<TermInfo>,
}

impl std::fmt::Debug for TermDictionary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TermDictionary")
            .field("terms", &self.infos.len())
            .finish()
    }
}

impl TermDictionary {
    /// Open from the FST sub-file and the encoded term infos
    pub fn open(fst_data: FileSlice, infos_data: &[u8]) -> Result<Self> {
        let fst = Map::new(fst_data)?;
        let infos: Vec<TermInfo> = decode_record(infos_data, "term infos")?;
        if fst.len() != infos.len() {
            return Err(SegdexError::corrupt(format!(
                "term dictionary has {} keys but {} term infos",
                fst.len(),
                infos.len()
            )));
        }
        Ok(Self { fst, infos })
    }

    pub fn len(&self) -> usize {
        self.infos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.infos.is_empty()
    }

    pub fn get(&self, term: &Term) -> Result<Option<TermInfo>> {
        self.get_key(&term.to_key())
    }

    pub fn get_key(&self, key: &[u8]) -> Result<Option<TermInfo>> {
        match self.fst.get(key) {
            Some(idx) => self
                .infos
                .get(idx as usize)
                .copied()
                .map(Some)
                .ok_or_else(|| SegdexError::corrupt("term dictionary value out of range")),
            None => Ok(None),
        }
    }

    /// Visit the terms of `field` in order, starting at `from` (inclusive).
    /// The visitor returns false to stop.
    pub fn visit_field_terms<F>(&self, field: &str, from: &str, mut visit: F) -> Result<()>
    where
        F: FnMut(&str, &TermInfo) -> bool,
    {
        let start = encode_term_key(field, from);
        let end = field_key_end(field);
        let mut stream = self.fst.range().ge(&start).lt(&end).into_stream();
        while let Some((key, idx)) = stream.next() {
            let (_, text) = decode_term_key(key)
                .ok_or_else(|| SegdexError::corrupt("undecodable term key"))?;
            let info = self
                .infos
                .get(idx as usize)
                .ok_or_else(|| SegdexError::corrupt("term dictionary value out of range"))?;
            if !visit(text, info) {
                break;
            }
        }
        Ok(())
    }

    /// All encoded keys with their infos, in key order
    pub fn entries(&self) -> Result<Vec<(Vec<u8>, TermInfo)>> {
        let mut out = Vec::with_capacity(self.infos.len());
        let mut stream = self.fst.stream();
        while let Some((key, idx)) = stream.next() {
            let info = self
                .infos
                .get(idx as usize)
                .ok_or_else(|| SegdexError::corrupt("term dictionary value out of range"))?;
            out.push((key.to_vec(), *info));
        }
        Ok(out)
    }
}

/// Builder for term dictionaries; keys must be added in ascending order
pub struct TermDictionaryBuilder {
    builder: Option<MapBuilder<Vec<u8>>>,
    infos: Vec<TermInfo>,
}

impl TermDictionaryBuilder {
    pub fn new() -> Self {
        Self {
            builder: Some(MapBuilder::memory()),
            infos: Vec::new(),
        }
    }

    pub fn add(&mut self, key: &[u8], info: TermInfo) -> Result<()> {
        let builder = self
            .builder
            .as_mut()
            .ok_or_else(|| SegdexError::Internal("term dictionary builder finished".to_string()))?;
        builder
            .insert(key, self.infos.len() as u64)
            .map_err(|e| SegdexError::Internal(format!("term dictionary insert: {}", e)))?;
        self.infos.push(info);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.infos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.infos.is_empty()
    }

    /// FST bytes and encoded term infos
    pub fn finish(mut self) -> Result<(Vec<u8>, Vec<u8>)> {
        let fst_data = match self.builder.take() {
            Some(builder) => builder.into_inner()?,
            None => return Err(SegdexError::Internal("term dictionary builder finished".to_string())),
        };
        let infos = encode_record(&self.infos)?;
        Ok((fst_data, infos))
    }
}

impl Default for TermDictionaryBuilder {
    fn default() -> Self {
        Self::new()
    }
}
