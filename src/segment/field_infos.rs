//! Per-segment field catalogue

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::codec::{decode_record, encode_record};
use crate::document::FieldFlags;
use crate::error::Result;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FieldInfo {
    pub name: String,
    pub number: u32,
    pub flags: FieldFlags,
}

/// Fields seen in a segment, numbered in first-seen order
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FieldInfos {
    fields: Vec<FieldInfo>,
    by_name: HashMap<String, usize>,
}

impl FieldInfos {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a field, merging flags if it is already known
    pub fn add(&mut self, name: &str, flags: FieldFlags) -> u32 {
        if let Some(&idx) = self.by_name.get(name) {
            let info = &mut self.fields[idx];
            info.flags = info.flags.union(flags);
            return info.number;
        }
        let number = self.fields.len() as u32;
        self.by_name.insert(name.to_string(), self.fields.len());
        self.fields.push(FieldInfo {
            name: name.to_string(),
            number,
            flags,
        });
        number
    }

    pub fn get(&self, name: &str) -> Option<&FieldInfo> {
        self.by_name.get(name).map(|&idx| &self.fields[idx])
    }

    pub fn iter(&self) -> impl Iterator<Item = &FieldInfo> {
        self.fields.iter()
    }

    pub fn names(&self) -> Vec<String> {
        self.fields.iter().map(|f| f.name.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        encode_record(&self.fields)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let fields: Vec<FieldInfo> = decode_record(bytes, "field infos")?;
        let mut infos = FieldInfos::new();
        for field in fields {
            infos.add(&field.name, field.flags);
        }
        Ok(infos)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_merges_flags() {
        let mut infos = FieldInfos::new();
        assert_eq!(infos.add("title", FieldFlags::TEXT), 0);
        assert_eq!(infos.add("id", FieldFlags::KEYWORD), 1);
        let with_vectors = FieldFlags {
            term_vectors: true,
            ..FieldFlags::TEXT
        };
        assert_eq!(infos.add("title", with_vectors), 0);
        assert!(infos.get("title").unwrap().flags.term_vectors);
        assert_eq!(infos.names(), vec!["title", "id"]);

        let restored = FieldInfos::from_bytes(&infos.to_bytes().unwrap()).unwrap();
        assert_eq!(restored, infos);
    }
}
