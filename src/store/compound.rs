//! Compound file: a segment's sub-files packed into one container.
//!
//! Layout:
//!
//! ```text
//! [magic "SGDXCFS\0"][version u32]
//! [sub-file bytes ...]
//! [table: bincode Vec<CompoundEntry>]
//! [table_offset u64][table_len u64][table_crc u32][magic "SGDXEND\0"]
//! ```
//!
//! The table and footer are written last. A file without a readable footer
//! and table is truncated or otherwise damaged and is reported as corruption.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::Write;

use super::directory::{Directory, FileSlice};
use crate::error::{Result, SegdexError};

const HEADER_MAGIC: &[u8; 8] = b"SGDXCFS\0";
const FOOTER_MAGIC: &[u8; 8] = b"SGDXEND\0";
const FORMAT_VERSION: u32 = 1;
const HEADER_LEN: usize = 12;
const FOOTER_LEN: usize = 28;

/// Location of one sub-file inside the container
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompoundEntry {
    pub name: String,
    pub offset: u64,
    pub length: u64,
}

/// Collects named sub-files and writes them as one compound file
#[derive(Debug, Default)]
pub struct CompoundFileWriter {
    files: Vec<(String, Vec<u8>)>,
}

impl CompoundFileWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_file(&mut self, name: impl Into<String>, data: Vec<u8>) -> Result<()> {
        let name = name.into();
        if self.files.iter().any(|(n, _)| *n == name) {
            return Err(SegdexError::InvalidRequest(format!(
                "duplicate compound sub-file: {}",
                name
            )));
        }
        self.files.push((name, data));
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Write the container to `directory` under `name`, returning its size
    pub fn write(self, directory: &dyn Directory, name: &str) -> Result<u64> {
        let mut out = directory.create_output(name)?;
        out.write_all(HEADER_MAGIC)?;
        out.write_all(&FORMAT_VERSION.to_le_bytes())?;

        let mut offset = HEADER_LEN as u64;
        let mut table = Vec::with_capacity(self.files.len());
        for (sub_name, data) in &self.files {
            out.write_all(data)?;
            table.push(CompoundEntry {
                name: sub_name.clone(),
                offset,
                length: data.len() as u64,
            });
            offset += data.len() as u64;
        }

        let table_bytes = bincode::serialize(&table)?;
        let crc = crc32fast::hash(&table_bytes);
        out.write_all(&table_bytes)?;
        out.write_all(&offset.to_le_bytes())?;
        out.write_all(&(table_bytes.len() as u64).to_le_bytes())?;
        out.write_all(&crc.to_le_bytes())?;
        out.write_all(FOOTER_MAGIC)?;

        let size = out.bytes_written();
        out.finish()?;
        Ok(size)
    }
}

/// Read-only view of a compound file as a set of named byte ranges
#[derive(Clone, Debug)]
pub struct CompoundFileReader {
    name: String,
    entries: HashMap<String, FileSlice>,
    size: u64,
}

impl CompoundFileReader {
    pub fn open(directory: &dyn Directory, name: &str) -> Result<Self> {
        let data = directory.open_file(name)?;
        Self::from_slice(name, data)
    }

    /// Validate footer, table checksum, and entry bounds
    pub fn from_slice(name: &str, data: FileSlice) -> Result<Self> {
        let corrupt = |msg: &str| SegdexError::corrupt(format!("compound file {}: {}", name, msg));
        let len = data.len();
        if len < HEADER_LEN + FOOTER_LEN {
            return Err(corrupt("too short for header and footer"));
        }
        if &data[..8] != HEADER_MAGIC {
            return Err(corrupt("bad header magic"));
        }
        let version = read_u32(&data[8..12]);
        if version != FORMAT_VERSION {
            return Err(corrupt(&format!("unsupported version {}", version)));
        }

        let footer = &data[len - FOOTER_LEN..];
        if &footer[20..28] != FOOTER_MAGIC {
            return Err(corrupt("missing trailing table"));
        }
        let table_offset = read_u64(&footer[0..8]);
        let table_len = read_u64(&footer[8..16]);
        let table_crc = read_u32(&footer[16..20]);

        let table_end = table_offset
            .checked_add(table_len)
            .ok_or_else(|| corrupt("table bounds overflow"))?;
        if table_offset < HEADER_LEN as u64 || table_end != (len - FOOTER_LEN) as u64 {
            return Err(corrupt("table bounds inconsistent with file length"));
        }
        let table_bytes = &data[table_offset as usize..table_end as usize];
        if crc32fast::hash(table_bytes) != table_crc {
            return Err(corrupt("table checksum mismatch"));
        }
        let mut table: Vec<CompoundEntry> =
            bincode::deserialize(table_bytes).map_err(|e| corrupt(&e.to_string()))?;

        table.sort_by_key(|e| e.offset);
        let mut entries = HashMap::with_capacity(table.len());
        let mut prev_end = HEADER_LEN as u64;
        for entry in table {
            let end = entry
                .offset
                .checked_add(entry.length)
                .ok_or_else(|| corrupt("entry bounds overflow"))?;
            if entry.offset < prev_end {
                return Err(corrupt(&format!("entry {} overlaps its predecessor", entry.name)));
            }
            if end > table_offset {
                return Err(corrupt(&format!("entry {} extends past contents", entry.name)));
            }
            let slice = data
                .slice(entry.offset as usize..end as usize)
                .ok_or_else(|| corrupt(&format!("entry {} out of bounds", entry.name)))?;
            if entries.insert(entry.name.clone(), slice).is_some() {
                return Err(corrupt(&format!("duplicate entry {}", entry.name)));
            }
            prev_end = end;
        }

        Ok(Self {
            name: name.to_string(),
            entries,
            size: len as u64,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Total container size in bytes
    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn file(&self, name: &str) -> Option<FileSlice> {
        self.entries.get(name).cloned()
    }

    /// A sub-file the caller cannot do without; absence is corruption
    pub fn require(&self, name: &str) -> Result<FileSlice> {
        self.file(name).ok_or_else(|| {
            SegdexError::corrupt(format!("compound file {}: missing {}", self.name, name))
        })
    }

    pub fn file_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.entries.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }
}

fn read_u32(b: &[u8]) -> u32 {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(&b[..4]);
    u32::from_le_bytes(buf)
}

fn read_u64(b: &[u8]) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&b[..8]);
    u64::from_le_bytes(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::RamDirectory;

    fn write_sample(dir: &RamDirectory) -> u64 {
        let mut writer = CompoundFileWriter::new();
        writer.add_file("fnm", b"fields".to_vec()).unwrap();
        writer.add_file("pst", vec![7u8; 300]).unwrap();
        writer.add_file("empty", Vec::new()).unwrap();
        writer.write(dir, "_0.cfs").unwrap()
    }

    #[test]
    fn test_roundtrip() {
        let dir = RamDirectory::new();
        let size = write_sample(&dir);
        assert_eq!(size, dir.file_len("_0.cfs").unwrap());

        let reader = CompoundFileReader::open(&dir, "_0.cfs").unwrap();
        assert_eq!(reader.file_names(), vec!["empty", "fnm", "pst"]);
        assert_eq!(reader.file("fnm").unwrap().as_slice(), b"fields");
        assert_eq!(reader.file("pst").unwrap().len(), 300);
        assert!(reader.file("empty").unwrap().is_empty());
        assert!(reader.file("nope").is_none());
        assert!(reader.require("nope").unwrap_err().is_corruption());
    }

    #[test]
    fn test_duplicate_sub_file_rejected() {
        let mut writer = CompoundFileWriter::new();
        writer.add_file("a", vec![1]).unwrap();
        assert!(writer.add_file("a", vec![2]).is_err());
    }

    #[test]
    fn test_truncation_is_corruption() {
        let dir = RamDirectory::new();
        write_sample(&dir);
        let full = dir.open_file("_0.cfs").unwrap().to_vec();

        for cut in [1usize, 10, 28, 100, full.len() - 12] {
            let truncated = FileSlice::new(full[..full.len() - cut].to_vec());
            let err = CompoundFileReader::from_slice("_0.cfs", truncated).unwrap_err();
            assert!(err.is_corruption(), "cut {} gave {:?}", cut, err);
        }
    }

    #[test]
    fn test_damaged_table_is_corruption() {
        let dir = RamDirectory::new();
        write_sample(&dir);
        let mut bytes = dir.open_file("_0.cfs").unwrap().to_vec();
        let table_pos = bytes.len() - FOOTER_LEN - 3;
        bytes[table_pos] ^= 0xFF;
        let err = CompoundFileReader::from_slice("_0.cfs", FileSlice::new(bytes)).unwrap_err();
        assert!(err.is_corruption());

        let mut bytes = dir.open_file("_0.cfs").unwrap().to_vec();
        bytes[0] = b'X';
        let err = CompoundFileReader::from_slice("_0.cfs", FileSlice::new(bytes)).unwrap_err();
        assert!(err.is_corruption());
    }

    #[test]
    fn test_overlapping_entries_rejected() {
        let table = vec![
            CompoundEntry {
                name: "a".to_string(),
                offset: HEADER_LEN as u64,
                length: 8,
            },
            CompoundEntry {
                name: "b".to_string(),
                offset: HEADER_LEN as u64 + 4,
                length: 4,
            },
        ];
        let mut bytes = Vec::new();
        bytes.extend_from_slice(HEADER_MAGIC);
        bytes.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
        bytes.extend_from_slice(&[0u8; 8]);
        let table_offset = bytes.len() as u64;
        let table_bytes = bincode::serialize(&table).unwrap();
        bytes.extend_from_slice(&table_bytes);
        bytes.extend_from_slice(&table_offset.to_le_bytes());
        bytes.extend_from_slice(&(table_bytes.len() as u64).to_le_bytes());
        bytes.extend_from_slice(&crc32fast::hash(&table_bytes).to_le_bytes());
        bytes.extend_from_slice(FOOTER_MAGIC);

        let err = CompoundFileReader::from_slice("x.cfs", FileSlice::new(bytes)).unwrap_err();
        assert!(err.is_corruption());
    }
}
