use crate::{
    cache::ErrorKind,
    djb2::djb2_hash,
    js5_compression::{Container, Js5Compression, Js5CompressionError},
    js5_index::Js5Group,
};
use osrs_bytes::ReadExt;
use std::{collections::BTreeMap, io};
use thiserror::Error;
use tracing::trace;

#[derive(Error, Debug)]
pub enum GroupError {
    #[error("compression error: {0}")]
    Compression(#[from] Js5CompressionError),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("trailer of {chunks} chunks for {file_count} files does not fit in {len} bytes")]
    TrailerTooLarge {
        chunks: u8,
        file_count: usize,
        len: usize,
    },
    #[error("negative chunk length {length} for file ordinal {ordinal}")]
    NegativeChunk { ordinal: usize, length: i64 },
    #[error("chunks need {needed} bytes but only {available} precede the trailer")]
    ChunkOverflow { needed: u64, available: usize },
    #[error("file {file} not found in group {group}")]
    FileNotFound { group: u32, file: u32 },
    #[error("file with name hash {name_hash} not found in group {group}")]
    NamedFileNotFound { group: u32, name_hash: i32 },
    #[error("entry {entry} not found in file {file}")]
    EntryNotFound { file: u32, entry: u32 },
}

impl GroupError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Compression(err) => err.kind(),
            Self::Io(_) => ErrorKind::Io,
            Self::FileNotFound { .. }
            | Self::NamedFileNotFound { .. }
            | Self::EntryNotFound { .. } => ErrorKind::NotFound,
            _ => ErrorKind::Corruption,
        }
    }
}

/// One file of a group.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Js5File {
    pub id: u32,
    pub name_hash: i32,
    pub data: Vec<u8>,
}

/// One entry of a file that is itself a packed, multi-entry container.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Js5Entry {
    pub file_id: u32,
    pub id: u32,
    pub name_hash: i32,
    pub data: Vec<u8>,
}

impl Js5File {
    /// Resolve entry `entry_id` of this file, which is treated as a nested
    /// container holding `entry_count` entries.
    pub fn entry(&self, entry_id: u32, entry_count: usize) -> Result<Js5Entry, GroupError> {
        self.entries(entry_count)?
            .into_iter()
            .find(|entry| entry.id == entry_id)
            .ok_or(GroupError::EntryNotFound {
                file: self.id,
                entry: entry_id,
            })
    }

    pub fn entries(&self, entry_count: usize) -> Result<Vec<Js5Entry>, GroupError> {
        let data = match Group::decode_packed(&self.data, None)? {
            Some(container) => container.data,
            None => self.data.clone(),
        };

        let entries = Group::split(data, &[], &[], entry_count)?
            .into_values()
            .map(|file| Js5Entry {
                file_id: self.id,
                id: file.id,
                name_hash: file.name_hash,
                data: file.data,
            })
            .collect();

        Ok(entries)
    }
}

/// The files of a group after decompression and splitting.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Unpacked {
    pub group: u32,
    pub key: Option<[u32; 4]>,
    files: BTreeMap<u32, Js5File>,
}

impl Unpacked {
    pub fn file(&self, id: u32) -> Option<&Js5File> {
        self.files.values().find(|file| file.id == id)
    }

    pub fn file_named(&self, name: &str) -> Option<&Js5File> {
        let name_hash = djb2_hash(name);
        self.files.values().find(|file| file.name_hash == name_hash)
    }

    pub fn file_at(&self, ordinal: u32) -> Option<&Js5File> {
        self.files.get(&ordinal)
    }

    /// Files keyed by their ordinal within the group.
    pub fn files(&self) -> &BTreeMap<u32, Js5File> {
        &self.files
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

pub struct Group {}

impl Group {
    /// Decompress the packed bytes of a group or file.
    ///
    /// Returns `None` when the bytes are not a container at all, in which case
    /// the caller uses them as they are.
    pub fn decode_packed(
        raw: &[u8],
        key: Option<[u32; 4]>,
    ) -> Result<Option<Container>, GroupError> {
        match Js5Compression::uncompress(raw, key) {
            Ok(container) => Ok(Some(container)),
            Err(err) if err.is_envelope_rejection() => {
                trace!("{} bytes are not a container ({}), using as-is", raw.len(), err);
                Ok(None)
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Split a decompressed group into its files, keyed by ordinal.
    ///
    /// `file_ids` and `name_hashes` are indexed by ordinal; missing ids fall
    /// back to the ordinal and missing name hashes to -1.
    pub fn split(
        input: Vec<u8>,
        file_ids: &[u32],
        name_hashes: &[i32],
        file_count: usize,
    ) -> Result<BTreeMap<u32, Js5File>, GroupError> {
        let file_at = |ordinal: usize, data: Vec<u8>| Js5File {
            id: file_ids.get(ordinal).copied().unwrap_or(ordinal as u32),
            name_hash: name_hashes.get(ordinal).copied().unwrap_or(-1),
            data,
        };

        if input.is_empty() || file_count <= 1 {
            return Ok(BTreeMap::from([(0, file_at(0, input))]));
        }

        // The trailer is one byte of chunk count preceded by the length table.
        let chunks = input[input.len() - 1];
        let table_len = (chunks as usize)
            .checked_mul(file_count)
            .and_then(|cells| cells.checked_mul(4))
            .filter(|&table_len| table_len < input.len())
            .ok_or(GroupError::TrailerTooLarge {
                chunks,
                file_count,
                len: input.len(),
            })?;
        let trailer_index = input.len() - 1 - table_len;
        let table = &input[trailer_index..input.len() - 1];

        let mut sizes = vec![0u64; file_count];
        let mut table_ref = table;
        for _ in 0..chunks {
            let mut chunk_len = 0i64;
            for (ordinal, size) in sizes.iter_mut().enumerate() {
                chunk_len += table_ref.read_i32()? as i64;
                if chunk_len < 0 {
                    return Err(GroupError::NegativeChunk {
                        ordinal,
                        length: chunk_len,
                    });
                }

                *size += chunk_len as u64;
            }
        }

        let needed: u64 = sizes.iter().sum();
        if needed > trailer_index as u64 {
            return Err(GroupError::ChunkOverflow {
                needed,
                available: trailer_index,
            });
        }

        let mut files: Vec<Vec<u8>> = sizes
            .iter()
            .map(|&size| Vec::with_capacity(size as usize))
            .collect();

        let mut offset = 0;
        let mut table_ref = table;
        for _ in 0..chunks {
            let mut chunk_len = 0i64;
            for file in files.iter_mut() {
                chunk_len += table_ref.read_i32()? as i64;
                let len = chunk_len as usize;

                file.extend_from_slice(&input[offset..offset + len]);
                offset += len;
            }
        }

        Ok(files
            .into_iter()
            .enumerate()
            .map(|(ordinal, data)| (ordinal as u32, file_at(ordinal, data)))
            .collect())
    }
}

impl Js5Group {
    /// Split the decompressed bytes of this group along its file table.
    pub fn split(&self, data: Vec<u8>) -> Result<BTreeMap<u32, Js5File>, GroupError> {
        Group::split(
            data,
            &self.file_ids(),
            &self.file_name_hashes(),
            self.files.len(),
        )
    }

    /// Decompress and split this group's raw bytes.
    pub fn unpack(&self, key: Option<[u32; 4]>) -> Result<Unpacked, GroupError> {
        self.unpack_with(key, |_, _| Ok(()))
    }

    /// Like [`Js5Group::unpack`], handing the decoded container (if the raw
    /// bytes were one) and the uncompressed bytes to `verify` before the
    /// split.
    pub fn unpack_with<E, F>(&self, key: Option<[u32; 4]>, verify: F) -> Result<Unpacked, E>
    where
        F: FnOnce(Option<&Container>, &[u8]) -> Result<(), E>,
        E: From<GroupError>,
    {
        let container = Group::decode_packed(&self.raw, key)?;
        let data = match container {
            Some(container) => {
                verify(Some(&container), &container.data)?;
                container.data
            }
            None => {
                verify(None, &self.raw)?;
                self.raw.clone()
            }
        };

        Ok(Unpacked::new(self.id, key, self.split(data)?))
    }

    pub fn file(&self, id: u32, key: Option<[u32; 4]>) -> Result<Js5File, GroupError> {
        self.unpack(key)?
            .files
            .into_values()
            .find(|file| file.id == id)
            .ok_or(GroupError::FileNotFound {
                group: self.id,
                file: id,
            })
    }

    pub fn file_named(&self, name: &str, key: Option<[u32; 4]>) -> Result<Js5File, GroupError> {
        let name_hash = djb2_hash(name);

        self.unpack(key)?
            .files
            .into_values()
            .find(|file| file.name_hash == name_hash)
            .ok_or(GroupError::NamedFileNotFound {
                group: self.id,
                name_hash,
            })
    }
}

impl Unpacked {
    pub(crate) fn new(group: u32, key: Option<[u32; 4]>, files: BTreeMap<u32, Js5File>) -> Unpacked {
        Unpacked { group, key, files }
    }
}
