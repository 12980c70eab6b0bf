use crate::{
    cache::ErrorKind,
    digest::DIGEST_SIZE,
    djb2::djb2_hash,
    js5_compression::{Compression, Container},
};
use osrs_bytes::ReadExt;
use std::{
    collections::HashMap,
    io::{self, Read},
};
use thiserror::Error;
use tracing::trace;

#[derive(Error, Debug)]
pub enum Js5IndexError {
    #[error("unsupported reference table protocol {0}")]
    UnsupportedProtocol(u8),
    #[error("reference table truncated: {0}")]
    Truncated(#[from] io::Error),
    #[error("id overflow at ordinal {ordinal}")]
    IdOverflow { ordinal: u32 },
}

impl Js5IndexError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::UnsupportedProtocol(_) => ErrorKind::Format,
            Self::Truncated(_) | Self::IdOverflow { .. } => ErrorKind::Corruption,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Js5Protocol {
    Original = 5,
    Versioned = 6,
    Smart = 7,
}

impl TryFrom<u8> for Js5Protocol {
    type Error = Js5IndexError;

    fn try_from(protocol: u8) -> Result<Self, Self::Error> {
        match protocol {
            5 => Ok(Self::Original),
            6 => Ok(Self::Versioned),
            7 => Ok(Self::Smart),
            _ => Err(Js5IndexError::UnsupportedProtocol(protocol)),
        }
    }
}

impl Js5Protocol {
    /// Read a count, id or delta field.
    ///
    /// Below [`Js5Protocol::Smart`] this is a plain u16. From it onwards it is
    /// a u16 when the high bit of the first byte is clear and an i32 with the
    /// high bit masked off otherwise.
    pub fn read_smart(self, buf: &mut &[u8]) -> io::Result<u32> {
        if self < Js5Protocol::Smart {
            return Ok(buf.read_u16()? as u32);
        }

        match buf.first() {
            Some(peek) if peek & 0x80 != 0 => Ok((buf.read_i32()? & 0x7FFF_FFFF) as u32),
            _ => Ok(buf.read_u16()? as u32),
        }
    }
}

enum Js5IndexFlags {
    Names = 0x1,
    Digests = 0x2,
    Lengths = 0x4,
    UncompressedChecksums = 0x8,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Js5IndexFile {
    pub id: u32,
    pub name_hash: i32,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Js5Group {
    pub ordinal: u32,
    pub id: u32,
    pub name_hash: i32,
    pub crc: u32,
    pub uncompressed_crc: u32,
    pub digest: Option<[u8; DIGEST_SIZE]>,
    pub length: u32,
    pub uncompressed_length: u32,
    pub revision: i32,
    pub files: Vec<Js5IndexFile>,
    /// Raw, still packed, bytes as read from the store.
    pub raw: Vec<u8>,
}

impl Js5Group {
    fn new(ordinal: u32, id: u32) -> Js5Group {
        Js5Group {
            ordinal,
            id,
            name_hash: -1,
            crc: 0,
            uncompressed_crc: 0,
            digest: None,
            length: 0,
            uncompressed_length: 0,
            revision: 0,
            files: Vec::new(),
            raw: Vec::new(),
        }
    }

    pub fn file_ids(&self) -> Vec<u32> {
        self.files.iter().map(|file| file.id).collect()
    }

    pub fn file_name_hashes(&self) -> Vec<i32> {
        self.files.iter().map(|file| file.name_hash).collect()
    }
}

/// The decoded reference table of one archive.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Js5Index {
    pub archive: u8,
    pub crc: u32,
    pub digest: [u8; DIGEST_SIZE],
    pub compression: Compression,
    pub protocol: Js5Protocol,
    pub revision: i32,
    pub has_names: bool,
    pub has_digests: bool,
    pub has_lengths: bool,
    pub has_uncompressed_checksums: bool,
    /// Largest group id plus one.
    pub capacity: u32,
    groups: Vec<Js5Group>,
    group_ids: Vec<u32>,
    name_hash_table: HashMap<i32, u32>,
}

impl Js5Index {
    /// Parse a decompressed reference table.
    ///
    /// Groups come back without their raw bytes and the envelope metadata is
    /// left at its defaults; [`Js5Index::decode`] fills both in.
    pub fn read<T: AsRef<[u8]>>(buf: T) -> Result<Js5Index, Js5IndexError> {
        let mut buf_ref = buf.as_ref();

        let protocol = Js5Protocol::try_from(buf_ref.read_u8()?)?;
        let revision = if protocol >= Js5Protocol::Versioned {
            buf_ref.read_i32()?
        } else {
            0
        };

        let flags = buf_ref.read_u8()?;
        let has_names = flags & Js5IndexFlags::Names as u8 != 0;
        let has_digests = flags & Js5IndexFlags::Digests as u8 != 0;
        let has_lengths = flags & Js5IndexFlags::Lengths as u8 != 0;
        let has_uncompressed_checksums = flags & Js5IndexFlags::UncompressedChecksums as u8 != 0;

        let size = protocol.read_smart(&mut buf_ref)?;

        // Every group needs at least four bytes so a bogus count cannot
        // reserve more than the buffer could describe.
        let mut groups = Vec::with_capacity((size as usize).min(buf_ref.len() / 4));
        let mut group_ids = Vec::with_capacity(groups.capacity());

        let mut prev_group_id: u32 = 0;
        for ordinal in 0..size {
            let delta = protocol.read_smart(&mut buf_ref)?;
            prev_group_id = prev_group_id
                .checked_add(delta)
                .ok_or(Js5IndexError::IdOverflow { ordinal })?;

            groups.push(Js5Group::new(ordinal, prev_group_id));
            group_ids.push(prev_group_id);
        }

        let mut name_hash_table = HashMap::new();
        if has_names {
            for group in groups.iter_mut() {
                group.name_hash = buf_ref.read_i32()?;
                name_hash_table
                    .entry(group.name_hash)
                    .or_insert(group.ordinal);
            }
        }

        for group in groups.iter_mut() {
            group.crc = buf_ref.read_u32()?;
        }

        if has_uncompressed_checksums {
            for group in groups.iter_mut() {
                group.uncompressed_crc = buf_ref.read_u32()?;
            }
        }

        if has_digests {
            for group in groups.iter_mut() {
                let mut digest = [0; DIGEST_SIZE];
                buf_ref.read_exact(&mut digest)?;
                group.digest = Some(digest);
            }
        }

        if has_lengths {
            for group in groups.iter_mut() {
                group.length = buf_ref.read_u32()?;
                group.uncompressed_length = buf_ref.read_u32()?;
            }
        }

        for group in groups.iter_mut() {
            group.revision = buf_ref.read_i32()?;
        }

        let mut file_counts = Vec::with_capacity(groups.len());
        for _ in 0..groups.len() {
            file_counts.push(protocol.read_smart(&mut buf_ref)?);
        }

        for (group, &count) in groups.iter_mut().zip(file_counts.iter()) {
            group.files = Vec::with_capacity((count as usize).min(buf_ref.len() / 2));

            let mut prev_file_id: u32 = 0;
            for _ in 0..count {
                let delta = protocol.read_smart(&mut buf_ref)?;
                prev_file_id = prev_file_id
                    .checked_add(delta)
                    .ok_or(Js5IndexError::IdOverflow {
                        ordinal: group.ordinal,
                    })?;

                group.files.push(Js5IndexFile {
                    id: prev_file_id,
                    name_hash: -1,
                });
            }
        }

        if has_names {
            for group in groups.iter_mut() {
                for file in group.files.iter_mut() {
                    file.name_hash = buf_ref.read_i32()?;
                }
            }
        }

        let capacity = group_ids.last().map_or(0, |id| id.saturating_add(1));

        Ok(Js5Index {
            archive: 0,
            crc: 0,
            digest: [0; DIGEST_SIZE],
            compression: Compression::None,
            protocol,
            revision,
            has_names,
            has_digests,
            has_lengths,
            has_uncompressed_checksums,
            capacity,
            groups,
            group_ids,
            name_hash_table,
        })
    }

    /// Build the directory of `archive` from its decompressed reference
    /// table, pulling every group's raw bytes from `group_source`.
    ///
    /// `group_source` is called with the ordinal and the id of each group.
    pub fn decode<F, E>(
        archive: u8,
        container: &Container,
        digest: [u8; DIGEST_SIZE],
        mut group_source: F,
    ) -> Result<Js5Index, E>
    where
        F: FnMut(u32, u32) -> Result<Vec<u8>, E>,
        E: From<Js5IndexError>,
    {
        let mut index = Js5Index::read(&container.data)?;
        index.archive = archive;
        index.crc = container.crc;
        index.digest = digest;
        index.compression = container.compression;

        for group in index.groups.iter_mut() {
            group.raw = group_source(group.ordinal, group.id)?;
            trace!(
                "group {} (ordinal {}) of archive {}: {} raw bytes",
                group.id,
                group.ordinal,
                archive,
                group.raw.len()
            );
        }

        Ok(index)
    }

    pub fn group(&self, id: u32) -> Option<&Js5Group> {
        let ordinal = self.group_ids.partition_point(|&group_id| group_id < id);

        match self.group_ids.get(ordinal) {
            Some(&group_id) if group_id == id => self.groups.get(ordinal),
            _ => None,
        }
    }

    pub fn group_named(&self, name: &str) -> Option<&Js5Group> {
        self.group_by_name_hash(djb2_hash(name))
    }

    pub fn group_by_name_hash(&self, name_hash: i32) -> Option<&Js5Group> {
        let ordinal = *self.name_hash_table.get(&name_hash)?;
        self.groups.get(ordinal as usize)
    }

    pub fn group_at(&self, ordinal: u32) -> Option<&Js5Group> {
        self.groups.get(ordinal as usize)
    }

    pub fn groups(&self) -> &[Js5Group] {
        &self.groups
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}
