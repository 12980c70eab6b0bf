use crate::{
    cache::ErrorKind,
    group::{GroupError, Js5Entry, Unpacked},
    js5_compression::Container,
    js5_index::Js5Group,
};
use thiserror::Error;

pub mod cache_archive;

#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("group {group} not found in archive {archive}")]
    GroupNotFound { archive: u8, group: u32 },
    #[error("group with name hash {name_hash} not found in archive {archive}")]
    NamedGroupNotFound { archive: u8, name_hash: i32 },
    #[error("file {file} not found in group {group} of archive {archive}")]
    FileNotFound { archive: u8, group: u32, file: u32 },
    #[error("checksum mismatch in group {group} of archive {archive} (expected {expected:#010x}, found {found:#010x})")]
    ChecksumMismatch {
        archive: u8,
        group: u32,
        expected: u32,
        found: u32,
    },
    #[error("uncompressed checksum mismatch in group {group} of archive {archive} (expected {expected:#010x}, found {found:#010x})")]
    UncompressedChecksumMismatch {
        archive: u8,
        group: u32,
        expected: u32,
        found: u32,
    },
    #[error("digest mismatch in group {group} of archive {archive}")]
    DigestMismatch { archive: u8, group: u32 },
    #[error("group error: {0}")]
    Group(#[from] GroupError),
}

impl ArchiveError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::GroupNotFound { .. }
            | Self::NamedGroupNotFound { .. }
            | Self::FileNotFound { .. } => ErrorKind::NotFound,
            Self::Group(err) => err.kind(),
            _ => ErrorKind::Corruption,
        }
    }
}

pub trait Archive {
    fn read(
        &mut self,
        group: u32,
        file: u32,
        key: Option<[u32; 4]>,
    ) -> Result<Vec<u8>, ArchiveError>;
    fn read_named_group(
        &mut self,
        name_hash: i32,
        file: u32,
        key: Option<[u32; 4]>,
    ) -> Result<Vec<u8>, ArchiveError>;
    fn read_entry(
        &mut self,
        group: u32,
        file: u32,
        entry: u32,
        entry_count: usize,
        key: Option<[u32; 4]>,
    ) -> Result<Js5Entry, ArchiveError>;
    fn get_unpacked(&mut self, group: u32, key: Option<[u32; 4]>)
        -> Result<&Unpacked, ArchiveError>;
    fn verify_compressed(&self, group: &Js5Group, container: &Container)
        -> Result<(), ArchiveError>;
    fn verify_uncompressed(&self, group: &Js5Group, buf: &[u8]) -> Result<(), ArchiveError>;
}
