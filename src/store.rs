use self::{
    disk_store::{DiskStore, DiskStoreError},
    index_store::IndexStoreError,
    sector_store::SectorStoreError,
};
use crate::cache::ErrorKind;
use std::path::Path;
use thiserror::Error;

pub mod disk_store;
pub mod index_store;
pub mod sector_store;

pub const DATA_PATH: &str = "main_file_cache.dat2";
pub const INDEX_PATH: &str = "main_file_cache.idx";

/// The archive whose groups are the reference tables of every other archive.
pub const MASTER_INDEX: u8 = 255;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("sector store error: {0}")]
    Sector(#[from] SectorStoreError),
    #[error("index store error: {0}")]
    Index(#[from] IndexStoreError),
    #[error("archive {0} does not exist")]
    ArchiveNotFound(u8),
}

impl StoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Sector(err) => err.kind(),
            Self::Index(err) => err.kind(),
            Self::ArchiveNotFound(_) => ErrorKind::NotFound,
        }
    }

    /// Whether the group lies past the last record of its index file.
    pub fn is_beyond_index(&self) -> bool {
        matches!(self, Self::Index(IndexStoreError::EndOfFile { .. }))
    }
}

/// The store hands out the raw, still packed, bytes of groups.
pub trait Store {
    /// Ids of every group present in `archive`.
    fn list(&self, archive: u8) -> Result<Vec<u32>, StoreError>;

    /// Raw bytes of `group`; empty when the index record points nowhere.
    fn read(&self, archive: u8, group: u32) -> Result<Vec<u8>, StoreError>;
}

pub fn store_open<P: AsRef<Path>>(path: P) -> Result<Box<dyn Store + Send + Sync>, DiskStoreError> {
    Ok(Box::new(DiskStore::open(path)?))
}
