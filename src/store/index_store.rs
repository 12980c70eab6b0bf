use super::sector_store::SectorLocator;
use crate::cache::ErrorKind;
use memmap2::Mmap;
use osrs_bytes::ReadExt;
use std::{fs::File, io, ops::Deref, path::Path};
use thiserror::Error;

/// Each record is a 24-bit length followed by a 24-bit start sector.
pub const INDEX_ENTRY_SIZE: usize = 6;

#[derive(Error, Debug)]
pub enum IndexStoreError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("record {ordinal} is beyond the end of index {archive} ({record_count} records)")]
    EndOfFile {
        archive: u8,
        ordinal: u32,
        record_count: u32,
    },
}

impl IndexStoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Io(_) => ErrorKind::Io,
            Self::EndOfFile { .. } => ErrorKind::NotFound,
        }
    }
}

/// Flat array of fixed-size locator records for one archive.
pub struct IndexStore<D = Mmap> {
    archive: u8,
    data: D,
}

impl IndexStore<Mmap> {
    pub fn open<P: AsRef<Path>>(archive: u8, path: P) -> Result<IndexStore<Mmap>, IndexStoreError> {
        let file = File::open(path)?;
        let data = unsafe { Mmap::map(&file) }?;

        Ok(IndexStore { archive, data })
    }
}

impl<D: Deref<Target = [u8]>> IndexStore<D> {
    pub fn new(archive: u8, data: D) -> IndexStore<D> {
        IndexStore { archive, data }
    }

    pub fn archive(&self) -> u8 {
        self.archive
    }

    pub fn record_count(&self) -> u32 {
        (self.data.len() / INDEX_ENTRY_SIZE) as u32
    }

    pub fn load_locator(&self, ordinal: u32) -> Result<SectorLocator, IndexStoreError> {
        let record_count = self.record_count();
        if ordinal >= record_count {
            return Err(IndexStoreError::EndOfFile {
                archive: self.archive,
                ordinal,
                record_count,
            });
        }

        let data: &[u8] = &self.data;
        let pos = ordinal as usize * INDEX_ENTRY_SIZE;
        let mut record = &data[pos..pos + INDEX_ENTRY_SIZE];

        let byte_length = record.read_u24()?;
        let start_sector = record.read_u24()?;

        Ok(SectorLocator {
            start_sector,
            byte_length,
        })
    }

    /// Every ordinal whose record points at a sector.
    pub fn list(&self) -> Vec<u32> {
        (0..self.record_count())
            .filter(|&ordinal| {
                self.load_locator(ordinal)
                    .map(|locator| locator.start_sector != 0)
                    .unwrap_or(false)
            })
            .collect()
    }
}
