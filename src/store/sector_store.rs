use crate::cache::ErrorKind;
use memmap2::Mmap;
use osrs_bytes::ReadExt;
use std::{cmp, fs::File, io, ops::Deref, path::Path};
use thiserror::Error;
use tracing::trace;

/// Size of one sector in the data file, header included.
pub const SECTOR_SIZE: usize = 520;
const BLOCK_HEADER_SIZE: usize = 8;
const EXTENDED_BLOCK_HEADER_SIZE: usize = 10;

/// Owner ids above this value use the extended header layout.
const EXTENDED_OWNER_THRESHOLD: u32 = 0xFFFF;

#[derive(Error, Debug)]
pub enum SectorStoreError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("chain of group {owner_id} in archive {category} ended after {read} of {length} bytes")]
    TruncatedChain {
        category: u8,
        owner_id: u32,
        read: usize,
        length: u32,
    },
    #[error("sector {sector} mismatch (expected {expected:?}, found {found:?})")]
    SectorMismatch {
        sector: u32,
        expected: SectorHeader,
        found: SectorHeader,
    },
    #[error("sector {sector} of group {owner_id} in archive {category} points to sector {next_sector}, beyond the {sector_count} sectors of the data file")]
    OutOfRange {
        category: u8,
        owner_id: u32,
        sector: u32,
        next_sector: u32,
        sector_count: u32,
    },
    #[error("sector {sector} of group {owner_id} in archive {category} runs past the end of the data file")]
    ShortRead {
        category: u8,
        owner_id: u32,
        sector: u32,
    },
}

impl SectorStoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Io(_) => ErrorKind::Io,
            _ => ErrorKind::Corruption,
        }
    }
}

/// Where a record starts in the data file and how many bytes it spans.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct SectorLocator {
    pub start_sector: u32,
    pub byte_length: u32,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct SectorHeader {
    pub owner_id: u32,
    pub part: u16,
    pub next_sector: u32,
    pub category: u8,
}

impl SectorHeader {
    fn read(mut buf: &[u8], extended: bool) -> io::Result<SectorHeader> {
        let owner_id = if extended {
            buf.read_u32()?
        } else {
            buf.read_u16()? as u32
        };

        Ok(SectorHeader {
            owner_id,
            part: buf.read_u16()?,
            next_sector: buf.read_u24()?,
            category: buf.read_u8()?,
        })
    }
}

/// Reads sector chains out of the data file.
///
/// The backing bytes are usually a memory map of `main_file_cache.dat2`, but
/// any byte container works, which keeps the chain logic testable in memory.
pub struct SectorStore<D = Mmap> {
    data: D,
}

impl SectorStore<Mmap> {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<SectorStore<Mmap>, SectorStoreError> {
        let file = File::open(path)?;
        let data = unsafe { Mmap::map(&file) }?;

        Ok(SectorStore { data })
    }
}

impl<D: Deref<Target = [u8]>> SectorStore<D> {
    pub fn new(data: D) -> SectorStore<D> {
        SectorStore { data }
    }

    pub fn sector_count(&self) -> u32 {
        (self.data.len() / SECTOR_SIZE) as u32
    }

    /// Read the record owned by `owner_id` in `category`.
    ///
    /// A locator whose first sector is 0 or outside the data file yields an
    /// empty buffer: the group is simply not present. Any inconsistency found
    /// further down the chain is an error.
    pub fn read(
        &self,
        category: u8,
        owner_id: u32,
        locator: SectorLocator,
    ) -> Result<Vec<u8>, SectorStoreError> {
        let mut buf = Vec::with_capacity(locator.byte_length as usize);
        self.read_into(category, owner_id, locator, &mut buf)?;

        Ok(buf)
    }

    /// Same as [`read`](Self::read), appending to a caller supplied buffer.
    pub fn read_into(
        &self,
        category: u8,
        owner_id: u32,
        locator: SectorLocator,
        buf: &mut Vec<u8>,
    ) -> Result<(), SectorStoreError> {
        let data: &[u8] = &self.data;
        let sector_count = self.sector_count();

        if locator.start_sector == 0 || locator.start_sector > sector_count {
            trace!(
                "group {} of archive {} is not present (sector {})",
                owner_id,
                category,
                locator.start_sector
            );
            return Ok(());
        }

        let extended = owner_id > EXTENDED_OWNER_THRESHOLD;
        let header_size = if extended {
            EXTENDED_BLOCK_HEADER_SIZE
        } else {
            BLOCK_HEADER_SIZE
        };

        let length = locator.byte_length as usize;
        let mut read = 0;
        let mut sector = locator.start_sector;
        let mut part: u16 = 0;

        buf.reserve(length);

        while read < length {
            if sector == 0 {
                return Err(SectorStoreError::TruncatedChain {
                    category,
                    owner_id,
                    read,
                    length: locator.byte_length,
                });
            }

            let len = cmp::min(length - read, SECTOR_SIZE - header_size);
            let pos = sector as usize * SECTOR_SIZE;
            let end = pos + header_size + len;
            if end > data.len() {
                return Err(SectorStoreError::ShortRead {
                    category,
                    owner_id,
                    sector,
                });
            }

            let header = SectorHeader::read(&data[pos..pos + header_size], extended)?;
            trace!("sector {}: {:?}", sector, header);

            if header.owner_id != owner_id || header.part != part || header.category != category
            {
                return Err(SectorStoreError::SectorMismatch {
                    sector,
                    expected: SectorHeader {
                        owner_id,
                        part,
                        next_sector: header.next_sector,
                        category,
                    },
                    found: header,
                });
            }

            if header.next_sector > sector_count {
                return Err(SectorStoreError::OutOfRange {
                    category,
                    owner_id,
                    sector,
                    next_sector: header.next_sector,
                    sector_count,
                });
            }

            buf.extend_from_slice(&data[pos + header_size..end]);

            read += len;
            sector = header.next_sector;
            part = part.wrapping_add(1);
        }

        Ok(())
    }
}
