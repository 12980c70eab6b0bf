use crate::cache::{Cache, CacheError, ErrorKind};
use osrs_bytes::WriteExt;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ChecksumTableError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("cache error: {0}")]
    Cache(#[from] CacheError),
    #[error("table has {found} entries but {expected} checksums were given")]
    LengthMismatch { expected: usize, found: usize },
    #[error("checksum mismatch for archive {archive} (expected {expected:#010x}, found {found:#010x})")]
    ChecksumMismatch {
        archive: usize,
        expected: u32,
        found: u32,
    },
}

impl ChecksumTableError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Io(_) => ErrorKind::Io,
            Self::Cache(err) => err.kind(),
            _ => ErrorKind::Corruption,
        }
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct ChecksumTableEntry {
    pub crc: u32,
    pub revision: i32,
}

/// CRC and revision of every reference table, indexed by archive id.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ChecksumTable {
    entries: Vec<ChecksumTableEntry>,
}

impl ChecksumTable {
    /// Collect the table from every archive of `cache`. Archive ids missing
    /// from the master index get zeroed entries.
    pub fn create(cache: &mut Cache) -> Result<ChecksumTable, ChecksumTableError> {
        let archives = cache.archives().to_vec();
        let mut entries = Vec::new();

        for archive in archives {
            let index = cache.index(archive)?;

            entries.resize(archive as usize, ChecksumTableEntry::default());
            entries.push(ChecksumTableEntry {
                crc: index.crc,
                revision: index.revision,
            });
        }

        Ok(ChecksumTable { entries })
    }

    pub fn entries(&self) -> &[ChecksumTableEntry] {
        &self.entries
    }

    /// Compare against trusted reference table CRCs.
    pub fn validate(&self, crcs: &[u32]) -> Result<(), ChecksumTableError> {
        if crcs.len() != self.entries.len() {
            return Err(ChecksumTableError::LengthMismatch {
                expected: crcs.len(),
                found: self.entries.len(),
            });
        }

        for (archive, (entry, &expected)) in self.entries.iter().zip(crcs).enumerate() {
            if entry.crc != expected {
                return Err(ChecksumTableError::ChecksumMismatch {
                    archive,
                    expected,
                    found: entry.crc,
                });
            }
        }

        Ok(())
    }

    pub fn encode(&self) -> Result<Vec<u8>, ChecksumTableError> {
        let mut buf = Vec::with_capacity(self.entries.len() * 8);

        for entry in &self.entries {
            buf.write_u32(entry.crc)?;
            buf.write_i32(entry.revision)?;
        }

        Ok(buf)
    }
}
