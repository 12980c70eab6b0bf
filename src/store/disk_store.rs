use super::{
    index_store::{IndexStore, IndexStoreError},
    sector_store::{SectorStore, SectorStoreError},
    Store, StoreError, DATA_PATH, INDEX_PATH, MASTER_INDEX,
};
use crate::cache::ErrorKind;
use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};
use thiserror::Error;
use tracing::{debug, trace};

#[derive(Error, Debug)]
pub enum DiskStoreError {
    #[error("data file {0} not found")]
    MissingDataFile(PathBuf),
    #[error("index file {path} for archive {archive} not found")]
    MissingIndexFile { archive: u8, path: PathBuf },
    #[error("sector store error: {0}")]
    Sector(#[from] SectorStoreError),
    #[error("index store error: {0}")]
    Index(#[from] IndexStoreError),
}

impl DiskStoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::MissingDataFile(_) | Self::MissingIndexFile { .. } => ErrorKind::NotFound,
            Self::Sector(err) => err.kind(),
            Self::Index(err) => err.kind(),
        }
    }
}

/// A cache directory on disk: one data file plus one index file per archive.
pub struct DiskStore {
    root: PathBuf,
    data: SectorStore,
    master: IndexStore,
    indexes: BTreeMap<u8, IndexStore>,
}

impl DiskStore {
    /// Open the cache at `path`.
    ///
    /// The master index is walked and every archive with a live record gets
    /// its own index file opened.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<DiskStore, DiskStoreError> {
        let root = path.as_ref().to_path_buf();

        let data_path = root.join(DATA_PATH);
        if !data_path.exists() {
            return Err(DiskStoreError::MissingDataFile(data_path));
        }

        let master_path = index_path(&root, MASTER_INDEX);
        if !master_path.exists() {
            return Err(DiskStoreError::MissingIndexFile {
                archive: MASTER_INDEX,
                path: master_path,
            });
        }

        let data = SectorStore::open(data_path)?;
        let master = IndexStore::open(MASTER_INDEX, master_path)?;

        let mut indexes = BTreeMap::new();
        for ordinal in 0..master.record_count() {
            let archive = match u8::try_from(ordinal) {
                Ok(archive) if archive != MASTER_INDEX => archive,
                _ => break,
            };

            let locator = master.load_locator(ordinal)?;
            if locator.start_sector == 0 {
                continue;
            }

            let path = index_path(&root, archive);
            if !path.exists() {
                return Err(DiskStoreError::MissingIndexFile { archive, path });
            }

            trace!("opening index {} ({:?})", archive, locator);
            indexes.insert(archive, IndexStore::open(archive, path)?);
        }

        debug!("Loaded {} indices from {}", indexes.len(), root.display());

        Ok(DiskStore {
            root,
            data,
            master,
            indexes,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn index(&self, archive: u8) -> Result<&IndexStore, StoreError> {
        if archive == MASTER_INDEX {
            return Ok(&self.master);
        }

        self.indexes
            .get(&archive)
            .ok_or(StoreError::ArchiveNotFound(archive))
    }
}

fn index_path(root: &Path, archive: u8) -> PathBuf {
    root.join(format!("{INDEX_PATH}{archive}"))
}

impl Store for DiskStore {
    fn list(&self, archive: u8) -> Result<Vec<u32>, StoreError> {
        Ok(self.index(archive)?.list())
    }

    fn read(&self, archive: u8, group: u32) -> Result<Vec<u8>, StoreError> {
        let locator = self.index(archive)?.load_locator(group)?;
        trace!("reading group {} of archive {}: {:?}", group, archive, locator);

        Ok(self.data.read(archive, group, locator)?)
    }
}
