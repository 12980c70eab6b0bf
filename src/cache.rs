use crate::{
    archive::{cache_archive::CacheArchive, Archive, ArchiveError},
    digest::whirlpool,
    djb2::djb2_hash,
    group::{GroupError, Js5Entry},
    js5_compression::{Js5Compression, Js5CompressionError},
    js5_index::{Js5Index, Js5IndexError},
    store::{disk_store::DiskStoreError, store_open, Store, StoreError, MASTER_INDEX},
};
use std::{collections::HashMap, io, path::Path};
use thiserror::Error;
use tracing::debug;

/// Group of the master index holding the bootstrap reference table.
pub const BOOTSTRAP_GROUP: u32 = 28;

const UNPACKED_CACHE_SIZE_DEFAULT: usize = 1024;

/// Coarse classification shared by every error in the crate.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The bytes are not in a format this crate understands.
    Format,
    /// The bytes claim to be in a known format but contradict themselves.
    Corruption,
    NotFound,
    Io,
}

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("disk store error: {0}")]
    DiskStore(#[from] DiskStoreError),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("JS5 compression error: {0}")]
    Js5Compression(#[from] Js5CompressionError),
    #[error("JS5 index error: {0}")]
    Js5Index(#[from] Js5IndexError),
    #[error("group error: {0}")]
    Group(#[from] GroupError),
    #[error("archive error: {0}")]
    Archive(#[from] ArchiveError),
    #[error("archive {0} not found in cache")]
    ArchiveNotFound(u8),
}

impl CacheError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Io(_) => ErrorKind::Io,
            Self::DiskStore(err) => err.kind(),
            Self::Store(err) => err.kind(),
            Self::Js5Compression(err) => err.kind(),
            Self::Js5Index(err) => err.kind(),
            Self::Group(err) => err.kind(),
            Self::Archive(err) => err.kind(),
            Self::ArchiveNotFound(_) => ErrorKind::NotFound,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct CacheOptions {
    /// Compare container CRCs with the reference table.
    pub verify_checksums: bool,
    /// Compare Whirlpool digests of packed groups with the reference table.
    pub verify_digests: bool,
    /// Unpacked groups memoized per archive before the memo is cleared.
    pub unpacked_cache_size: usize,
}

impl Default for CacheOptions {
    fn default() -> Self {
        CacheOptions {
            verify_checksums: false,
            verify_digests: false,
            unpacked_cache_size: UNPACKED_CACHE_SIZE_DEFAULT,
        }
    }
}

pub struct Cache {
    store: Box<dyn Store + Send + Sync>,
    options: CacheOptions,
    archive_ids: Vec<u8>,
    archives: HashMap<u8, CacheArchive>,
}

impl Cache {
    /// Open a cache from a path
    ///
    /// # Arguments
    ///
    /// * `input_path` - The directory holding the data and index files
    pub fn open<P: AsRef<Path>>(input_path: P) -> Result<Cache, CacheError> {
        Self::open_with_options(input_path, CacheOptions::default())
    }

    pub fn open_with_options<P: AsRef<Path>>(
        input_path: P,
        options: CacheOptions,
    ) -> Result<Cache, CacheError> {
        Self::open_with_store(store_open(input_path)?, options)
    }

    /// Open a cache from a store
    ///
    /// # Arguments
    ///
    /// * `store` - The store to use
    /// * `options` - Verification and memoization settings
    pub fn open_with_store(
        store: Box<dyn Store + Send + Sync>,
        options: CacheOptions,
    ) -> Result<Cache, CacheError> {
        let archive_ids: Vec<u8> = store
            .list(MASTER_INDEX)?
            .into_iter()
            .filter_map(|archive| u8::try_from(archive).ok())
            .filter(|&archive| archive != MASTER_INDEX)
            .collect();

        debug!("Found {} archives: {:?}", archive_ids.len(), archive_ids);

        Ok(Cache {
            store,
            options,
            archive_ids,
            archives: HashMap::new(),
        })
    }

    pub fn options(&self) -> &CacheOptions {
        &self.options
    }

    /// Ids of every archive with a reference table in the master index.
    pub fn archives(&self) -> &[u8] {
        &self.archive_ids
    }

    /// The reference table of `archive`, decoded on first use.
    pub fn index(&mut self, archive: u8) -> Result<&Js5Index, CacheError> {
        Ok(&self.archive(archive)?.index)
    }

    fn archive(&mut self, archive: u8) -> Result<&mut CacheArchive, CacheError> {
        if !self.archives.contains_key(&archive) {
            let index = self.load_index(archive)?;
            self.archives
                .insert(archive, CacheArchive::new(archive, index, self.options));
        }

        self.archives
            .get_mut(&archive)
            .ok_or(CacheError::ArchiveNotFound(archive))
    }

    fn load_index(&self, archive: u8) -> Result<Js5Index, CacheError> {
        if !self.archive_ids.contains(&archive) {
            return Err(CacheError::ArchiveNotFound(archive));
        }

        let raw = self.read_raw(MASTER_INDEX, archive as u32)?;
        if raw.is_empty() {
            return Err(CacheError::ArchiveNotFound(archive));
        }

        let digest = whirlpool(&raw);
        let container = Js5Compression::uncompress(&raw, None)?;

        // Tables may declare groups that were never written to the index file.
        let index = Js5Index::decode(archive, &container, digest, |_, group| {
            match self.store.read(archive, group) {
                Ok(raw) => Ok(raw),
                Err(err) if err.is_beyond_index() => Ok(Vec::new()),
                Err(err) => Err(CacheError::from(err)),
            }
        })?;

        debug!(
            "Decoded index {} (protocol {:?}, revision {}, {} groups)",
            archive,
            index.protocol,
            index.revision,
            index.len()
        );

        Ok(index)
    }

    /// Raw, still packed, bytes of a group. A record that points at no
    /// sector comes back empty; a record past the end of the index file or a
    /// missing archive is an error.
    pub fn read_raw(&self, archive: u8, group: u32) -> Result<Vec<u8>, CacheError> {
        Ok(self.store.read(archive, group)?)
    }

    /// The fixed bootstrap record of the master index.
    pub fn read_bootstrap_table(&self) -> Result<Vec<u8>, CacheError> {
        self.read_raw(MASTER_INDEX, BOOTSTRAP_GROUP)
    }

    /// Read a file from the cache
    ///
    /// # Arguments
    ///
    /// * `archive` - The archive to read from
    /// * `group` - The group to read from
    /// * `file` - The file to read
    /// * `xtea_keys` - The XTEA keys to use for decryption. If None, the file will not be decrypted
    pub fn read(
        &mut self,
        archive: u8,
        group: u32,
        file: u32,
        xtea_keys: Option<[u32; 4]>,
    ) -> Result<Vec<u8>, CacheError> {
        Ok(self.archive(archive)?.read(group, file, xtea_keys)?)
    }

    /// Read a file from the cache using a named group
    ///
    /// # Arguments
    ///
    /// * `archive` - The archive to read from
    /// * `group` - The name of the group to read from
    /// * `file` - The file to read
    /// * `xtea_keys` - The XTEA keys to use for decryption. If None, the file will not be decrypted
    pub fn read_named_group(
        &mut self,
        archive: u8,
        group: &str,
        file: u32,
        xtea_keys: Option<[u32; 4]>,
    ) -> Result<Vec<u8>, CacheError> {
        Ok(self
            .archive(archive)?
            .read_named_group(djb2_hash(group), file, xtea_keys)?)
    }

    /// Read one entry of a file that packs `entry_count` entries.
    pub fn read_entry(
        &mut self,
        archive: u8,
        group: u32,
        file: u32,
        entry: u32,
        entry_count: usize,
        xtea_keys: Option<[u32; 4]>,
    ) -> Result<Js5Entry, CacheError> {
        Ok(self
            .archive(archive)?
            .read_entry(group, file, entry, entry_count, xtea_keys)?)
    }
}
