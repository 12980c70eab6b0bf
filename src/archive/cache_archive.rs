use super::{Archive, ArchiveError};
use crate::{
    cache::CacheOptions,
    digest::whirlpool,
    group::{Js5Entry, Unpacked},
    js5_compression::Container,
    js5_index::{Js5Group, Js5Index},
};
use std::collections::HashMap;
use tracing::{trace, warn};

/// An archive with its decoded index and a bounded memo of unpacked groups.
pub struct CacheArchive {
    pub archive: u8,
    pub index: Js5Index,
    options: CacheOptions,
    unpacked_cache: HashMap<u32, Unpacked>,
}

impl CacheArchive {
    pub fn new(archive: u8, index: Js5Index, options: CacheOptions) -> CacheArchive {
        if options.verify_digests && !index.has_digests {
            warn!("archive {} has no digests, skipping digest checks", archive);
        }

        CacheArchive {
            archive,
            index,
            options,
            unpacked_cache: HashMap::new(),
        }
    }

    fn group(&self, group: u32) -> Result<&Js5Group, ArchiveError> {
        self.index.group(group).ok_or(ArchiveError::GroupNotFound {
            archive: self.archive,
            group,
        })
    }

    fn unpack(&self, group: &Js5Group, key: Option<[u32; 4]>) -> Result<Unpacked, ArchiveError> {
        group.unpack_with(key, |container, data| {
            if let Some(container) = container {
                self.verify_compressed(group, container)?;
            }
            self.verify_uncompressed(group, data)
        })
    }

    fn file(&mut self, group: u32, file: u32, key: Option<[u32; 4]>) -> Result<&[u8], ArchiveError> {
        let archive = self.archive;

        self.get_unpacked(group, key)?
            .file(file)
            .map(|file| file.data.as_slice())
            .ok_or(ArchiveError::FileNotFound {
                archive,
                group,
                file,
            })
    }
}

impl Archive for CacheArchive {
    fn read(
        &mut self,
        group: u32,
        file: u32,
        key: Option<[u32; 4]>,
    ) -> Result<Vec<u8>, ArchiveError> {
        Ok(self.file(group, file, key)?.to_vec())
    }

    fn read_named_group(
        &mut self,
        name_hash: i32,
        file: u32,
        key: Option<[u32; 4]>,
    ) -> Result<Vec<u8>, ArchiveError> {
        let group = self
            .index
            .group_by_name_hash(name_hash)
            .ok_or(ArchiveError::NamedGroupNotFound {
                archive: self.archive,
                name_hash,
            })?
            .id;

        self.read(group, file, key)
    }

    fn read_entry(
        &mut self,
        group: u32,
        file: u32,
        entry: u32,
        entry_count: usize,
        key: Option<[u32; 4]>,
    ) -> Result<Js5Entry, ArchiveError> {
        let archive = self.archive;

        let file = self
            .get_unpacked(group, key)?
            .file(file)
            .ok_or(ArchiveError::FileNotFound {
                archive,
                group,
                file,
            })?;

        Ok(file.entry(entry, entry_count)?)
    }

    fn get_unpacked(
        &mut self,
        group: u32,
        key: Option<[u32; 4]>,
    ) -> Result<&Unpacked, ArchiveError> {
        let cached = self
            .unpacked_cache
            .get(&group)
            .map_or(false, |unpacked| unpacked.key == key);

        if !cached {
            let unpacked = self.unpack(self.group(group)?, key)?;

            if self.unpacked_cache.len() >= self.options.unpacked_cache_size {
                trace!("unpacked cache of archive {} full, clearing", self.archive);
                self.unpacked_cache.clear();
            }

            self.unpacked_cache.insert(group, unpacked);
        }

        self.unpacked_cache
            .get(&group)
            .ok_or(ArchiveError::GroupNotFound {
                archive: self.archive,
                group,
            })
    }

    fn verify_compressed(&self, group: &Js5Group, container: &Container) -> Result<(), ArchiveError> {
        if self.options.verify_checksums && container.crc != group.crc {
            return Err(ArchiveError::ChecksumMismatch {
                archive: self.archive,
                group: group.id,
                expected: group.crc,
                found: container.crc,
            });
        }

        if !self.options.verify_digests {
            return Ok(());
        }

        if let Some(expected) = group.digest {
            let packed = &group.raw[..container.packed_len.min(group.raw.len())];
            if whirlpool(packed) != expected {
                return Err(ArchiveError::DigestMismatch {
                    archive: self.archive,
                    group: group.id,
                });
            }
        }

        Ok(())
    }

    fn verify_uncompressed(&self, group: &Js5Group, buf: &[u8]) -> Result<(), ArchiveError> {
        if !self.options.verify_checksums || !self.index.has_uncompressed_checksums {
            return Ok(());
        }

        let found = crc32fast::hash(buf);
        if found != group.uncompressed_crc {
            return Err(ArchiveError::UncompressedChecksumMismatch {
                archive: self.archive,
                group: group.id,
                expected: group.uncompressed_crc,
                found,
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{js5_compression::Compression, js5_index::Js5IndexError};
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };
    use tracing::{Event, Level, Subscriber};
    use tracing_subscriber::{
        layer::{Context, SubscriberExt},
        Layer, Registry,
    };

    struct WarnCounter(Arc<AtomicUsize>);

    impl<S: Subscriber> Layer<S> for WarnCounter {
        fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
            if *event.metadata().level() == Level::WARN {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    // protocol 5, no flags, groups 0 and 1 with a single file each, zero CRCs
    const TABLE: [u8; 32] = [
        5, 0, 0, 2, 0, 0, 0, 1, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 1, 0, 1, 0, 0,
        0, 0,
    ];

    fn index() -> Js5Index {
        let container = Container {
            data: TABLE.to_vec(),
            compression: Compression::None,
            revision: -1,
            crc: 0,
            packed_len: TABLE.len(),
        };

        Js5Index::decode(0, &container, [0; 64], |_, _| {
            let mut raw = vec![0, 0, 0, 0, 7];
            raw.extend(b"OpenRS2");
            Ok::<_, Js5IndexError>(raw)
        })
        .unwrap()
    }

    fn options(verify_checksums: bool, verify_digests: bool) -> CacheOptions {
        CacheOptions {
            verify_checksums,
            verify_digests,
            ..CacheOptions::default()
        }
    }

    #[test]
    fn test_missing_digests_warned_once() {
        let warnings = Arc::new(AtomicUsize::new(0));
        let subscriber = Registry::default().with(WarnCounter(warnings.clone()));

        tracing::subscriber::with_default(subscriber, || {
            let mut archive = CacheArchive::new(0, index(), options(false, true));

            for group in [0, 1] {
                assert_eq!(b"OpenRS2".to_vec(), archive.read(group, 0, None).unwrap());
            }
            // another key unpacks group 0 again
            assert!(archive.read(0, 0, Some([1, 2, 3, 4])).is_ok());
        });

        assert_eq!(1, warnings.load(Ordering::SeqCst));
    }

    #[test]
    fn test_unpack_checks_container_crc() {
        let mut archive = CacheArchive::new(0, index(), options(true, false));

        assert!(matches!(
            archive.read(1, 0, None),
            Err(ArchiveError::ChecksumMismatch {
                archive: 0,
                group: 1,
                expected: 0,
                ..
            })
        ));

        let mut archive = CacheArchive::new(0, index(), CacheOptions::default());
        assert_eq!(b"OpenRS2".to_vec(), archive.read(1, 0, None).unwrap());
    }
}
