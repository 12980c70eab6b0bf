#![allow(dead_code)]

use byteorder::BE;
use extended_tea::XTEA;
use std::{collections::BTreeMap, fs, io::Write};
use tempfile::TempDir;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

pub const KEY: [u32; 4] = [0x00112233, 0x44556677, 0x8899AABB, 0xCCDDEEFF];

const SECTOR_SIZE: usize = 520;

pub fn setup_tracing() {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::TRACE)
        .with_test_writer()
        .finish();

    tracing::subscriber::set_global_default(subscriber).ok();
}

/// Lays groups out in sector chains and writes the data and index files
/// into a temporary directory.
#[derive(Default)]
pub struct CacheBuilder {
    groups: BTreeMap<(u8, u32), Vec<u8>>,
}

impl CacheBuilder {
    pub fn new() -> CacheBuilder {
        CacheBuilder::default()
    }

    pub fn put(mut self, archive: u8, group: u32, data: Vec<u8>) -> CacheBuilder {
        self.groups.insert((archive, group), data);
        self
    }

    pub fn write(&self) -> TempDir {
        let dir = TempDir::new().unwrap();

        // sector 0 is never allocated
        let mut dat = vec![0; SECTOR_SIZE];
        let mut indexes: BTreeMap<u8, Vec<u8>> = BTreeMap::from([(255, Vec::new())]);

        for (&(archive, group), data) in &self.groups {
            let sector = if data.is_empty() {
                0
            } else {
                write_chain(&mut dat, archive, group, data)
            };

            let index = indexes.entry(archive).or_default();
            let pos = group as usize * 6;
            if index.len() < pos + 6 {
                index.resize(pos + 6, 0);
            }
            index[pos..pos + 3].copy_from_slice(&(data.len() as u32).to_be_bytes()[1..]);
            index[pos + 3..pos + 6].copy_from_slice(&sector.to_be_bytes()[1..]);
        }

        // every archive referenced by the master index needs its own file
        let master = indexes[&255].clone();
        for (archive, record) in master.chunks(6).enumerate() {
            if archive < 255 && record[3..6] != [0, 0, 0] {
                indexes.entry(archive as u8).or_default();
            }
        }

        fs::write(dir.path().join("main_file_cache.dat2"), dat).unwrap();
        for (archive, index) in indexes {
            fs::write(
                dir.path().join(format!("main_file_cache.idx{archive}")),
                index,
            )
            .unwrap();
        }

        dir
    }
}

fn write_chain(dat: &mut Vec<u8>, archive: u8, group: u32, data: &[u8]) -> u32 {
    let extended = group > 0xFFFF;
    let header_size = if extended { 10 } else { 8 };
    let chunks: Vec<&[u8]> = data.chunks(SECTOR_SIZE - header_size).collect();

    let first = (dat.len() / SECTOR_SIZE) as u32;
    for (part, chunk) in chunks.iter().enumerate() {
        let sector = first + part as u32;
        let next = if part + 1 == chunks.len() { 0 } else { sector + 1 };

        let mut buf = Vec::with_capacity(SECTOR_SIZE);
        if extended {
            buf.extend(group.to_be_bytes());
        } else {
            buf.extend((group as u16).to_be_bytes());
        }
        buf.extend((part as u16).to_be_bytes());
        buf.extend(&next.to_be_bytes()[1..]);
        buf.push(archive);
        buf.extend(*chunk);
        buf.resize(SECTOR_SIZE, 0);

        dat.extend(buf);
    }

    first
}

pub fn encipher(data: &[u8], key: &[u32; 4]) -> Vec<u8> {
    let mut output = data.to_vec();
    let len = data.len() / 8 * 8;
    if len > 0 {
        XTEA::new(key).encipher_u8slice::<BE>(&data[..len], &mut output[..len]);
    }
    output
}

fn envelope(type_id: u8, len: usize, body: Vec<u8>, revision: Option<u16>) -> Vec<u8> {
    let mut buf = vec![type_id];
    buf.extend((len as i32).to_be_bytes());
    buf.extend(body);
    if let Some(revision) = revision {
        buf.extend(revision.to_be_bytes());
    }
    buf
}

pub fn container_none(data: &[u8], key: Option<[u32; 4]>) -> Vec<u8> {
    let body = match key {
        Some(key) => encipher(data, &key),
        None => data.to_vec(),
    };
    envelope(0, data.len(), body, None)
}

fn compressed(
    type_id: u8,
    data: &[u8],
    compressed: Vec<u8>,
    key: Option<[u32; 4]>,
    revision: Option<u16>,
) -> Vec<u8> {
    let mut body = (data.len() as u32).to_be_bytes().to_vec();
    body.extend(&compressed);
    if let Some(key) = key {
        body = encipher(&body, &key);
    }
    envelope(type_id, compressed.len(), body, revision)
}

pub fn container_gzip(data: &[u8], key: Option<[u32; 4]>, revision: Option<u16>) -> Vec<u8> {
    let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::best());
    encoder.write_all(data).unwrap();
    compressed(2, data, encoder.finish().unwrap(), key, revision)
}

pub fn container_bzip2(data: &[u8], key: Option<[u32; 4]>, revision: Option<u16>) -> Vec<u8> {
    let mut encoder = bzip2::write::BzEncoder::new(Vec::new(), bzip2::Compression::new(1));
    encoder.write_all(data).unwrap();
    let stream = encoder.finish().unwrap();
    // the stored stream has no "BZh1" magic
    compressed(1, data, stream[4..].to_vec(), key, revision)
}

/// Concatenate files and append a single chunk trailer.
pub fn pack_files(files: &[&[u8]]) -> Vec<u8> {
    if files.len() == 1 {
        return files[0].to_vec();
    }

    let mut buf: Vec<u8> = files.concat();
    let mut prev = 0i32;
    for file in files {
        let len = file.len() as i32;
        buf.extend((len - prev).to_be_bytes());
        prev = len;
    }
    buf.push(1);
    buf
}

#[derive(Clone, Debug, Default)]
pub struct TableGroup {
    pub id: u32,
    pub name_hash: i32,
    pub crc: u32,
    pub digest: Option<[u8; 64]>,
    pub revision: i32,
    pub files: Vec<(u32, i32)>,
}

impl TableGroup {
    pub fn new(id: u32, files: &[u32]) -> TableGroup {
        TableGroup {
            id,
            name_hash: -1,
            files: files.iter().map(|&file| (file, -1)).collect(),
            ..Default::default()
        }
    }
}

fn write_smart(buf: &mut Vec<u8>, protocol: u8, value: u32) {
    if protocol >= 7 && value >= 0x8000 {
        buf.extend((value | 0x8000_0000).to_be_bytes());
    } else {
        buf.extend((value as u16).to_be_bytes());
    }
}

/// Encode a reference table. Groups must be sorted by id.
pub fn encode_table(
    protocol: u8,
    revision: i32,
    named: bool,
    digests: bool,
    groups: &[TableGroup],
) -> Vec<u8> {
    let mut buf = vec![protocol];
    if protocol >= 6 {
        buf.extend(revision.to_be_bytes());
    }
    buf.push(named as u8 | (digests as u8) << 1);

    write_smart(&mut buf, protocol, groups.len() as u32);
    let mut prev = 0;
    for group in groups {
        write_smart(&mut buf, protocol, group.id - prev);
        prev = group.id;
    }

    if named {
        for group in groups {
            buf.extend(group.name_hash.to_be_bytes());
        }
    }
    for group in groups {
        buf.extend(group.crc.to_be_bytes());
    }
    if digests {
        for group in groups {
            buf.extend(group.digest.unwrap_or([0; 64]));
        }
    }
    for group in groups {
        buf.extend(group.revision.to_be_bytes());
    }
    for group in groups {
        write_smart(&mut buf, protocol, group.files.len() as u32);
    }
    for group in groups {
        let mut prev = 0;
        for &(file, _) in &group.files {
            write_smart(&mut buf, protocol, file - prev);
            prev = file;
        }
    }
    if named {
        for group in groups {
            for &(_, name_hash) in &group.files {
                buf.extend(name_hash.to_be_bytes());
            }
        }
    }

    buf
}
