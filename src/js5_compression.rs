use crate::{cache::ErrorKind, xtea::xtea_decipher};
use bzip2::read::BzDecoder;
use crc32fast::Hasher;
use flate2::bufread::GzDecoder;
use osrs_bytes::ReadExt;
use std::io::{self, Read};
use thiserror::Error;

const COMPRESSION_TYPE_NONE: u8 = 0;
const COMPRESSION_TYPE_BZIP: u8 = 1;
const COMPRESSION_TYPE_GZIP: u8 = 2;

const HEADER_SIZE: usize = 5;
const UNCOMPRESSED_LENGTH_SIZE: usize = 4;

/// Anything larger is treated as a corrupt envelope.
const MAX_LENGTH: i32 = 2_000_000;

#[derive(Error, Debug)]
pub enum Js5CompressionError {
    #[error("missing header")]
    MissingHeader,
    #[error("invalid length {0}")]
    InvalidLength(i32),
    #[error("unknown compression type {0}")]
    UnknownCompressionType(u8),
    #[error("data truncated (expected {expected} bytes, found {found})")]
    Truncated { expected: usize, found: usize },
    #[error("uncompressed length is negative: {0}")]
    NegativeUncompressedLength(i32),
    #[error("size mismatch (expected {expected} bytes, found {found})")]
    SizeMismatch { expected: usize, found: usize },
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

impl Js5CompressionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::MissingHeader | Self::InvalidLength(_) | Self::UnknownCompressionType(_) => {
                ErrorKind::Format
            }
            Self::Io(_) => ErrorKind::Io,
            _ => ErrorKind::Corruption,
        }
    }

    /// The input was rejected before any payload was looked at, meaning it is
    /// most likely not a container at all.
    pub fn is_envelope_rejection(&self) -> bool {
        matches!(
            self,
            Self::MissingHeader | Self::InvalidLength(_) | Self::UnknownCompressionType(_)
        )
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum Compression {
    #[default]
    None,
    Bzip2,
    Gzip,
}

impl From<Compression> for u8 {
    fn from(compression: Compression) -> Self {
        match compression {
            Compression::None => COMPRESSION_TYPE_NONE,
            Compression::Bzip2 => COMPRESSION_TYPE_BZIP,
            Compression::Gzip => COMPRESSION_TYPE_GZIP,
        }
    }
}

impl TryFrom<u8> for Compression {
    type Error = Js5CompressionError;

    fn try_from(type_id: u8) -> Result<Self, Self::Error> {
        match type_id {
            COMPRESSION_TYPE_NONE => Ok(Self::None),
            COMPRESSION_TYPE_BZIP => Ok(Self::Bzip2),
            COMPRESSION_TYPE_GZIP => Ok(Self::Gzip),
            _ => Err(Js5CompressionError::UnknownCompressionType(type_id)),
        }
    }
}

/// A decoded container along with its envelope metadata.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Container {
    pub data: Vec<u8>,
    pub compression: Compression,
    /// Trailing revision, -1 when absent.
    pub revision: i32,
    /// CRC32 of the envelope header and the packed payload.
    pub crc: u32,
    /// Number of input bytes covered by `crc`.
    pub packed_len: usize,
}

pub struct Js5Compression {}

impl Js5Compression {
    /// Strip the envelope off `input`, decipher it with `xtea_keys` if given,
    /// and decompress it.
    pub fn uncompress<T: AsRef<[u8]>>(
        input: T,
        xtea_keys: Option<[u32; 4]>,
    ) -> Result<Container, Js5CompressionError> {
        let input = input.as_ref();

        if input.len() < HEADER_SIZE {
            return Err(Js5CompressionError::MissingHeader);
        }

        let mut header = &input[..HEADER_SIZE];
        let type_id = header.read_u8()?;
        let len = header.read_i32()?;
        if !(0..=MAX_LENGTH).contains(&len) {
            return Err(Js5CompressionError::InvalidLength(len));
        }

        let compression = Compression::try_from(type_id)?;

        let mut crc = Hasher::new();
        crc.update(&input[..HEADER_SIZE]);

        let body = &input[HEADER_SIZE..];
        let packed_len = match compression {
            Compression::None => len as usize,
            _ => len as usize + UNCOMPRESSED_LENGTH_SIZE,
        };

        let packed = body
            .get(..packed_len)
            .ok_or(Js5CompressionError::Truncated {
                expected: packed_len,
                found: body.len(),
            })?;
        crc.update(packed);

        let plain_text = Self::decrypt(packed, xtea_keys);

        if compression == Compression::None {
            return Ok(Container {
                data: plain_text,
                compression,
                revision: -1,
                crc: crc.finalize(),
                packed_len: HEADER_SIZE + packed_len,
            });
        }

        let revision = match body.get(packed_len..packed_len + 2) {
            Some(mut trailer) => trailer.read_u16()? as i32,
            None => -1,
        };

        let mut plain_text_ref = plain_text.as_slice();
        let uncompressed_len = plain_text_ref.read_i32()?;
        if uncompressed_len < 0 {
            return Err(Js5CompressionError::NegativeUncompressedLength(
                uncompressed_len,
            ));
        }

        let data = match compression {
            Compression::Bzip2 => decompress_bzip2(plain_text_ref, uncompressed_len as usize)?,
            Compression::Gzip => decompress_gzip(plain_text_ref, uncompressed_len as usize)?,
            Compression::None => plain_text_ref.to_vec(),
        };

        Ok(Container {
            data,
            compression,
            revision,
            crc: crc.finalize(),
            packed_len: HEADER_SIZE + packed_len,
        })
    }

    fn decrypt(input: &[u8], xtea_keys: Option<[u32; 4]>) -> Vec<u8> {
        match xtea_keys {
            Some(xtea_keys) => xtea_decipher(input, &xtea_keys),
            None => input.to_vec(),
        }
    }
}

// Read at most one byte past `expected` so a lying length cannot balloon the output.
fn read_bounded<R: Read>(decoder: R, expected: usize) -> Result<Vec<u8>, Js5CompressionError> {
    let mut decompressed = Vec::new();
    decoder
        .take(expected as u64 + 1)
        .read_to_end(&mut decompressed)?;

    if decompressed.len() != expected {
        return Err(Js5CompressionError::SizeMismatch {
            expected,
            found: decompressed.len(),
        });
    }

    Ok(decompressed)
}

// The stored bzip2 stream lacks its magic and block size.
fn decompress_bzip2(payload: &[u8], expected: usize) -> Result<Vec<u8>, Js5CompressionError> {
    let mut compressed = Vec::with_capacity(payload.len() + 4);
    compressed.extend(b"BZh1");
    compressed.extend(payload);

    read_bounded(BzDecoder::new(compressed.as_slice()), expected)
}

fn decompress_gzip(payload: &[u8], expected: usize) -> Result<Vec<u8>, Js5CompressionError> {
    read_bounded(GzDecoder::new(payload), expected)
}
