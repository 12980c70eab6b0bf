//! Read engine for JS5 caches: sector-chained data files, per-archive index
//! files, compressed containers, reference tables and multi-file groups.

pub mod archive;
pub mod cache;
pub mod checksumtable;
pub mod digest;
pub mod djb2;
pub mod ffi;
pub mod group;
pub mod js5_compression;
pub mod js5_index;
pub mod store;
pub mod xtea;

pub use cache::{Cache, CacheError, CacheOptions, ErrorKind};
pub use ffi::{cache_close, cache_free, cache_open, cache_read, cache_read_named_group};
pub use group::{Js5Entry, Js5File, Unpacked};
pub use js5_index::{Js5Group, Js5Index};
