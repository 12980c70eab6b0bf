use js5cache::{cache_close, cache_free, cache_open, cache_read, cache_read_named_group};
use std::{ffi::CString, ptr, slice};
use tempfile::TempDir;

mod common;

use common::{container_gzip, container_none, encode_table, CacheBuilder, TableGroup, KEY};

fn write_cache() -> TempDir {
    common::setup_tracing();

    let groups = [
        TableGroup {
            name_hash: js5cache::djb2::djb2_hash("OpenRS2"),
            ..TableGroup::new(0, &[0])
        },
        TableGroup::new(1, &[0]),
    ];
    let table = container_gzip(&encode_table(6, 0, true, false, &groups), None, None);

    CacheBuilder::new()
        .put(255, 0, table)
        .put(0, 0, container_none(b"OpenRS2", None))
        .put(0, 1, container_gzip(b"OpenRS2", Some(KEY), None))
        .write()
}

fn open(dir: &TempDir) -> *mut js5cache::Cache {
    let path = CString::new(dir.path().to_str().unwrap()).unwrap();
    unsafe { cache_open(path.as_ptr()) }
}

#[test]
fn test_cache_open() {
    let dir = write_cache();
    let cache_ptr = open(&dir);

    assert!(!cache_ptr.is_null());
    unsafe { cache_close(cache_ptr) };
}

#[test]
fn test_cache_read() {
    let dir = write_cache();
    let cache_ptr = open(&dir);

    let mut out_len = 0;
    let buf = unsafe { cache_read(cache_ptr, 0, 0, 0, ptr::null(), &mut out_len) };
    assert!(!buf.is_null());

    let buf_data = unsafe { slice::from_raw_parts(buf, out_len as usize) };
    assert_eq!("OpenRS2".as_bytes(), buf_data);

    unsafe {
        cache_free(buf, out_len);
        cache_close(cache_ptr);
    }
}

#[test]
fn test_cache_read_encrypted() {
    let dir = write_cache();
    let cache_ptr = open(&dir);

    let mut out_len = 0;
    let buf = unsafe { cache_read(cache_ptr, 0, 1, 0, &KEY, &mut out_len) };
    assert!(!buf.is_null());

    let buf_data = unsafe { slice::from_raw_parts(buf, out_len as usize) };
    assert_eq!("OpenRS2".as_bytes(), buf_data);

    unsafe {
        cache_free(buf, out_len);
        cache_close(cache_ptr);
    }
}

#[test]
fn test_cache_read_named_group() {
    let dir = write_cache();
    let cache_ptr = open(&dir);

    let mut out_len = 0;
    let group_str = CString::new("OpenRS2").unwrap();
    let buf = unsafe {
        cache_read_named_group(
            cache_ptr,
            0,
            group_str.as_ptr(),
            0,
            ptr::null(),
            &mut out_len,
        )
    };
    assert!(!buf.is_null());

    let buf_data = unsafe { slice::from_raw_parts(buf, out_len as usize) };
    assert_eq!("OpenRS2".as_bytes(), buf_data);

    unsafe {
        cache_free(buf, out_len);
        cache_close(cache_ptr);
    }
}

#[test]
fn test_cache_read_missing() {
    let dir = write_cache();
    let cache_ptr = open(&dir);

    let mut out_len = 0;
    let buf = unsafe { cache_read(cache_ptr, 0, 7, 0, ptr::null(), &mut out_len) };
    assert!(buf.is_null());

    unsafe { cache_close(cache_ptr) };
}
