use crate::Cache;
use std::{ffi::CStr, os::raw::c_char, ptr};
use tracing::warn;

/// Open a cache at the given path
///
/// # Arguments
///
/// * `path` - The path to the cache
///
/// # Returns
///
/// A pointer to the cache, or null if the path is invalid or the cache could not be opened
///
/// # Safety
///
/// `path` must be null or point to a valid nul-terminated string.
#[no_mangle]
pub unsafe extern "C" fn cache_open(path: *const c_char) -> *mut Cache {
    if path.is_null() {
        return ptr::null_mut();
    }

    let path_str = match CStr::from_ptr(path).to_str() {
        Ok(path_str) => path_str,
        Err(err) => {
            warn!("cache path is not valid UTF-8: {}", err);
            return ptr::null_mut();
        }
    };

    match Cache::open(path_str) {
        Ok(cache) => Box::into_raw(Box::new(cache)),
        Err(err) => {
            warn!("failed to open cache at {}: {}", path_str, err);
            ptr::null_mut()
        }
    }
}

unsafe fn xtea_keys(xtea_keys_arg: *const [u32; 4]) -> Option<[u32; 4]> {
    if xtea_keys_arg.is_null() {
        None
    } else {
        Some(*xtea_keys_arg)
    }
}

unsafe fn into_raw_buffer(buf: Vec<u8>, out_len: *mut u32) -> *mut u8 {
    let buf = buf.into_boxed_slice();
    if !out_len.is_null() {
        *out_len = buf.len() as u32;
    }
    Box::into_raw(buf) as *mut u8
}

/// Read a file from the cache
///
/// # Arguments
///
/// * `cache_ptr` - The cache to read from
/// * `archive` - The archive to read from
/// * `group` - The group to read from
/// * `file` - The file to read
/// * `xtea_keys` - The optional XTEA keys to use for decryption
/// * `out_len` - The length of the returned buffer
///
/// # Returns
///
/// The function returns a pointer to the buffer containing the file data, where the length is stored in the `out_len` variable.
/// The caller is responsible for freeing the buffer using the function `cache_free`.
/// Null is returned if the file could not be read.
///
/// # Safety
///
/// `cache_ptr` must come from `cache_open`, `xtea_keys_arg` must be null or
/// point to four words and `out_len` must be valid for writes.
#[no_mangle]
pub unsafe extern "C" fn cache_read(
    cache_ptr: *mut Cache,
    archive: u8,
    group: u32,
    file: u32,
    xtea_keys_arg: *const [u32; 4],
    out_len: *mut u32,
) -> *mut u8 {
    let cache = match cache_ptr.as_mut() {
        Some(cache) => cache,
        None => return ptr::null_mut(),
    };

    match cache.read(archive, group, file, xtea_keys(xtea_keys_arg)) {
        Ok(buf) => into_raw_buffer(buf, out_len),
        Err(err) => {
            warn!("failed reading {}/{}/{}: {}", archive, group, file, err);
            ptr::null_mut()
        }
    }
}

/// Read a named group from the cache
///
/// # Arguments
///
/// * `cache_ptr` - The cache to read from
/// * `archive` - The archive to read from
/// * `group` - The name of the group to read from
/// * `file` - The file to read
/// * `xtea_keys` - The optional XTEA keys to use for decryption
/// * `out_len` - The length of the returned buffer
///
/// # Returns
///
/// Same as `cache_read`.
///
/// # Safety
///
/// As for `cache_read`; `group` must point to a valid nul-terminated string.
#[no_mangle]
pub unsafe extern "C" fn cache_read_named_group(
    cache_ptr: *mut Cache,
    archive: u8,
    group: *const c_char,
    file: u32,
    xtea_keys_arg: *const [u32; 4],
    out_len: *mut u32,
) -> *mut u8 {
    let cache = match cache_ptr.as_mut() {
        Some(cache) => cache,
        None => return ptr::null_mut(),
    };

    if group.is_null() {
        return ptr::null_mut();
    }

    let group_str = match CStr::from_ptr(group).to_str() {
        Ok(group_str) => group_str,
        Err(err) => {
            warn!("group name is not valid UTF-8: {}", err);
            return ptr::null_mut();
        }
    };

    match cache.read_named_group(archive, group_str, file, xtea_keys(xtea_keys_arg)) {
        Ok(buf) => into_raw_buffer(buf, out_len),
        Err(err) => {
            warn!("failed reading {}/{}/{}: {}", archive, group_str, file, err);
            ptr::null_mut()
        }
    }
}

/// Free a buffer returned by cache read functions
///
/// # Arguments
///
/// * `buffer` - The buffer to free
/// * `len` - The length reported through `out_len` when the buffer was returned
///
/// # Safety
///
/// The caller must ensure that the pointer and length came from one of the
/// read functions and that the buffer is freed only once.
#[no_mangle]
pub unsafe extern "C" fn cache_free(buffer: *mut u8, len: u32) {
    if !buffer.is_null() {
        drop(Box::from_raw(ptr::slice_from_raw_parts_mut(
            buffer,
            len as usize,
        )))
    }
}

/// Close a cache
///
/// # Arguments
///
/// * `cache_ptr` - The cache to close
///
/// # Safety
///
/// This function is unsafe because it dereferences the pointer to the cache.
///
/// - The caller must ensure that the pointer is valid.
/// - The caller should also ensure that the cache is not used after it has been closed.
#[no_mangle]
pub unsafe extern "C" fn cache_close(cache_ptr: *mut Cache) {
    if !cache_ptr.is_null() {
        drop(Box::from_raw(cache_ptr))
    }
}
