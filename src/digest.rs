use whirlpool::{Digest, Whirlpool};

pub const DIGEST_SIZE: usize = 64;

/// Whirlpool hash of `data`, as stored in reference tables.
pub fn whirlpool(data: &[u8]) -> [u8; DIGEST_SIZE] {
    let mut digest = [0; DIGEST_SIZE];
    digest.copy_from_slice(&Whirlpool::digest(data));
    digest
}
