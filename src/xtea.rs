use byteorder::BE;
use extended_tea::XTEA;

const BLOCK_SIZE: usize = 8;

/// Decipher `input` with the 32 round XTEA cipher.
///
/// Only whole 8-byte blocks are enciphered; trailing bytes pass through.
pub fn xtea_decipher(input: &[u8], key: &[u32; 4]) -> Vec<u8> {
    let mut output = input.to_vec();
    let len = input.len() / BLOCK_SIZE * BLOCK_SIZE;

    if len > 0 {
        XTEA::new(key).decipher_u8slice::<BE>(&input[..len], &mut output[..len]);
    }

    output
}

#[cfg(test)]
pub(crate) fn xtea_encipher(input: &[u8], key: &[u32; 4]) -> Vec<u8> {
    let mut output = input.to_vec();
    let len = input.len() / BLOCK_SIZE * BLOCK_SIZE;

    if len > 0 {
        XTEA::new(key).encipher_u8slice::<BE>(&input[..len], &mut output[..len]);
    }

    output
}
