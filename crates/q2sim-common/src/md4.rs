// md4.rs - map checksums

use md4::{Digest, Md4};

/// Folds the MD4 digest of `data` into one word by XORing its four
/// little-endian 32-bit parts. Clients compare this against their own copy
/// of the map to detect mismatched files.
pub fn block_checksum(data: &[u8]) -> u32 {
    let digest = Md4::digest(data);
    digest
        .chunks_exact(4)
        .map(|w| u32::from_le_bytes([w[0], w[1], w[2], w[3]]))
        .fold(0, |acc, w| acc ^ w)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_folds_known_digest() {
        // MD4("") = 31d6cfe0 d16ae931 b73c59d7 e0c089c0
        let words = [0xe0cfd631u32, 0x31e96ad1, 0xd7593cb7, 0xc089c0e0];
        assert_eq!(block_checksum(&[]), words.iter().fold(0, |a, w| a ^ w));
    }

    #[test]
    fn checksum_depends_on_content() {
        assert_ne!(block_checksum(b"base1"), block_checksum(b"base2"));
        assert_eq!(block_checksum(b"base1"), block_checksum(b"base1"));
    }
}
