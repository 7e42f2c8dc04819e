/// Register seed of the CRC-32 used by GPT headers and entry arrays.
pub const CRC32_SEED: u32 = 0xFFFF_FFFF;

/// CRC-32/ISO-HDLC (reflected `0xEDB88320`) of `bytes`, starting from the raw register `seed`.
///
/// The result is already XORed with `0xFFFFFFFF`, which makes `crc32(bytes, CRC32_SEED)` the value
/// stored on disk.
#[must_use]
pub fn crc32(bytes: &[u8], seed: u32) -> u32 {
    // crc32fast takes the previous *finalized* value as its starting point.
    let mut hasher = crc32fast::Hasher::new_with_initial(!seed);
    hasher.update(bytes);
    hasher.finalize()
}

#[cfg(test)]
mod tests {
    use super::{crc32, CRC32_SEED};

    #[test]
    pub fn crc32_check_value() {
        assert_eq!(crc32(b"123456789", CRC32_SEED), 0xCBF4_3926);
    }

    #[test]
    pub fn crc32_matches_plain_hash() {
        let data = [0x5au8; 16384];

        assert_eq!(crc32(&data, CRC32_SEED), crc32fast::hash(&data));
        assert_eq!(crc32(&[], CRC32_SEED), 0);
    }
}
