//! Module: job::crc32
//! Responsibility: the master CRC-32 lookup table shipped in every job header.
//! Does not own: which bytes are hashed (plans decide that).

/// Number of entries in the hash lookup table.
pub const LOOKUP_TABLE_LEN: usize = 256;

const POLYNOMIAL: u32 = 0xEDB8_8320;

/// Reflected CRC-32 table (polynomial 0x04C11DB7).
pub const CRC32_TABLE: [u32; LOOKUP_TABLE_LEN] = build_table();

const fn build_table() -> [u32; LOOKUP_TABLE_LEN] {
    let mut table = [0u32; LOOKUP_TABLE_LEN];
    let mut index = 0;
    while index < LOOKUP_TABLE_LEN {
        let mut crc = index as u32;
        let mut bit = 0;
        while bit < 8 {
            crc = if crc & 1 == 1 {
                (crc >> 1) ^ POLYNOMIAL
            } else {
                crc >> 1
            };
            bit += 1;
        }
        table[index] = crc;
        index += 1;
    }

    table
}
