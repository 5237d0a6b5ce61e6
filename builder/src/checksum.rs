// Licensed under the Apache-2.0 license

//! Software rendition of the CRC calculation unit found in STM32-class
//! MCUs, in its default configuration: polynomial 0x04C11DB7, initial
//! value 0xFFFFFFFF, 32-bit input width, no input/output reflection, no
//! final XOR.
//!
//! The boot ROM validates images with the hardware unit, so this loop
//! must match it bit for bit. Each word is the little-endian u32 the
//! hardware sees when firmware walks flash with a `uint32_t` pointer,
//! and the unit consumes it MSB-first.

use std::borrow::Cow;

pub const CRC_POLY: u32 = 0x04C1_1DB7;
pub const CRC_INIT: u32 = 0xFFFF_FFFF;

/// One full word through the shift/compare/feedback cycle. The bit
/// shifted out of position 31 is discarded; nothing enters at bit 0.
fn crc_update_word(mut crc: u32, word: u32) -> u32 {
    for bit in 0..32 {
        let top = crc >> 31;
        let data = (word >> (31 - bit)) & 1;
        crc <<= 1;
        if top ^ data != 0 {
            crc ^= CRC_POLY;
        }
    }
    crc
}

/// Runs the register over a word stream, starting from [`CRC_INIT`].
/// The final register value is the checksum; no output transformation
/// is applied.
pub fn checksum_words<I>(words: I) -> u32
where
    I: IntoIterator<Item = u32>,
{
    words.into_iter().fold(CRC_INIT, crc_update_word)
}

/// Checksums a byte region whose length is a multiple of 4, framing it
/// into little-endian words. Callers pad with [`align_payload`] first.
pub fn checksum_aligned(data: &[u8]) -> u32 {
    debug_assert!(data.len() % 4 == 0, "payload must be padded to whole words");
    checksum_words(
        data.chunks_exact(4)
            .map(|w| u32::from_le_bytes([w[0], w[1], w[2], w[3]])),
    )
}

/// Pads `payload` to a 4-byte boundary with `pad_byte`, borrowing the
/// input unchanged when it is already aligned. The returned length is
/// always the true, unpadded length; that is what belongs in the
/// header's size field.
pub fn align_payload(payload: &[u8], pad_byte: u8) -> (Cow<'_, [u8]>, usize) {
    let true_len = payload.len();
    match true_len % 4 {
        0 => (Cow::Borrowed(payload), true_len),
        rem => {
            let mut padded = Vec::with_capacity(true_len + 4 - rem);
            padded.extend_from_slice(payload);
            padded.resize(true_len + (4 - rem), pad_byte);
            (Cow::Owned(padded), true_len)
        }
    }
}
