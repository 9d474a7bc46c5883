//! Two's-complement signature over a block of 32-bit words.
//!
//! A firmware image reserves one word for the signature. The programmer
//! computes it with [`signature_word`] over the covered words; the bootloader
//! then validates the image by summing the covered words *plus* the stored
//! signature and checking for zero, which is what [`verify`] does. All
//! arithmetic wraps, so the scheme is independent of the image contents.

/// Compute the signature word for `words`: the two's complement of their
/// wrapping sum.
pub fn signature_word(words: &[u32]) -> u32 {
    let mut sum = 0u32;
    for &word in words {
        sum = sum.wrapping_add(word);
    }
    sum.wrapping_neg()
}

/// Validate a block whose last covered word range already includes the stored
/// signature. Returns `true` when the wrapping sum of all words is zero.
pub fn verify(words: &[u32]) -> bool {
    let mut sum = 0u32;
    for &word in words {
        sum = sum.wrapping_add(word);
    }
    sum == 0
}
