//! Space types setting the inline capacity of a [`Function`](crate::Function).
//!
//! A space `S` provides `size_of::<S>() - 1` bytes of inline storage aligned to
//! `align_of::<S>()`. The last byte is reserved: it records whether the region holds the
//! callable itself or the bookkeeping of a heap block. Any sized type works as a space as
//! long as it is larger than that bookkeeping (four words), so `[usize; 5]` is the smallest
//! word array accepted. A space that is too small is rejected at compile time.
//!
//! The value of a space is never constructed or dropped; only its layout is used.

/// 8 words: 63 inline bytes on 64-bit targets.
pub type S8 = [usize; 8];

/// 16 words: 127 inline bytes on 64-bit targets.
pub type S16 = [usize; 16];

/// 32 words: 255 inline bytes on 64-bit targets.
pub type S32 = [usize; 32];

/// 64 words: 511 inline bytes on 64-bit targets.
pub type S64 = [usize; 64];
