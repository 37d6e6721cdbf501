use core::ptr::NonNull;

/// A non-null pointer with address `align` and no provenance, valid for zero-sized accesses
/// at that alignment.
#[allow(clippy::as_conversions)]
pub fn dangling_aligned(align: usize) -> NonNull<u8> {
    debug_assert!(align.is_power_of_two());
    NonNull::new(align as *mut u8).unwrap_or(NonNull::dangling())
}
