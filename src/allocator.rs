//! The allocation capability consumed by [`Storage`](crate::storage::Storage).
//!
//! Storage only ever needs two operations, "allocate a block for this layout" and
//! "release this block", plus two facts about the allocator that decide whether a block
//! may change hands between containers:
//!
//! - [`Allocator::STATELESS`]: every instance can release blocks of every other instance.
//! - [`Allocator::is_equal`]: these two particular instances can release each other's blocks.
//!
//! [`Global`] forwards to the global allocator. Arenas chosen at runtime implement the
//! object-safe [`MemoryResource`] and are used through a reference, see [`Polymorphic`].

use core::alloc::Layout;
use core::fmt;
use core::ptr::{self, NonNull};

#[cfg(not(feature = "std"))]
use alloc::alloc as global;
#[cfg(feature = "std")]
use std::alloc as global;

use crate::sptr;

/// The allocator could not satisfy a request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AllocError;

impl fmt::Display for AllocError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("memory allocation failed")
    }
}

#[cfg(feature = "std")]
impl std::error::Error for AllocError {}

/// A source of memory blocks for heap-backed storage.
///
/// # Safety
///
/// A block returned by `allocate` must be valid for reads and writes of `layout.size()`
/// bytes, aligned to `layout.align()`, and must stay valid until it is passed to
/// `deallocate` on this instance or on an instance that `is_equal` to it. When
/// `STATELESS` is true, any instance must be able to release any other instance's blocks.
pub unsafe trait Allocator {
    /// Whether all instances are interchangeable.
    const STATELESS: bool = false;

    /// Allocates a block for `layout`.
    fn allocate(&self, layout: Layout) -> Result<NonNull<u8>, AllocError>;

    /// Releases a block.
    ///
    /// # Safety
    ///
    /// `ptr` must have been returned by `allocate` with the same `layout`, on this instance
    /// or on one that compares equal, and must not be used afterwards.
    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout);

    /// Whether blocks allocated by `other` may be released through `self`.
    fn is_equal(&self, other: &Self) -> bool {
        let _ = other;
        Self::STATELESS
    }
}

/// The global allocator.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Global;

unsafe impl Allocator for Global {
    const STATELESS: bool = true;

    fn allocate(&self, layout: Layout) -> Result<NonNull<u8>, AllocError> {
        if layout.size() == 0 {
            return Ok(sptr::dangling_aligned(layout.align()));
        }
        // SAFETY: the layout has a non-zero size.
        NonNull::new(unsafe { global::alloc(layout) }).ok_or(AllocError)
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        if layout.size() != 0 {
            // SAFETY: non-empty blocks come from `global::alloc` with this layout.
            unsafe { global::dealloc(ptr.as_ptr(), layout) }
        }
    }
}

/// An object-safe allocator, for arenas selected at runtime.
///
/// Any `&R` where `R: MemoryResource` is an [`Allocator`]; two references compare equal
/// when they point at the same resource.
///
/// # Safety
///
/// Same contract as [`Allocator`], where "compares equal" means "is the same resource".
pub unsafe trait MemoryResource {
    /// Allocates a block for `layout`.
    fn allocate(&self, layout: Layout) -> Result<NonNull<u8>, AllocError>;

    /// Releases a block.
    ///
    /// # Safety
    ///
    /// `ptr` must have been returned by `allocate` on this resource with the same `layout`.
    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout);
}

unsafe impl MemoryResource for Global {
    fn allocate(&self, layout: Layout) -> Result<NonNull<u8>, AllocError> {
        <Global as Allocator>::allocate(self, layout)
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        // SAFETY: forwarded from the caller.
        unsafe { <Global as Allocator>::deallocate(self, ptr, layout) }
    }
}

unsafe impl<R: MemoryResource + ?Sized> Allocator for &R {
    fn allocate(&self, layout: Layout) -> Result<NonNull<u8>, AllocError> {
        (**self).allocate(layout)
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        // SAFETY: forwarded from the caller; equal references name the same resource.
        unsafe { (**self).deallocate(ptr, layout) }
    }

    /// Two references are equal when they point at the same resource. Zero-sized
    /// resources all share one address, so for trait objects the vtable must match too.
    #[allow(ambiguous_wide_pointer_comparisons)]
    fn is_equal(&self, other: &Self) -> bool {
        ptr::eq(*self, *other)
    }
}

/// A type-erased allocator: a reference to any [`MemoryResource`].
pub type Polymorphic<'r> = &'r dyn MemoryResource;
