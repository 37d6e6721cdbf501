//! Untyped small-buffer storage.
//!
//! A [`Storage`] owns either its inline region or one heap block, never both. While a heap
//! block is active its bookkeeping lives at the start of the inline region and the last
//! byte of the region is set to a tag. The inline capacity is one byte short of the space
//! so a payload never reaches the tag.
//!
//! Like a vector, a storage has a size (the bytes in use) apart from its capacity. Only the
//! preserving operations look at the size: [`Storage::resize`] keeps the bytes that still
//! fit, and [`Storage::reserve`], [`Clone`] and [`Storage::move_from`] carry exactly
//! `size()` bytes over.

use core::alloc::Layout;
use core::cell::UnsafeCell;
use core::cmp;
use core::fmt;
use core::mem::{self, MaybeUninit};
use core::ptr::{self, NonNull};

#[cfg(not(feature = "std"))]
use alloc::alloc::handle_alloc_error;
#[cfg(feature = "std")]
use std::alloc::handle_alloc_error;

use crate::allocator::{AllocError, Allocator, Global};

const INLINE: u8 = 0;
const HEAP: u8 = 1;

/// An active heap block.
#[derive(Clone, Copy)]
pub(crate) struct HeapBlock {
    ptr: NonNull<u8>,
    /// Bytes in use, at most `capacity`.
    size: usize,
    align: usize,
    capacity: usize,
}

impl HeapBlock {
    fn layout(&self) -> Layout {
        // SAFETY: the block was allocated with exactly this layout.
        unsafe { Layout::from_size_align_unchecked(self.capacity, self.align) }
    }
}

/// Raw bytes kept inline when they fit and in a block from `A` otherwise.
///
/// The inline region holds [`INLINE_CAPACITY`](Self::INLINE_CAPACITY) bytes aligned to
/// [`INLINE_ALIGN`](Self::INLINE_ALIGN). A request that is larger or more strictly aligned
/// moves the storage to a heap block aligned to at least `INLINE_ALIGN`.
///
/// The storage never interprets its bytes: it does not drop them and its [`Clone`] copies
/// them verbatim. Moving a `Storage` by value is always fine since it holds no pointer
/// into itself.
///
/// # Example
///
/// ```
/// use core::alloc::Layout;
/// use smallfn::space::S8;
/// use smallfn::Storage;
///
/// let mut storage = Storage::<S8>::new();
/// assert!(!storage.is_heap());
///
/// storage.resize_discard(Layout::new::<[u64; 32]>());
/// assert!(storage.is_heap());
/// assert_eq!(storage.capacity(), 256);
///
/// storage.resize_discard(Layout::new::<u32>());
/// assert!(!storage.is_heap());
/// ```
pub struct Storage<Space, A: Allocator = Global> {
    space: UnsafeCell<MaybeUninit<Space>>,
    /// Bytes in use while inline. A heap block keeps its own.
    len: usize,
    alloc: A,
}

impl<Space> Storage<Space, Global> {
    /// Creates an empty storage on the global allocator.
    pub fn new() -> Self {
        Self::new_in(Global)
    }
}

impl<Space, A: Allocator> Storage<Space, A> {
    /// Bytes available without allocating.
    pub const INLINE_CAPACITY: usize = mem::size_of::<Space>() - 1;

    /// Alignment of the inline region.
    pub const INLINE_ALIGN: usize = mem::align_of::<Space>();

    const SPACE_HOLDS_BLOCK: () = assert!(
        mem::size_of::<Space>() > mem::size_of::<HeapBlock>(),
        "space is too small to hold the bookkeeping of a heap block"
    );

    /// Creates an empty, inline storage.
    pub fn new_in(alloc: A) -> Self {
        #[allow(clippy::let_unit_value)]
        let () = Self::SPACE_HOLDS_BLOCK;
        let storage = Storage {
            space: UnsafeCell::new(MaybeUninit::uninit()),
            len: 0,
            alloc,
        };
        storage.set_tag(INLINE);
        storage
    }

    /// Creates a storage with room for `layout`.
    ///
    /// # Panics
    ///
    /// Aborts through [`handle_alloc_error`] when the allocator fails, and panics with
    /// "capacity overflow" when `layout` cannot be rounded up to the inline alignment.
    pub fn with_layout_in(layout: Layout, alloc: A) -> Self {
        let mut storage = Self::new_in(alloc);
        storage.resize_discard(layout);
        storage
    }

    /// Creates a storage with room for `layout`, reporting allocation failure.
    pub fn try_with_layout_in(layout: Layout, alloc: A) -> Result<Self, AllocError> {
        let mut storage = Self::new_in(alloc);
        storage.try_resize_discard(layout)?;
        Ok(storage)
    }

    /// Whether a value of `layout` is stored inline.
    pub const fn fits_inline(layout: Layout) -> bool {
        layout.size() <= Self::INLINE_CAPACITY && layout.align() <= Self::INLINE_ALIGN
    }

    /// Whether a heap block is active.
    pub fn is_heap(&self) -> bool {
        self.tag() == HEAP
    }

    /// Bytes in use, at most [`capacity`](Self::capacity).
    pub fn size(&self) -> usize {
        match self.block() {
            Some(block) => block.size,
            None => self.len,
        }
    }

    /// Bytes available in the active region.
    pub fn capacity(&self) -> usize {
        match self.block() {
            Some(block) => block.capacity,
            None => Self::INLINE_CAPACITY,
        }
    }

    /// Alignment of the active region.
    pub fn alignment(&self) -> usize {
        match self.block() {
            Some(block) => block.align,
            None => Self::INLINE_ALIGN,
        }
    }

    /// The allocator backing heap blocks.
    pub fn allocator(&self) -> &A {
        &self.alloc
    }

    /// Pointer to the active region.
    pub fn as_ptr(&self) -> *const u8 {
        self.data().as_ptr()
    }

    /// Mutable pointer to the active region.
    pub fn as_mut_ptr(&mut self) -> *mut u8 {
        self.data().as_ptr()
    }

    /// Pointer to the active region, writable through a shared reference.
    pub(crate) fn data(&self) -> NonNull<u8> {
        match self.block() {
            Some(block) => block.ptr,
            // SAFETY: `UnsafeCell::get` never returns null.
            None => unsafe { NonNull::new_unchecked(self.space.get().cast::<u8>()) },
        }
    }

    fn tag_ptr(&self) -> *mut u8 {
        // SAFETY: the tag is the last byte of the space.
        unsafe { self.space.get().cast::<u8>().add(Self::INLINE_CAPACITY) }
    }

    fn tag(&self) -> u8 {
        // SAFETY: the tag is written on construction and only ever replaced.
        unsafe { self.tag_ptr().read() }
    }

    fn set_tag(&self, tag: u8) {
        // SAFETY: the tag byte belongs to no payload.
        unsafe { self.tag_ptr().write(tag) }
    }

    fn block(&self) -> Option<HeapBlock> {
        if self.is_heap() {
            // SAFETY: while the tag says heap the region starts with a block record.
            Some(unsafe { self.space.get().cast::<HeapBlock>().read_unaligned() })
        } else {
            None
        }
    }

    fn set_block(&mut self, block: HeapBlock) {
        // SAFETY: the record fits below the tag, checked by `SPACE_HOLDS_BLOCK`.
        unsafe { self.space.get_mut().as_mut_ptr().cast::<HeapBlock>().write_unaligned(block) };
        self.set_tag(HEAP);
    }

    /// Layout of the bytes in use, at the alignment of the active region.
    fn used_layout(&self) -> Layout {
        // SAFETY: the size never exceeds a capacity that was valid with this alignment.
        unsafe { Layout::from_size_align_unchecked(self.size(), self.alignment()) }
    }

    fn allocate_block(&self, size: usize, align: usize) -> Result<HeapBlock, AllocError> {
        let layout = Layout::from_size_align(size, align).map_err(|_| AllocError)?;
        let ptr = self.alloc.allocate(layout)?;
        Ok(HeapBlock {
            ptr,
            size,
            align,
            capacity: size,
        })
    }

    /// Makes room for `layout` without preserving the current bytes.
    ///
    /// A layout that fits inline releases any heap block. A heap block that is already
    /// large enough and aligned enough is reused. Otherwise a new block is allocated before
    /// the old one is released.
    ///
    /// # Panics
    ///
    /// Same as [`with_layout_in`](Self::with_layout_in).
    pub fn resize_discard(&mut self, layout: Layout) {
        if self.try_resize_discard(layout).is_err() {
            alloc_failed(layout.size(), cmp::max(layout.align(), Self::INLINE_ALIGN))
        }
    }

    /// Like [`resize_discard`](Self::resize_discard), leaving the storage untouched when
    /// allocation fails.
    pub fn try_resize_discard(&mut self, layout: Layout) -> Result<(), AllocError> {
        if Self::fits_inline(layout) {
            self.release();
            self.len = layout.size();
            return Ok(());
        }
        let align = cmp::max(layout.align(), Self::INLINE_ALIGN);
        if let Some(mut block) = self.block() {
            if layout.size() <= block.capacity && align <= block.align {
                block.size = layout.size();
                self.set_block(block);
                return Ok(());
            }
        }
        let block = self.allocate_block(layout.size(), align)?;
        self.release();
        self.set_block(block);
        Ok(())
    }

    /// Sets the size to `layout.size()`, keeping the first `min(size, layout.size())` bytes.
    ///
    /// The inline region is used while the layout fits it. Once on the heap the storage
    /// stays there, reusing its block when the block is large enough and aligned enough.
    ///
    /// # Panics
    ///
    /// Same as [`with_layout_in`](Self::with_layout_in).
    pub fn resize(&mut self, layout: Layout) {
        if self.try_resize(layout).is_err() {
            alloc_failed(layout.size(), cmp::max(layout.align(), Self::INLINE_ALIGN))
        }
    }

    /// Like [`resize`](Self::resize), leaving the storage untouched when allocation fails.
    pub fn try_resize(&mut self, layout: Layout) -> Result<(), AllocError> {
        let align = cmp::max(layout.align(), Self::INLINE_ALIGN);
        match self.block() {
            None if Self::fits_inline(layout) => {
                self.len = layout.size();
                return Ok(());
            }
            Some(mut block) if layout.size() <= block.capacity && align <= block.align => {
                block.size = layout.size();
                self.set_block(block);
                return Ok(());
            }
            _ => {}
        }
        let block = self.allocate_block(layout.size(), align)?;
        let kept = cmp::min(self.size(), layout.size());
        // SAFETY: both regions hold at least `kept` bytes and the new block is ours alone.
        unsafe { ptr::copy_nonoverlapping(self.as_ptr(), block.ptr.as_ptr(), kept) };
        self.release();
        self.set_block(block);
        Ok(())
    }

    /// Grows the active region to at least `capacity` bytes, preserving the first
    /// [`size`](Self::size) bytes. The size is unchanged.
    ///
    /// # Panics
    ///
    /// Same as [`with_layout_in`](Self::with_layout_in).
    pub fn reserve(&mut self, capacity: usize) {
        if self.try_reserve(capacity).is_err() {
            alloc_failed(capacity, self.alignment())
        }
    }

    /// Like [`reserve`](Self::reserve), leaving the storage untouched when allocation fails.
    pub fn try_reserve(&mut self, capacity: usize) -> Result<(), AllocError> {
        if capacity <= self.capacity() {
            return Ok(());
        }
        let used = self.used_layout();
        let mut block = self.allocate_block(capacity, used.align())?;
        block.size = used.size();
        // SAFETY: the new block is at least `used.size()` bytes and distinct from ours.
        unsafe { ptr::copy_nonoverlapping(self.as_ptr(), block.ptr.as_ptr(), used.size()) };
        self.release();
        self.set_block(block);
        Ok(())
    }

    /// Grows the active region to at least `capacity` bytes without preserving its
    /// content. The size is unchanged.
    ///
    /// # Panics
    ///
    /// Same as [`with_layout_in`](Self::with_layout_in).
    pub fn reserve_discard(&mut self, capacity: usize) {
        if self.try_reserve_discard(capacity).is_err() {
            alloc_failed(capacity, self.alignment())
        }
    }

    /// Like [`reserve_discard`](Self::reserve_discard), leaving the storage untouched when
    /// allocation fails.
    pub fn try_reserve_discard(&mut self, capacity: usize) -> Result<(), AllocError> {
        if capacity <= self.capacity() {
            return Ok(());
        }
        let mut block = self.allocate_block(capacity, self.alignment())?;
        block.size = self.size();
        self.release();
        self.set_block(block);
        Ok(())
    }

    /// Frees the heap block, if any, and returns to the inline region.
    pub fn release(&mut self) {
        if let Some(block) = self.take_block() {
            // SAFETY: the block came from `self.alloc`, or from an allocator equal to it.
            unsafe { self.alloc.deallocate(block.ptr, block.layout()) }
        }
    }

    /// Detaches the heap block without freeing it, leaving an empty inline region.
    pub(crate) fn take_block(&mut self) -> Option<HeapBlock> {
        let block = self.block();
        if block.is_some() {
            self.set_tag(INLINE);
            self.len = 0;
        }
        block
    }

    /// Takes ownership of `block`, releasing our own first.
    ///
    /// The block must be releasable through our allocator.
    pub(crate) fn put_block(&mut self, block: HeapBlock) {
        self.release();
        self.set_block(block);
    }

    /// Whether heap blocks may move between `self` and `other`.
    pub fn is_compatible<S>(&self, other: &Storage<S, A>) -> bool {
        A::STATELESS || self.alloc.is_equal(&other.alloc)
    }

    /// Takes over the heap block of `other` when it has one and the allocators are
    /// compatible. Returns whether it did; `other` is inline afterwards if so.
    pub fn adopt<S>(&mut self, other: &mut Storage<S, A>) -> bool {
        if !other.is_heap() || !self.is_compatible(other) {
            return false;
        }
        match other.take_block() {
            Some(block) => {
                self.put_block(block);
                true
            }
            None => false,
        }
    }

    /// Moves the content of `other` here, adopting its block when possible and copying
    /// the bytes otherwise. `other` ends up inline and without a heap block.
    pub fn move_from<S>(&mut self, other: &mut Storage<S, A>) {
        if self.adopt(other) {
            return;
        }
        let used = other.used_layout();
        self.resize_discard(used);
        // SAFETY: we have room for `used` and the regions belong to different storages.
        unsafe { ptr::copy_nonoverlapping(other.as_ptr(), self.as_mut_ptr(), used.size()) };
        other.release();
    }

    /// Exchanges content with `other`.
    ///
    /// With compatible allocators only the regions change places. Otherwise the
    /// allocators are exchanged as well, so every block stays with the allocator that
    /// can release it.
    pub fn swap(&mut self, other: &mut Self) {
        if !self.is_compatible(other) {
            mem::swap(&mut self.alloc, &mut other.alloc);
        }
        mem::swap(self.space.get_mut(), other.space.get_mut());
        mem::swap(&mut self.len, &mut other.len);
    }
}

impl<Space, A: Allocator + Clone> Clone for Storage<Space, A> {
    fn clone(&self) -> Self {
        let mut storage = Self::new_in(self.alloc.clone());
        storage.clone_from(self);
        storage
    }

    /// Copies the bytes of `source`, reusing our heap block when it is large enough.
    fn clone_from(&mut self, source: &Self) {
        let used = source.used_layout();
        self.resize_discard(used);
        // SAFETY: we have room for `used`; `&mut self` and `&source` cannot alias.
        unsafe { ptr::copy_nonoverlapping(source.as_ptr(), self.as_mut_ptr(), used.size()) };
    }
}

impl<Space, A: Allocator> Drop for Storage<Space, A> {
    fn drop(&mut self) {
        self.release();
    }
}

impl<Space, A: Allocator + Default> Default for Storage<Space, A> {
    fn default() -> Self {
        Self::new_in(A::default())
    }
}

impl<Space, A: Allocator> fmt::Debug for Storage<Space, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Storage")
            .field("heap", &self.is_heap())
            .field("size", &self.size())
            .field("capacity", &self.capacity())
            .field("alignment", &self.alignment())
            .finish()
    }
}

#[cold]
fn alloc_failed(size: usize, align: usize) -> ! {
    match Layout::from_size_align(size, align) {
        Ok(layout) => handle_alloc_error(layout),
        Err(_) => panic!("capacity overflow"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allocator::MemoryResource;
    use crate::space::S8;
    use core::cell::Cell;

    #[derive(Default)]
    struct Counting {
        allocs: Cell<usize>,
        deallocs: Cell<usize>,
    }

    unsafe impl MemoryResource for Counting {
        fn allocate(&self, layout: Layout) -> Result<NonNull<u8>, AllocError> {
            self.allocs.set(self.allocs.get() + 1);
            Allocator::allocate(&Global, layout)
        }

        unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
            self.deallocs.set(self.deallocs.get() + 1);
            unsafe { Allocator::deallocate(&Global, ptr, layout) }
        }
    }

    fn pattern(seed: u8, len: usize) -> Vec<u8> {
        let mut byte = seed;
        (0..len)
            .map(|_| {
                let current = byte;
                byte = byte.wrapping_add(1);
                current
            })
            .collect()
    }

    fn write_bytes<S, A: Allocator>(storage: &mut Storage<S, A>, len: usize, seed: u8) {
        for (i, byte) in pattern(seed, len).into_iter().enumerate() {
            unsafe { storage.as_mut_ptr().add(i).write(byte) };
        }
    }

    fn read_bytes<S, A: Allocator>(storage: &Storage<S, A>, len: usize) -> Vec<u8> {
        (0..len)
            .map(|i| unsafe { storage.as_ptr().add(i).read() })
            .collect()
    }

    #[test]
    fn test_inline_capacity() {
        assert_eq!(Storage::<S8>::INLINE_CAPACITY, mem::size_of::<S8>() - 1);
        assert_eq!(Storage::<S8>::INLINE_ALIGN, mem::align_of::<usize>());
        assert!(Storage::<S8>::fits_inline(Layout::new::<[u8; 63]>()));
        assert!(!Storage::<[u8; 64]>::fits_inline(Layout::new::<u16>()));
        assert!(!Storage::<S8>::fits_inline(
            Layout::from_size_align(1, 64).unwrap()
        ));
    }

    #[test]
    fn test_resize_discard() {
        let counting = Counting::default();
        let mut storage = Storage::<S8, &Counting>::new_in(&counting);
        assert!(!storage.is_heap());

        storage.resize_discard(Layout::new::<[u64; 16]>());
        assert!(storage.is_heap());
        assert_eq!(storage.capacity(), 128);
        assert_eq!(storage.as_ptr().align_offset(8), 0);

        // Smaller, still too large for inline: the block is reused.
        storage.resize_discard(Layout::new::<[u64; 9]>());
        assert_eq!(storage.capacity(), 128);
        assert_eq!(counting.allocs.get(), 1);

        // Larger: new block, old one released.
        storage.resize_discard(Layout::new::<[u64; 17]>());
        assert_eq!(counting.allocs.get(), 2);
        assert_eq!(counting.deallocs.get(), 1);

        // Fits inline: back to the inline region.
        storage.resize_discard(Layout::new::<u8>());
        assert!(!storage.is_heap());
        assert_eq!(counting.deallocs.get(), 2);

        drop(storage);
        assert_eq!(counting.deallocs.get(), 2);
    }

    #[test]
    fn test_over_aligned() {
        let mut storage = Storage::<S8>::new();
        let layout = Layout::from_size_align(256, 128).unwrap();
        storage.resize_discard(layout);
        assert!(storage.is_heap());
        assert_eq!(storage.alignment(), 128);
        assert_eq!(storage.as_ptr().align_offset(128), 0);

        // Smaller and less aligned than the block: the block is kept.
        let block = storage.as_ptr();
        storage.resize_discard(Layout::from_size_align(64, 16).unwrap());
        assert_eq!(storage.as_ptr(), block);
    }

    #[test]
    fn test_size() {
        let mut storage = Storage::<S8>::new();
        assert_eq!(storage.size(), 0);

        storage.resize_discard(Layout::new::<[u8; 20]>());
        assert_eq!(storage.size(), 20);
        assert_eq!(storage.capacity(), 63);

        storage.resize_discard(Layout::new::<[u8; 100]>());
        assert_eq!(storage.size(), 100);

        storage.reserve(300);
        assert_eq!(storage.size(), 100);
        assert_eq!(storage.capacity(), 300);

        storage.release();
        assert_eq!(storage.size(), 0);
    }

    #[test]
    fn test_resize_preserves_bytes() {
        let counting = Counting::default();
        let mut storage = Storage::<S8, &Counting>::new_in(&counting);
        storage.resize(Layout::new::<[u8; 40]>());
        write_bytes(&mut storage, 40, 1);

        // Inline to heap keeps the old bytes.
        storage.resize(Layout::new::<[u8; 120]>());
        assert!(storage.is_heap());
        assert_eq!(storage.size(), 120);
        assert_eq!(read_bytes(&storage, 40), pattern(1, 40));

        // Shrinking keeps the block and the leading bytes.
        write_bytes(&mut storage, 120, 50);
        let block = storage.as_ptr();
        storage.resize(Layout::new::<[u8; 30]>());
        assert!(storage.is_heap());
        assert_eq!(storage.as_ptr(), block);
        assert_eq!(storage.size(), 30);
        assert_eq!(read_bytes(&storage, 30), pattern(50, 30));
        assert_eq!(counting.allocs.get(), 1);

        // Growing past the block copies what is in use.
        storage.resize(Layout::new::<[u8; 500]>());
        assert_eq!(storage.capacity(), 500);
        assert_eq!(read_bytes(&storage, 30), pattern(50, 30));
        assert_eq!(counting.allocs.get(), 2);
        assert_eq!(counting.deallocs.get(), 1);
    }

    #[test]
    fn test_reserve_preserves_bytes() {
        let mut storage = Storage::<S8>::new();
        storage.resize(Layout::new::<[u8; 63]>());
        write_bytes(&mut storage, 63, 1);

        storage.reserve(100);
        assert!(storage.is_heap());
        assert!(storage.capacity() >= 100);
        assert_eq!(read_bytes(&storage, 63), pattern(1, 63));

        storage.resize(Layout::new::<[u8; 100]>());
        write_bytes(&mut storage, 100, 70);
        storage.reserve(400);
        assert_eq!(storage.size(), 100);
        assert_eq!(read_bytes(&storage, 100), pattern(70, 100));

        // Never shrinks.
        storage.reserve(10);
        assert!(storage.capacity() >= 400);
    }

    #[test]
    fn test_reserve_discard() {
        let counting = Counting::default();
        let mut storage = Storage::<S8, &Counting>::new_in(&counting);
        storage.resize(Layout::new::<[u8; 10]>());

        storage.reserve_discard(50);
        assert!(!storage.is_heap());
        assert_eq!(counting.allocs.get(), 0);

        storage.reserve_discard(200);
        assert!(storage.is_heap());
        assert_eq!(storage.capacity(), 200);
        assert_eq!(storage.size(), 10);

        storage.reserve_discard(1000);
        assert_eq!(storage.capacity(), 1000);
        assert_eq!(counting.allocs.get(), 2);
        assert_eq!(counting.deallocs.get(), 1);

        let mut buf = [MaybeUninit::uninit(); 64];
        let arena = crate::Monotonic::new(&mut buf);
        let mut small = Storage::<S8, &crate::Monotonic<'_>>::new_in(&arena);
        assert_eq!(small.try_reserve_discard(512), Err(AllocError));
        assert!(!small.is_heap());
    }

    #[test]
    fn test_try_resize_failure_leaves_storage() {
        let mut buf = [MaybeUninit::uninit(); 64];
        let arena = crate::Monotonic::new(&mut buf);
        let mut storage = Storage::<S8, &crate::Monotonic<'_>>::new_in(&arena);
        write_bytes(&mut storage, 8, 3);

        assert_eq!(
            storage.try_resize_discard(Layout::new::<[u8; 256]>()),
            Err(AllocError)
        );
        assert!(!storage.is_heap());
        assert_eq!(read_bytes(&storage, 8), pattern(3, 8));
        assert!(storage.try_reserve(512).is_err());
    }

    #[test]
    fn test_clone_duplicates() {
        let mut storage = Storage::<S8>::with_layout_in(Layout::new::<[u8; 200]>(), Global);
        write_bytes(&mut storage, 200, 0);

        let copy = storage.clone();
        assert!(copy.is_heap());
        assert_ne!(copy.as_ptr(), storage.as_ptr());
        assert_eq!(read_bytes(&copy, 200), read_bytes(&storage, 200));

        let mut small = Storage::<S8>::with_layout_in(Layout::new::<[u8; 63]>(), Global);
        write_bytes(&mut small, 63, 9);
        let mut target = Storage::<S8>::with_layout_in(Layout::new::<[u8; 500]>(), Global);
        let block = target.as_ptr();
        target.clone_from(&storage);
        assert_eq!(target.as_ptr(), block);
        assert_eq!(read_bytes(&target, 200), read_bytes(&storage, 200));

        target.clone_from(&small);
        assert!(!target.is_heap());
        assert_eq!(target.size(), 63);
        assert_eq!(read_bytes(&target, 63), read_bytes(&small, 63));
    }

    #[test]
    fn test_move_adopts_compatible_block() {
        let counting = Counting::default();
        let mut from = Storage::<S8, &Counting>::with_layout_in(Layout::new::<[u8; 100]>(), &counting);
        write_bytes(&mut from, 100, 5);
        let block = from.as_ptr();

        let mut to = Storage::<S8, &Counting>::new_in(&counting);
        to.move_from(&mut from);
        assert_eq!(to.as_ptr(), block);
        assert!(!from.is_heap());
        assert_eq!(read_bytes(&to, 100), pattern(5, 100));
        assert_eq!(counting.allocs.get(), 1);
    }

    #[test]
    fn test_move_copies_between_arenas() {
        let left = Counting::default();
        let right = Counting::default();
        let mut from = Storage::<S8, &Counting>::with_layout_in(Layout::new::<[u8; 100]>(), &left);
        write_bytes(&mut from, 100, 5);

        let mut to = Storage::<S8, &Counting>::new_in(&right);
        assert!(!to.adopt(&mut from));
        to.move_from(&mut from);
        assert!(to.is_heap());
        assert!(!from.is_heap());
        assert_eq!(read_bytes(&to, 100), pattern(5, 100));
        assert_eq!(left.deallocs.get(), 1);
        assert_eq!(right.allocs.get(), 1);
    }

    #[test]
    fn test_swap_all_combinations() {
        for (a_heap, b_heap) in [(false, false), (false, true), (true, false), (true, true)] {
            let make = |heap: bool, seed: u8| {
                let len = if heap { 150 } else { 40 };
                let mut storage = Storage::<S8>::with_layout_in(
                    Layout::from_size_align(len, 1).unwrap(),
                    Global,
                );
                write_bytes(&mut storage, len, seed);
                (storage, len)
            };
            let (mut a, a_len) = make(a_heap, 10);
            let (mut b, b_len) = make(b_heap, 90);

            a.swap(&mut b);
            assert_eq!(a.is_heap(), b_heap);
            assert_eq!(b.is_heap(), a_heap);
            assert_eq!(read_bytes(&a, b_len), pattern(90, b_len));
            assert_eq!(read_bytes(&b, a_len), pattern(10, a_len));
        }
    }

    #[test]
    fn test_swap_incompatible_moves_allocators() {
        let left = Counting::default();
        let right = Counting::default();
        let mut a = Storage::<S8, &Counting>::with_layout_in(Layout::new::<[u8; 100]>(), &left);
        let mut b = Storage::<S8, &Counting>::new_in(&right);

        a.swap(&mut b);
        assert!(ptr::eq(*a.allocator(), &right));
        assert!(ptr::eq(*b.allocator(), &left));
        drop(b);
        assert_eq!(left.deallocs.get(), 1);
    }
}
