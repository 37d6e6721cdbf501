use core::alloc::Layout;
use core::cell::Cell;
use core::fmt;
use core::marker::PhantomData;
use core::mem::MaybeUninit;
use core::ptr::NonNull;

use crate::allocator::{AllocError, MemoryResource};

/// A bump arena over a caller-provided buffer.
///
/// Every allocation advances a cursor; releasing a block does nothing. Once the buffer is
/// exhausted further requests fail with [`AllocError`]. [`reset`](Monotonic::reset) rewinds
/// the cursor, which needs exclusive access and therefore cannot happen while any function
/// still borrows the arena.
///
/// # Example
///
/// ```
/// use core::mem::MaybeUninit;
/// use smallfn::{Monotonic, PolyFunction};
///
/// let mut buf = [MaybeUninit::uninit(); 1024];
/// let arena = Monotonic::new(&mut buf);
///
/// let table = [7u64; 32];
/// let f = PolyFunction::<dyn Fn(usize) -> u64>::new_in(move |i| table[i], &arena);
///
/// assert!(f.is_heap());
/// assert_eq!(f.call(3), 7);
/// assert!(arena.used() >= 256);
/// ```
pub struct Monotonic<'buf> {
    start: NonNull<u8>,
    len: usize,
    used: Cell<usize>,
    _buf: PhantomData<&'buf mut [MaybeUninit<u8>]>,
}

impl<'buf> Monotonic<'buf> {
    /// Creates an arena handing out memory from `buf`.
    pub fn new(buf: &'buf mut [MaybeUninit<u8>]) -> Self {
        let len = buf.len();
        Monotonic {
            start: NonNull::from(buf).cast::<u8>(),
            len,
            used: Cell::new(0),
            _buf: PhantomData,
        }
    }

    /// Bytes consumed so far, alignment padding included.
    pub fn used(&self) -> usize {
        self.used.get()
    }

    /// Bytes left in the buffer.
    pub fn remaining(&self) -> usize {
        self.len - self.used.get()
    }

    /// Rewinds the arena so the whole buffer can be handed out again.
    pub fn reset(&mut self) {
        self.used.set(0);
    }
}

unsafe impl MemoryResource for Monotonic<'_> {
    fn allocate(&self, layout: Layout) -> Result<NonNull<u8>, AllocError> {
        let used = self.used.get();
        let cursor = self.start.as_ptr().wrapping_add(used);
        let padding = cursor.align_offset(layout.align());
        let begin = used.checked_add(padding).ok_or(AllocError)?;
        let end = begin.checked_add(layout.size()).ok_or(AllocError)?;
        if end > self.len {
            return Err(AllocError);
        }
        self.used.set(end);
        // SAFETY: `begin <= end <= len`, so the offset stays inside the buffer.
        Ok(unsafe { NonNull::new_unchecked(self.start.as_ptr().add(begin)) })
    }

    unsafe fn deallocate(&self, _ptr: NonNull<u8>, _layout: Layout) {}
}

impl fmt::Debug for Monotonic<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Monotonic")
            .field("used", &self.used())
            .field("len", &self.len)
            .finish()
    }
}
