use core::alloc::Layout;
use core::fmt;
use core::marker::PhantomData;
use core::mem::{self, ManuallyDrop};
use core::ptr;

use crate::allocator::{Allocator, Global, Polymorphic};
use crate::delegate::Delegate;
use crate::signature::{Loosen, Signature};
use crate::space::S8;
use crate::storage::Storage;

/// A move-only callable stored inline when small and in one heap block otherwise.
///
/// `Sig` is the call signature, such as `dyn Fn(i32) -> i32` or `dyn FnMut() + Send`
/// (see [`Signature`]). Callables up to `size_of::<Space>() - 1` bytes that are not more
/// strictly aligned than `Space` live inside the function; anything else goes to a block
/// from `A`.
///
/// Constructors are defined per signature, so the signature has to be known where the
/// function is created. A type alias keeps this short:
///
/// ```
/// use smallfn::Function;
///
/// type Callback = Function<dyn Fn(i32) -> i32>;
///
/// let offset = 25;
/// let f = Callback::new(move |x| x + offset);
/// assert_eq!(f.call(100), 125);
/// assert!(!f.is_heap());
///
/// let table = [7usize; 101];
/// let g = Function::<dyn Fn(usize) -> usize>::new(move |i| table[i]);
/// assert_eq!(g.call(100), 7);
/// assert!(g.is_heap());
/// ```
///
/// `Function` is `Send` when its signature includes `+ Send` and its allocator is `Send`.
/// It is never `Sync`.
pub struct Function<Sig: ?Sized + Signature, A: Allocator = Global, Space = S8> {
    storage: Storage<Space, A>,
    delegate: Delegate<Sig>,
    _marker: PhantomData<Sig>,
}

/// A [`Function`] whose memory resource is picked at runtime.
///
/// See [`Monotonic`](crate::Monotonic) for an example.
pub type PolyFunction<'r, Sig, Space = S8> = Function<Sig, Polymorphic<'r>, Space>;

impl<Sig: ?Sized + Signature, A: Allocator, Space> Function<Sig, A, Space> {
    /// Creates an empty function.
    ///
    /// # Example
    ///
    /// ```
    /// use smallfn::Function;
    ///
    /// let f = Function::<dyn Fn()>::empty();
    /// assert!(f.is_none());
    /// ```
    pub fn empty() -> Self
    where
        A: Default,
    {
        Self::empty_in(A::default())
    }

    /// Creates an empty function allocating from `alloc`.
    pub fn empty_in(alloc: A) -> Self {
        Function {
            storage: Storage::new_in(alloc),
            delegate: Delegate::empty(),
            _marker: PhantomData,
        }
    }

    /// Whether a callable is held.
    pub fn is_some(&self) -> bool {
        self.delegate.is_bound()
    }

    /// Whether the function is empty.
    pub fn is_none(&self) -> bool {
        !self.is_some()
    }

    /// Whether the storage is a heap block.
    ///
    /// This stays true after [`clear`](Self::clear), which keeps the block for reuse.
    pub fn is_heap(&self) -> bool {
        self.storage.is_heap()
    }

    /// Bytes available for a callable without allocating.
    pub fn capacity(&self) -> usize {
        self.storage.capacity()
    }

    /// The allocator.
    pub fn allocator(&self) -> &A {
        self.storage.allocator()
    }

    /// Drops the callable, keeping the storage.
    pub fn clear(&mut self) {
        let delegate = self.delegate.take();
        // SAFETY: the delegate was bound for the value in storage, now unbound.
        unsafe { delegate.destroy(self.storage.data()) }
    }

    /// Releases the heap block of an empty function.
    ///
    /// Does nothing while a callable is held.
    pub fn shrink_to_fit(&mut self) {
        if self.is_none() {
            self.storage.release();
        }
    }

    /// Moves the callable into a new function on a clone of the allocator, leaving `self`
    /// empty.
    ///
    /// # Example
    ///
    /// ```
    /// use smallfn::Function;
    ///
    /// let mut f = Function::<dyn Fn() -> u8>::new(|| 1);
    /// let g = f.take();
    /// assert!(f.is_none());
    /// assert_eq!(g.call(), 1);
    /// ```
    pub fn take(&mut self) -> Self
    where
        A: Clone,
    {
        let mut taken = Self::empty_in(self.allocator().clone());
        taken.move_from(self);
        taken
    }

    /// Exchanges callables with `other`.
    ///
    /// When the allocators cannot release each other's blocks they are exchanged too.
    pub fn swap(&mut self, other: &mut Self) {
        self.storage.swap(&mut other.storage);
        mem::swap(&mut self.delegate, &mut other.delegate);
    }

    /// Replaces the callable with the one held by `source`, leaving `source` empty.
    ///
    /// A heap block is taken over when both allocators can release it; otherwise the
    /// callable is moved into this function's own storage. `source` may have a stricter
    /// signature, see [`Loosen`].
    ///
    /// # Example
    ///
    /// ```
    /// use smallfn::Function;
    ///
    /// let mut strict = Function::<dyn Fn() -> u32 + Send>::new(|| 3);
    /// let mut loose = Function::<dyn FnMut() -> u32>::empty();
    /// loose.move_from(&mut strict);
    /// assert!(strict.is_none());
    /// assert_eq!(loose.call(), 3);
    /// ```
    pub fn move_from<S>(&mut self, source: &mut Function<S, A, Space>)
    where
        S: ?Sized + Signature<Args = Sig::Args, Output = Sig::Output>,
        Sig: Loosen<S>,
    {
        self.clear();
        let delegate = source.delegate.take();
        let Some(layout) = delegate.layout() else {
            return;
        };
        if !self.storage.adopt(&mut source.storage) {
            self.storage.resize_discard(layout);
            // SAFETY: `source` held a live value of the bound type and we have room for it.
            unsafe { delegate.relocate(source.storage.data(), self.storage.data()) };
            source.storage.release();
        }
        self.delegate = delegate.loosen();
    }

    /// Converts to a looser signature without touching the callable.
    ///
    /// [`From`] offers the same conversions.
    pub fn loosen<T>(self) -> Function<T, A, Space>
    where
        T: ?Sized + Loosen<Sig> + Signature<Args = Sig::Args, Output = Sig::Output>,
    {
        let this = ManuallyDrop::new(self);
        // SAFETY: `this` is never dropped, so the storage is read out exactly once.
        let storage = unsafe { ptr::read(&this.storage) };
        Function {
            storage,
            delegate: this.delegate.loosen(),
            _marker: PhantomData,
        }
    }

    /// Changes the inline capacity.
    ///
    /// A callable on the heap keeps its block. An inline callable is moved into the new
    /// space, or to the heap if it no longer fits.
    ///
    /// # Example
    ///
    /// ```
    /// use smallfn::space::{S16, S8};
    /// use smallfn::{Function, Global};
    ///
    /// let data = [1u64; 12];
    /// let f = Function::<dyn Fn() -> u64, Global, S16>::new(move || data.iter().sum());
    /// assert!(!f.is_heap());
    ///
    /// let g: Function<dyn Fn() -> u64, Global, S8> = f.resize();
    /// assert!(g.is_heap());
    /// assert_eq!(g.call(), 12);
    /// ```
    pub fn resize<ToSpace>(self) -> Function<Sig, A, ToSpace> {
        let mut this = ManuallyDrop::new(self);
        // SAFETY: `this` is never dropped, so the allocator is read out exactly once.
        let alloc = unsafe { ptr::read(this.storage.allocator()) };
        let delegate = this.delegate.take();

        let mut result = Function::<Sig, A, ToSpace>::empty_in(alloc);
        if let Some(block) = this.storage.take_block() {
            result.storage.put_block(block);
        } else if let Some(layout) = delegate.layout() {
            result.storage.resize_discard(layout);
            // SAFETY: the inline value is live and the new storage has room for it.
            unsafe { delegate.relocate(this.storage.data(), result.storage.data()) };
        }
        result.delegate = delegate;
        result
    }

    /// Moves the callable into a function backed by `alloc`.
    ///
    /// The callable is always relocated, since a block from one allocator cannot be
    /// released by another type of allocator.
    pub fn with_allocator<B: Allocator>(mut self, alloc: B) -> Function<Sig, B, Space> {
        let mut result = Function::<Sig, B, Space>::empty_in(alloc);
        let delegate = self.delegate.take();
        if let Some(layout) = delegate.layout() {
            result.storage.resize_discard(layout);
            // SAFETY: the value is live and the new storage has room for it.
            unsafe { delegate.relocate(self.storage.data(), result.storage.data()) };
            result.delegate = delegate;
        }
        result
    }

    /// Stores `f`, dropping any previous callable first.
    ///
    /// # Safety
    ///
    /// `delegate` must be bound for `F`.
    unsafe fn assign<F>(&mut self, f: F, delegate: Delegate<Sig>) {
        self.clear();
        self.storage.resize_discard(Layout::new::<F>());
        // SAFETY: the storage has room for an `F`.
        unsafe { self.storage.data().cast::<F>().as_ptr().write(f) };
        self.delegate = delegate;
    }

    /// Like `assign`, handing `f` back when the allocator fails.
    ///
    /// # Safety
    ///
    /// `delegate` must be bound for `F`.
    unsafe fn try_assign<F>(&mut self, f: F, delegate: Delegate<Sig>) -> Result<(), F> {
        self.clear();
        if self.storage.try_resize_discard(Layout::new::<F>()).is_err() {
            return Err(f);
        }
        // SAFETY: the storage has room for an `F`.
        unsafe { self.storage.data().cast::<F>().as_ptr().write(f) };
        self.delegate = delegate;
        Ok(())
    }
}

impl<Sig: ?Sized + Signature, A: Allocator, Space> Drop for Function<Sig, A, Space> {
    fn drop(&mut self) {
        self.clear();
    }
}

impl<Sig: ?Sized + Signature, A: Allocator + Default, Space> Default for Function<Sig, A, Space> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<Sig: ?Sized + Signature, A: Allocator, Space> fmt::Debug for Function<Sig, A, Space> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Function")
            .field("bound", &self.is_some())
            .field("heap", &self.is_heap())
            .finish()
    }
}

macro_rules! callable {
    (@impl $f:ident [$($send:tt)*] $bind:ident [$($by:tt)*] $($arg:ident $val:ident),*) => {
        impl<'a, $($arg,)* R, A: Allocator, Space>
            Function<dyn $f($($arg),*) -> R $($send)* + 'a, A, Space>
        {
            /// Wraps `f`.
            pub fn new<F>(f: F) -> Self
            where
                A: Default,
                F: $f($($arg),*) -> R $($send)* + 'a,
            {
                Self::new_in(f, A::default())
            }

            /// Wraps `f`, allocating from `alloc` if it does not fit inline.
            pub fn new_in<F>(f: F, alloc: A) -> Self
            where
                F: $f($($arg),*) -> R $($send)* + 'a,
            {
                let mut this = Self::empty_in(alloc);
                // SAFETY: the delegate is bound for `F`.
                unsafe { this.assign(f, Delegate::$bind::<F>()) };
                this
            }

            /// Wraps `f`, handing it back if the allocator fails.
            pub fn try_new_in<F>(f: F, alloc: A) -> Result<Self, F>
            where
                F: $f($($arg),*) -> R $($send)* + 'a,
            {
                let mut this = Self::empty_in(alloc);
                // SAFETY: the delegate is bound for `F`.
                unsafe { this.try_assign(f, Delegate::$bind::<F>()) }?;
                Ok(this)
            }

            /// Wraps a function pointer; `None` gives an empty function.
            pub fn from_fn_ptr(f: Option<fn($($arg),*) -> R>) -> Self
            where
                A: Default,
                $($arg: 'a,)*
                R: 'a,
            {
                Self::from_fn_ptr_in(f, A::default())
            }

            /// Wraps a function pointer, allocating from `alloc`.
            pub fn from_fn_ptr_in(f: Option<fn($($arg),*) -> R>, alloc: A) -> Self
            where
                $($arg: 'a,)*
                R: 'a,
            {
                match f {
                    Some(f) => Self::new_in(f, alloc),
                    None => Self::empty_in(alloc),
                }
            }

            /// Binds `method` to `target`, which the function owns.
            pub fn from_method<T>(target: T, method: fn($($by)* T, $($arg),*) -> R) -> Self
            where
                A: Default,
                T: 'a $($send)*,
                $($arg: 'a,)*
                R: 'a,
            {
                Self::from_method_in(target, method, A::default())
            }

            /// Binds `method` to `target`, allocating from `alloc`.
            pub fn from_method_in<T>(
                target: T,
                method: fn($($by)* T, $($arg),*) -> R,
                alloc: A,
            ) -> Self
            where
                T: 'a $($send)*,
                $($arg: 'a,)*
                R: 'a,
            {
                #[allow(unused_mut)]
                let mut target = target;
                Self::new_in(move |$($val: $arg),*| method($($by)* target, $($val),*), alloc)
            }

            /// Replaces the callable with `f`.
            ///
            /// The old callable is dropped first. A heap block is reused when `f` does not
            /// fit inline but fits the block, and released when `f` fits inline.
            pub fn set<F>(&mut self, f: F)
            where
                F: $f($($arg),*) -> R $($send)* + 'a,
            {
                // SAFETY: the delegate is bound for `F`.
                unsafe { self.assign(f, Delegate::$bind::<F>()) }
            }

            /// Calls the held callable.
            ///
            /// # Panics
            ///
            /// Panics if the function is empty.
            #[inline]
            pub fn call($($by)* self, $($val: $arg),*) -> R {
                // SAFETY: a bound delegate always matches the value in storage, and the
                // receiver grants the access its binding needs.
                unsafe { self.delegate.call(self.storage.data(), ($($val,)*)) }
            }
        }
    };

    (@from $sf:ident [$($ss:tt)*] => $lf:ident [$($ls:tt)*] $($arg:ident),*) => {
        impl<'a, $($arg,)* R, A: Allocator, Space>
            From<Function<dyn $sf($($arg),*) -> R $($ss)* + 'a, A, Space>>
            for Function<dyn $lf($($arg),*) -> R $($ls)* + 'a, A, Space>
        {
            fn from(f: Function<dyn $sf($($arg),*) -> R $($ss)* + 'a, A, Space>) -> Self {
                f.loosen()
            }
        }
    };

    ($($arg:ident $val:ident),*) => {
        callable!(@impl Fn [] shared [&] $($arg $val),*);
        callable!(@impl Fn [+ Send] shared [&] $($arg $val),*);
        callable!(@impl FnMut [] exclusive [&mut] $($arg $val),*);
        callable!(@impl FnMut [+ Send] exclusive [&mut] $($arg $val),*);

        callable!(@from Fn [+ Send] => Fn [] $($arg),*);
        callable!(@from Fn [+ Send] => FnMut [+ Send] $($arg),*);
        callable!(@from Fn [+ Send] => FnMut [] $($arg),*);
        callable!(@from Fn [] => FnMut [] $($arg),*);
        callable!(@from FnMut [+ Send] => FnMut [] $($arg),*);
    };
}

callable!();
callable!(A1 a1);
callable!(A1 a1, A2 a2);
callable!(A1 a1, A2 a2, A3 a3);
callable!(A1 a1, A2 a2, A3 a3, A4 a4);
callable!(A1 a1, A2 a2, A3 a3, A4 a4, A5 a5);
callable!(A1 a1, A2 a2, A3 a3, A4 a4, A5 a5, A6 a6);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::space::S16;
    use core::cell::Cell;

    type Add = Function<dyn Fn(i32) -> i32>;

    #[test]
    fn test_basic() {
        let f = Add::new(|x| x + 25);
        assert!(f.is_some());
        assert!(!f.is_heap());
        assert_eq!(f.call(100), 125);

        let array = [3i32; 101];
        let g = Add::new(move |i| array[usize::try_from(i).unwrap()] + 1);
        assert!(g.is_heap());
        assert_eq!(g.call(100), 4);
    }

    #[test]
    fn test_exclusive_call() {
        let mut count = 0;
        let mut f = Function::<dyn FnMut() -> i32>::new(move || {
            count += 1;
            count
        });
        assert_eq!(f.call(), 1);
        assert_eq!(f.call(), 2);
    }

    #[test]
    fn test_set_reuses_block() {
        let mut f = Add::new(|x| x);
        let big = [1i32; 40];
        f.set(move |x| x + big[0]);
        assert!(f.is_heap());
        let capacity = f.capacity();

        let smaller = [2i32; 20];
        f.set(move |x| x + smaller[19]);
        assert!(f.is_heap());
        assert_eq!(f.capacity(), capacity);
        assert_eq!(f.call(1), 3);

        f.set(|x| x - 1);
        assert!(!f.is_heap());
        assert_eq!(f.call(1), 0);
    }

    #[test]
    fn test_clear_keeps_capacity() {
        let big = [0u8; 100];
        let mut f = Add::new(move |x| x + i32::from(big[0]));
        f.clear();
        assert!(f.is_none());
        assert!(f.is_heap());
        f.shrink_to_fit();
        assert!(!f.is_heap());
    }

    #[test]
    fn test_shrink_keeps_held_callable() {
        let big = [0u8; 100];
        let mut f = Add::new(move |x| x + i32::from(big[99]));
        f.shrink_to_fit();
        assert!(f.is_heap());
        assert_eq!(f.call(5), 5);
    }

    #[test]
    fn test_resize_inline_to_inline() {
        let f = Function::<dyn Fn() -> u8, Global, S16>::new(|| 9);
        let g: Function<dyn Fn() -> u8> = f.resize();
        assert!(!g.is_heap());
        assert_eq!(g.call(), 9);
    }

    #[test]
    fn test_resize_keeps_heap_block() {
        let big = [5u8; 300];
        let f = Function::<dyn Fn() -> u8>::new(move || big[299]);
        let capacity = f.capacity();
        let g: Function<dyn Fn() -> u8, Global, S16> = f.resize();
        assert!(g.is_heap());
        assert_eq!(g.capacity(), capacity);
        assert_eq!(g.call(), 5);
    }

    #[test]
    fn test_drop_runs_once() {
        struct Guard<'a>(&'a Cell<u32>);
        impl Drop for Guard<'_> {
            fn drop(&mut self) {
                self.0.set(self.0.get() + 1);
            }
        }

        let drops = Cell::new(0);
        let guard = Guard(&drops);
        let mut f = Function::<dyn Fn() -> u32 + '_>::new(move || {
            let guard = &guard;
            guard.0.get()
        });
        let g = f.take();
        assert_eq!(drops.get(), 0);

        let g: Function<dyn Fn() -> u32 + '_, Global, S16> = g.resize();
        let g = g.with_allocator(Global);
        assert_eq!(drops.get(), 0);
        assert_eq!(g.call(), 0);

        drop(f);
        drop(g);
        assert_eq!(drops.get(), 1);
    }

    #[test]
    fn test_debug() {
        let f = Add::new(|x| x);
        assert_eq!(format!("{:?}", f), "Function { bound: true, heap: false }");
        assert_eq!(
            format!("{:?}", Add::empty()),
            "Function { bound: false, heap: false }"
        );
    }
}
