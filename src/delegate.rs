//! The operation table behind a [`Function`](crate::Function).
//!
//! Binding a concrete callable type produces one [`Ops`]: plain function pointers that
//! invoke, move and drop a value of that type through an untyped pointer, plus its
//! layout. The table is replaced as a whole, never field by field.

use core::alloc::Layout;
use core::mem;
use core::ptr::{self, NonNull};

use crate::signature::{Loosen, Signature};

/// Calling through a shared reference with the arguments packed in a tuple.
pub(crate) trait CallShared<Args, R> {
    fn call_shared(&self, args: Args) -> R;
}

/// Calling through an exclusive reference with the arguments packed in a tuple.
pub(crate) trait CallExclusive<Args, R> {
    fn call_exclusive(&mut self, args: Args) -> R;
}

macro_rules! call_impls {
    ($($arg:ident $val:ident),*) => {
        impl<F, $($arg,)* R> CallShared<($($arg,)*), R> for F
        where
            F: Fn($($arg),*) -> R,
        {
            #[inline]
            fn call_shared(&self, ($($val,)*): ($($arg,)*)) -> R {
                self($($val),*)
            }
        }

        impl<F, $($arg,)* R> CallExclusive<($($arg,)*), R> for F
        where
            F: FnMut($($arg),*) -> R,
        {
            #[inline]
            fn call_exclusive(&mut self, ($($val,)*): ($($arg,)*)) -> R {
                self($($val),*)
            }
        }
    };
}

call_impls!();
call_impls!(A1 a1);
call_impls!(A1 a1, A2 a2);
call_impls!(A1 a1, A2 a2, A3 a3);
call_impls!(A1 a1, A2 a2, A3 a3, A4 a4);
call_impls!(A1 a1, A2 a2, A3 a3, A4 a4, A5 a5);
call_impls!(A1 a1, A2 a2, A3 a3, A4 a4, A5 a5, A6 a6);

unsafe fn invoke_shared<F, Args, R>(data: NonNull<u8>, args: Args) -> R
where
    F: CallShared<Args, R>,
{
    // SAFETY: `data` points to a live, aligned `F`.
    unsafe { data.cast::<F>().as_ref() }.call_shared(args)
}

unsafe fn invoke_exclusive<F, Args, R>(data: NonNull<u8>, args: Args) -> R
where
    F: CallExclusive<Args, R>,
{
    // SAFETY: `data` points to a live, aligned `F` nobody else is looking at.
    unsafe { data.cast::<F>().as_mut() }.call_exclusive(args)
}

unsafe fn relocate<F>(from: NonNull<u8>, to: NonNull<u8>) {
    // SAFETY: `from` holds a live `F`, `to` has room for one; the source is dead afterwards.
    unsafe { ptr::write(to.cast::<F>().as_ptr(), ptr::read(from.cast::<F>().as_ptr())) }
}

unsafe fn destroy<F>(data: NonNull<u8>) {
    // SAFETY: `data` holds a live `F` that is not used again.
    unsafe { ptr::drop_in_place(data.cast::<F>().as_ptr()) }
}

/// Function pointers bound for one concrete callable type.
pub(crate) struct Ops<Sig: ?Sized + Signature> {
    invoke: unsafe fn(NonNull<u8>, Sig::Args) -> Sig::Output,
    relocate: unsafe fn(NonNull<u8>, NonNull<u8>),
    destroy: Option<unsafe fn(NonNull<u8>)>,
    layout: Layout,
}

impl<Sig: ?Sized + Signature> Clone for Ops<Sig> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<Sig: ?Sized + Signature> Copy for Ops<Sig> {}

/// Either a complete operation table or nothing.
pub(crate) struct Delegate<Sig: ?Sized + Signature> {
    ops: Option<Ops<Sig>>,
}

impl<Sig: ?Sized + Signature> Clone for Delegate<Sig> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<Sig: ?Sized + Signature> Copy for Delegate<Sig> {}

impl<Sig: ?Sized + Signature> Delegate<Sig> {
    pub(crate) const fn empty() -> Self {
        Delegate { ops: None }
    }

    /// Binds `F`, invoked through a shared reference.
    pub(crate) fn shared<F>() -> Self
    where
        F: CallShared<Sig::Args, Sig::Output>,
    {
        Self::bind::<F>(invoke_shared::<F, Sig::Args, Sig::Output>)
    }

    /// Binds `F`, invoked through an exclusive reference.
    pub(crate) fn exclusive<F>() -> Self
    where
        F: CallExclusive<Sig::Args, Sig::Output>,
    {
        Self::bind::<F>(invoke_exclusive::<F, Sig::Args, Sig::Output>)
    }

    fn bind<F>(invoke: unsafe fn(NonNull<u8>, Sig::Args) -> Sig::Output) -> Self {
        Delegate {
            ops: Some(Ops {
                invoke,
                relocate: relocate::<F>,
                destroy: if mem::needs_drop::<F>() {
                    Some(destroy::<F>)
                } else {
                    None
                },
                layout: Layout::new::<F>(),
            }),
        }
    }

    /// Unbinds, returning what was bound.
    pub(crate) fn take(&mut self) -> Self {
        Delegate {
            ops: self.ops.take(),
        }
    }

    pub(crate) fn is_bound(&self) -> bool {
        self.ops.is_some()
    }

    /// Layout of the bound type.
    pub(crate) fn layout(&self) -> Option<Layout> {
        self.ops.map(|ops| ops.layout)
    }

    /// Calls the value at `data`.
    ///
    /// # Safety
    ///
    /// When bound, `data` must point to a live value of the bound type, with exclusive
    /// access if it was bound by [`exclusive`](Self::exclusive).
    ///
    /// # Panics
    ///
    /// Panics when nothing is bound.
    #[inline]
    pub(crate) unsafe fn call(&self, data: NonNull<u8>, args: Sig::Args) -> Sig::Output {
        match self.ops {
            // SAFETY: forwarded from the caller.
            Some(ops) => unsafe { (ops.invoke)(data, args) },
            None => empty_call(),
        }
    }

    /// Moves the bound value from `from` to `to`. `from` is dead afterwards.
    ///
    /// # Safety
    ///
    /// `from` must hold a live value of the bound type; `to` must be valid for writes of
    /// [`layout`](Self::layout) and must not overlap `from`.
    pub(crate) unsafe fn relocate(&self, from: NonNull<u8>, to: NonNull<u8>) {
        if let Some(ops) = self.ops {
            // SAFETY: forwarded from the caller.
            unsafe { (ops.relocate)(from, to) }
        }
    }

    /// Drops the bound value in place. No-op for types without drop glue.
    ///
    /// # Safety
    ///
    /// `data` must hold a live value of the bound type, which is dead afterwards.
    pub(crate) unsafe fn destroy(&self, data: NonNull<u8>) {
        if let Some(destroy) = self.ops.and_then(|ops| ops.destroy) {
            // SAFETY: forwarded from the caller.
            unsafe { destroy(data) }
        }
    }

    /// The same table viewed through a looser signature.
    pub(crate) fn loosen<T>(self) -> Delegate<T>
    where
        T: ?Sized + Loosen<Sig> + Signature<Args = Sig::Args, Output = Sig::Output>,
    {
        Delegate {
            ops: self.ops.map(|ops| Ops {
                invoke: ops.invoke,
                relocate: ops.relocate,
                destroy: ops.destroy,
                layout: ops.layout,
            }),
        }
    }
}

#[cold]
#[inline(never)]
fn empty_call() -> ! {
    panic!("called an empty `Function`")
}
