//! Call signatures a [`Function`](crate::Function) can be instantiated with.
//!
//! A signature is written as a trait object type: `dyn Fn(A, B) -> R` for callables
//! invoked through a shared reference, `dyn FnMut(A, B) -> R` for callables that need
//! exclusive access, each optionally `+ Send`. Zero to six arguments are supported.
//!
//! Arguments that borrow must name their lifetime, `dyn Fn(&'s str) -> usize + 's`;
//! higher-ranked signatures such as `dyn for<'x> Fn(&'x str)` are not signatures.

mod sealed {
    pub trait Sealed {}
}

/// A callable signature: the argument tuple and the result.
///
/// Implemented for `dyn Fn(..) -> R`, `dyn FnMut(..) -> R` and their `+ Send` forms.
/// This trait is sealed.
pub trait Signature: sealed::Sealed {
    /// Arguments as a tuple, `(A, B)` for `dyn Fn(A, B) -> R`.
    type Args;
    /// The result type.
    type Output;
}

/// `Self` can hold any callable admitted by `Strict`.
///
/// Holds for every signature and itself, and for the conversions that only drop a
/// guarantee: `Fn` to `FnMut`, and `+ Send` to its plain form. The reverse directions are
/// never implemented, so a `FnMut` callable cannot end up behind a shared-call signature.
///
/// # Safety
///
/// A callable bound for `Strict` must be sound to call and move through `Self`.
pub unsafe trait Loosen<Strict: ?Sized>: Signature {}

unsafe impl<S: ?Sized + Signature> Loosen<S> for S {}

macro_rules! signature {
    ($f:ident [$($send:tt)*] $($arg:ident),*) => {
        impl<'a, $($arg,)* R> sealed::Sealed for dyn $f($($arg),*) -> R $($send)* + 'a {}

        impl<'a, $($arg,)* R> Signature for dyn $f($($arg),*) -> R $($send)* + 'a {
            type Args = ($($arg,)*);
            type Output = R;
        }
    };
}

macro_rules! signatures {
    ($($arg:ident),*) => {
        signature!(Fn [] $($arg),*);
        signature!(Fn [+ Send] $($arg),*);
        signature!(FnMut [] $($arg),*);
        signature!(FnMut [+ Send] $($arg),*);

        unsafe impl<'a, $($arg,)* R> Loosen<dyn Fn($($arg),*) -> R + Send + 'a>
            for dyn Fn($($arg),*) -> R + 'a {}
        unsafe impl<'a, $($arg,)* R> Loosen<dyn Fn($($arg),*) -> R + Send + 'a>
            for dyn FnMut($($arg),*) -> R + Send + 'a {}
        unsafe impl<'a, $($arg,)* R> Loosen<dyn Fn($($arg),*) -> R + Send + 'a>
            for dyn FnMut($($arg),*) -> R + 'a {}
        unsafe impl<'a, $($arg,)* R> Loosen<dyn Fn($($arg),*) -> R + 'a>
            for dyn FnMut($($arg),*) -> R + 'a {}
        unsafe impl<'a, $($arg,)* R> Loosen<dyn FnMut($($arg),*) -> R + Send + 'a>
            for dyn FnMut($($arg),*) -> R + 'a {}
    };
}

signatures!();
signatures!(A1);
signatures!(A1, A2);
signatures!(A1, A2, A3);
signatures!(A1, A2, A3, A4);
signatures!(A1, A2, A3, A4, A5);
signatures!(A1, A2, A3, A4, A5, A6);

#[cfg(test)]
mod tests {
    use super::*;
    use core::any::TypeId;

    fn args_of<S: ?Sized + Signature>() -> TypeId
    where
        S::Args: 'static,
    {
        TypeId::of::<S::Args>()
    }

    fn loosens<To: ?Sized + Loosen<From>, From: ?Sized>() {}

    #[test]
    fn test_args_tuple() {
        assert_eq!(args_of::<dyn Fn()>(), TypeId::of::<()>());
        assert_eq!(args_of::<dyn FnMut(u8) + Send>(), TypeId::of::<(u8,)>());
        assert_eq!(
            args_of::<dyn Fn(u8, u16, u32, u64, i8, i16) -> bool>(),
            TypeId::of::<(u8, u16, u32, u64, i8, i16)>()
        );
    }

    #[test]
    fn test_loosening_relation() {
        loosens::<dyn Fn(i32), dyn Fn(i32)>();
        loosens::<dyn Fn(i32), dyn Fn(i32) + Send>();
        loosens::<dyn FnMut(i32), dyn Fn(i32)>();
        loosens::<dyn FnMut(i32), dyn Fn(i32) + Send>();
        loosens::<dyn FnMut(i32) + Send, dyn Fn(i32) + Send>();
        loosens::<dyn FnMut(i32), dyn FnMut(i32) + Send>();
    }
}
