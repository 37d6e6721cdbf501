//! # smallfn: Small-Buffer Callables
//!
//! [`Function`] is a move-only, type-erased callable in the spirit of `Box<dyn Fn>`. Small
//! closures are stored inside the function itself, and only closures that are too large or
//! too strictly aligned for the inline space get a heap block. The heap block comes from a
//! pluggable allocator, which can be chosen at runtime with [`PolyFunction`].
//!
//! ## Core Concept
//!
//! A `Box<dyn Fn>` allocates for every closure with captured state. [`Function`] keeps a
//! configurable inline space and a small table of function pointers (call, move, drop)
//! bound for the concrete closure type, so storing a closure that fits is free of
//! allocation.
//!
//! ## Quick Start
//!
//! Add smallfn to your `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! smallfn = "0.1"
//! ```
//!
//! Basic usage:
//!
//! ```rust
//! use smallfn::Function;
//!
//! type Handler = Function<dyn Fn(i32) -> i32>;
//!
//! // Small closures are stored inline
//! let offset = 25;
//! let small = Handler::new(move |x| x + offset);
//! assert!(!small.is_heap());
//! assert_eq!(small.call(100), 125);
//!
//! // Large closures fall back to one heap block
//! let table = [1i32; 101];
//! let mut large = Handler::new(move |i| table[i as usize]);
//! assert!(large.is_heap());
//!
//! // Reassigning drops the old closure first
//! large.set(|x| -x);
//! assert_eq!(large.call(4), -4);
//! ```
//!
//! ## Signatures
//!
//! The first type parameter is a trait object type naming how the function is called:
//!
//! - `dyn Fn(A, B) -> R`: [`call`](Function::call) takes `&self`
//! - `dyn FnMut(A, B) -> R`: `call` takes `&mut self` and the closure may mutate its state
//! - either with `+ Send`: only `Send` closures are accepted and the function is `Send`
//!
//! Up to six arguments are supported. A function converts to a signature that only drops
//! guarantees (`Fn` to `FnMut`, `+ Send` to plain) without moving its closure:
//!
//! ```rust
//! use smallfn::Function;
//!
//! let strict = Function::<dyn Fn() -> &'static str + Send>::new(|| "hello");
//! let mut loose: Function<dyn FnMut() -> &'static str> = strict.into();
//! assert_eq!(loose.call(), "hello");
//! ```
//!
//! ## Configuration
//!
//! ### Feature Flags
//!
//! - **`std`** (enabled by default)
//!   - Links to the standard library and implements `std::error::Error` for [`AllocError`]
//!   - Disable for `#![no_std]` environments: `default-features = false`
//!
//! ### Custom Space Types
//!
//! The third type parameter sets the inline capacity, see [`space`]:
//!
//! ```rust
//! use smallfn::space::S32;
//! use smallfn::{Function, Global};
//!
//! type Wide = Function<dyn Fn() -> u64, Global, S32>;
//!
//! let data = [2u64; 24];
//! let f = Wide::new(move || data.iter().sum());
//! assert!(!f.is_heap());
//! assert_eq!(f.call(), 48);
//! ```
//!
//! **Important**: Space alignment matters! A closure more strictly aligned than the space
//! goes to the heap regardless of its size.
//!
//! ### Allocators
//!
//! The second type parameter is the [`Allocator`] for heap blocks; [`Global`] by default.
//! [`PolyFunction`] takes any [`MemoryResource`] by reference instead, such as the
//! [`Monotonic`] arena:
//!
//! ```rust
//! use core::mem::MaybeUninit;
//! use smallfn::{Monotonic, PolyFunction};
//!
//! let mut buf = [MaybeUninit::uninit(); 256];
//! let arena = Monotonic::new(&mut buf);
//!
//! let big = [3u8; 100];
//! let f = PolyFunction::<dyn Fn() -> u8>::new_in(move || big[99], &arena);
//! assert!(f.is_heap());
//! assert!(arena.used() >= 100);
//!
//! // Out of arena memory: the closure is handed back
//! let bigger = [0u8; 200];
//! assert!(PolyFunction::<dyn Fn() -> u8>::try_new_in(move || bigger[0], &arena).is_err());
//! ```

#![cfg_attr(not(feature = "std"), no_std)]
#![deny(missing_docs)]
#![deny(clippy::as_conversions)]

extern crate alloc;

mod allocator;
mod delegate;
mod function;
mod monotonic;
pub mod signature;
pub mod space;
mod sptr;
mod storage;

pub use crate::allocator::{AllocError, Allocator, Global, MemoryResource, Polymorphic};
pub use crate::function::{Function, PolyFunction};
pub use crate::monotonic::Monotonic;
pub use crate::signature::{Loosen, Signature};
pub use crate::storage::Storage;
