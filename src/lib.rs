#![cfg_attr(all(not(test), not(feature = "std")), no_std)]
#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! # `cbrc`
//! Reference-counted pointers sharing ownership through an explicit control block, in the vein
//! of C++'s `shared_ptr` and `weak_ptr`.
//!
//! A [`Shared<T>`] is an access pointer paired with a strong handle to a control block. The
//! control block, not the pointer, owns the payload: it destroys the payload when the last
//! [`Shared`] goes away, and frees its own memory once the last [`Weak`] is gone too. Because the
//! access pointer is separate from the owner, a `Shared` can point at any member of its payload
//! (see [`Shared::project`]) while keeping the whole payload alive.
//!
//! Payloads either live inline in the control block ([`Shared::new`], one allocation) or in
//! their own box ([`Shared::from_box`], supports unsized payloads). Payloads implementing
//! [`SharedFromThis`] can obtain pointers to themselves.
//!
//! # Example
//! ```
//! use cbrc::{DanglingWeak, Shared, Weak};
//!
//! fn accepts_shared(shared: Shared<u8>) {}
//!
//! // Shared can point into a larger payload
//! let tuple = Shared::new((16usize, 8u8));
//! let field: Shared<u8> = tuple.project(|tuple| &tuple.1);
//! let weak: Weak<u8> = Shared::downgrade(&field);
//! drop(tuple);
//!
//! // Functions accept any Shared<u8>, regardless of the payload it points into
//! accepts_shared(field);
//!
//! // Now the payload is gone
//! assert!(weak.expired());
//! assert!(Shared::is_null(&weak.lock()));
//! assert_eq!(Shared::<u8>::try_from(&weak).map(|_| ()), Err(DanglingWeak));
//! ```
//!
//! The counts are not atomic, so neither pointer can cross threads:
//! ```compile_fail,E0277
//! use cbrc::Shared;
//! let shared = Shared::new(1);
//! std::thread::spawn(move || drop(shared));
//! ```
//!
//! # Soundness
//! None of the following should compile:
//!
//! ```compile_fail,E0597
//! use cbrc::Shared;
//!
//! let x: Shared<()> = Shared::new(());
//! let z: Shared<str>;
//! {
//!     let s = "Hello World!".to_string();
//!     let s_ref: &str = &s;
//!     let y: Shared<&str> = x.project(|_| &s_ref);
//!     z = y.project(|s: &&str| *s);
//!     // s deallocated here
//! }
//! println!("{}", &*z); // printing garbage, accessing `s` after it’s freed
//! ```
//!
//! ```compile_fail,E0597
//! use cbrc::Shared;
//!
//! let x: Shared<()> = Shared::new(());
//! let z: Shared<str>;
//! {
//!     let s = "Hello World!".to_string();
//!     z = x.project(|_| &s as &str);
//!     // s deallocated here
//! }
//! println!("{}", &*z); // printing garbage, accessing `s` after it’s freed
//! ```

#![deny(missing_docs)]
#![deny(clippy::std_instead_of_core)]
#![deny(clippy::std_instead_of_alloc)]

extern crate alloc;

#[cfg(doctest)]
doc_comment::doctest!("../README.md");

mod block;
mod error;
mod shared;
mod this;
mod vtable;
mod weak;

pub use error::DanglingWeak;
pub use shared::Shared;
pub use this::{SharedFromThis, WeakThis};
pub use weak::Weak;
