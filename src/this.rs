//! Payloads that can hand out [`Shared`] pointers to themselves.

use core::{cell::Cell, fmt};

use crate::{error::DanglingWeak, shared::Shared, weak::Weak};

/// A slot for the weak back-reference of a [`SharedFromThis`] payload.
///
/// The slot starts empty and is filled by [`Shared::new_linked`] or [`Shared::from_box_linked`].
/// Cloning a `WeakThis` yields an empty slot: a cloned payload is a new object that hasn't been
/// adopted by any `Shared` yet.
pub struct WeakThis<T: ?Sized> {
    weak: Cell<Weak<T>>,
}

impl<T: ?Sized> WeakThis<T> {
    /// Constructs an empty slot.
    #[inline]
    pub const fn new() -> WeakThis<T> {
        Self {
            weak: Cell::new(Weak::new()),
        }
    }

    /// Returns a copy of the stored back-reference.
    pub fn get(&self) -> Weak<T> {
        let weak = self.weak.take();
        let copy = weak.clone();
        self.weak.set(weak);
        copy
    }

    pub(crate) fn link(&self, weak: Weak<T>) {
        self.weak.set(weak);
    }
}

impl<T: ?Sized> Default for WeakThis<T> {
    #[inline]
    fn default() -> Self {
        WeakThis::new()
    }
}

impl<T: ?Sized> Clone for WeakThis<T> {
    #[inline]
    fn clone(&self) -> Self {
        WeakThis::new()
    }
}

impl<T: ?Sized> fmt::Debug for WeakThis<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(WeakThis)")
    }
}

/// A payload that can obtain [`Shared`] and [`Weak`] pointers to itself.
///
/// Implementors embed a [`WeakThis`] and return it from [`weak_this`](SharedFromThis::weak_this).
/// The slot is only filled when the payload is wrapped with [`Shared::new_linked`] or
/// [`Shared::from_box_linked`]; the plain constructors leave it empty.
///
/// # Example
/// ```
/// use cbrc::{Shared, SharedFromThis, WeakThis};
/// use std::cell::RefCell;
///
/// struct Subscriber {
///     this: WeakThis<Subscriber>,
///     name: &'static str,
/// }
///
/// impl SharedFromThis for Subscriber {
///     fn weak_this(&self) -> &WeakThis<Self> {
///         &self.this
///     }
/// }
///
/// impl Subscriber {
///     fn subscribe(&self, list: &RefCell<Vec<Shared<Subscriber>>>) {
///         list.borrow_mut().push(self.shared_from_this().unwrap());
///     }
/// }
///
/// let list = RefCell::new(Vec::new());
/// let subscriber = Shared::new_linked(Subscriber { this: WeakThis::new(), name: "a" });
/// subscriber.subscribe(&list);
/// assert_eq!(Shared::strong_count(&subscriber), 2);
/// assert_eq!(list.borrow()[0].name, "a");
/// ```
pub trait SharedFromThis: 'static {
    /// Returns the slot holding this payload's back-reference.
    fn weak_this(&self) -> &WeakThis<Self>;

    /// Returns a new [`Shared`] sharing ownership of `self` with the `Shared` that adopted it.
    ///
    /// # Errors
    /// Fails with [`DanglingWeak`] if `self` was never adopted by a linking constructor, or if
    /// all strong pointers to it are already gone (e.g. when called from `Drop`).
    fn shared_from_this(&self) -> Result<Shared<Self>, DanglingWeak> {
        self.weak_this().get().upgrade().ok_or(DanglingWeak)
    }

    /// Returns a [`Weak`] pointer to `self`, which is empty if `self` was never adopted.
    fn weak_from_this(&self) -> Weak<Self> {
        self.weak_this().get()
    }
}
