//! The non-owning observer pointer, [`Weak`].

use core::{fmt, ptr::NonNull};

use crate::{block::BlockWeak, shared::Shared};

/// Weak is a version of [`Shared`] that holds a non-owning reference to the managed allocation.
/// The allocation is accessed by calling [`upgrade`] or [`lock`], or by `Shared::try_from(&weak)`.
///
/// `Weak` keeps the control block allocated, but not the payload. It caches the access pointer of
/// the `Shared` it was created from, so upgrading a `Weak` made from a projection yields the same
/// projection.
///
/// # Example
/// ```
/// use cbrc::{Shared, Weak};
///
/// let tuple = Shared::new((7, 8));
/// let weak: Weak<(usize, usize)> = Shared::downgrade(&tuple);
/// let projected = tuple.project(|x| &x.1);
/// drop(tuple);
///
/// // Even when tuple is dropped, we can still access it using Weak
/// let tuple = weak.upgrade().unwrap();
/// assert_eq!(*tuple, (7, 8));
///
/// // When we drop all strong references, upgrading fails
/// drop(tuple);
/// drop(projected);
/// assert!(weak.expired());
/// assert!(weak.upgrade().is_none());
/// assert!(Shared::is_null(&weak.lock()));
/// assert!(Shared::<(usize, usize)>::try_from(&weak).is_err());
/// ```
///
/// [`upgrade`]: Weak::upgrade
/// [`lock`]: Weak::lock
pub struct Weak<T: ?Sized> {
    pub(crate) block: Option<BlockWeak>,
    pub(crate) ptr: Option<NonNull<T>>,
}

impl<T: ?Sized> Weak<T> {
    /// Constructs an empty `Weak` that references no control block and never upgrades.
    ///
    /// # Example
    /// ```
    /// use cbrc::Weak;
    /// let empty: Weak<u8> = Weak::new();
    /// assert!(empty.expired());
    /// assert_eq!(empty.strong_count(), 0);
    /// ```
    #[inline]
    pub const fn new() -> Weak<T> {
        Self {
            block: None,
            ptr: None,
        }
    }

    /// Attempts to upgrade the `Weak` pointer to a [`Shared`], delaying dropping of the payload
    /// if successful.
    ///
    /// Returns [`None`] if the payload has since been dropped or if this `Weak` is empty.
    ///
    /// # Example
    /// ```
    /// use cbrc::Shared;
    /// let five = Shared::new(5);
    ///
    /// let weak_five = Shared::downgrade(&five);
    ///
    /// let strong_five: Option<Shared<_>> = weak_five.upgrade();
    /// assert!(strong_five.is_some());
    ///
    /// // Destroy all strong pointers.
    /// drop(strong_five);
    /// drop(five);
    ///
    /// assert!(weak_five.upgrade().is_none());
    /// ```
    #[inline]
    pub fn upgrade(&self) -> Option<Shared<T>> {
        let block = self.block.as_ref()?.upgrade()?;
        Some(Shared {
            block: Some(block),
            ptr: self.ptr,
        })
    }

    /// Like [`upgrade`](Weak::upgrade), but returns a null [`Shared`] on failure.
    ///
    /// # Example
    /// ```
    /// use cbrc::Shared;
    /// let five = Shared::new(5);
    /// let weak_five = Shared::downgrade(&five);
    /// assert_eq!(*weak_five.lock(), 5);
    ///
    /// drop(five);
    /// assert!(Shared::is_null(&weak_five.lock()));
    /// ```
    #[inline]
    pub fn lock(&self) -> Shared<T> {
        self.upgrade().unwrap_or_default()
    }

    /// Returns `true` if upgrading this `Weak` would fail.
    #[inline]
    pub fn expired(&self) -> bool {
        self.strong_count() == 0
    }

    /// Returns the number of strong pointers pointing to this allocation.
    ///
    /// Returns `0` if this `Weak` is empty.
    #[inline]
    pub fn strong_count(&self) -> usize {
        self.block.as_ref().map_or(0, BlockWeak::strong_count)
    }

    /// Gets the number of `Weak` pointers pointing to this allocation.
    ///
    /// Like [`std::rc::Weak::weak_count`], this returns `0` once there are no strong pointers
    /// left, or if this `Weak` is empty.
    ///
    /// [`std::rc::Weak::weak_count`]: https://doc.rust-lang.org/std/rc/struct.Weak.html#method.weak_count
    #[inline]
    pub fn weak_count(&self) -> usize {
        self.block.as_ref().map_or(0, BlockWeak::weak_count)
    }

    /// Drops this `Weak`'s reference to the control block, leaving it empty.
    ///
    /// # Example
    /// ```
    /// use cbrc::Shared;
    /// let five = Shared::new(5);
    /// let mut weak = Shared::downgrade(&five);
    /// weak.reset();
    /// assert!(weak.expired());
    /// assert_eq!(Shared::weak_count(&five), 0);
    /// ```
    #[inline]
    pub fn reset(&mut self) {
        drop(core::mem::take(self));
    }

    /// Exchanges the contents of two `Weak`s without touching any counts.
    ///
    /// # Example
    /// ```
    /// use cbrc::{Shared, Weak};
    /// let five = Shared::new(5);
    /// let mut weak = Shared::downgrade(&five);
    /// let mut empty = Weak::new();
    /// weak.swap(&mut empty);
    /// assert!(weak.expired());
    /// assert_eq!(*empty.lock(), 5);
    /// ```
    #[inline]
    pub fn swap(&mut self, other: &mut Weak<T>) {
        core::mem::swap(self, other);
    }

    /// Returns `true` if the two `Weak`s cache the same access pointer, comparing addresses only.
    ///
    /// This function is able to compare `Weak` pointers even when either or both of them
    /// can't successfully `upgrade` anymore.
    #[inline]
    pub fn ptr_eq<U: ?Sized>(&self, other: &Weak<U>) -> bool {
        core::ptr::eq(self.addr(), other.addr())
    }

    /// Returns `true` if the two `Weak`s reference the same control block (or are both empty).
    ///
    /// # Example
    /// ```
    /// use cbrc::Shared;
    /// let pair = Shared::new((1, 2));
    /// let first = Shared::downgrade(&pair.project(|pair| &pair.0));
    /// let second = Shared::downgrade(&pair.project(|pair| &pair.1));
    /// assert!(first.owner_eq(&second));
    /// assert!(!first.ptr_eq(&second));
    ///
    /// let other = Shared::downgrade(&Shared::new(1));
    /// assert!(!first.owner_eq(&other));
    /// ```
    #[inline]
    pub fn owner_eq<U: ?Sized>(&self, other: &Weak<U>) -> bool {
        match (&self.block, &other.block) {
            (Some(this), Some(other)) => this.ptr_eq(other),
            (None, None) => true,
            _ => false,
        }
    }

    fn addr(&self) -> *const () {
        self.ptr.map_or(core::ptr::null(), |ptr| {
            ptr.cast::<()>().as_ptr() as *const ()
        })
    }
}

impl<T> Weak<T> {
    /// Returns the cached access pointer, or a null pointer for an empty `Weak`.
    ///
    /// The pointer is valid only if there are some strong references.
    ///
    /// # Example
    /// ```
    /// use cbrc::Shared;
    /// use std::ptr;
    ///
    /// let strong = Shared::new("hello".to_owned());
    /// let weak = Shared::downgrade(&strong);
    /// // Both point to the same object
    /// assert!(ptr::eq(&*strong, weak.as_ptr()));
    /// // The strong here keeps it alive, so we can still access the object.
    /// assert_eq!("hello", unsafe { &*weak.as_ptr() });
    ///
    /// drop(strong);
    /// // But not any more. We can do weak.as_ptr(), but accessing the pointer would lead to
    /// // undefined behaviour.
    /// // assert_eq!("hello", unsafe { &*weak.as_ptr() });
    /// ```
    #[must_use]
    pub fn as_ptr(&self) -> *const T {
        self.ptr
            .map_or(core::ptr::null(), |ptr| ptr.as_ptr() as *const T)
    }
}

impl<T: ?Sized> Clone for Weak<T> {
    #[inline]
    fn clone(&self) -> Self {
        Self {
            block: self.block.clone(),
            ptr: self.ptr,
        }
    }

    /// Assigns `source` to `self`, leaving the counts untouched if both already reference the
    /// same control block.
    fn clone_from(&mut self, source: &Self) {
        if self.owner_eq(source) {
            self.ptr = source.ptr;
            return;
        }
        *self = source.clone();
    }
}

impl<T: ?Sized> Default for Weak<T> {
    #[inline]
    fn default() -> Self {
        Weak::new()
    }
}

impl<T: ?Sized> From<&Shared<T>> for Weak<T> {
    #[inline]
    fn from(shared: &Shared<T>) -> Self {
        Shared::downgrade(shared)
    }
}

impl<T: ?Sized> fmt::Debug for Weak<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(Weak)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::live;
    use alloc::rc::Rc;
    use core::cell::Cell;

    struct Drops(Rc<Cell<usize>>);

    impl Drop for Drops {
        fn drop(&mut self) {
            self.0.set(self.0.get() + 1);
        }
    }

    #[test]
    fn block_freed_with_last_weak() {
        let blocks = live::blocks();
        let dropped = Rc::new(Cell::new(0));

        let shared = Shared::new(Drops(dropped.clone()));
        let weak = Shared::downgrade(&shared);
        let weak2 = weak.clone();
        drop(shared);
        assert_eq!(dropped.get(), 1);
        assert!(weak.expired());

        drop(weak);
        assert_eq!(live::blocks(), blocks + 1);
        drop(weak2);
        assert_eq!(live::blocks(), blocks);
        assert_eq!(dropped.get(), 1);
    }

    #[test]
    fn reset_last_weak_frees_block() {
        let blocks = live::blocks();
        let shared = Shared::new(1);
        let mut weak = Shared::downgrade(&shared);
        drop(shared);
        assert_eq!(live::blocks(), blocks + 1);

        weak.reset();
        assert_eq!(live::blocks(), blocks);
        assert!(weak.upgrade().is_none());
    }

    #[test]
    fn clone_from_same_block_keeps_counts() {
        let shared = Shared::new(1);
        let mut weak = Shared::downgrade(&shared);
        let weak2 = weak.clone();

        weak.clone_from(&weak2);
        assert_eq!(weak.weak_count(), 2);
        assert_eq!(weak.strong_count(), 1);
    }

    #[test]
    fn clone_from_other_block_releases_old() {
        let blocks = live::blocks();
        let first = Shared::new(1);
        let second = Shared::new(2);
        let mut weak = Shared::downgrade(&first);
        drop(first);
        assert_eq!(live::blocks(), blocks + 2);

        // The first block only had this weak left, so reassigning frees it
        weak.clone_from(&Shared::downgrade(&second));
        assert_eq!(live::blocks(), blocks + 1);
        assert_eq!(*weak.lock(), 2);
        assert_eq!(Shared::weak_count(&second), 1);
    }

    #[test]
    fn swap_keeps_counts() {
        let a = Shared::new(1);
        let b = Shared::new(2);
        let mut weak_a = Shared::downgrade(&a);
        let mut weak_b = Shared::downgrade(&b);

        weak_a.swap(&mut weak_b);
        assert_eq!(*weak_a.lock(), 2);
        assert_eq!(*weak_b.lock(), 1);
        assert_eq!(Shared::weak_count(&a), 1);
        assert_eq!(Shared::weak_count(&b), 1);
    }

    #[test]
    fn empty_weaks() {
        let empty: Weak<u8> = Weak::default();
        assert!(empty.expired());
        assert_eq!(empty.weak_count(), 0);
        assert!(empty.as_ptr().is_null());
        assert!(empty.owner_eq(&Weak::<u32>::new()));
        assert!(Shared::is_null(&empty.lock()));
    }
}
