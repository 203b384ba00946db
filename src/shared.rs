//! The strong-owning pointer, [`Shared`].

use alloc::boxed::Box;
use core::{
    cmp::Ordering,
    fmt,
    hash::{Hash, Hasher},
    iter::FromIterator,
    ops::Deref,
    ptr::{self, NonNull},
};

use crate::{
    block::BlockRc,
    error::DanglingWeak,
    this::SharedFromThis,
    weak::Weak,
};

/// Reference counted pointer sharing ownership of its payload through a control block.
///
/// A `Shared<T>` is an *access pointer* to a `T` together with a strong handle to the control
/// block that owns the payload. The access pointer doesn't have to point at the payload itself:
/// [`project`](Shared::project) produces `Shared`s pointing to any (sub)member of the payload, or
/// to the payload as a trait object, which keep the whole payload alive.
///
/// `Shared` can also be null. A null `Shared` references no control block and dereferencing it
/// panics; use [`Shared::get`] to check.
///
/// The counts are not atomic, so `Shared` is neither `Send` nor `Sync`.
///
/// # Example
/// ```
/// use cbrc::Shared;
///
/// let pair = Shared::new((16usize, 8u8));
/// let second: Shared<u8> = pair.project(|pair| &pair.1);
/// assert_eq!(Shared::strong_count(&pair), 2);
///
/// drop(pair);
/// // The projection keeps the whole pair alive
/// assert_eq!(*second, 8);
/// assert_eq!(Shared::strong_count(&second), 1);
/// ```
pub struct Shared<T: ?Sized> {
    pub(crate) block: Option<BlockRc>,
    pub(crate) ptr: Option<NonNull<T>>,
}

impl<T: 'static> Shared<T> {
    /// Constructs a new `Shared<T>`, storing `value` inline in its control block.
    ///
    /// This needs a single allocation, as opposed to [`Shared::from_box`]. The value's memory is
    /// returned only once the last [`Weak`] is dropped as well.
    ///
    /// The payload's [`WeakThis`](crate::WeakThis) slot, if any, is left empty: wrap
    /// [`SharedFromThis`] payloads with [`Shared::new_linked`] instead.
    ///
    /// # Example
    /// ```
    /// use cbrc::Shared;
    /// let shared = Shared::new(6);
    /// assert_eq!(Shared::strong_count(&shared), 1);
    /// ```
    #[inline]
    pub fn new(value: T) -> Shared<T> {
        let (block, ptr) = BlockRc::in_place(value);
        Self {
            block: Some(block),
            ptr: Some(ptr),
        }
    }
}

impl<T: ?Sized + 'static> Shared<T> {
    /// Constructs a new `Shared<T>` taking ownership of a boxed payload.
    ///
    /// The control block is allocated separately from the payload, which is freed as soon as the
    /// last strong pointer is dropped. Unsized payloads are supported.
    ///
    /// Like [`Shared::new`], this doesn't link a [`SharedFromThis`] payload; use
    /// [`Shared::from_box_linked`] for those.
    ///
    /// # Example
    /// ```
    /// use cbrc::Shared;
    /// let slice: Shared<[u8]> = Shared::from_box(vec![1, 2, 3].into_boxed_slice());
    /// assert_eq!(&*slice, &[1, 2, 3]);
    /// ```
    #[inline]
    pub fn from_box(payload: Box<T>) -> Shared<T> {
        let (block, ptr) = BlockRc::separate(payload);
        Self {
            block: Some(block),
            ptr: Some(ptr),
        }
    }

    /// Constructs a new `Shared<T>` taking ownership of a raw pointer.
    ///
    /// [`SharedFromThis`] payloads are linked by [`Shared::from_raw_linked`] instead.
    ///
    /// # Safety
    /// `ptr` must have been returned by [`Box::into_raw`] and must not be owned by anything else;
    /// in particular it must not be passed to `from_raw` twice.
    ///
    /// # Example
    /// ```
    /// use cbrc::Shared;
    /// let raw = Box::into_raw(Box::new(5));
    /// // SAFETY: `raw` comes from `Box::into_raw` and nothing else owns it
    /// let shared = unsafe { Shared::from_raw(raw) };
    /// assert_eq!(*shared, 5);
    /// ```
    pub unsafe fn from_raw(ptr: *mut T) -> Shared<T> {
        Self::from_box(Box::from_raw(ptr))
    }

    /// Releases the current payload and takes ownership of a new boxed one.
    ///
    /// The new payload isn't linked. Assign the result of [`Shared::from_box_linked`] to replace a
    /// [`SharedFromThis`] payload.
    ///
    /// # Example
    /// ```
    /// use cbrc::Shared;
    /// let mut shared = Shared::new(1);
    /// let other = shared.clone();
    /// Shared::reset_with(&mut shared, Box::new(2));
    /// assert_eq!((*shared, *other), (2, 1));
    /// assert_eq!(Shared::strong_count(&other), 1);
    /// ```
    pub fn reset_with(this: &mut Self, payload: Box<T>) {
        *this = Self::from_box(payload);
    }

    /// Returns a mutable reference to the data if there are no other `Shared` or [`Weak`]
    /// pointers to the same control block, and this `Shared` points at the whole payload.
    ///
    /// Projections never grant mutable access: the projected data may be reachable through other
    /// paths, e.g. when it lives behind a reference stored in the payload.
    ///
    /// # Example
    /// ```
    /// use cbrc::Shared;
    /// let mut x = Shared::new(3);
    /// *Shared::get_mut(&mut x).unwrap() = 4;
    /// assert_eq!(*x, 4);
    ///
    /// let _y = x.clone();
    /// assert!(Shared::get_mut(&mut x).is_none());
    ///
    /// let pair = Shared::new((1, 2));
    /// let mut first = pair.project(|pair| &pair.0);
    /// drop(pair);
    /// assert!(Shared::get_mut(&mut first).is_none());
    /// ```
    pub fn get_mut(this: &mut Self) -> Option<&mut T> {
        let ptr = this.ptr?;
        match &this.block {
            // SAFETY: no other handle references the block, and `ptr` is the block's own payload,
            // so nothing else can reach the data
            Some(block) if block.is_unique() && block.is_payload(ptr) => {
                Some(unsafe { &mut *ptr.as_ptr() })
            }
            _ => None,
        }
    }
}

impl<T: SharedFromThis> Shared<T> {
    /// Like [`Shared::new`], but also points the payload's [`WeakThis`](crate::WeakThis) slot at
    /// the new control block, enabling [`SharedFromThis::shared_from_this`].
    ///
    /// The slot holds a weak reference, so the strong count is still 1.
    ///
    /// # Example
    /// ```
    /// use cbrc::{Shared, SharedFromThis, WeakThis};
    ///
    /// struct Node {
    ///     this: WeakThis<Node>,
    /// }
    ///
    /// impl SharedFromThis for Node {
    ///     fn weak_this(&self) -> &WeakThis<Self> {
    ///         &self.this
    ///     }
    /// }
    ///
    /// let node = Shared::new_linked(Node { this: WeakThis::new() });
    /// assert_eq!(Shared::strong_count(&node), 1);
    /// let again = node.shared_from_this().unwrap();
    /// assert_eq!(Shared::strong_count(&node), 2);
    /// assert!(Shared::owner_eq(&node, &again));
    /// ```
    pub fn new_linked(value: T) -> Shared<T> {
        let this = Self::new(value);
        Self::link_this(&this);
        this
    }

    /// Like [`Shared::from_box`], but also points the payload's [`WeakThis`](crate::WeakThis) slot
    /// at the new control block.
    pub fn from_box_linked(payload: Box<T>) -> Shared<T> {
        let this = Self::from_box(payload);
        Self::link_this(&this);
        this
    }

    /// Like [`Shared::from_raw`], but also points the payload's [`WeakThis`](crate::WeakThis)
    /// slot at the new control block.
    ///
    /// # Safety
    /// Same as [`Shared::from_raw`].
    ///
    /// # Example
    /// ```
    /// use cbrc::{Shared, SharedFromThis, WeakThis};
    ///
    /// struct Node {
    ///     this: WeakThis<Node>,
    /// }
    ///
    /// impl SharedFromThis for Node {
    ///     fn weak_this(&self) -> &WeakThis<Self> {
    ///         &self.this
    ///     }
    /// }
    ///
    /// let raw = Box::into_raw(Box::new(Node { this: WeakThis::new() }));
    /// // SAFETY: `raw` comes from `Box::into_raw` and nothing else owns it
    /// let node = unsafe { Shared::from_raw_linked(raw) };
    /// assert!(node.shared_from_this().is_ok());
    /// ```
    pub unsafe fn from_raw_linked(ptr: *mut T) -> Shared<T> {
        Self::from_box_linked(Box::from_raw(ptr))
    }

    fn link_this(this: &Self) {
        if let Some(value) = Shared::get(this) {
            value.weak_this().link(Shared::downgrade(this));
        }
    }
}

impl<T: ?Sized> Shared<T> {
    /// Constructs a null `Shared<T>` that references no control block.
    ///
    /// # Example
    /// ```
    /// use cbrc::Shared;
    /// let null: Shared<str> = Shared::null();
    /// assert!(Shared::is_null(&null));
    /// assert_eq!(Shared::strong_count(&null), 0);
    /// ```
    #[inline]
    pub const fn null() -> Shared<T> {
        Self {
            block: None,
            ptr: None,
        }
    }

    /// Constructs a new `Shared<U>` sharing ownership with this one by projecting a field.
    ///
    /// # Panics
    /// If `self` is null. If `project` panics, the panic is propagated to the caller and the
    /// strong count isn't incremented.
    ///
    /// # Example
    /// ```
    /// use cbrc::Shared;
    /// use std::fmt::Display;
    ///
    /// let shared = Shared::new((5u64, String::from("five")));
    /// let number = shared.project(|tuple| &tuple.0);
    /// let display: Shared<dyn Display> = shared.project(|tuple| &tuple.1 as &dyn Display);
    /// assert_eq!(format!("{} {}", number, display), "5 five");
    /// ```
    ///
    /// Note that references to local variables cannot be returned from the `project` function:
    /// ```compile_fail,E0597
    /// use cbrc::Shared;
    /// let shared = Shared::new((5u64,));
    /// let local = 5;
    /// let projected = shared.project(|tuple| &local);
    /// ```
    #[inline]
    pub fn project<U, F>(&self, project: F) -> Shared<U>
    where
        U: ?Sized + 'static,
        F: FnOnce(&T) -> &U,
    {
        let projected = project(self);
        // SAFETY: the returned reference always converts to a non-null pointer.
        // The lifetime of the reference returned by `F` must be either the lifetime
        // of the reference passed to it, which the control block keeps alive, or 'static
        let projected = unsafe { NonNull::new_unchecked(projected as *const U as *mut U) };
        Shared::<U> {
            block: self.block.clone(),
            ptr: Some(projected),
        }
    }

    /// Constructs a new `Option<Shared<U>>` sharing ownership with this one
    /// by trying to project a field.
    ///
    /// If the function passed into this returns `None`, this method will also return `None`.
    ///
    /// # Panics
    /// If `self` is null.
    ///
    /// # Example
    /// ```
    /// use cbrc::Shared;
    ///
    /// enum Enum {
    ///     Str(String),
    ///     Int(isize),
    /// }
    ///
    /// let shared = Shared::new(Enum::Int(5));
    /// let projected = shared.try_project(|x| match x {
    ///     Enum::Str(_) => None,
    ///     Enum::Int(i) => Some(i),
    /// });
    ///
    /// assert!(matches!(projected, Some(p) if *p == 5));
    /// ```
    pub fn try_project<U, F>(&self, project: F) -> Option<Shared<U>>
    where
        U: ?Sized + 'static,
        F: for<'x> FnOnce(&'x T) -> Option<&'x U>,
    {
        let projected = project(self)?;
        // SAFETY: same as in `project`
        let projected = unsafe { NonNull::new_unchecked(projected as *const U as *mut U) };
        Some(Shared::<U> {
            block: self.block.clone(),
            ptr: Some(projected),
        })
    }

    /// Constructs a `Shared<T>` that shares `owner`'s control block but accesses `ptr`.
    ///
    /// The strong count of `owner`'s block is incremented (unless `owner` is null). The new
    /// pointer is null iff `ptr` is null, regardless of `owner`.
    ///
    /// # Safety
    /// `ptr` must stay valid for reads for as long as the block's payload is alive, or for as
    /// long as the returned pointer is used if `owner` is null.
    ///
    /// # Example
    /// ```
    /// use cbrc::Shared;
    /// let owner = Shared::new([1u32, 2, 3]);
    /// let last = &owner[2] as *const u32;
    /// // SAFETY: `last` points into the payload owned by `owner`'s block
    /// let last = unsafe { Shared::aliasing(&owner, last) };
    /// drop(owner);
    /// assert_eq!(*last, 3);
    /// ```
    pub unsafe fn aliasing<U: ?Sized>(owner: &Shared<U>, ptr: *const T) -> Shared<T> {
        Shared::<T> {
            block: owner.block.clone(),
            ptr: NonNull::new(ptr as *mut T),
        }
    }

    /// Returns a reference to the data, or `None` if this `Shared` is null.
    #[inline]
    pub fn get(this: &Self) -> Option<&T> {
        // SAFETY: the access pointer is valid for as long as the block's payload is alive,
        // which our strong handle guarantees
        this.ptr.map(|ptr| unsafe { &*ptr.as_ptr() })
    }

    /// Moves out of `this`, leaving it null.
    ///
    /// # Example
    /// ```
    /// use cbrc::Shared;
    /// let mut x = Shared::new(3);
    /// let y = Shared::take(&mut x);
    /// assert!(Shared::is_null(&x));
    /// assert_eq!(Shared::strong_count(&y), 1);
    /// ```
    #[inline]
    pub fn take(this: &mut Self) -> Shared<T> {
        core::mem::replace(this, Shared::null())
    }

    /// Releases this pointer's ownership, leaving it null.
    ///
    /// # Example
    /// ```
    /// use cbrc::Shared;
    /// let mut x = Shared::new(3);
    /// let y = x.clone();
    /// Shared::reset(&mut x);
    /// assert!(Shared::is_null(&x));
    /// assert_eq!(Shared::strong_count(&y), 1);
    /// ```
    #[inline]
    pub fn reset(this: &mut Self) {
        drop(Shared::take(this));
    }

    /// Exchanges the contents of two `Shared`s without touching any counts.
    ///
    /// # Example
    /// ```
    /// use cbrc::Shared;
    /// let mut a = Shared::new(1);
    /// let mut b = Shared::null();
    /// Shared::swap(&mut a, &mut b);
    /// assert!(Shared::is_null(&a));
    /// assert_eq!((*b, Shared::strong_count(&b)), (1, 1));
    /// ```
    #[inline]
    pub fn swap(this: &mut Self, other: &mut Self) {
        core::mem::swap(this, other);
    }

    /// Returns `true` if this `Shared` has no access pointer.
    #[inline]
    pub fn is_null(this: &Self) -> bool {
        this.ptr.is_none()
    }

    /// Creates a new [`Weak`] pointer to this allocation.
    ///
    /// The `Weak` caches this `Shared`'s access pointer, and is tied to the control block rather
    /// than to this particular `Shared`.
    ///
    /// # Example
    /// ```
    /// use cbrc::Shared;
    /// let pair = Shared::new((42, 7));
    /// let weak = {
    ///     let first = pair.project(|pair| &pair.0);
    ///     Shared::downgrade(&first)
    /// };
    /// assert_eq!(weak.upgrade().map(|first| *first), Some(42));
    /// ```
    #[inline]
    pub fn downgrade(this: &Self) -> Weak<T> {
        Weak::<T> {
            block: this.block.as_ref().map(BlockRc::downgrade),
            ptr: this.ptr,
        }
    }

    /// Gets the number of strong pointers to this allocation, or 0 if this `Shared` is null.
    ///
    /// # Example
    /// ```
    /// use cbrc::Shared;
    /// let six = Shared::new(6);
    /// let _also_six = six.clone();
    /// assert_eq!(Shared::strong_count(&six), 2);
    /// ```
    #[inline]
    pub fn strong_count(this: &Self) -> usize {
        this.block.as_ref().map_or(0, BlockRc::strong_count)
    }

    /// Gets the number of [`Weak`] pointers to this allocation.
    ///
    /// # Example
    /// ```
    /// use cbrc::Shared;
    /// let six = Shared::new(6);
    /// let _weak_six = Shared::downgrade(&six);
    /// assert_eq!(Shared::weak_count(&six), 1);
    /// ```
    #[inline]
    pub fn weak_count(this: &Self) -> usize {
        this.block.as_ref().map_or(0, BlockRc::weak_count)
    }

    /// Returns `true` if the two `Shared`s have the same access pointer. This is what `==` does.
    ///
    /// Only addresses are compared, so a `Shared<dyn Trait>` equals any other pointer to the
    /// same object regardless of the vtable.
    ///
    /// # Example
    /// ```
    /// use cbrc::Shared;
    ///
    /// let five = Shared::new(5);
    /// let same_five = five.clone();
    /// let other_five = Shared::new(5);
    ///
    /// assert!(Shared::ptr_eq(&five, &same_five));
    /// assert!(!Shared::ptr_eq(&five, &other_five));
    /// ```
    #[inline]
    pub fn ptr_eq<U: ?Sized>(this: &Self, other: &Shared<U>) -> bool {
        ptr::eq(this.addr(), other.addr())
    }

    /// Returns `true` if the two `Shared`s share a control block (or are both without one),
    /// whatever their access pointers.
    ///
    /// # Example
    /// ```
    /// use cbrc::Shared;
    ///
    /// let pair = Shared::new((1, 2));
    /// let second = pair.project(|pair| &pair.1);
    /// assert!(Shared::owner_eq(&pair, &second));
    /// assert!(!Shared::ptr_eq(&pair, &second));
    /// ```
    #[inline]
    pub fn owner_eq<U: ?Sized>(this: &Self, other: &Shared<U>) -> bool {
        match (&this.block, &other.block) {
            (Some(this), Some(other)) => this.ptr_eq(other),
            (None, None) => true,
            _ => false,
        }
    }

    fn addr(&self) -> *const () {
        self.ptr
            .map_or(ptr::null(), |ptr| ptr.cast::<()>().as_ptr() as *const ())
    }
}

impl<T> Shared<T> {
    /// Provides a raw pointer to the data, or a null pointer if this `Shared` is null.
    ///
    /// The counts are not affected. The pointer is valid for as long as the control block's
    /// payload is alive.
    ///
    /// # Example
    /// ```
    /// use cbrc::Shared;
    ///
    /// let x = Shared::new("hello".to_owned());
    /// let y = Shared::clone(&x);
    /// assert_eq!(Shared::as_ptr(&x), Shared::as_ptr(&y));
    /// assert_eq!(unsafe { &*Shared::as_ptr(&x) }, "hello");
    /// assert!(Shared::as_ptr(&Shared::<u8>::null()).is_null());
    /// ```
    #[must_use]
    pub fn as_ptr(this: &Self) -> *const T {
        this.ptr.map_or(ptr::null(), |ptr| ptr.as_ptr() as *const T)
    }
}

impl<T: ?Sized> Clone for Shared<T> {
    #[inline]
    fn clone(&self) -> Self {
        Self {
            block: self.block.clone(),
            ptr: self.ptr,
        }
    }

    /// Assigns `source` to `self`.
    ///
    /// If both already share a control block only the access pointer is copied and the counts
    /// stay untouched. Otherwise `source`'s block is acquired before `self`'s is released.
    fn clone_from(&mut self, source: &Self) {
        if Shared::owner_eq(self, source) {
            self.ptr = source.ptr;
            return;
        }
        *self = source.clone();
    }
}

impl<T: ?Sized> Default for Shared<T> {
    #[inline]
    fn default() -> Self {
        Shared::null()
    }
}

impl<T: ?Sized> Deref for Shared<T> {
    type Target = T;

    /// # Panics
    /// If this `Shared` is null.
    #[inline]
    fn deref(&self) -> &Self::Target {
        Shared::get(self).unwrap_or_else(|| null_deref())
    }
}

#[cold]
fn null_deref() -> ! {
    panic!("dereferenced a null Shared")
}

impl<T: ?Sized> AsRef<T> for Shared<T> {
    #[inline]
    fn as_ref(&self) -> &T {
        self.deref()
    }
}

impl<T: ?Sized + fmt::Debug> fmt::Debug for Shared<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match Shared::get(self) {
            Some(value) => f.debug_tuple("Shared").field(&value).finish(),
            None => f.write_str("Shared(null)"),
        }
    }
}

impl<T> fmt::Display for Shared<T>
where
    T: fmt::Display + ?Sized,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match Shared::get(self) {
            Some(value) => value.fmt(f),
            None => f.write_str("null"),
        }
    }
}

impl<T: ?Sized> fmt::Pointer for Shared<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Pointer::fmt(&self.addr(), f)
    }
}

#[cfg(feature = "std")]
impl<T> std::error::Error for Shared<T>
where
    T: std::error::Error + ?Sized,
{
    #[inline]
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.deref().source()
    }
}

impl<T: ?Sized + 'static> From<Box<T>> for Shared<T> {
    /// Same as [`Shared::from_box`], so [`SharedFromThis`] payloads are not linked.
    #[inline]
    fn from(payload: Box<T>) -> Self {
        Shared::from_box(payload)
    }
}

impl<T: ?Sized> TryFrom<&Weak<T>> for Shared<T> {
    type Error = DanglingWeak;

    /// Promotes `weak`, failing if it has no control block or the payload is already gone.
    ///
    /// Nothing is modified on failure. Use [`Weak::lock`] for a promotion that returns a null
    /// `Shared` instead.
    #[inline]
    fn try_from(weak: &Weak<T>) -> Result<Self, Self::Error> {
        weak.upgrade().ok_or(DanglingWeak)
    }
}

impl<T: 'static> FromIterator<T> for Shared<[T]> {
    #[inline]
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Shared::from_box(iter.into_iter().collect::<Box<[T]>>())
    }
}

impl<T: ?Sized> Hash for Shared<T> {
    #[inline]
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.addr().hash(state)
    }
}

impl<T: ?Sized, U: ?Sized> PartialEq<Shared<U>> for Shared<T> {
    #[inline]
    fn eq(&self, other: &Shared<U>) -> bool {
        Shared::ptr_eq(self, other)
    }
}

impl<T: ?Sized> Eq for Shared<T> {}

impl<T: ?Sized> Ord for Shared<T> {
    #[inline]
    fn cmp(&self, other: &Self) -> Ordering {
        self.addr().cmp(&other.addr())
    }
}

impl<T: ?Sized> PartialOrd for Shared<T> {
    #[inline]
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Unpin for Shared<T> where T: ?Sized {}
impl<T> core::panic::UnwindSafe for Shared<T> where T: core::panic::RefUnwindSafe + ?Sized {}
