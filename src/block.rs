//! Type-erased control blocks.
//!
//! Every block starts with a [`Header`] holding the strong and weak counts. [`BlockRc`] and
//! [`BlockWeak`] are the owning handles [`Shared`](crate::Shared) and [`Weak`](crate::Weak)
//! keep; each live handle contributes exactly one unit to its count, and all count transitions
//! go through [`Header::release_strong`] and [`Header::release_weak`].

mod in_place;
mod separate;

use alloc::boxed::Box;
use core::{any::TypeId, cell::Cell, marker::PhantomData, ptr::NonNull};

use crate::vtable::BlockVTable;

use in_place::InPlace;
use separate::Separate;

/// Bookkeeping shared by every control block variant.
///
/// Variants are `#[repr(C)]` with the header as their first field, so a pointer to the variant
/// is also a pointer to its header.
#[derive(Debug)]
pub(crate) struct Header {
    strong: Cell<usize>,
    weak: Cell<usize>,
    destroyed: Cell<bool>,
    vtable: &'static BlockVTable,
}

impl Header {
    /// A header for a freshly created block, owned by exactly one strong handle.
    pub(crate) const fn new(vtable: &'static BlockVTable) -> Self {
        Self {
            strong: Cell::new(1),
            weak: Cell::new(0),
            destroyed: Cell::new(false),
            vtable,
        }
    }

    /// Marks the payload as destroyed.
    ///
    /// Returns `true` only for the first call; the caller must then destroy the payload.
    pub(crate) fn begin_finalize(&self) -> bool {
        !self.destroyed.replace(true)
    }

    fn increment_strong(&self) {
        let strong = self.strong.get();
        self.strong
            .set(strong.checked_add(1).unwrap_or_else(|| count_overflow()));
    }

    fn increment_weak(&self) {
        let weak = self.weak.get();
        self.weak
            .set(weak.checked_add(1).unwrap_or_else(|| count_overflow()));
    }

    fn try_increment_strong(&self) -> bool {
        if self.strong.get() == 0 {
            return false;
        }
        self.increment_strong();
        true
    }

    /// Destroys the payload unless that already happened.
    unsafe fn finalize(this: NonNull<Header>) {
        let header = this.as_ref();
        if header.begin_finalize() {
            (header.vtable.finalize)(this);
        }
    }

    /// Gives up one strong unit.
    ///
    /// The payload is finalized when the last strong unit goes away. For the duration of the
    /// payload's destructor the block holds an extra weak unit, so weak pointers the payload owns
    /// (e.g. its own [`WeakThis`](crate::WeakThis) slot) can't free the block under it.
    unsafe fn release_strong(this: NonNull<Header>) {
        let header = this.as_ref();
        let strong = header.strong.get() - 1;
        header.strong.set(strong);
        if strong != 0 {
            return;
        }

        header.increment_weak();
        Header::finalize(this);
        Header::release_weak(this);
    }

    /// Gives up one weak unit, freeing the block once no units of either kind remain.
    unsafe fn release_weak(this: NonNull<Header>) {
        let header = this.as_ref();
        let weak = header.weak.get() - 1;
        header.weak.set(weak);
        if weak == 0 && header.strong.get() == 0 {
            let deallocate = header.vtable.deallocate;
            deallocate(this);
        }
    }
}

#[cold]
fn count_overflow() -> ! {
    panic!("reference count overflow")
}

/// Owning strong handle to a type-erased control block.
pub(crate) struct BlockRc {
    header: NonNull<Header>,
    _phantom: PhantomData<*mut ()>,
}

impl BlockRc {
    /// Creates a block storing `value` inline, returning the handle and a pointer to the value.
    pub(crate) fn in_place<T: 'static>(value: T) -> (Self, NonNull<T>) {
        let (header, value) = InPlace::allocate(value);
        (Self::adopt(header), value)
    }

    /// Creates a block taking ownership of a boxed payload.
    pub(crate) fn separate<T: ?Sized + 'static>(payload: Box<T>) -> (Self, NonNull<T>) {
        let (header, payload) = Separate::allocate(payload);
        (Self::adopt(header), payload)
    }

    fn adopt(header: NonNull<Header>) -> Self {
        Self {
            header,
            _phantom: PhantomData,
        }
    }

    fn header(&self) -> &Header {
        // SAFETY: our strong unit keeps the block allocated
        unsafe { self.header.as_ref() }
    }

    pub(crate) fn downgrade(&self) -> BlockWeak {
        self.header().increment_weak();
        BlockWeak {
            header: self.header,
            _phantom: PhantomData,
        }
    }

    pub(crate) fn strong_count(&self) -> usize {
        self.header().strong.get()
    }

    pub(crate) fn weak_count(&self) -> usize {
        self.header().weak.get()
    }

    /// Whether this is the only handle of either kind referencing the block.
    pub(crate) fn is_unique(&self) -> bool {
        self.strong_count() == 1 && self.weak_count() == 0
    }

    /// Whether `ptr` addresses the payload this block was created with, as that same type.
    ///
    /// Anything else a projection may point at, such as memory behind a reference stored in the
    /// payload, isn't owned by the block.
    pub(crate) fn is_payload<T: ?Sized + 'static>(&self, ptr: NonNull<T>) -> bool {
        let vtable = self.header().vtable;
        // SAFETY: our strong unit keeps the block allocated
        let payload = unsafe { (vtable.payload)(self.header) };
        (vtable.payload_type)() == TypeId::of::<T>()
            && core::ptr::eq(payload, ptr.cast::<()>().as_ptr() as *const ())
    }

    pub(crate) fn ptr_eq(&self, other: &BlockRc) -> bool {
        self.header == other.header
    }
}

impl Clone for BlockRc {
    #[inline]
    fn clone(&self) -> Self {
        self.header().increment_strong();
        Self::adopt(self.header)
    }
}

impl Drop for BlockRc {
    fn drop(&mut self) {
        // SAFETY: this handle owns one strong unit, released exactly once here
        unsafe { Header::release_strong(self.header) }
    }
}

/// Owning weak handle to a type-erased control block.
pub(crate) struct BlockWeak {
    header: NonNull<Header>,
    _phantom: PhantomData<*mut ()>,
}

impl BlockWeak {
    fn header(&self) -> &Header {
        // SAFETY: our weak unit keeps the block allocated
        unsafe { self.header.as_ref() }
    }

    /// Acquires a strong unit if the payload is still alive.
    pub(crate) fn upgrade(&self) -> Option<BlockRc> {
        if self.header().try_increment_strong() {
            Some(BlockRc::adopt(self.header))
        } else {
            None
        }
    }

    pub(crate) fn strong_count(&self) -> usize {
        self.header().strong.get()
    }

    /// Like `std::rc::Weak::weak_count`, reports `0` once the payload is gone.
    pub(crate) fn weak_count(&self) -> usize {
        if self.strong_count() == 0 {
            0
        } else {
            self.header().weak.get()
        }
    }

    pub(crate) fn ptr_eq(&self, other: &BlockWeak) -> bool {
        self.header == other.header
    }
}

impl Clone for BlockWeak {
    #[inline]
    fn clone(&self) -> Self {
        self.header().increment_weak();
        Self {
            header: self.header,
            _phantom: PhantomData,
        }
    }
}

impl Drop for BlockWeak {
    fn drop(&mut self) {
        // SAFETY: this handle owns one weak unit, released exactly once here
        unsafe { Header::release_weak(self.header) }
    }
}
