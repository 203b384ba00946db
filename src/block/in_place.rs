use alloc::boxed::Box;
use core::{
    any::TypeId,
    mem::ManuallyDrop,
    ptr::{addr_of, addr_of_mut, NonNull},
};

use super::Header;
use crate::vtable::BlockVTable;

/// Control block storing its payload inline, in the same allocation as the counts.
///
/// The payload is destroyed in place when the last strong handle goes away, but its memory is only
/// returned together with the block once the weak handles are gone too.
#[repr(C)]
pub(crate) struct InPlace<T> {
    header: Header,
    value: ManuallyDrop<T>,
}

impl<T: 'static> InPlace<T> {
    const VTABLE: BlockVTable = BlockVTable {
        finalize: Self::finalize,
        deallocate: Self::deallocate,
        payload: Self::payload,
        payload_type: TypeId::of::<T>,
    };

    pub(crate) fn allocate(value: T) -> (NonNull<Header>, NonNull<T>) {
        let block = Box::new(Self {
            header: Header::new(&Self::VTABLE),
            value: ManuallyDrop::new(value),
        });
        let block = Box::into_raw(block);
        #[cfg(test)]
        super::live::allocated();

        // SAFETY: `block` comes from `Box::into_raw`, so it and the field address are non-null.
        // `ManuallyDrop<T>` is `repr(transparent)` over `T`.
        unsafe {
            let value = addr_of_mut!((*block).value).cast::<T>();
            (
                NonNull::new_unchecked(block).cast(),
                NonNull::new_unchecked(value),
            )
        }
    }

    unsafe fn finalize(header: NonNull<Header>) {
        let block = header.cast::<Self>().as_ptr();
        ManuallyDrop::drop(&mut (*block).value);
    }

    unsafe fn payload(header: NonNull<Header>) -> *const () {
        let block = header.cast::<Self>().as_ptr();
        addr_of!((*block).value).cast()
    }

    unsafe fn deallocate(header: NonNull<Header>) {
        drop(Box::from_raw(header.cast::<Self>().as_ptr()));
        #[cfg(test)]
        super::live::freed();
    }
}

impl<T> Drop for InPlace<T> {
    fn drop(&mut self) {
        if self.header.begin_finalize() {
            // SAFETY: the `destroyed` flag was unset, so the value hasn't been dropped yet
            unsafe { ManuallyDrop::drop(&mut self.value) }
        }
    }
}
