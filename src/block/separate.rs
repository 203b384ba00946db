use alloc::boxed::Box;
use core::{any::TypeId, ptr::NonNull};

use super::Header;
use crate::vtable::BlockVTable;

/// Control block owning a separately boxed payload.
///
/// Unlike [`InPlace`](super::InPlace), the payload's memory is returned as soon as it's finalized,
/// and the payload may be unsized.
#[repr(C)]
pub(crate) struct Separate<T: ?Sized> {
    header: Header,
    payload: NonNull<T>,
}

impl<T: ?Sized + 'static> Separate<T> {
    const VTABLE: BlockVTable = BlockVTable {
        finalize: Self::finalize,
        deallocate: Self::deallocate,
        payload: Self::payload,
        payload_type: TypeId::of::<T>,
    };

    pub(crate) fn allocate(payload: Box<T>) -> (NonNull<Header>, NonNull<T>) {
        // SAFETY: `Box::into_raw` never returns null
        let payload = unsafe { NonNull::new_unchecked(Box::into_raw(payload)) };
        let block = Box::into_raw(Box::new(Self {
            header: Header::new(&Self::VTABLE),
            payload,
        }));
        #[cfg(test)]
        super::live::allocated();

        // SAFETY: `Box::into_raw` never returns null
        (unsafe { NonNull::new_unchecked(block) }.cast(), payload)
    }

    unsafe fn finalize(header: NonNull<Header>) {
        let block = header.cast::<Self>().as_ptr();
        drop(Box::from_raw((*block).payload.as_ptr()));
    }

    unsafe fn payload(header: NonNull<Header>) -> *const () {
        let block = header.cast::<Self>().as_ptr();
        (*block).payload.cast::<()>().as_ptr() as *const ()
    }

    unsafe fn deallocate(header: NonNull<Header>) {
        drop(Box::from_raw(header.cast::<Self>().as_ptr()));
        #[cfg(test)]
        super::live::freed();
    }
}

impl<T: ?Sized> Drop for Separate<T> {
    fn drop(&mut self) {
        if self.header.begin_finalize() {
            // SAFETY: the `destroyed` flag was unset, so we still own the boxed payload
            unsafe { drop(Box::from_raw(self.payload.as_ptr())) }
        }
    }
}
