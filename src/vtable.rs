//! A module containing the VTable for control blocks.

use core::{any::TypeId, ptr::NonNull};

use crate::block::Header;

/// A VTable shared by every control block of one storage variant and payload type.
///
/// This allows [`Header`] to finalize and free its block through a type-erased pointer,
/// while not having to care which variant or payload type the block was created with.
#[derive(Debug)]
pub(crate) struct BlockVTable {
    /// Destroys the payload. Called at most once, guarded by the header's `destroyed` flag.
    pub finalize: unsafe fn(NonNull<Header>),
    /// Frees the block's memory, finalizing the payload first if that hasn't happened yet.
    pub deallocate: unsafe fn(NonNull<Header>),
    /// Returns the address of the payload the block was created with.
    pub payload: unsafe fn(NonNull<Header>) -> *const (),
    /// The type the block was created with.
    pub payload_type: fn() -> TypeId,
}
