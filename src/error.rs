use core::fmt;

/// The error returned when promoting a [`Weak`](crate::Weak) whose payload is no longer alive.
///
/// Returned by `Shared::try_from(&weak)` and
/// [`SharedFromThis::shared_from_this`](crate::SharedFromThis::shared_from_this).
/// An empty `Weak` that was never attached to a control block yields the same error as one whose
/// strong handles are all gone.
///
/// # Example
/// ```
/// use cbrc::{DanglingWeak, Shared, Weak};
///
/// let weak: Weak<u8> = Weak::new();
/// assert_eq!(Shared::<u8>::try_from(&weak), Err(DanglingWeak));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct DanglingWeak;

impl fmt::Display for DanglingWeak {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("dangling weak reference")
    }
}

#[cfg(feature = "std")]
impl std::error::Error for DanglingWeak {}
