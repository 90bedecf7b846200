//! Error-enum conventions shared across kernel crates.

use core::ffi::c_int;

/// Implement common methods for kernel error enums that follow the
/// `#[repr(i32)]`, `0 => success`, `negative => specific failure` convention.
///
/// Generates `as_c_int()`, `from_c_int()`, `is_success()`, and `is_error()`.
#[macro_export]
macro_rules! impl_kernel_error {
    ($ty:ty, fallback: $fallback:ident, variants: { $($val:literal => $variant:ident),* $(,)? }) => {
        impl $ty {
            #[inline]
            pub fn as_c_int(self) -> core::ffi::c_int {
                self as core::ffi::c_int
            }

            #[inline]
            pub fn from_c_int(val: core::ffi::c_int) -> Self {
                match val {
                    $($val => Self::$variant,)*
                    _ => Self::$fallback,
                }
            }

            #[inline]
            pub fn is_success(self) -> bool {
                matches!(self, Self::Success)
            }

            #[inline]
            pub fn is_error(self) -> bool {
                !self.is_success()
            }
        }
    };
}

/// Bounds/availability failures shared by the allocator, VFS and VM address
/// checks wherever a single flat error code is more useful than a per-crate enum.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KernelError {
    #[default]
    Success = 0,
    OutOfMemory = -1,
    NotFound = -2,
    AlreadyExists = -3,
    InvalidArgument = -4,
    PermissionDenied = -5,
    Timeout = -6,
}

impl_kernel_error!(KernelError, fallback: InvalidArgument, variants: {
    0 => Success,
    -1 => OutOfMemory,
    -2 => NotFound,
    -3 => AlreadyExists,
    -4 => InvalidArgument,
    -5 => PermissionDenied,
    -6 => Timeout,
});

/// Adapt a `c_int` syscall-style return into a `Result`, the inverse of
/// `as_c_int` at the boundary where VM syscalls and shell built-ins live.
#[inline]
pub fn c_int_result(code: c_int) -> Result<(), KernelError> {
    if code == 0 {
        Ok(())
    } else {
        Err(KernelError::from_c_int(code))
    }
}
