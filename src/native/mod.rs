//! Boundary with the native libneo driver library
//!
//! [`NativeLibrary`] mirrors the C entry points of `neo/neo.h` one to one.
//! Handles are opaque pointers owned by the native side; this layer never
//! dereferences them.
//!
//! Implementations:
//! - [`LibNeo`]: links the installed `libneo` (feature `libneo`)
//! - [`MockNeo`]: in-process fake that records every call (feature `mock`)

use crate::error::{Error, Result};
use std::ffi::{CStr, c_void};

#[cfg(feature = "libneo")]
mod ffi;
#[cfg(feature = "libneo")]
pub use ffi::LibNeo;

#[cfg(any(test, feature = "mock"))]
mod mock;
#[cfg(any(test, feature = "mock"))]
pub use mock::{MockNeo, MockOp, NativeCall};

macro_rules! raw_handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[repr(transparent)]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub struct $name(*mut c_void);

        impl $name {
            /// The null handle
            pub const fn null() -> Self {
                Self(std::ptr::null_mut())
            }

            /// Wrap a pointer handed out by the native library
            pub(crate) const fn from_ptr(ptr: *mut c_void) -> Self {
                Self(ptr)
            }

            /// Raw pointer for passing back across the boundary
            pub const fn as_ptr(self) -> *mut c_void {
                self.0
            }

            /// True if no native resource is referenced
            pub fn is_null(self) -> bool {
                self.0.is_null()
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::null()
            }
        }
    };
}

raw_handle!(
    /// Opaque `neo_error_s`
    RawError
);
raw_handle!(
    /// Opaque `neo_device_s`
    RawDevice
);
raw_handle!(
    /// Opaque `neo_scan_s`
    RawScan
);

/// Decoded `neo_get_version` word: major in the upper 16 bits, minor below
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Version {
    pub major: u16,
    pub minor: u16,
}

impl Version {
    pub fn from_raw(raw: i32) -> Self {
        let raw = raw as u32;
        Self {
            major: (raw >> 16) as u16,
            minor: (raw & 0xFFFF) as u16,
        }
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// The native driver library.
///
/// Every fallible entry point takes an error slot. The callee leaves it null
/// on success and stores an error handle on failure; the caller then owns
/// that handle and must read its message before destroying it. Call sites in
/// this crate go through [`invoke`] instead of handling the slot themselves.
///
/// The library is shared between sessions, so implementations must be
/// `Send + Sync`. Individual device handles are not: see
/// [`DeviceSession`](crate::device::DeviceSession).
///
/// # Safety
///
/// Methods taking a handle are `unsafe`. The caller must pass a handle
/// produced by this same library that has not been destroyed yet, and must
/// respect libneo's preconditions, which abort the process when violated:
///
/// - sample indices lie in `0..scan_sample_count(scan)`
/// - `device_get_scan` only while scanning
/// - `device_start_scanning`, motor speed, sample rate, reset and
///   calibrate only while not scanning
/// - motor speed within [`MOTOR_SPEED_RANGE`](crate::device::MOTOR_SPEED_RANGE),
///   sample rate one of [`SAMPLE_RATES_HZ`](crate::device::SAMPLE_RATES_HZ)
///
/// [`DeviceSession`](crate::device::DeviceSession) upholds all of these.
///
/// Releasing a handle needs an `unsafe` block:
///
/// ```compile_fail
/// use neo_lidar::native::{MockNeo, NativeLibrary, RawScan};
///
/// MockNeo::new().scan_destruct(RawScan::null());
/// ```
///
/// and handles cannot be forged from arbitrary pointers:
///
/// ```compile_fail
/// use neo_lidar::native::RawDevice;
///
/// let _ = RawDevice::from_ptr(0x10 as *mut std::ffi::c_void);
/// ```
pub trait NativeLibrary: Send + Sync {
    /// Raw version word of the loaded library
    fn version(&self) -> i32;

    /// True if the loaded library matches the interface these bindings expect
    fn is_abi_compatible(&self) -> bool;

    /// Message carried by an error handle
    ///
    /// # Safety
    /// `error` must be a live, non-null error handle.
    unsafe fn error_message(&self, error: RawError) -> String;

    /// Release an error handle
    ///
    /// # Safety
    /// `error` must be a live, non-null error handle; it is dangling afterwards.
    unsafe fn error_destruct(&self, error: RawError);

    /// Open a device with auto-negotiated settings
    fn device_construct_simple(&self, port: &CStr, error: &mut RawError) -> RawDevice;

    /// Open a device at an explicit bitrate (must be positive)
    fn device_construct(&self, port: &CStr, bitrate: i32, error: &mut RawError) -> RawDevice;

    /// Close a device
    ///
    /// # Safety
    /// `device` must be live; it is dangling afterwards.
    unsafe fn device_destruct(&self, device: RawDevice);

    /// # Safety
    /// `device` must be live and not scanning.
    unsafe fn device_start_scanning(&self, device: RawDevice, error: &mut RawError);

    /// # Safety
    /// `device` must be live.
    unsafe fn device_stop_scanning(&self, device: RawDevice, error: &mut RawError);

    /// Block until the device delivers one full rotation
    ///
    /// # Safety
    /// `device` must be live and scanning.
    unsafe fn device_get_scan(&self, device: RawDevice, error: &mut RawError) -> RawScan;

    /// # Safety
    /// `scan` must be live; it is dangling afterwards.
    unsafe fn scan_destruct(&self, scan: RawScan);

    /// # Safety
    /// `scan` must be live.
    unsafe fn scan_sample_count(&self, scan: RawScan) -> i32;

    /// # Safety
    /// `scan` must be live and `sample` in bounds.
    unsafe fn scan_angle(&self, scan: RawScan, sample: i32) -> i32;

    /// # Safety
    /// `scan` must be live and `sample` in bounds.
    unsafe fn scan_distance(&self, scan: RawScan, sample: i32) -> i32;

    /// # Safety
    /// `scan` must be live and `sample` in bounds.
    unsafe fn scan_signal_strength(&self, scan: RawScan, sample: i32) -> i32;

    /// # Safety
    /// `device` must be live and not scanning.
    unsafe fn device_motor_speed(&self, device: RawDevice, error: &mut RawError) -> i32;

    /// # Safety
    /// `device` must be live and not scanning, `hz` within the motor speed range.
    unsafe fn device_set_motor_speed(&self, device: RawDevice, hz: i32, error: &mut RawError);

    /// # Safety
    /// `device` must be live and not scanning.
    unsafe fn device_sample_rate(&self, device: RawDevice, error: &mut RawError) -> i32;

    /// # Safety
    /// `device` must be live and not scanning, `hz` one of the supported rates.
    unsafe fn device_set_sample_rate(&self, device: RawDevice, hz: i32, error: &mut RawError);

    /// # Safety
    /// `device` must be live and not scanning.
    unsafe fn device_reset(&self, device: RawDevice, error: &mut RawError);

    /// Run the device's calibration routine (blocks for several seconds)
    ///
    /// # Safety
    /// `device` must be live and not scanning.
    unsafe fn device_calibrate(&self, device: RawDevice, error: &mut RawError);
}

/// Read the message of an error handle, then release the handle.
///
/// `error` must have just been written to a slot by `library`.
pub(crate) fn take_error(library: &dyn NativeLibrary, error: RawError) -> Error {
    debug_assert!(!error.is_null());
    // SAFETY: a non-null slot value is a fresh handle owned by this call
    let message = unsafe { library.error_message(error) };
    unsafe { library.error_destruct(error) };
    log::warn!("libneo: {}", message);
    Error::Native(message)
}

/// Call into the native library with a fresh error slot.
///
/// Returns the call's value if the slot stayed null. Otherwise the error
/// handle is read, destroyed and returned as [`Error::Native`].
pub(crate) fn invoke<T>(
    library: &dyn NativeLibrary,
    call: impl FnOnce(&mut RawError) -> T,
) -> Result<T> {
    invoke_with_cleanup(library, call, drop)
}

/// Like [`invoke`], for calls returning a native resource.
///
/// If the call fails but still produced a value, `cleanup` releases it after
/// the error has been taken.
pub(crate) fn invoke_with_cleanup<T>(
    library: &dyn NativeLibrary,
    call: impl FnOnce(&mut RawError) -> T,
    cleanup: impl FnOnce(T),
) -> Result<T> {
    let mut error = RawError::null();
    let value = call(&mut error);
    if error.is_null() {
        Ok(value)
    } else {
        let err = take_error(library, error);
        cleanup(value);
        Err(err)
    }
}
