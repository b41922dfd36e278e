//! libneo C ABI
//!
//! Links against the installed shared library (`-lneo`). Enable with the
//! `libneo` feature.

use super::{NativeLibrary, RawDevice, RawError, RawScan};
use libc::c_char;
use std::ffi::{CStr, c_void};

type NeoError = *mut c_void;
type NeoDevice = *mut c_void;
type NeoScan = *mut c_void;

#[link(name = "neo")]
unsafe extern "C" {
    fn neo_get_version() -> i32;
    fn neo_is_abi_compatible() -> bool;

    fn neo_error_message(error: NeoError) -> *const c_char;
    fn neo_error_destruct(error: NeoError);

    fn neo_device_construct_simple(port: *const c_char, error: *mut NeoError) -> NeoDevice;
    fn neo_device_construct(port: *const c_char, bitrate: i32, error: *mut NeoError) -> NeoDevice;
    fn neo_device_destruct(device: NeoDevice);

    fn neo_device_start_scanning(device: NeoDevice, error: *mut NeoError);
    fn neo_device_stop_scanning(device: NeoDevice, error: *mut NeoError);

    fn neo_device_get_scan(device: NeoDevice, error: *mut NeoError) -> NeoScan;
    fn neo_scan_destruct(scan: NeoScan);

    fn neo_scan_get_number_of_samples(scan: NeoScan) -> i32;
    // Declared as float in some header revisions; the library returns millidegrees as int32
    fn neo_scan_get_angle(scan: NeoScan, sample: i32) -> i32;
    fn neo_scan_get_distance(scan: NeoScan, sample: i32) -> i32;
    fn neo_scan_get_signal_strength(scan: NeoScan, sample: i32) -> i32;

    fn neo_device_get_motor_speed(device: NeoDevice, error: *mut NeoError) -> i32;
    fn neo_device_set_motor_speed(device: NeoDevice, hz: i32, error: *mut NeoError);

    fn neo_device_get_sample_rate(device: NeoDevice, error: *mut NeoError) -> i32;
    fn neo_device_set_sample_rate(device: NeoDevice, hz: i32, error: *mut NeoError);

    fn neo_device_reset(device: NeoDevice, error: *mut NeoError);
    fn neo_device_calibrate(device: NeoDevice, error: *mut NeoError);
}

/// Error slot as the C side sees it
fn slot(error: &mut RawError) -> *mut NeoError {
    // RawError is repr(transparent) over the same pointer type
    (error as *mut RawError).cast()
}

/// The installed libneo shared library
#[derive(Debug, Clone, Copy, Default)]
pub struct LibNeo;

impl LibNeo {
    pub fn new() -> Self {
        LibNeo
    }
}

// SAFETY (all calls below): the handle and precondition contract of
// NativeLibrary is passed through to the caller unchanged.
impl NativeLibrary for LibNeo {
    fn version(&self) -> i32 {
        unsafe { neo_get_version() }
    }

    fn is_abi_compatible(&self) -> bool {
        unsafe { neo_is_abi_compatible() }
    }

    unsafe fn error_message(&self, error: RawError) -> String {
        let what = unsafe { neo_error_message(error.as_ptr()) };
        if what.is_null() {
            return String::from("unknown libneo error");
        }
        unsafe { CStr::from_ptr(what) }
            .to_string_lossy()
            .into_owned()
    }

    unsafe fn error_destruct(&self, error: RawError) {
        unsafe { neo_error_destruct(error.as_ptr()) }
    }

    fn device_construct_simple(&self, port: &CStr, error: &mut RawError) -> RawDevice {
        RawDevice::from_ptr(unsafe { neo_device_construct_simple(port.as_ptr(), slot(error)) })
    }

    fn device_construct(&self, port: &CStr, bitrate: i32, error: &mut RawError) -> RawDevice {
        RawDevice::from_ptr(unsafe { neo_device_construct(port.as_ptr(), bitrate, slot(error)) })
    }

    unsafe fn device_destruct(&self, device: RawDevice) {
        unsafe { neo_device_destruct(device.as_ptr()) }
    }

    unsafe fn device_start_scanning(&self, device: RawDevice, error: &mut RawError) {
        unsafe { neo_device_start_scanning(device.as_ptr(), slot(error)) }
    }

    unsafe fn device_stop_scanning(&self, device: RawDevice, error: &mut RawError) {
        unsafe { neo_device_stop_scanning(device.as_ptr(), slot(error)) }
    }

    unsafe fn device_get_scan(&self, device: RawDevice, error: &mut RawError) -> RawScan {
        RawScan::from_ptr(unsafe { neo_device_get_scan(device.as_ptr(), slot(error)) })
    }

    unsafe fn scan_destruct(&self, scan: RawScan) {
        unsafe { neo_scan_destruct(scan.as_ptr()) }
    }

    unsafe fn scan_sample_count(&self, scan: RawScan) -> i32 {
        unsafe { neo_scan_get_number_of_samples(scan.as_ptr()) }
    }

    unsafe fn scan_angle(&self, scan: RawScan, sample: i32) -> i32 {
        unsafe { neo_scan_get_angle(scan.as_ptr(), sample) }
    }

    unsafe fn scan_distance(&self, scan: RawScan, sample: i32) -> i32 {
        unsafe { neo_scan_get_distance(scan.as_ptr(), sample) }
    }

    unsafe fn scan_signal_strength(&self, scan: RawScan, sample: i32) -> i32 {
        unsafe { neo_scan_get_signal_strength(scan.as_ptr(), sample) }
    }

    unsafe fn device_motor_speed(&self, device: RawDevice, error: &mut RawError) -> i32 {
        unsafe { neo_device_get_motor_speed(device.as_ptr(), slot(error)) }
    }

    unsafe fn device_set_motor_speed(&self, device: RawDevice, hz: i32, error: &mut RawError) {
        unsafe { neo_device_set_motor_speed(device.as_ptr(), hz, slot(error)) }
    }

    unsafe fn device_sample_rate(&self, device: RawDevice, error: &mut RawError) -> i32 {
        unsafe { neo_device_get_sample_rate(device.as_ptr(), slot(error)) }
    }

    unsafe fn device_set_sample_rate(&self, device: RawDevice, hz: i32, error: &mut RawError) {
        unsafe { neo_device_set_sample_rate(device.as_ptr(), hz, slot(error)) }
    }

    unsafe fn device_reset(&self, device: RawDevice, error: &mut RawError) {
        unsafe { neo_device_reset(device.as_ptr(), slot(error)) }
    }

    unsafe fn device_calibrate(&self, device: RawDevice, error: &mut RawError) {
        unsafe { neo_device_calibrate(device.as_ptr(), slot(error)) }
    }
}
