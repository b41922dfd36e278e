//! Device session over a native libneo handle
//!
//! A [`DeviceSession`] is created from a port and an optional bitrate, then
//! opened through a scope:
//!
//! ```
//! use neo_lidar::device::DeviceSession;
//! use neo_lidar::native::MockNeo;
//! use std::sync::Arc;
//!
//! let mut session = DeviceSession::new(Arc::new(MockNeo::new()), "/dev/ttyUSB0", None)?;
//! session.scoped(|device| {
//!     device.set_motor_speed(5)?;
//!     device.start_scanning()?;
//!     for scan in device.get_scans().take(10) {
//!         println!("{} samples", scan?.len());
//!     }
//!     device.stop_scanning()
//! })?;
//! # Ok::<(), neo_lidar::Error>(())
//! ```
//!
//! The handle is released when the scope ends, on every path out of it.
//! Calling an operation on a session that is not open panics.
//!
//! libneo aborts the process on out-of-range arguments and on calls made in
//! the wrong scanning state. The session checks both before crossing the
//! boundary: motor speed, sample rate, reset and calibrate are only accepted
//! while not scanning, and scans only while scanning.
//!
//! A session is `Send` but not `Sync`: it may be moved to a worker thread
//! (see [`ScanWorker`]) but the native handle is never shared between
//! threads. There is no internal locking.

mod stream;
mod worker;

pub use stream::ScanStream;
pub use worker::{RecvTimeoutError, ScanWorker, WorkerConfig};

use crate::error::{Error, Result};
use crate::native::{self, NativeLibrary, RawDevice, RawError, Version};
use std::cell::Cell;
use std::ffi::CString;
use std::ops::{Deref, RangeInclusive};
use std::sync::Arc;

/// Motor speeds accepted by the device, in Hz
pub const MOTOR_SPEED_RANGE: RangeInclusive<i32> = 0..=10;

/// Sample rates accepted by the device, in Hz
pub const SAMPLE_RATES_HZ: [i32; 3] = [500, 750, 1000];

/// Bitrate the native simple constructor negotiates
pub const DEFAULT_BITRATE: i32 = 115_200;

/// Which native constructor opens the device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectMode {
    /// Auto-negotiated settings
    Simple,
    /// Explicit bitrate
    Bitrate(i32),
}

impl ConnectMode {
    /// Select the constructor for an optional bitrate.
    ///
    /// A present bitrate must be positive; zero or negative is rejected
    /// rather than silently treated as absent.
    pub fn from_bitrate(bitrate: Option<i32>) -> Result<Self> {
        match bitrate {
            None => Ok(ConnectMode::Simple),
            Some(bitrate) if bitrate > 0 => Ok(ConnectMode::Bitrate(bitrate)),
            Some(bitrate) => Err(Error::InvalidBitrate(bitrate)),
        }
    }
}

/// A native device handle with scoped lifecycle
pub struct DeviceSession {
    library: Arc<dyn NativeLibrary>,
    port: String,
    c_port: CString,
    mode: ConnectMode,
    /// Null while closed
    device: RawDevice,
    /// Mirrors the native scanning flag
    scanning: Cell<bool>,
}

// Sole owner of the handle, so it may move threads. Not Sync: one caller at a time.
unsafe impl Send for DeviceSession {}

impl DeviceSession {
    /// Prepare a session for `port`.
    ///
    /// Validates the arguments before touching the native library, then
    /// checks ABI compatibility. Nothing is opened yet.
    ///
    /// # Panics
    /// If the loaded library is not ABI compatible with these bindings.
    pub fn new(library: Arc<dyn NativeLibrary>, port: &str, bitrate: Option<i32>) -> Result<Self> {
        let mode = ConnectMode::from_bitrate(bitrate)?;
        let c_port = CString::new(port).map_err(|_| Error::InvalidPort(port.to_string()))?;

        let compatible = library.is_abi_compatible();
        let version = Version::from_raw(library.version());
        assert!(
            compatible,
            "Your installed libneo ({}) is not ABI compatible with these bindings",
            version
        );
        log::debug!("libneo {} ({:?} on {})", version, mode, port);

        Ok(DeviceSession {
            library,
            port: port.to_string(),
            c_port,
            mode,
            device: RawDevice::null(),
            scanning: Cell::new(false),
        })
    }

    /// Port identifier this session connects to
    pub fn port(&self) -> &str {
        &self.port
    }

    pub fn mode(&self) -> ConnectMode {
        self.mode
    }

    /// Version of the loaded native library
    pub fn library_version(&self) -> Version {
        Version::from_raw(self.library.version())
    }

    /// True while a native handle is held
    pub fn is_open(&self) -> bool {
        !self.device.is_null()
    }

    /// True between a successful `start_scanning` and `stop_scanning`
    pub fn is_scanning(&self) -> bool {
        self.scanning.get()
    }

    /// Construct the native device.
    ///
    /// The returned guard closes the session when dropped.
    ///
    /// # Panics
    /// If the session is already open.
    pub fn open(&mut self) -> Result<SessionGuard<'_>> {
        assert!(self.device.is_null(), "Device on {} is already open", self.port);

        let library = &*self.library;
        let device = native::invoke_with_cleanup(
            library,
            |error| match self.mode {
                ConnectMode::Simple => library.device_construct_simple(&self.c_port, error),
                ConnectMode::Bitrate(bitrate) => {
                    library.device_construct(&self.c_port, bitrate, error)
                }
            },
            |device| {
                if !device.is_null() {
                    // SAFETY: fresh handle, never handed out
                    unsafe { library.device_destruct(device) };
                }
            },
        )?;

        if device.is_null() {
            return Err(Error::Other(format!(
                "libneo returned no device for {}",
                self.port
            )));
        }

        self.device = device;
        self.scanning.set(false);
        log::info!("Opened device on {}", self.port);
        Ok(SessionGuard { session: self })
    }

    /// Release the native handle, if one is held
    pub fn close(&mut self) {
        if self.device.is_null() {
            return;
        }
        // SAFETY: the handle is live and dropped from the session right after
        unsafe { self.library.device_destruct(self.device) };
        self.device = RawDevice::null();
        self.scanning.set(false);
        log::info!("Closed device on {}", self.port);
    }

    /// Open, run `f`, close.
    ///
    /// The session is closed however `f` exits, including by `?` or panic.
    pub fn scoped<T>(&mut self, f: impl FnOnce(&DeviceSession) -> Result<T>) -> Result<T> {
        let guard = self.open()?;
        f(&*guard)
    }

    pub fn start_scanning(&self) -> Result<()> {
        self.require_idle("start scanning")?;
        log::debug!("Starting scan");
        // SAFETY: live handle, not scanning
        self.call(|library, device, error| unsafe {
            library.device_start_scanning(device, error)
        })?;
        self.scanning.set(true);
        Ok(())
    }

    /// Stop scanning. A no-op if the device is not scanning.
    pub fn stop_scanning(&self) -> Result<()> {
        log::debug!("Stopping scan");
        // SAFETY: live handle
        self.call(|library, device, error| unsafe { library.device_stop_scanning(device, error) })?;
        self.scanning.set(false);
        Ok(())
    }

    /// Motor speed in Hz
    pub fn motor_speed(&self) -> Result<i32> {
        self.require_idle("query motor speed")?;
        // SAFETY: live handle, not scanning
        self.call(|library, device, error| unsafe { library.device_motor_speed(device, error) })
    }

    /// Set motor speed in Hz (0 stops the motor)
    pub fn set_motor_speed(&self, hz: i32) -> Result<()> {
        if !MOTOR_SPEED_RANGE.contains(&hz) {
            return Err(Error::InvalidConfig(format!(
                "motor speed must be within {}..={} Hz, got {}",
                MOTOR_SPEED_RANGE.start(),
                MOTOR_SPEED_RANGE.end(),
                hz
            )));
        }
        self.require_idle("adjust motor speed")?;
        log::debug!("Setting motor speed to {} Hz", hz);
        // SAFETY: live handle, not scanning, hz in range
        self.call(|library, device, error| unsafe {
            library.device_set_motor_speed(device, hz, error)
        })
    }

    /// Sample rate in Hz
    pub fn sample_rate(&self) -> Result<i32> {
        self.require_idle("query sample rate")?;
        // SAFETY: live handle, not scanning
        self.call(|library, device, error| unsafe { library.device_sample_rate(device, error) })
    }

    pub fn set_sample_rate(&self, hz: i32) -> Result<()> {
        if !SAMPLE_RATES_HZ.contains(&hz) {
            return Err(Error::InvalidConfig(format!(
                "sample rate must be one of {:?} Hz, got {}",
                SAMPLE_RATES_HZ, hz
            )));
        }
        self.require_idle("adjust sample rate")?;
        log::debug!("Setting sample rate to {} Hz", hz);
        // SAFETY: live handle, not scanning, supported rate
        self.call(|library, device, error| unsafe {
            library.device_set_sample_rate(device, hz, error)
        })
    }

    pub fn reset(&self) -> Result<()> {
        self.require_idle("reset")?;
        log::debug!("Resetting device");
        // SAFETY: live handle, not scanning
        self.call(|library, device, error| unsafe { library.device_reset(device, error) })
    }

    /// Run the device calibration routine. Blocks for several seconds.
    pub fn calibrate(&self) -> Result<()> {
        self.require_idle("calibrate")?;
        log::info!("Calibrating device on {}", self.port);
        // SAFETY: live handle, not scanning
        self.call(|library, device, error| unsafe { library.device_calibrate(device, error) })
    }

    /// Lazy, infinite stream of scans.
    ///
    /// Each pull blocks until the device delivers a rotation. The stream ends
    /// after yielding its first error.
    pub fn get_scans(&self) -> ScanStream<'_> {
        self.handle();
        ScanStream::new(self)
    }

    pub(crate) fn library(&self) -> &dyn NativeLibrary {
        &*self.library
    }

    /// The open handle.
    ///
    /// # Panics
    /// If the session is not open.
    pub(crate) fn handle(&self) -> RawDevice {
        assert!(
            !self.device.is_null(),
            "Use DeviceSession::open or DeviceSession::scoped to guarantee deterministic resource management"
        );
        self.device
    }

    fn require_idle(&self, what: &str) -> Result<()> {
        if self.scanning.get() {
            return Err(Error::InvalidState(format!(
                "cannot {} while scanning on {}",
                what, self.port
            )));
        }
        Ok(())
    }

    fn call<T>(
        &self,
        f: impl FnOnce(&dyn NativeLibrary, RawDevice, &mut RawError) -> T,
    ) -> Result<T> {
        let device = self.handle();
        let library = self.library();
        native::invoke(library, |error| f(library, device, error))
    }
}

impl Drop for DeviceSession {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for DeviceSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceSession")
            .field("port", &self.port)
            .field("mode", &self.mode)
            .field("open", &self.is_open())
            .field("scanning", &self.is_scanning())
            .finish()
    }
}

/// An open [`DeviceSession`]; closes it on drop
pub struct SessionGuard<'a> {
    session: &'a mut DeviceSession,
}

impl Deref for SessionGuard<'_> {
    type Target = DeviceSession;

    fn deref(&self) -> &DeviceSession {
        self.session
    }
}

impl Drop for SessionGuard<'_> {
    fn drop(&mut self) {
        self.session.close();
    }
}
