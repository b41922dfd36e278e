//! Mock native library for testing
//!
//! Stands in for libneo without hardware. Every device-level call is
//! appended to a call log, handles are tracked so leaks and double frees
//! show up as counts, and error handles remember whether their message was
//! read before they were destroyed.
//!
//! Calls that would trip one of libneo's assertions (and abort the process)
//! are recorded as violations instead and otherwise ignored. Only injected
//! failures produce error handles.

use super::{NativeLibrary, RawDevice, RawError, RawScan};
use crate::device::{MOTOR_SPEED_RANGE, SAMPLE_RATES_HZ};
use crate::types::Sample;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet, VecDeque};
use std::ffi::{CStr, c_void};
use std::sync::Arc;

/// Version word reported by the mock (1.0)
const MOCK_VERSION: i32 = 1 << 16;

/// Samples in a synthetic scan when nothing is scripted
const DEFAULT_SAMPLES_PER_SCAN: usize = 360;

/// Largest scan libneo can return
const MAX_SAMPLES_PER_SCAN: usize = 4096;

/// A call observed by [`MockNeo`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NativeCall {
    Version,
    AbiCheck,
    ErrorMessage(usize),
    ErrorDestruct(usize),
    ConstructSimple { port: String },
    Construct { port: String, bitrate: i32 },
    DeviceDestruct,
    StartScanning,
    StopScanning,
    GetScan,
    ScanDestruct,
    MotorSpeed,
    SetMotorSpeed(i32),
    SampleRate,
    SetSampleRate(i32),
    Reset,
    Calibrate,
}

/// Operations that can be told to fail once
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MockOp {
    Construct,
    StartScanning,
    StopScanning,
    MotorSpeed,
    SetMotorSpeed,
    SampleRate,
    SetSampleRate,
    Reset,
    Calibrate,
}

#[derive(Debug, Clone)]
enum ScriptedScan {
    Samples(Vec<Sample>),
    Fail(String),
}

#[derive(Debug)]
struct ErrorEntry {
    message: String,
    read: bool,
}

#[derive(Debug)]
struct MockState {
    abi_compatible: bool,
    next_handle: usize,
    calls: Vec<NativeCall>,

    errors: HashMap<usize, ErrorEntry>,
    errors_created: usize,
    devices: HashSet<usize>,
    devices_constructed: usize,
    devices_destructed: usize,
    scans: HashMap<usize, Vec<Sample>>,
    handle_on_construct_error: bool,

    scanning: bool,
    motor_speed: i32,
    sample_rate: i32,
    script: VecDeque<ScriptedScan>,
    default_samples: usize,
    failures: HashMap<MockOp, String>,

    violations: Vec<String>,
}

impl MockState {
    fn handle(&mut self) -> *mut c_void {
        self.next_handle += 1;
        // Never dereferenced; only used as an identity
        self.next_handle as *mut c_void
    }

    fn raise(&mut self, message: impl Into<String>) -> RawError {
        let error = RawError::from_ptr(self.handle());
        self.errors.insert(
            error.as_ptr() as usize,
            ErrorEntry {
                message: message.into(),
                read: false,
            },
        );
        self.errors_created += 1;
        error
    }

    /// Fail with the injected message for `op`, if any
    fn injected(&mut self, op: MockOp, error: &mut RawError) -> bool {
        match self.failures.remove(&op) {
            Some(message) => {
                *error = self.raise(message);
                true
            }
            None => false,
        }
    }

    fn check_device(&mut self, device: RawDevice) -> bool {
        if self.devices.contains(&(device.as_ptr() as usize)) {
            true
        } else {
            self.violations
                .push(format!("use of unknown device handle {:?}", device));
            false
        }
    }

    fn construct(&mut self, call: NativeCall, error: &mut RawError) -> RawDevice {
        self.calls.push(call);
        if self.injected(MockOp::Construct, error) {
            if self.handle_on_construct_error {
                let device = RawDevice::from_ptr(self.handle());
                self.devices.insert(device.as_ptr() as usize);
                self.devices_constructed += 1;
                return device;
            }
            return RawDevice::null();
        }
        let device = RawDevice::from_ptr(self.handle());
        self.devices.insert(device.as_ptr() as usize);
        self.devices_constructed += 1;
        self.scanning = false;
        device
    }

    /// Shared prologue of control operations: log, validate, fail on request
    fn control(
        &mut self,
        call: NativeCall,
        op: MockOp,
        device: RawDevice,
        error: &mut RawError,
    ) -> bool {
        self.calls.push(call);
        if !self.check_device(device) {
            *error = self.raise("invalid device handle");
            return false;
        }
        !self.injected(op, error)
    }

    /// Control operation that libneo only accepts while not scanning
    fn idle_control(
        &mut self,
        call: NativeCall,
        op: MockOp,
        device: RawDevice,
        error: &mut RawError,
    ) -> bool {
        if self.scanning {
            self.violations.push(format!("{:?} while scanning", call));
            self.calls.push(call);
            return false;
        }
        self.control(call, op, device, error)
    }

    fn synthetic_scan(&self) -> Vec<Sample> {
        let n = self.default_samples.max(1) as i64;
        (0..self.default_samples as i64)
            .map(|i| Sample::new((i * 360_000 / n) as i32, 100 + (i % 50) as i32, 200))
            .collect()
    }
}

/// Mock native library.
///
/// Cheap to clone; clones share state, so a test can keep one copy for
/// inspection while a session owns another.
#[derive(Clone)]
pub struct MockNeo {
    inner: Arc<Mutex<MockState>>,
}

impl MockNeo {
    /// Create a new mock library with an ABI-compatible version
    pub fn new() -> Self {
        MockNeo {
            inner: Arc::new(Mutex::new(MockState {
                abi_compatible: true,
                next_handle: 0x1000,
                calls: Vec::new(),
                errors: HashMap::new(),
                errors_created: 0,
                devices: HashSet::new(),
                devices_constructed: 0,
                devices_destructed: 0,
                scans: HashMap::new(),
                handle_on_construct_error: false,
                scanning: false,
                motor_speed: 0,
                sample_rate: 500,
                script: VecDeque::new(),
                default_samples: DEFAULT_SAMPLES_PER_SCAN,
                failures: HashMap::new(),
                violations: Vec::new(),
            })),
        }
    }

    /// Report an incompatible ABI from now on
    pub fn set_abi_compatible(&self, compatible: bool) {
        self.inner.lock().abi_compatible = compatible;
    }

    /// Queue a scan to be returned by the next unscripted `get_scan`
    pub fn push_scan(&self, samples: Vec<Sample>) {
        self.inner
            .lock()
            .script
            .push_back(ScriptedScan::Samples(samples));
    }

    /// Queue a failing `get_scan`
    pub fn push_scan_error(&self, message: impl Into<String>) {
        self.inner
            .lock()
            .script
            .push_back(ScriptedScan::Fail(message.into()));
    }

    /// Sample count of synthetic scans produced once the script runs dry.
    ///
    /// Capped at the 4096 samples libneo can hold in one scan.
    pub fn set_default_samples(&self, count: usize) {
        self.inner.lock().default_samples = count.min(MAX_SAMPLES_PER_SCAN);
    }

    /// Make the next call of `op` fail with `message`
    pub fn fail_next(&self, op: MockOp, message: impl Into<String>) {
        self.inner.lock().failures.insert(op, message.into());
    }

    /// Hand out a device handle even when construction reports an error
    pub fn set_handle_on_construct_error(&self, enabled: bool) {
        self.inner.lock().handle_on_construct_error = enabled;
    }

    /// Create an error handle carrying `message`
    pub fn raise(&self, message: impl Into<String>) -> RawError {
        self.inner.lock().raise(message)
    }

    /// All calls observed so far, in order
    pub fn calls(&self) -> Vec<NativeCall> {
        self.inner.lock().calls.clone()
    }

    /// Forget the call log
    pub fn clear_calls(&self) {
        self.inner.lock().calls.clear();
    }

    /// Protocol violations: unknown handles, double frees, unread errors and
    /// calls libneo would abort on
    pub fn violations(&self) -> Vec<String> {
        self.inner.lock().violations.clone()
    }

    pub fn devices_constructed(&self) -> usize {
        self.inner.lock().devices_constructed
    }

    pub fn devices_destructed(&self) -> usize {
        self.inner.lock().devices_destructed
    }

    /// Device handles constructed but not yet destroyed
    pub fn live_devices(&self) -> usize {
        self.inner.lock().devices.len()
    }

    /// Error handles handed out but not yet destroyed
    pub fn live_errors(&self) -> usize {
        self.inner.lock().errors.len()
    }

    pub fn errors_created(&self) -> usize {
        self.inner.lock().errors_created
    }

    /// Scan handles handed out but not yet destroyed
    pub fn live_scans(&self) -> usize {
        self.inner.lock().scans.len()
    }

    pub fn is_scanning(&self) -> bool {
        self.inner.lock().scanning
    }

    /// Current motor speed setting
    pub fn motor_speed(&self) -> i32 {
        self.inner.lock().motor_speed
    }
}

impl Default for MockNeo {
    fn default() -> Self {
        Self::new()
    }
}

impl NativeLibrary for MockNeo {
    fn version(&self) -> i32 {
        self.inner.lock().calls.push(NativeCall::Version);
        MOCK_VERSION
    }

    fn is_abi_compatible(&self) -> bool {
        let mut state = self.inner.lock();
        state.calls.push(NativeCall::AbiCheck);
        state.abi_compatible
    }

    unsafe fn error_message(&self, error: RawError) -> String {
        let mut state = self.inner.lock();
        let id = error.as_ptr() as usize;
        state.calls.push(NativeCall::ErrorMessage(id));
        match state.errors.get_mut(&id) {
            Some(entry) => {
                entry.read = true;
                entry.message.clone()
            }
            None => {
                state
                    .violations
                    .push(format!("message read from unknown error handle {:#x}", id));
                String::new()
            }
        }
    }

    unsafe fn error_destruct(&self, error: RawError) {
        let mut state = self.inner.lock();
        let id = error.as_ptr() as usize;
        state.calls.push(NativeCall::ErrorDestruct(id));
        match state.errors.remove(&id) {
            Some(entry) if !entry.read => state
                .violations
                .push(format!("error handle {:#x} destroyed before read", id)),
            Some(_) => {}
            None => state
                .violations
                .push(format!("unknown or double-freed error handle {:#x}", id)),
        }
    }

    fn device_construct_simple(&self, port: &CStr, error: &mut RawError) -> RawDevice {
        let port = port.to_string_lossy().into_owned();
        self.inner
            .lock()
            .construct(NativeCall::ConstructSimple { port }, error)
    }

    fn device_construct(&self, port: &CStr, bitrate: i32, error: &mut RawError) -> RawDevice {
        let port = port.to_string_lossy().into_owned();
        let mut state = self.inner.lock();
        if bitrate <= 0 {
            state
                .violations
                .push(format!("configured constructor called with bitrate {}", bitrate));
        }
        state.construct(NativeCall::Construct { port, bitrate }, error)
    }

    unsafe fn device_destruct(&self, device: RawDevice) {
        let mut state = self.inner.lock();
        state.calls.push(NativeCall::DeviceDestruct);
        if state.devices.remove(&(device.as_ptr() as usize)) {
            state.devices_destructed += 1;
            state.scanning = false;
        } else {
            state
                .violations
                .push(format!("unknown or double-freed device handle {:?}", device));
        }
    }

    unsafe fn device_start_scanning(&self, device: RawDevice, error: &mut RawError) {
        let mut state = self.inner.lock();
        if state.idle_control(NativeCall::StartScanning, MockOp::StartScanning, device, error) {
            state.scanning = true;
        }
    }

    unsafe fn device_stop_scanning(&self, device: RawDevice, error: &mut RawError) {
        let mut state = self.inner.lock();
        if !state.scanning {
            // No-op in libneo, before any I/O
            state.calls.push(NativeCall::StopScanning);
            state.check_device(device);
            return;
        }
        if state.control(NativeCall::StopScanning, MockOp::StopScanning, device, error) {
            state.scanning = false;
        }
    }

    unsafe fn device_get_scan(&self, device: RawDevice, error: &mut RawError) -> RawScan {
        let mut state = self.inner.lock();
        state.calls.push(NativeCall::GetScan);
        if !state.check_device(device) {
            *error = state.raise("invalid device handle");
            return RawScan::null();
        }
        if !state.scanning {
            state.violations.push("GetScan while not scanning".into());
            return RawScan::null();
        }

        let samples = match state.script.pop_front() {
            Some(ScriptedScan::Samples(samples)) => samples,
            Some(ScriptedScan::Fail(message)) => {
                *error = state.raise(message);
                return RawScan::null();
            }
            None => state.synthetic_scan(),
        };

        let scan = RawScan::from_ptr(state.handle());
        state.scans.insert(scan.as_ptr() as usize, samples);
        scan
    }

    unsafe fn scan_destruct(&self, scan: RawScan) {
        let mut state = self.inner.lock();
        state.calls.push(NativeCall::ScanDestruct);
        if state.scans.remove(&(scan.as_ptr() as usize)).is_none() {
            state
                .violations
                .push(format!("unknown or double-freed scan handle {:?}", scan));
        }
    }

    unsafe fn scan_sample_count(&self, scan: RawScan) -> i32 {
        let state = self.inner.lock();
        state
            .scans
            .get(&(scan.as_ptr() as usize))
            .map_or(0, |samples| samples.len() as i32)
    }

    unsafe fn scan_angle(&self, scan: RawScan, sample: i32) -> i32 {
        self.sample_field(scan, sample, |s| s.angle)
    }

    unsafe fn scan_distance(&self, scan: RawScan, sample: i32) -> i32 {
        self.sample_field(scan, sample, |s| s.distance)
    }

    unsafe fn scan_signal_strength(&self, scan: RawScan, sample: i32) -> i32 {
        self.sample_field(scan, sample, |s| s.signal_strength)
    }

    unsafe fn device_motor_speed(&self, device: RawDevice, error: &mut RawError) -> i32 {
        let mut state = self.inner.lock();
        if !state.idle_control(NativeCall::MotorSpeed, MockOp::MotorSpeed, device, error) {
            return 0;
        }
        state.motor_speed
    }

    unsafe fn device_set_motor_speed(&self, device: RawDevice, hz: i32, error: &mut RawError) {
        let mut state = self.inner.lock();
        if !MOTOR_SPEED_RANGE.contains(&hz) {
            state.calls.push(NativeCall::SetMotorSpeed(hz));
            state.violations.push(format!("motor speed {} Hz out of range", hz));
            return;
        }
        if state.idle_control(NativeCall::SetMotorSpeed(hz), MockOp::SetMotorSpeed, device, error) {
            state.motor_speed = hz;
        }
    }

    unsafe fn device_sample_rate(&self, device: RawDevice, error: &mut RawError) -> i32 {
        let mut state = self.inner.lock();
        if !state.idle_control(NativeCall::SampleRate, MockOp::SampleRate, device, error) {
            return 0;
        }
        state.sample_rate
    }

    unsafe fn device_set_sample_rate(&self, device: RawDevice, hz: i32, error: &mut RawError) {
        let mut state = self.inner.lock();
        if !SAMPLE_RATES_HZ.contains(&hz) {
            state.calls.push(NativeCall::SetSampleRate(hz));
            state.violations.push(format!("sample rate {} Hz unknown", hz));
            return;
        }
        if state.idle_control(NativeCall::SetSampleRate(hz), MockOp::SetSampleRate, device, error) {
            state.sample_rate = hz;
        }
    }

    unsafe fn device_reset(&self, device: RawDevice, error: &mut RawError) {
        let mut state = self.inner.lock();
        if state.idle_control(NativeCall::Reset, MockOp::Reset, device, error) {
            state.motor_speed = 0;
        }
    }

    unsafe fn device_calibrate(&self, device: RawDevice, error: &mut RawError) {
        let mut state = self.inner.lock();
        state.idle_control(NativeCall::Calibrate, MockOp::Calibrate, device, error);
    }
}

impl MockNeo {
    fn sample_field(&self, scan: RawScan, sample: i32, field: impl Fn(&Sample) -> i32) -> i32 {
        let mut state = self.inner.lock();
        let value = state
            .scans
            .get(&(scan.as_ptr() as usize))
            .and_then(|samples| usize::try_from(sample).ok().and_then(|i| samples.get(i)))
            .map(field);
        match value {
            Some(value) => value,
            None => {
                state
                    .violations
                    .push(format!("sample index {} out of bounds for {:?}", sample, scan));
                0
            }
        }
    }
}
