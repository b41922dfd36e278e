//! End-to-end session tests against the mock library
//!
//! Drives the public API the way the CLI does and checks the exact native
//! call sequence plus handle bookkeeping:
//! - open / configure / scan / stop / close
//! - every error handle destroyed exactly once
//! - device handles released on every exit path
//!
//! Run with: `cargo test --test session_flow`

use neo_lidar::device::{ConnectMode, DeviceSession, ScanWorker, WorkerConfig};
use neo_lidar::native::{MockNeo, MockOp, NativeCall};
use neo_lidar::{Error, Result, Sample};
use std::sync::Arc;

// ============================================================================
// Helpers
// ============================================================================

fn session(mock: &MockNeo, port: &str, bitrate: Option<i32>) -> DeviceSession {
    DeviceSession::new(Arc::new(mock.clone()), port, bitrate).unwrap()
}

fn assert_clean(mock: &MockNeo) {
    assert_eq!(mock.live_devices(), 0, "device handle leaked");
    assert_eq!(mock.live_scans(), 0, "scan handle leaked");
    assert_eq!(mock.live_errors(), 0, "error handle leaked");
    assert!(mock.violations().is_empty(), "{:?}", mock.violations());
}

// ============================================================================
// Full Sessions
// ============================================================================

#[test]
fn test_ten_scans_call_sequence() {
    let mock = MockNeo::new();
    mock.set_default_samples(32);
    let mut session = session(&mock, "/dev/ttyUSB0", None);

    let counts = session
        .scoped(|device| {
            device.set_motor_speed(5)?;
            device.start_scanning()?;
            let counts = device
                .get_scans()
                .take(10)
                .map(|scan| scan.map(|s| s.len()))
                .collect::<Result<Vec<_>>>()?;
            device.stop_scanning()?;
            device.set_motor_speed(0)?;
            Ok(counts)
        })
        .unwrap();

    assert_eq!(counts, vec![32; 10]);

    let mut expected = vec![
        NativeCall::AbiCheck,
        NativeCall::Version,
        NativeCall::ConstructSimple {
            port: "/dev/ttyUSB0".into(),
        },
        NativeCall::SetMotorSpeed(5),
        NativeCall::StartScanning,
    ];
    for _ in 0..10 {
        expected.push(NativeCall::GetScan);
        expected.push(NativeCall::ScanDestruct);
    }
    expected.extend([
        NativeCall::StopScanning,
        NativeCall::SetMotorSpeed(0),
        NativeCall::DeviceDestruct,
    ]);

    assert_eq!(mock.calls(), expected);
    assert_eq!(mock.motor_speed(), 0);
    assert!(!mock.is_scanning());
    assert_clean(&mock);
}

#[test]
fn test_configured_bitrate_uses_configured_constructor() {
    let mock = MockNeo::new();
    let mut session = session(&mock, "/dev/ttyACM0", Some(115_200));
    assert_eq!(session.mode(), ConnectMode::Bitrate(115_200));

    session.scoped(|device| device.reset()).unwrap();

    let calls = mock.calls();
    assert!(calls.contains(&NativeCall::Construct {
        port: "/dev/ttyACM0".into(),
        bitrate: 115_200,
    }));
    assert!(
        !calls
            .iter()
            .any(|c| matches!(c, NativeCall::ConstructSimple { .. }))
    );
    assert_clean(&mock);
}

#[test]
fn test_invalid_bitrate_never_reaches_library() {
    let mock = MockNeo::new();
    for bitrate in [0, -9600] {
        let result = DeviceSession::new(Arc::new(mock.clone()), "/dev/ttyUSB0", Some(bitrate));
        assert!(matches!(result, Err(Error::InvalidBitrate(b)) if b == bitrate));
    }
    assert!(mock.calls().is_empty());
}

#[test]
fn test_motor_and_sample_rate_round_trip() {
    let mock = MockNeo::new();
    let mut session = session(&mock, "/dev/ttyUSB0", None);

    let (motor, rate) = session
        .scoped(|device| {
            device.set_motor_speed(7)?;
            device.set_sample_rate(1000)?;
            Ok((device.motor_speed()?, device.sample_rate()?))
        })
        .unwrap();

    assert_eq!(motor, 7);
    assert_eq!(rate, 1000);
    assert_clean(&mock);
}

// ============================================================================
// Failure Paths
// ============================================================================

#[test]
fn test_open_failure_surfaces_message() {
    let mock = MockNeo::new();
    mock.fail_next(MockOp::Construct, "unable to open serial port");
    let mut session = session(&mock, "/dev/ttyUSB9", None);

    let err = session.scoped(|_| Ok(())).unwrap_err();
    assert!(err.is_native());
    assert_eq!(err.to_string(), "unable to open serial port");
    assert!(!session.is_open());
    assert_eq!(mock.devices_constructed(), 0);
    assert_clean(&mock);
}

#[test]
fn test_adjusting_motor_while_scanning_is_refused() {
    let mock = MockNeo::new();
    let mut session = session(&mock, "/dev/ttyUSB0", None);

    let err = session
        .scoped(|device| {
            device.start_scanning()?;
            device.set_motor_speed(3)
        })
        .unwrap_err();

    assert!(matches!(err, Error::InvalidState(_)));
    assert!(!err.is_native());
    assert!(!mock.calls().contains(&NativeCall::SetMotorSpeed(3)));
    assert_eq!(mock.calls().last(), Some(&NativeCall::DeviceDestruct));
    assert_eq!(mock.errors_created(), 0);
    assert_clean(&mock);
}

#[test]
fn test_out_of_range_motor_speed_is_refused() {
    let mock = MockNeo::new();
    let mut session = session(&mock, "/dev/ttyUSB0", None);

    let err = session.scoped(|device| device.set_motor_speed(11)).unwrap_err();

    assert!(matches!(err, Error::InvalidConfig(_)));
    assert!(!mock.calls().contains(&NativeCall::SetMotorSpeed(11)));
    assert_clean(&mock);
}

#[test]
fn test_scan_error_mid_stream() {
    let mock = MockNeo::new();
    mock.push_scan(vec![Sample::new(0, 120, 200)]);
    mock.push_scan_error("invalid neo scan response");
    let mut session = session(&mock, "/dev/ttyUSB0", None);

    let received = session
        .scoped(|device| {
            device.start_scanning()?;
            let mut received = 0;
            for scan in device.get_scans() {
                match scan {
                    Ok(_) => received += 1,
                    Err(e) => {
                        assert_eq!(e.to_string(), "invalid neo scan response");
                        break;
                    }
                }
            }
            device.stop_scanning()?;
            Ok(received)
        })
        .unwrap();

    assert_eq!(received, 1);
    assert_clean(&mock);
}

#[test]
fn test_repeated_sessions_balance_handles() {
    let mock = MockNeo::new();
    let mut session = session(&mock, "/dev/ttyUSB0", None);

    for _ in 0..5 {
        session.scoped(|device| device.calibrate()).unwrap();
        assert!(!session.is_open());
    }

    assert_eq!(mock.devices_constructed(), 5);
    assert_eq!(mock.devices_destructed(), 5);
    assert_clean(&mock);
}

// ============================================================================
// Background Acquisition
// ============================================================================

#[test]
fn test_worker_session_round_trip() {
    let mock = MockNeo::new();
    mock.set_default_samples(360);
    let config = WorkerConfig {
        motor_speed: Some(5),
        sample_rate: Some(750),
        idle_motor_speed: Some(0),
        channel_capacity: 2,
    };
    let worker = ScanWorker::spawn(session(&mock, "/dev/ttyUSB0", None), config).unwrap();

    let received: Vec<_> = worker.iter().take(4).collect::<Result<_>>().unwrap();
    assert!(received.iter().all(|scan| scan.len() == 360));

    // The returned session can be opened again on this thread
    let mut session = worker.stop().unwrap();
    session.scoped(|device| device.motor_speed()).unwrap();

    assert_eq!(mock.devices_constructed(), 2);
    assert_eq!(mock.motor_speed(), 0);
    assert_clean(&mock);
}
