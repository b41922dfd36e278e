//! Pull-based scan stream

use super::DeviceSession;
use crate::error::{Error, Result};
use crate::native::{self, NativeLibrary, RawScan};
use crate::types::{Sample, Scan};
use std::iter::FusedIterator;

/// Lazy, infinite sequence of scans from an open session.
///
/// Every `next()` blocks on the native library until one rotation is
/// available. After the first error the stream is finished and yields
/// `None` from then on; open a new stream with
/// [`DeviceSession::get_scans`] to keep reading.
///
/// There is no way to interrupt a pull in progress. To stop, stop pulling
/// and call [`DeviceSession::stop_scanning`]; a pull already blocked in the
/// native library may not return until its next timeout or error.
pub struct ScanStream<'a> {
    session: &'a DeviceSession,
    finished: bool,
}

impl<'a> ScanStream<'a> {
    pub(crate) fn new(session: &'a DeviceSession) -> Self {
        Self {
            session,
            finished: false,
        }
    }

    /// True once an error has ended the stream
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    fn pull(&self) -> Result<Scan> {
        let library = self.session.library();
        let device = self.session.handle();
        if !self.session.is_scanning() {
            return Err(Error::InvalidState(format!(
                "cannot read scans from {} while not scanning",
                self.session.port()
            )));
        }

        let raw = native::invoke_with_cleanup(
            library,
            // SAFETY: live handle, scanning
            |error| unsafe { library.device_get_scan(device, error) },
            |scan| {
                if !scan.is_null() {
                    unsafe { library.scan_destruct(scan) };
                }
            },
        )?;
        if raw.is_null() {
            return Err(Error::Other("libneo returned no scan".into()));
        }

        Ok(ScanHandle { library, raw }.read())
    }
}

impl Iterator for ScanStream<'_> {
    type Item = Result<Scan>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        match self.pull() {
            Ok(scan) => Some(Ok(scan)),
            Err(e) => {
                self.finished = true;
                Some(Err(e))
            }
        }
    }
}

impl FusedIterator for ScanStream<'_> {}

/// Owned native scan, destroyed on drop.
///
/// `raw` is a live, non-null scan from `library` that nothing else owns.
struct ScanHandle<'a> {
    library: &'a dyn NativeLibrary,
    raw: RawScan,
}

impl ScanHandle<'_> {
    fn read(&self) -> Scan {
        // SAFETY: live scan; indices stay below the reported count
        let count = unsafe { self.library.scan_sample_count(self.raw) }.max(0);
        let samples = (0..count)
            .map(|i| unsafe {
                Sample::new(
                    self.library.scan_angle(self.raw, i),
                    self.library.scan_distance(self.raw, i),
                    self.library.scan_signal_strength(self.raw, i),
                )
            })
            .collect();
        Scan::new(samples)
    }
}

impl Drop for ScanHandle<'_> {
    fn drop(&mut self) {
        // SAFETY: sole owner, destroyed exactly once
        unsafe { self.library.scan_destruct(self.raw) };
    }
}

#[cfg(test)]
mod tests {
    use crate::device::DeviceSession;
    use crate::error::Error;
    use crate::native::{MockNeo, NativeCall};
    use crate::types::Sample;
    use std::sync::Arc;

    fn open_scanning<T>(mock: &MockNeo, f: impl FnOnce(&DeviceSession) -> T) -> T {
        let mut session = DeviceSession::new(Arc::new(mock.clone()), "/dev/ttyUSB0", None).unwrap();
        let guard = session.open().unwrap();
        guard.start_scanning().unwrap();
        f(&*guard)
    }

    fn samples(n: i32) -> Vec<Sample> {
        (0..n)
            .map(|i| Sample::new(i * 1000, 50 + i, 255 - i % 200))
            .collect()
    }

    #[test]
    fn test_scan_matches_native_accessors() {
        let mock = MockNeo::new();
        for n in [0, 1, 360] {
            mock.push_scan(samples(n));
        }

        let scans: Vec<_> = open_scanning(&mock, |device| {
            device
                .get_scans()
                .take(3)
                .collect::<Result<Vec<_>, _>>()
                .unwrap()
        });

        assert_eq!(scans.len(), 3);
        for (scan, n) in scans.iter().zip([0, 1, 360]) {
            assert_eq!(scan.len(), n as usize);
            assert_eq!(scan.samples(), samples(n).as_slice());
        }
        assert_eq!(mock.live_scans(), 0);
        assert!(mock.violations().is_empty());
    }

    #[test]
    fn test_error_on_nth_pull_ends_stream() {
        let mock = MockNeo::new();
        mock.push_scan(samples(10));
        mock.push_scan(samples(10));
        mock.push_scan_error("unable to receive neo scan response");
        mock.push_scan(samples(10));

        open_scanning(&mock, |device| {
            let mut scans = device.get_scans();
            assert!(scans.next().unwrap().is_ok());
            assert!(scans.next().unwrap().is_ok());

            let err = scans.next().unwrap().unwrap_err();
            assert_eq!(err.to_string(), "unable to receive neo scan response");
            assert!(scans.is_finished());
            assert!(scans.next().is_none());
            assert!(scans.next().is_none());
        });

        // The failed pull produced no scan handle and the queued scan was never fetched
        let calls = mock.calls();
        assert_eq!(calls.iter().filter(|c| **c == NativeCall::GetScan).count(), 3);
        assert_eq!(calls.iter().filter(|c| **c == NativeCall::ScanDestruct).count(), 2);
        assert_eq!(mock.live_scans(), 0);
        assert_eq!(mock.live_errors(), 0);
        assert!(mock.violations().is_empty());
    }

    #[test]
    fn test_each_scan_released_before_next_pull() {
        let mock = MockNeo::new();
        mock.set_default_samples(8);

        open_scanning(&mock, |device| {
            for scan in device.get_scans().take(5) {
                assert_eq!(scan.unwrap().len(), 8);
                assert_eq!(mock.live_scans(), 0);
            }
        });

        let pulls: Vec<_> = mock
            .calls()
            .into_iter()
            .filter(|c| matches!(c, NativeCall::GetScan | NativeCall::ScanDestruct))
            .collect();
        let expected: Vec<_> = std::iter::repeat([NativeCall::GetScan, NativeCall::ScanDestruct])
            .take(5)
            .flatten()
            .collect();
        assert_eq!(pulls, expected);
    }

    #[test]
    fn test_pull_without_scanning_never_reaches_library() {
        let mock = MockNeo::new();
        let mut session = DeviceSession::new(Arc::new(mock.clone()), "/dev/ttyUSB0", None).unwrap();

        session
            .scoped(|device| {
                let mut scans = device.get_scans();
                let result = scans.next().unwrap();
                assert!(matches!(result, Err(Error::InvalidState(_))));
                assert!(scans.next().is_none());
                Ok(())
            })
            .unwrap();

        assert!(!mock.calls().contains(&NativeCall::GetScan));
        assert!(mock.violations().is_empty());
    }

    #[test]
    fn test_pull_after_stop_never_reaches_library() {
        let mock = MockNeo::new();

        open_scanning(&mock, |device| {
            assert!(device.get_scans().next().unwrap().is_ok());
            device.stop_scanning().unwrap();
            let result = device.get_scans().next().unwrap();
            assert!(matches!(result, Err(Error::InvalidState(_))));
        });

        let pulls = mock.calls().iter().filter(|c| **c == NativeCall::GetScan).count();
        assert_eq!(pulls, 1);
        assert!(mock.violations().is_empty());
    }
}
