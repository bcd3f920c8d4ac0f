#![allow(dead_code)]

use parking_lot::{Mutex, MutexGuard};

/// The handler registry is process wide, so expectations can't be run at the
/// same time
pub fn serial() -> MutexGuard<'static, ()> {
    static SERIAL: Mutex<()> = parking_lot::const_mutex(());

    capture_output();
    SERIAL.lock()
}

#[inline]
pub fn capture_output() {
    static SUB: std::sync::Once = std::sync::Once::new();

    SUB.call_once(|| {
        tracing_subscriber::fmt().with_test_writer().init();
    });
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum TestError {
    #[error("test error A")]
    A,
    #[error("test error B")]
    B,
}
