#![allow(dead_code)]

use error_assertions::{BoxError, Category, Halted, SourceLocation};
use parking_lot::{Mutex, MutexGuard};
use std::sync::Arc;

/// The handler registry is process wide, so tests that replace handlers can't
/// run at the same time
pub fn serial() -> MutexGuard<'static, ()> {
    static SERIAL: Mutex<()> = parking_lot::const_mutex(());
    SERIAL.lock()
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum TestError {
    #[error("test error A")]
    A,
    #[error("test error B")]
    B,
}

/// A failure recorded by a replacement handler
pub struct Recorded {
    pub error: BoxError,
    pub location: SourceLocation,
}

pub type Recorder = Arc<Mutex<Vec<Recorded>>>;

pub fn recorder() -> Recorder {
    Arc::new(Mutex::new(Vec::new()))
}

pub fn record_unconditional(
    rec: &Recorder,
) -> impl Fn(BoxError, SourceLocation) + Send + Sync + 'static {
    let rec = rec.clone();
    move |error: BoxError, location: SourceLocation| rec.lock().push(Recorded { error, location })
}

/// Runs the closure on a separate thread and returns the category it was
/// halted with, if any
pub fn run_halting(f: impl FnOnce() + Send + 'static) -> Option<Category> {
    match std::thread::spawn(f).join() {
        Ok(()) => None,
        Err(payload) => Some(
            payload
                .downcast_ref::<Halted>()
                .expect("thread panicked rather than halting")
                .category(),
        ),
    }
}
