use crate::{BoxError, Category, SourceLocation};
use std::sync::Arc;

/// A handler for a call that always fails, receiving the reported error and
/// the location of the call
pub type UnconditionalHandler = Arc<dyn Fn(BoxError, SourceLocation) + Send + Sync>;

/// A handler for a call that checks a condition, receiving the result of the
/// condition, the error to report if it is `false`, and the location of the
/// call
pub type ConditionalHandler = Arc<dyn Fn(bool, BoxError, SourceLocation) + Send + Sync>;

/// The replacements installed on top of the default handler of a single
/// category, the last one is the active handler
struct Slot<H> {
    overrides: Vec<(u64, H)>,
}

impl<H: Clone> Slot<H> {
    const fn new() -> Self {
        Self {
            overrides: Vec::new(),
        }
    }

    #[inline]
    fn push(&mut self, id: u64, handler: H) {
        self.overrides.push((id, handler));
    }

    #[inline]
    fn active(&self) -> Option<H> {
        self.overrides.last().map(|(_, handler)| handler.clone())
    }
}

/// Operations that don't depend on the handler signature of a slot
trait SlotOps {
    fn remove(&mut self, id: u64) -> bool;
    fn clear(&mut self) -> usize;
    fn is_replaced(&self) -> bool;
}

impl<H> SlotOps for Slot<H> {
    fn remove(&mut self, id: u64) -> bool {
        if let Some(pos) = self.overrides.iter().position(|(oid, _)| *oid == id) {
            self.overrides.remove(pos);
            true
        } else {
            false
        }
    }

    fn clear(&mut self) -> usize {
        let count = self.overrides.len();
        self.overrides.clear();
        count
    }

    #[inline]
    fn is_replaced(&self) -> bool {
        !self.overrides.is_empty()
    }
}

struct Registry {
    next_id: u64,
    fatal: Slot<UnconditionalHandler>,
    precondition: Slot<ConditionalHandler>,
    precondition_failure: Slot<UnconditionalHandler>,
    assert: Slot<ConditionalHandler>,
    assertion_failure: Slot<UnconditionalHandler>,
}

impl Registry {
    const fn new() -> Self {
        Self {
            next_id: 0,
            fatal: Slot::new(),
            precondition: Slot::new(),
            precondition_failure: Slot::new(),
            assert: Slot::new(),
            assertion_failure: Slot::new(),
        }
    }

    fn slot(&mut self, category: Category) -> &mut dyn SlotOps {
        match category {
            Category::Fatal => &mut self.fatal,
            Category::Precondition => &mut self.precondition,
            Category::PreconditionFailure => &mut self.precondition_failure,
            Category::Assert => &mut self.assert,
            Category::AssertionFailure => &mut self.assertion_failure,
        }
    }

    fn unconditional(&self, category: Category) -> Option<UnconditionalHandler> {
        match category {
            Category::Fatal => self.fatal.active(),
            Category::PreconditionFailure => self.precondition_failure.active(),
            Category::AssertionFailure => self.assertion_failure.active(),
            Category::Precondition | Category::Assert => None,
        }
    }

    fn conditional(&self, category: Category) -> Option<ConditionalHandler> {
        match category {
            Category::Precondition => self.precondition.active(),
            Category::Assert => self.assert.active(),
            Category::Fatal | Category::PreconditionFailure | Category::AssertionFailure => None,
        }
    }
}

static REGISTRY: parking_lot::Mutex<Registry> = parking_lot::const_mutex(Registry::new());

/// Undoes a single handler replacement.
///
/// The replacement is removed when [`Self::restore`] is called, or when this
/// is dropped. Restoring is idempotent, and only ever removes the handler
/// that was installed by the call that returned this, so that if it was the
/// only replacement for its category, the category is back to its default
/// behavior of aborting the process.
#[must_use = "the replaced handler is restored as soon as this is dropped"]
pub struct RestorationHandler {
    category: Category,
    id: u64,
}

impl RestorationHandler {
    /// The category whose handler was replaced
    #[inline]
    pub fn category(&self) -> Category {
        self.category
    }

    /// Removes the replacement handler
    pub fn restore(&self) {
        if REGISTRY.lock().slot(self.category).remove(self.id) {
            log::debug!("restored {} handler ({})", self.category, self.id);
        }
    }
}

impl Drop for RestorationHandler {
    fn drop(&mut self) {
        self.restore();
    }
}

fn install(category: Category, push: impl FnOnce(&mut Registry, u64)) -> RestorationHandler {
    let mut registry = REGISTRY.lock();
    registry.next_id += 1;
    let id = registry.next_id;
    push(&mut *registry, id);

    log::debug!("replaced {category} handler ({id})");
    RestorationHandler { category, id }
}

cfg_if::cfg_if! {
    if #[cfg(any(debug_assertions, feature = "replace-fatal"))] {
        /// Replaces the handler invoked by [`crate::fatal_error`].
        ///
        /// If the handler returns, the calling thread is unwound with a
        /// [`crate::Halted`] payload.
        pub fn replace_fatal<F>(handler: F) -> RestorationHandler
        where
            F: Fn(BoxError, SourceLocation) + Send + Sync + 'static,
        {
            install(Category::Fatal, |r, id| r.fatal.push(id, Arc::new(handler)))
        }

        /// Removes every replacement for [`crate::fatal_error`]
        #[inline]
        pub fn restore_fatal() {
            restore(Category::Fatal);
        }
    }
}

/// Replaces the handler invoked by [`crate::precondition`].
///
/// The handler is called for every precondition, and decides itself what to
/// do if the condition is `false`, see [`crate::halt`].
pub fn replace_precondition<F>(handler: F) -> RestorationHandler
where
    F: Fn(bool, BoxError, SourceLocation) + Send + Sync + 'static,
{
    install(Category::Precondition, |r, id| {
        r.precondition.push(id, Arc::new(handler));
    })
}

/// Replaces the handler invoked by [`crate::precondition_failure`].
///
/// If the handler returns, the calling thread is unwound with a
/// [`crate::Halted`] payload.
pub fn replace_precondition_failure<F>(handler: F) -> RestorationHandler
where
    F: Fn(BoxError, SourceLocation) + Send + Sync + 'static,
{
    install(Category::PreconditionFailure, |r, id| {
        r.precondition_failure.push(id, Arc::new(handler));
    })
}

/// Replaces the handler invoked by [`crate::assertion`]
pub fn replace_assert<F>(handler: F) -> RestorationHandler
where
    F: Fn(bool, BoxError, SourceLocation) + Send + Sync + 'static,
{
    install(Category::Assert, |r, id| r.assert.push(id, Arc::new(handler)))
}

/// Replaces the handler invoked by [`crate::assertion_failure`]
pub fn replace_assertion_failure<F>(handler: F) -> RestorationHandler
where
    F: Fn(BoxError, SourceLocation) + Send + Sync + 'static,
{
    install(Category::AssertionFailure, |r, id| {
        r.assertion_failure.push(id, Arc::new(handler));
    })
}

/// Removes every replacement for [`crate::precondition`]
#[inline]
pub fn restore_precondition() {
    restore(Category::Precondition);
}

/// Removes every replacement for [`crate::precondition_failure`]
#[inline]
pub fn restore_precondition_failure() {
    restore(Category::PreconditionFailure);
}

/// Removes every replacement for [`crate::assertion`]
#[inline]
pub fn restore_assert() {
    restore(Category::Assert);
}

/// Removes every replacement for [`crate::assertion_failure`]
#[inline]
pub fn restore_assertion_failure() {
    restore(Category::AssertionFailure);
}

/// Puts the category straight back to its default handler, regardless of
/// how many replacements are outstanding.
///
/// Any outstanding [`RestorationHandler`] for the category becomes a no-op.
pub fn restore(category: Category) {
    let removed = REGISTRY.lock().slot(category).clear();
    if removed > 0 {
        log::debug!("reset {category} handler, removed {removed} replacement(s)");
    }
}

/// Whether the category currently has a replacement handler rather than the
/// default, aborting, one
#[inline]
pub fn is_replaced(category: Category) -> bool {
    REGISTRY.lock().slot(category).is_replaced()
}

/// Where a failure call ends up
enum Route<H> {
    /// The calling thread is quarantined, see [`crate::quarantine_on`]
    Quarantined,
    Handler(H),
    Default,
}

/// Picks the route for a call made on the current thread.
///
/// The quarantine is checked under the lock, a thread is always quarantined
/// before the handlers it was observed through are restored, so it can't
/// miss both.
fn route<H>(lookup: impl FnOnce(&Registry) -> Option<H>) -> Route<H> {
    let registry = REGISTRY.lock();

    if crate::is_quarantined() {
        Route::Quarantined
    } else {
        lookup(&*registry).map_or(Route::Default, Route::Handler)
    }
}

/// Routes a call that always fails to the active handler, never returns.
///
/// Calls made on a quarantined thread halt it without reaching any handler.
pub(crate) fn dispatch_unconditional(
    category: Category,
    error: BoxError,
    location: SourceLocation,
) -> ! {
    // The lock must not be held while the handler runs, it may well replace
    // or restore handlers itself
    match route(|registry| registry.unconditional(category)) {
        Route::Quarantined => {
            log::warn!("{category} failure at {location} on a quarantined thread: {error}");
            crate::halt(category)
        }
        Route::Handler(handler) => {
            handler(error, location);
            crate::halt(category)
        }
        Route::Default => crate::abort_with(category, &*error, location),
    }
}

/// Routes a conditional call to the active handler, which decides what
/// happens when the condition is `false`.
pub(crate) fn dispatch_conditional(
    category: Category,
    condition: bool,
    error: BoxError,
    location: SourceLocation,
) {
    match route(|registry| registry.conditional(category)) {
        // Unwinding again from a destructor would abort
        Route::Quarantined if !condition && !std::thread::panicking() => {
            log::warn!("{category} failure at {location} on a quarantined thread: {error}");
            crate::halt(category);
        }
        Route::Handler(handler) => handler(condition, error, location),
        Route::Default if !condition => crate::abort_with(category, &*error, location),
        Route::Quarantined | Route::Default => {}
    }
}
