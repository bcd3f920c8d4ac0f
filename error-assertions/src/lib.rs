// BEGIN - Embark standard lints v6 for Rust 1.55+
// do not change or add/remove here, but one can add exceptions after this section
// for more info see: <https://github.com/EmbarkStudios/rust-ecosystem/issues/59>
#![deny(unsafe_code)]
#![warn(
    clippy::all,
    clippy::await_holding_lock,
    clippy::char_lit_as_u8,
    clippy::checked_conversions,
    clippy::dbg_macro,
    clippy::debug_assert_with_mut_call,
    clippy::doc_markdown,
    clippy::empty_enum,
    clippy::enum_glob_use,
    clippy::exit,
    clippy::expl_impl_clone_on_copy,
    clippy::explicit_deref_methods,
    clippy::explicit_into_iter_loop,
    clippy::fallible_impl_from,
    clippy::filter_map_next,
    clippy::flat_map_option,
    clippy::float_cmp_const,
    clippy::fn_params_excessive_bools,
    clippy::from_iter_instead_of_collect,
    clippy::if_let_mutex,
    clippy::implicit_clone,
    clippy::imprecise_flops,
    clippy::inefficient_to_string,
    clippy::invalid_upcast_comparisons,
    clippy::large_digit_groups,
    clippy::large_stack_arrays,
    clippy::large_types_passed_by_value,
    clippy::let_unit_value,
    clippy::linkedlist,
    clippy::lossy_float_literal,
    clippy::macro_use_imports,
    clippy::manual_ok_or,
    clippy::map_err_ignore,
    clippy::map_flatten,
    clippy::map_unwrap_or,
    clippy::match_on_vec_items,
    clippy::match_same_arms,
    clippy::match_wild_err_arm,
    clippy::match_wildcard_for_single_variants,
    clippy::mem_forget,
    clippy::mismatched_target_os,
    clippy::missing_enforced_import_renames,
    clippy::mut_mut,
    clippy::mutex_integer,
    clippy::needless_borrow,
    clippy::needless_continue,
    clippy::needless_for_each,
    clippy::option_option,
    clippy::path_buf_push_overwrite,
    clippy::ptr_as_ptr,
    clippy::rc_mutex,
    clippy::ref_option_ref,
    clippy::rest_pat_in_fully_bound_structs,
    clippy::same_functions_in_if_condition,
    clippy::semicolon_if_nothing_returned,
    clippy::single_match_else,
    clippy::string_add_assign,
    clippy::string_add,
    clippy::string_lit_as_bytes,
    clippy::string_to_string,
    clippy::todo,
    clippy::trait_duplication_in_bounds,
    clippy::unimplemented,
    clippy::unnested_or_patterns,
    clippy::unused_self,
    clippy::useless_transmute,
    clippy::verbose_file_reads,
    clippy::zero_sized_map_values,
    future_incompatible,
    nonstandard_style,
    rust_2018_idioms
)]
// END - Embark standard lints v6 for Rust 1.55+
// crate-specific exceptions:

//! Replaceable stand-ins for abort-style failure calls.
//!
//! Code that treats invalid state as unrecoverable would normally reach for
//! `std::process::abort` or a panic. Routing those calls through the
//! functions in this crate instead keeps the exact same behavior in normal
//! operation, the process is aborted after a diagnostic is written to stderr,
//! while allowing tests to swap the handler for each kind of failure and
//! observe which error was reported.
//!
//! # Categories
//!
//! There are five kinds of failure call, each with its own handler slot in a
//! process-wide registry, see [`Category`].
//!
//! * [`fatal_error`] always fails
//! * [`precondition`] fails only if its condition is `false`
//! * [`precondition_failure`] always fails
//! * [`assertion`] fails only if its condition is `false`, and only when debug
//!   assertions are enabled
//! * [`assertion_failure`] always fails, but only when debug assertions are
//!   enabled
//!
//! Every call has a `_message` variant which takes a string instead of an
//! error, the message is wrapped in an [`AnonymousError`].
//!
//! # Replacing handlers
//!
//! The `replace_*` functions install a new handler on top of the default one
//! and return a [`RestorationHandler`] which removes it again, either when
//! [`RestorationHandler::restore`] is called or when it is dropped.
//!
//! Calls that never return, such as [`fatal_error`], can't actually return
//! to their caller if a replacement handler returns. Instead the calling
//! thread is unwound with a [`Halted`] payload, which the
//! `error-expectations` crate catches on its worker threads.
//!
//! A thread whose failures are no longer being observed can be quarantined
//! with [`quarantine_on`], after which its failure calls halt it without
//! reaching any handler, including the default one.
//!
//! The registry is shared by the entire process, tests that replace handlers
//! must not run concurrently with each other.

mod anonymous;
mod assertion;
mod fatal;
mod precondition;
mod quarantine;
mod registry;

pub use anonymous::AnonymousError;
pub use assertion::{
    assertion, assertion_failure, assertion_failure_message, assertion_message,
};
pub use fatal::{fatal_error, fatal_error_message};
pub use precondition::{
    precondition, precondition_failure, precondition_failure_message, precondition_message,
};
pub use quarantine::{is_quarantined, quarantine_on};
pub use registry::{
    ConditionalHandler, RestorationHandler, UnconditionalHandler, is_replaced, replace_assert,
    replace_assertion_failure, replace_precondition, replace_precondition_failure, restore,
    restore_assert, restore_assertion_failure, restore_precondition, restore_precondition_failure,
};

#[cfg(any(debug_assertions, feature = "replace-fatal"))]
pub use registry::{replace_fatal, restore_fatal};

use std::fmt;

/// The error type passed to every handler
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The location in the source of the failure call
pub type SourceLocation = &'static std::panic::Location<'static>;

/// The kinds of failure call that can be intercepted
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Category {
    /// [`fatal_error`], always fails
    Fatal,
    /// [`precondition`], fails if the condition is `false`
    Precondition,
    /// [`precondition_failure`], always fails
    PreconditionFailure,
    /// [`assertion`], fails if the condition is `false` in debug builds
    Assert,
    /// [`assertion_failure`], always fails in debug builds
    AssertionFailure,
}

impl Category {
    /// Every category, in registry order
    pub const ALL: [Self; 5] = [
        Self::Fatal,
        Self::Precondition,
        Self::PreconditionFailure,
        Self::Assert,
        Self::AssertionFailure,
    ];

    /// Whether the call checks a condition before failing
    #[inline]
    pub fn is_conditional(self) -> bool {
        matches!(self, Self::Precondition | Self::Assert)
    }

    /// The prefix of the diagnostic written before the process is aborted
    #[inline]
    pub fn label(self) -> &'static str {
        match self {
            Self::Fatal => "Fatal error",
            Self::Precondition => "Precondition failed",
            Self::PreconditionFailure => "Precondition failure",
            Self::Assert => "Assertion failed",
            Self::AssertionFailure => "Assertion failure",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Fatal => "fatal",
            Self::Precondition => "precondition",
            Self::PreconditionFailure => "precondition-failure",
            Self::Assert => "assert",
            Self::AssertionFailure => "assertion-failure",
        })
    }
}

/// The payload a thread is unwound with when a replaced handler returns from
/// a call that must not return.
///
/// This is raised with [`std::panic::resume_unwind`], so the panic hook is not
/// invoked, and can be told apart from a regular panic when caught with
/// [`std::panic::catch_unwind`].
///
/// Code that catches every unwind itself, eg. a thread pool that collects
/// panics from its jobs, will also catch this, and carry on past a call that
/// was meant to never return. Such code should re-raise payloads of this type
/// with [`std::panic::resume_unwind`].
#[derive(Debug)]
pub struct Halted {
    category: Category,
}

impl Halted {
    /// The category of the call that halted the thread
    #[inline]
    pub fn category(&self) -> Category {
        self.category
    }
}

/// Stops the current thread from continuing past a failure call by unwinding
/// it with a [`Halted`] payload.
///
/// Replacement handlers for conditional categories use this to emulate the
/// default behavior of never returning when the condition is violated.
///
/// A thread that is already unwinding, eg. because a destructor made a
/// failure call while the thread was being halted, can't be unwound a second
/// time without aborting the process, so it is parked forever instead.
pub fn halt(category: Category) -> ! {
    if std::thread::panicking() {
        log::warn!(
            "{category} failure on thread {:?} while it is already unwinding, parking it",
            std::thread::current().name()
        );
        loop {
            std::thread::park();
        }
    }

    log::trace!(
        "halting thread {:?} after {category} failure",
        std::thread::current().name()
    );
    std::panic::resume_unwind(Box::new(Halted { category }))
}

/// Writes the failure to stderr and aborts the process
#[cold]
pub(crate) fn abort_with(
    category: Category,
    error: &(dyn std::error::Error + Send + Sync + 'static),
    location: SourceLocation,
) -> ! {
    eprintln!(
        "{}: {error}, file {}, line {}",
        category.label(),
        location.file(),
        location.line()
    );
    std::process::abort()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn categories() {
        let conditional: Vec<_> = Category::ALL
            .into_iter()
            .filter(|c| c.is_conditional())
            .collect();
        assert_eq!(conditional, [Category::Precondition, Category::Assert]);

        assert_eq!(Category::PreconditionFailure.to_string(), "precondition-failure");
        assert_eq!(Category::Fatal.label(), "Fatal error");
    }

    #[test]
    fn halt_unwinds_with_payload() {
        let payload = std::panic::catch_unwind(|| {
            halt(Category::Assert);
        })
        .expect_err("halt must not return");

        let halted = payload
            .downcast_ref::<Halted>()
            .expect("payload should be Halted");
        assert_eq!(halted.category(), Category::Assert);
    }

    #[test]
    fn halt_while_unwinding_parks() {
        struct HaltOnDrop;

        impl Drop for HaltOnDrop {
            fn drop(&mut self) {
                halt(Category::PreconditionFailure);
            }
        }

        let worker = std::thread::spawn(|| {
            let _guard = HaltOnDrop;
            halt(Category::Fatal);
        });

        // Unwinding a second time would have aborted the whole process
        std::thread::sleep(std::time::Duration::from_millis(100));
        assert!(!worker.is_finished());
    }
}
