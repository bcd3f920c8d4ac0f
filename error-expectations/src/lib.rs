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

//! Test helpers that check which failure a piece of code reports through the
//! calls in [`error_assertions`], without aborting the test process.
//!
//! Every helper follows the same steps:
//!
//! 1. Replace the handler of every failure call with one that records the
//!    failure and stops the calling thread
//! 2. Run the test block on a new, isolated, worker thread
//! 3. Wait, up to a timeout, for a failure to be reported, or for the block to
//!    finish
//! 4. Cancel the worker thread and restore the default handlers, regardless of
//!    the outcome
//!
//! ```
//! use error_assertions::{AnonymousError, fatal_error_message, precondition};
//! use error_expectations::{expect_any_failure, expect_failure, expect_no_failure};
//!
//! expect_failure(AnonymousError::new("boom"), || fatal_error_message("boom"));
//!
//! let failure = expect_any_failure(|| precondition(false, AnonymousError::Blank));
//! assert_eq!(failure.category, error_assertions::Category::Precondition);
//!
//! expect_no_failure(|| precondition(true, AnonymousError::Blank));
//! ```
//!
//! The handlers are process wide, so tests using these helpers must not run
//! concurrently with each other, or with anything else that calls the
//! intercepted functions.

mod error;
mod expect;
mod expectation;
mod thread;

pub use error::ExpectError;
pub use error_assertions::{AnonymousError, Category};
pub use expect::{DEFAULT_TEARDOWN_TIMEOUT, DEFAULT_TIMEOUT, Expect, TIMEOUT_ENV};
pub use expectation::CapturedFailure;
pub use thread::is_cancelled;

/// Converts the outcome into a test failure at the caller's location
#[track_caller]
fn report<T>(result: Result<T, ExpectError>) -> T {
    match result {
        Ok(value) => value,
        Err(err) => panic!("{err}"),
    }
}

/// Runs `testcase` and expects it to report a failure with an error equal to
/// `expected`, the test fails otherwise.
///
/// See [`Expect::failure`] for a version with a custom timeout that returns
/// the outcome rather than failing the test.
#[track_caller]
pub fn expect_failure<E, F>(expected: E, testcase: F)
where
    E: std::error::Error + PartialEq + Send + Sync + 'static,
    F: FnOnce() + Send + 'static,
{
    report(Expect::default().failure(expected, testcase));
}

/// Runs `testcase` and expects it to report a failure with the message, the
/// test fails otherwise.
///
/// An empty message expects [`AnonymousError::Blank`].
#[track_caller]
pub fn expect_failure_message<F>(message: impl Into<String>, testcase: F)
where
    F: FnOnce() + Send + 'static,
{
    report(Expect::default().failure_message(message, testcase));
}

/// Runs `testcase` and expects it to report any failure, which is returned,
/// the test fails otherwise.
#[track_caller]
pub fn expect_any_failure<F>(testcase: F) -> CapturedFailure
where
    F: FnOnce() + Send + 'static,
{
    report(Expect::default().any_failure(testcase))
}

/// Runs `testcase` and expects it to run to completion without reporting any
/// failure, the test fails otherwise.
#[track_caller]
pub fn expect_no_failure<F>(testcase: F)
where
    F: FnOnce() + Send + 'static,
{
    report(Expect::default().no_failure(testcase));
}
