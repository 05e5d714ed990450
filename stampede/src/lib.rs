//! The stampede load harness.
//!
//! This library supports the stampede binary found elsewhere in this
//! project: deterministic dataset synthesis feeding bounded-concurrency
//! insert fleets, a duration-bounded read mix, and live throughput
//! reporting, all against a sharded relational store.

#![deny(clippy::all)]
#![deny(clippy::cargo)]
#![deny(clippy::pedantic)]
#![deny(clippy::print_stdout)]
#![deny(clippy::print_stderr)]
#![deny(clippy::dbg_macro)]
#![deny(unused_extern_crates)]
#![deny(unused_allocation)]
#![deny(unused_assignments)]
#![deny(unused_comparisons)]
#![deny(unreachable_pub)]
#![deny(missing_docs)]
#![deny(missing_copy_implementations)]
#![deny(missing_debug_implementations)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::multiple_crate_versions)]

pub mod config;
pub mod coordinator;
pub mod divide;
pub mod ramp;
pub mod report;
pub mod sql;
pub mod worker;
