//! cmkbase: host/service rule engine and Nagios configuration compiler.
//!
//! Reads a declarative monitoring configuration (hosts with tags, rule
//! tables, check declarations), evaluates the rules per host and service,
//! and produces the Nagios object configuration and precompiled per-host
//! check programs. Service discovery writes autochecks that feed back into
//! the check tables.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod literal;
pub mod rules;

pub mod catalog;
pub mod config;
pub mod hosts;

pub mod autochecks;
pub mod engine;

pub mod nagios;
pub mod precompile;

pub mod discovery;

pub mod activation;
pub mod automation;
pub mod housekeeping;
pub mod parents;
pub mod report;

pub mod logging;
