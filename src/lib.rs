//! Rule-based bid adjustment for ads accounts.
//!
//! A pass walks a set of campaigns over several lookback windows, compares
//! each entity's performance with a target formula and nudges its bid or
//! modifier one significant step at a time.

pub mod logger;
pub mod errors;
pub mod utils;

pub mod types;
pub mod windows;
pub mod config;
pub mod adjustment_core;
pub mod target_formulas;
pub mod decision;
pub mod collaborators;
pub mod processing;
pub mod orchestrator;
pub mod product_groups;

pub mod in_memory_account;
pub mod simulation;
pub mod charts;
