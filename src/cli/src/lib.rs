//! Stratum CLI library.

pub mod commands;
