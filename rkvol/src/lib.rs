//! # rkvol — Docker volume plugins built on `libmountvol`
//!
//! One binary serves one filesystem variant per process, selected by
//! subcommand. The variants only decide how a volume's options become mount
//! helper arguments; the lifecycle, persistence and protocol handling live in
//! `libmountvol`.

pub mod config;
pub mod drivers;
