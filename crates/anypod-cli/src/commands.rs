//! Subcommand implementations

pub mod debug_ytdlp;
pub mod serve;
