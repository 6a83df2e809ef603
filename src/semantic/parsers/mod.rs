//! Output parsers for the supported download tools

pub mod ytdlp;

pub use ytdlp::{YtDlpParser, RULES};
