#![forbid(unsafe_code)]

pub mod cli;
pub mod config;
pub mod error;
pub mod extract;
pub mod flatten;
pub mod formats;
pub mod gemini;
pub mod logging;
pub mod pipeline;
pub mod rewrite;
pub mod search;
pub mod sheet;
pub mod sheet_link;
