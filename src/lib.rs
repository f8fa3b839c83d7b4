//! toolgate: run external reverse-engineering and LLM command-line tools
//! under a managed process runner and expose them over a JSON API.

pub mod availability;
pub mod cancel;
pub mod classify;
pub mod cli;
pub mod config;
pub mod error;
pub mod extract;
pub mod filetree;
pub mod gate;
pub mod hints;
pub mod http;
pub mod jobs;
pub mod logging;
pub mod prompt;
pub mod resolve;
pub mod subprocess;
pub mod tools;
