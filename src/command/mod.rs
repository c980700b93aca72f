//! Azure CLI command handling
//!
//! Parsing of raw `az ...` text into structured commands.

pub mod parser;

pub use parser::{extract_az_command, parse, Command};
