//! Shell integration

pub mod history;

pub use history::{last_az_command_in, CurrentShellHistory, HistoryReader, ShellHistory, ShellKind};
