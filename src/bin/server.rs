//! Patchlog server binary.
//! Run with: cargo run --bin patchlog-server

use std::process::ExitCode;

use patchlog::startup;

fn main() -> ExitCode {
    startup::run()
}
