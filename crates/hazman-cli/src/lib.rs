//! Command-line surface of the `hazman` binary.

pub mod cli_args;
