//! Integration tests for the agents plane CLI
//!
//! These tests spawn the actual binary and check end-to-end behavior that
//! does not need a cloud account: argument parsing, validation and exit codes.

mod cli_tests;
