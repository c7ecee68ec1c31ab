//! Unit tests for the agents plane CLI
//!
//! These tests use scripted collaborators and run fast without spawning
//! the real cloud or directory CLIs.

mod architecture;
mod directory_adapter;
mod gcloud_provider;
mod mocks;
mod state_store;
