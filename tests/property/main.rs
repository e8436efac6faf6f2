//! Property-based soundness tests for the merger.
//!
//! Run with: `cargo test --test property`

mod merge_soundness;
