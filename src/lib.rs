//! Workspace root package. The Holdfast crates live under `crates/`.
