//! Purpose: Library crate behind the `dataflow-pqt` CLI and its tests.
//! Exports: `core` (decode and convert stages, errors), `api` (stable re-exports).
//! Role: Decode exported dataflow definitions and repackage them as template bundles.
//! Invariants: Stage drivers return report structs; they never print.
//! Invariants: Core modules prefer explicit inputs/outputs over hidden state.
pub mod api;
pub mod core;
