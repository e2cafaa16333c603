//! Shared analysis utilities for the checkpoints procedural macros
//!
//! This crate provides the compile-time half of the identity system used
//! by `checkpoints-macros`: canonical body strings (whitespace, comments
//! and doc attributes never reach the fingerprint), the free-symbol scan
//! that records which names a function body reads from outside its own
//! scope, and attribute parsing shared across the macros.

mod attrs;
mod body;
mod symbols;

pub use attrs::{
    parse_capture_attrs, parse_checkpoint_attrs, CaptureAttrs, CheckpointAttrs,
};
pub use body::{fn_body_string, is_framework_attr, strip_doc_tokens};
pub use symbols::free_symbols;
