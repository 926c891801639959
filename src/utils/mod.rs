//! Shared utility functions for diagramforge.

pub mod response;

pub use response::{extract_json_object, strip_code_fences, strip_to_svg};
