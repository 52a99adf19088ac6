//! Shared utility functions for debate-forge.

pub mod json_extraction;

pub use json_extraction::{
    extract_json_object, find_matching_brace, parse_json_response, JsonExtractionError,
};
