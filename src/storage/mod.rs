pub mod json_utils;

pub use json_utils::*;
