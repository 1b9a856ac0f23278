//! Article text extraction and prompt slicing

pub mod slicer;
pub mod text;

pub use slicer::{is_heading, primer_slice, structure_slice};
pub use text::TextExtractor;
