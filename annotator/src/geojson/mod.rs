//! GeoJSON input parsing and output writing

pub mod parser;
pub mod writer;

pub use parser::InputParser;
pub use writer::{OutputPaths, write_outputs};
