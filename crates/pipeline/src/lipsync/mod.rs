//! Viseme extraction adapters

mod rhubarb;

pub use rhubarb::{parse_cues, RhubarbExtractor};
