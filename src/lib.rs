// src/lib.rs
//
// Library-first structure so every component - decoders, ring, registry,
// processor - is independently unit- and integration-testable, with
// `main.rs` reduced to argument parsing and thread supervision.

pub mod cobs;
pub mod context;
pub mod error;
pub mod logging;
pub mod options;
pub mod processor;
pub mod registry;
pub mod reporter;
pub mod ring;
pub mod source;
pub mod supervisor;
pub mod tpiu;

pub use supervisor::run;
