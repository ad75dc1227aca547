//! Token models: the persisted token triple and the redacting secret wrapper.

pub mod token;

pub use token::{record::*, secret::*};
