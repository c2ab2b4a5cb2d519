//! Logbook data model: validated identifier types.

pub mod types;
