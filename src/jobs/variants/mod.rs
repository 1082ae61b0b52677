//! Variant processing jobs: creation from validated data and VRS mapping.

pub mod creation;
pub mod mapping;
