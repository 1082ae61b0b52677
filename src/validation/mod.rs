//! Validation of uploaded variant data: target sequences, MAVE-HGVS variant
//! strings, and the tabular score/count datasets that carry them.

pub mod dataframe;
pub mod hgvs;
pub mod target;
