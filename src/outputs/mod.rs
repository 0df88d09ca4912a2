//! Output generation for ranked results.
//!
//! - [`json`]: Writes the [`MostReadResponse`](crate::wiki::MostReadResponse)
//!   envelope to a file or stdout

pub mod json;
