//! Job definitions.

#![allow(missing_docs)]

mod av_scan;

pub use av_scan::AvScanJob;
