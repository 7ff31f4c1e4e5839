//! Job workers.

mod av_scan;

pub use av_scan::{AvScanContext, ScanJobResult, av_scan_worker, handle_scan_job};
