//! On-disk formats: length-prefixed record files for intermediate data
//! and tab-separated text for result files.

pub mod lines;
pub mod writelog;
