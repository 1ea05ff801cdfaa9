pub mod overlap;
pub mod pam_filter;

pub use overlap::{OverlapResolver, Resolution};
pub use pam_filter::{filter_pam, pam_matches, PamWindow};
