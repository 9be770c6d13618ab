pub mod claim_loader;
pub mod marker_refresher;
