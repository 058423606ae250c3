//! Collection of general or specifc algorithms which may be useful
//! to any kind of odometry or pose tracking implementations

pub mod brief;
pub mod pca;
pub mod rigid;
pub mod transformation;
