//! Keyframe tracking, ground truth and the computation driving them

pub mod converter;
pub mod features;
pub mod frame;
pub mod markers;
pub mod notifier;
pub mod options;
pub mod system;
pub mod tracker;
pub mod trajectory;
pub mod worker;
