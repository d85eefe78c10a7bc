//! License plate localization, recognition and access decisions for still
//! images, video files and live cameras.

pub mod authorization;
pub mod detection;
pub mod pipeline;
pub mod recognition;
pub mod shared;
pub mod video;
