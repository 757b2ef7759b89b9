pub mod animation;
pub mod meter;
