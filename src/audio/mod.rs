pub mod analyzer;
pub mod decode;
pub mod output;
pub mod resample;
pub mod tap;
