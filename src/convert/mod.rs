//! One-shot asset converters driving external tools.
//!
//! - [`png`]: quantize/resize with `convert`, then `optipng`
//! - [`drawio`]: `pdf2svg` plus background removal

pub mod drawio;
pub mod png;
