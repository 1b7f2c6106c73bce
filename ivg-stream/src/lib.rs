//! # ivg-stream: IVG stream tool
//!
//! Command-line front end for `ivg-core`. `serve` broadcasts a moving
//! test pattern to TCP subscribers and/or a serial line; `view`
//! connects to a stream and logs what it decodes.

pub mod config;
pub mod logging;
pub mod pattern;
