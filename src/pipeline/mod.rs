//! Pipeline stages for receipt extraction.
//!
//! Each submodule implements exactly one transformation step, so each is
//! independently testable and the renderer and vision client can be swapped
//! behind their traits without touching other stages.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ render ──▶ optimize ──▶ client ──▶ normalize
//! (path)    (pdfium)   (jpeg/grey)  (VLM)      (records)
//! ```
//!
//! 1. [`input`]   : validate the path and the `%PDF` magic bytes
//! 2. [`render`]  : rasterise the first pages; runs in `spawn_blocking`
//!    because pdfium is not async-safe
//! 3. [`optimize`]: downscale, greyscale and JPEG-encode each page
//! 4. [`client`]  : one VLM call per file and JSON recovery from the answer;
//!    the only stage with network I/O
//! 5. [`normalize`]: single-line fields and defaults; never fails

pub mod client;
pub mod input;
pub mod normalize;
pub mod optimize;
pub mod render;
