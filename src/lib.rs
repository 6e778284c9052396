//! # mdprint
//!
//! A CLI utility that prints Markdown and HTML documents by rendering them
//! to a Letter-sized PDF and handing the result to the OS print subsystem.
//!
//! ## Current Features
//!
//! - Markdown-to-PDF conversion with a print-friendly stylesheet
//! - Page-range selection (`--pages "1-3,5,7-9"`)
//! - Layered print dispatch with per-platform fallbacks
//! - Manual-print HTML fallback when no browser is available for rendering
//!
//! ## Usage
//!
//! ```bash
//! mdprint notes.md --printer "Office" --pages "1-3,7"
//! ```

pub mod capabilities;
pub mod dispatch;
pub mod extract;
pub mod pages;
pub mod render;

pub use capabilities::Capabilities;
pub use dispatch::{DispatchError, Dispatcher, Mechanism, Platform, PrintJob};
pub use extract::ExtractError;
pub use pages::{parse_page_spec, PageInterval, PageSpecError};
pub use render::{PageGeometry, RenderError, Renderer};
