//! # cfgagent-renderer
//!
//! Render boundary for configuration manifests: a [`Renderer`] turns a
//! template plus merged metadata into file contents, and [`RenderContext`]
//! builds that merged metadata.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use cfgagent_core::{InstanceId, Manifest, Metadata};
//! use cfgagent_renderer::{RenderContext, Renderer, TeraRenderer};
//!
//! fn render_one(manifest: &Manifest, authority: &Metadata, local: &Metadata, auto: &Metadata) {
//!     let ctx = RenderContext::build(&InstanceId::from("zone"), authority, local, auto);
//!     if let Ok(contents) = TeraRenderer::new().render(&manifest.template, ctx.metadata()) {
//!         println!("{}: {} bytes", manifest.path.display(), contents.len());
//!     }
//! }
//! ```

pub mod context;
pub mod engine;
pub mod error;

pub use context::{RenderContext, AUTO_KEY};
pub use engine::{Renderer, TeraRenderer};
pub use error::RenderError;
