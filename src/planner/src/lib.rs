//! Stratum Planner - build planning for layered image fleets.
//!
//! This crate implements the planning pipeline: layer scanning and
//! dependency resolution, image resolution, the popularity-weighted global
//! layer order, intermediate-image synthesis, build-order computation,
//! artifact emission, and the post-build layer-merge pass.

pub mod alias;
pub mod calver;
pub mod config;
pub mod emit;
pub mod engine;
pub mod image;
pub mod layer;
pub mod merge;
pub mod plan;
pub mod scaffold;

// Re-export common types
pub use config::{Config, ImageSettings, PkgFamily};
pub use emit::Generator;
pub use image::{resolve_all_images, resolve_image_order, ResolvedImage};
pub use layer::{scan_layers, Layer};
pub use merge::{merge_image, plan_merge, MergeStep};
pub use plan::{absolute_layer_sequence, compute_intermediates, global_layer_order};

/// Stratum Planner version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
