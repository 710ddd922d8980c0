//! Fleet-wide planning: the global layer order and intermediate synthesis.

mod intermediates;
mod order;

pub use intermediates::compute_intermediates;
pub use order::{absolute_layer_sequence, global_layer_order};
