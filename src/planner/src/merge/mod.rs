//! Post-build layer merging.
//!
//! Compacts a built image by concatenating runs of adjacent layers whose
//! combined size stays under a cap, then realigning the image history.

mod execute;
mod oci;
mod plan;
mod tar;

pub use execute::{merge_image, realign_history, MergeOutcome};
pub use oci::{
    Descriptor, HistoryRecord, ImageConfigFile, ImageIndex, ImageLayout, ImageManifest, RootFs,
};
pub use plan::{plan_merge, MergeStep};
pub use tar::{merge_layer_streams, BlobLayer, LayerReader, MemoryLayer};
