pub mod distance;
pub mod flat;
pub mod hnsw;
pub mod index;
pub mod live;
pub mod snapshot;

pub use flat::FlatIndex;
pub use hnsw::{HnswGraph, HnswParams};
pub use index::{HnswIndex, IndexConfig, IndexMetadata};
pub use live::LiveIndex;
pub use snapshot::SnapshotStore;
