//! # Block Module
//!
//! Block ids, block faces and the material catalog that describes them.

pub mod block_side;
pub mod block_type;
pub mod catalog;

pub use block_side::BlockSide;
pub use block_type::BlockDefinition;
pub use catalog::{BlockCatalog, CatalogError};

/// Identifier of a block type as stored in a chunk.
pub type BlockId = u16;

/// The empty block.
pub const AIR: BlockId = 0;
