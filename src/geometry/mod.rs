pub mod sp_grid;

pub use sp_grid::{
    BlockKey, GridBlock, SparseBlockGrid, block_color, block_coord, block_key, block_origin,
    in_block_coord, in_block_index, morton_decode, morton_encode,
};
