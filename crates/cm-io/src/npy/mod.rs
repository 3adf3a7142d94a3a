pub mod header;
pub mod reader;
pub mod writer;

pub use header::NpyHeader;
pub use reader::{load_matrix, NpyFile};
pub use writer::{npy_path, save_matrix, write_npy_blocks};
