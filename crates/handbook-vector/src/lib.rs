pub mod index;
pub mod reader;
pub mod schema;
pub mod table;
pub mod writer;

pub use index::{squared_l2, VectorIndex, FORMAT_VERSION};
