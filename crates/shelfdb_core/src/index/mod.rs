//! Secondary indexes.
//!
//! An index maps a key derived from each record (through its key path) to
//! the primary keys of the records that produce it. Entries are maintained
//! by the owning store on every write, in the same transaction; indexes
//! never accept writes of their own.

mod data;
mod handle;

pub(crate) use data::{IndexData, IndexMeta};
pub use data::IndexParams;
pub use handle::Index;
