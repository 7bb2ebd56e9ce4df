//! Object stores.

mod data;
mod handle;

pub(crate) use data::{StoreData, StoreMeta};
pub use data::StoreParams;
pub use handle::ObjectStore;
