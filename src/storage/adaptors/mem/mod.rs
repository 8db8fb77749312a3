mod mem_store;
mod ttl_index;

pub use mem_store::*;
