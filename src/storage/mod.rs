//! Store abstraction, backend registry and bundled backends.

mod registry;
mod store;

pub mod adaptors;


#[doc(hidden)]
pub use adaptors::*;
#[doc(hidden)]
pub use registry::*;
#[doc(hidden)]
pub use store::*;
