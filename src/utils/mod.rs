pub mod path;

pub use path::*;

#[cfg(test)]
mod utils_test;
