mod etcd;
mod mem;

pub use etcd::*;
pub use mem::*;
