mod common;
mod node_lifecycle;
mod watch_extend;
