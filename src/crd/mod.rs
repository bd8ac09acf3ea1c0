mod autonomous_database;
mod container_database;
mod managed;
mod pluggable_database;

pub use autonomous_database::*;
pub use container_database::*;
pub use managed::*;
pub use pluggable_database::*;
