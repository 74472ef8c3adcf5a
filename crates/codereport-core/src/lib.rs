pub mod config_manager;
pub mod error;
pub mod graph;
pub mod source;

pub use config_manager::*;
pub use error::*;
pub use graph::*;
pub use source::*;
