pub mod config;
pub mod error;
pub mod glob;
pub mod node;
pub mod path;
pub mod protocol;
pub mod search;
pub mod server;
pub mod snapshot;
pub mod transport;
pub mod vfs;

pub use error::{Outcome, VfsError};
pub use node::{Node, NodeId, NodeKind};
pub use path::{VfsLimits, VfsPath};
pub use vfs::FileSystem;
