use clap::Parser;

use crate::path::VfsLimits;

#[derive(Parser, Debug)]
#[command(
    name = "fisher-vfs",
    about = "In-memory filesystem engine over JSON-RPC 2.0 / NDJSON stdio"
)]
pub struct CliArgs {
    /// Log level (trace, debug, info, warn, error). `RUST_LOG` takes precedence.
    #[arg(long, default_value = "info", env = "FISHER_VFS_LOG_LEVEL")]
    pub log_level: String,

    /// Largest file contents accepted, in bytes
    #[arg(long, env = "FISHER_VFS_MAX_FILE_SIZE")]
    pub max_file_size: Option<u64>,

    /// Combined size of all file contents, in bytes
    #[arg(long, env = "FISHER_VFS_MAX_TOTAL_SIZE")]
    pub max_total_size: Option<u64>,

    /// Maximum number of nodes, root included
    #[arg(long, env = "FISHER_VFS_MAX_NODE_COUNT")]
    pub max_node_count: Option<usize>,

    /// Maximum number of components in a path
    #[arg(long, env = "FISHER_VFS_MAX_PATH_DEPTH")]
    pub max_path_depth: Option<usize>,

    /// Maximum length of a single name, in bytes
    #[arg(long, env = "FISHER_VFS_MAX_NAME_LENGTH")]
    pub max_name_length: Option<usize>,
}

impl CliArgs {
    /// Limits to start with; anything not given falls back to the defaults.
    pub fn limits(&self) -> VfsLimits {
        let defaults = VfsLimits::default();
        VfsLimits {
            max_file_size: self.max_file_size.unwrap_or(defaults.max_file_size),
            max_total_size: self.max_total_size.unwrap_or(defaults.max_total_size),
            max_path_depth: self.max_path_depth.unwrap_or(defaults.max_path_depth),
            max_name_length: self.max_name_length.unwrap_or(defaults.max_name_length),
            max_node_count: self.max_node_count.unwrap_or(defaults.max_node_count),
        }
    }
}
