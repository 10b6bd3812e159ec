use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Clone, Parser)]
#[command(name = "jar-indexer")]
#[command(about = "Register, materialize and browse Java artifact sources")]
pub struct Cli {
    /// Runs the MCP server when omitted.
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Storage root (default: $JAR_INDEXER_HOME or ~/.jar-indexer)
    #[arg(long, value_name = "DIR", global = true)]
    pub home: Option<PathBuf>,

    /// Private key used for SSH git remotes
    #[arg(long, value_name = "FILE", global = true)]
    pub ssh_key: Option<PathBuf>,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Commands {
    /// MCP server on stdin/stdout
    Serve,
    Register {
        group_id: String,
        artifact_id: String,
        version: String,
        source_uri: String,

        #[arg(long, value_name = "REF")]
        git_ref: Option<String>,
    },
    Index {
        group_id: String,
        artifact_id: String,
        version: String,
    },
    List {
        #[arg(long)]
        page: Option<usize>,

        #[arg(long, value_name = "N")]
        page_size: Option<usize>,

        #[arg(long, value_name = "PREFIX")]
        group: Option<String>,

        #[arg(long, value_name = "PREFIX")]
        artifact: Option<String>,

        #[arg(long = "versions", value_name = "CONSTRAINT")]
        version_filter: Option<String>,

        #[arg(long, value_name = "LABELS")]
        status: Option<String>,
    },
    Tree {
        group_id: String,
        artifact_id: String,
        version: String,

        #[arg(long, default_value = "")]
        path: String,

        #[arg(long)]
        files: bool,

        #[arg(long, default_value_t = 3)]
        depth: usize,
    },
    Get {
        group_id: String,
        artifact_id: String,
        version: String,
        file_path: String,

        #[arg(long, value_name = "LINE")]
        start: Option<usize>,

        #[arg(long, value_name = "LINE")]
        end: Option<usize>,
    },
    FindFiles {
        group_id: String,
        artifact_id: String,
        version: String,
        pattern: String,

        /// Treat the pattern as a regex instead of a glob
        #[arg(long)]
        regex: bool,

        #[arg(long, default_value = "")]
        start_path: String,

        #[arg(long, default_value_t = 10)]
        depth: usize,
    },
    Grep {
        group_id: String,
        artifact_id: String,
        version: String,
        query: String,

        #[arg(long)]
        regex: bool,

        #[arg(long, default_value = "")]
        start_path: String,

        #[arg(long, default_value_t = 10)]
        depth: usize,

        #[arg(short = 'B', long, default_value_t = 2)]
        before: usize,

        #[arg(short = 'A', long, default_value_t = 2)]
        after: usize,

        #[arg(long, default_value_t = 100)]
        max_results: usize,
    },
    /// Look for -sources.jar files in the local Maven/Gradle caches
    Cached {
        group_id: String,
        artifact_id: String,

        #[arg(long = "versions", value_name = "CONSTRAINT")]
        version_filter: Option<String>,

        #[arg(long, default_value = "maven,gradle")]
        cache: String,
    },
}
