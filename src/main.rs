use anyhow::{Context, Result};
use clap::Parser;
use jar_indexer::cli::{Cli, Commands};
use jar_indexer::config::{resolve_auth, resolve_storage_root};
use jar_indexer::materialize::SourceMaterializer;
use jar_indexer::mcp;
use jar_indexer::storage::StorageLayout;
use jar_indexer::tools::{
    GetFileRequest, IndexArtifactRequest, ListArtifactsRequest, ListFolderTreeRequest, RegisterSourceRequest,
    SearchCachedArtifactRequest, SearchFileContentRequest, SearchFileNamesRequest, ToolService,
};
use serde::Serialize;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();

    let root = resolve_storage_root(&cli)?;
    let materializer = SourceMaterializer::with_cli(StorageLayout::new(&root)).with_auth(resolve_auth(&cli));
    let service = ToolService::new(materializer);

    match cli.command.clone().unwrap_or(Commands::Serve) {
        Commands::Serve => {
            info!(root = %root.display(), "serving MCP on stdio");
            mcp::run(&service).context("MCP server stopped")?;
        }
        Commands::Register {
            group_id,
            artifact_id,
            version,
            source_uri,
            git_ref,
        } => print_json(&service.register_source(&RegisterSourceRequest {
            group_id,
            artifact_id,
            version,
            source_uri,
            auto_index: true,
            git_ref,
        }))?,
        Commands::Index {
            group_id,
            artifact_id,
            version,
        } => print_json(&service.index_artifact(&IndexArtifactRequest {
            group_id,
            artifact_id,
            version,
        }))?,
        Commands::List {
            page,
            page_size,
            group,
            artifact,
            version_filter,
            status,
        } => print_json(&service.list_artifacts(&ListArtifactsRequest {
            page,
            page_size,
            group_filter: group,
            artifact_filter: artifact,
            version_filter,
            status_filter: status,
        }))?,
        Commands::Tree {
            group_id,
            artifact_id,
            version,
            path,
            files,
            depth,
        } => print_json(&service.list_folder_tree(&ListFolderTreeRequest {
            group_id,
            artifact_id,
            version,
            path,
            include_files: files,
            max_depth: depth,
        }))?,
        Commands::Get {
            group_id,
            artifact_id,
            version,
            file_path,
            start,
            end,
        } => print_json(&service.get_file(&GetFileRequest {
            group_id,
            artifact_id,
            version,
            file_path,
            start_line: start,
            end_line: end,
        }))?,
        Commands::FindFiles {
            group_id,
            artifact_id,
            version,
            pattern,
            regex,
            start_path,
            depth,
        } => print_json(&service.search_file_names(&SearchFileNamesRequest {
            group_id,
            artifact_id,
            version,
            pattern,
            pattern_type: pattern_kind(regex, "glob"),
            start_path,
            max_depth: depth,
        }))?,
        Commands::Grep {
            group_id,
            artifact_id,
            version,
            query,
            regex,
            start_path,
            depth,
            before,
            after,
            max_results,
        } => print_json(&service.search_file_content(&SearchFileContentRequest {
            group_id,
            artifact_id,
            version,
            query,
            query_type: pattern_kind(regex, "string"),
            start_path,
            max_depth: depth,
            context_before: before,
            context_after: after,
            max_results,
        }))?,
        Commands::Cached {
            group_id,
            artifact_id,
            version_filter,
            cache,
        } => print_json(&service.search_cached_artifact(&SearchCachedArtifactRequest {
            group_id,
            artifact_id,
            version_filter,
            cache,
        }))?,
    }

    Ok(())
}

/// Logs go to stderr; stdout carries JSON only.
fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn pattern_kind(regex: bool, literal: &str) -> String {
    (if regex { "regex" } else { literal }).to_string()
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_subcommand_means_serve() {
        let cli = Cli::try_parse_from(["jar-indexer", "--home", "/tmp/store"]).unwrap();
        assert!(cli.command.is_none());
        assert_eq!(cli.home.as_deref(), Some(std::path::Path::new("/tmp/store")));
    }

    #[test]
    fn grep_flags_parse() {
        let cli = Cli::try_parse_from([
            "jar-indexer",
            "grep",
            "org.example",
            "lib",
            "1.0",
            "TODO",
            "--regex",
            "-B",
            "0",
            "--home",
            "/tmp/store",
        ])
        .unwrap();
        match cli.command {
            Some(Commands::Grep { regex, before, after, .. }) => {
                assert!(regex);
                assert_eq!((before, after), (0, 2));
            }
            other => panic!("unexpected command: {other:?}"),
        }
        assert_eq!(pattern_kind(true, "string"), "regex");
        assert_eq!(pattern_kind(false, "string"), "string");
    }
}
