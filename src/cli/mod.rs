use std::io::IsTerminal as _;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use serde::Serialize;

use crate::models::{
    DumpParams, IngestSummary, PositionParams, ReferenceParams, RenameParams, RenamePlan,
    SrcLocation, TextPosition, QUERY_RESULT_VERSION,
};
use crate::server;
use crate::session::IndexSession;

mod args;
mod config;
mod http_backend;

pub use args::{
    Cli, Commands, IndexArgs, OutputFormat, PositionArgs, ReferencesArgs, RenameArgs, ServeArgs,
    SourceArgs,
};

use config::{apply_source_defaults, effective_server_url, load_cli_config, CliConfig};
use http_backend::HttpQueryBackend;

const DEFAULT_SERVE_ADDR: &str = "127.0.0.1:7878";

/// Entry point for the CLI binary.
pub fn run() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if cli.schema_version {
        println!("Query result JSON schema version: {}", QUERY_RESULT_VERSION);
        return Ok(());
    }

    let cli_config = load_cli_config()?;

    match cli.command {
        Some(Commands::Index(mut index_args)) => {
            if let Some(ref config) = cli_config {
                apply_source_defaults(config, &mut index_args.source);
            }

            let server_url = effective_server_url(
                index_args.server.as_deref(),
                index_args.no_server,
                cli_config.as_ref(),
            );

            let summary: IngestSummary = if let Some(url) = server_url {
                let backend = HttpQueryBackend::new(url)?;
                let summary = backend.reindex()?;
                if let Some(dump) = &index_args.dump {
                    backend.dump(DumpParams { path: dump.clone() })?;
                }
                summary
            } else {
                let session = local_session(&index_args.source)?;
                let summary = session.reindex()?;
                if let Some(dump) = &index_args.dump {
                    session.dump(dump)?;
                }
                summary
            };

            match index_args.format {
                OutputFormat::Text => {
                    println!(
                        "Indexed {} files, {} symbols, {} anchors, {} references",
                        summary.files, summary.symbols, summary.anchors, summary.refs
                    );
                    if summary.dropped_records + summary.dropped_edges > 0 {
                        println!(
                            "Dropped {} records and {} edges",
                            summary.dropped_records, summary.dropped_edges
                        );
                    }
                    if let Some(updated_at) = &summary.updated_at {
                        println!("Updated {updated_at}");
                    }
                    Ok(())
                }
                OutputFormat::Json => print_json(&summary),
            }
        }
        Some(Commands::Definition(mut query_args)) => {
            if let Some(ref config) = cli_config {
                apply_source_defaults(config, &mut query_args.source);
            }

            let params = position_params(&query_args);
            let location = match query_backend(&query_args, cli_config.as_ref())? {
                Some(backend) => backend.definition(params)?,
                None => {
                    let session = local_session(&query_args.source)?;
                    session.definition(&query_args.file, position_of(&query_args))?
                }
            };

            match query_args.format {
                OutputFormat::Text => {
                    match &location {
                        Some(location) => println!("{}", format_location(location)),
                        None => println!("no definition found"),
                    }
                    Ok(())
                }
                OutputFormat::Json => print_json(&location),
            }
        }
        Some(Commands::References(mut ref_args)) => {
            if let Some(ref config) = cli_config {
                apply_source_defaults(config, &mut ref_args.position.source);
            }

            let query_args = &ref_args.position;
            let params = ReferenceParams {
                path: query_args.file.clone(),
                position: position_of(query_args),
                include_declaration: ref_args.include_declaration,
            };
            let locations = match query_backend(query_args, cli_config.as_ref())? {
                Some(backend) => backend.references(params)?,
                None => {
                    let session = local_session(&query_args.source)?;
                    session.references(
                        &query_args.file,
                        position_of(query_args),
                        ref_args.include_declaration,
                    )?
                }
            };

            match query_args.format {
                OutputFormat::Text => {
                    for location in &locations {
                        println!("{}", format_location(location));
                    }
                    Ok(())
                }
                OutputFormat::Json => print_json(&locations),
            }
        }
        Some(Commands::Completion(mut query_args)) => {
            if let Some(ref config) = cli_config {
                apply_source_defaults(config, &mut query_args.source);
            }

            let params = position_params(&query_args);
            let names = match query_backend(&query_args, cli_config.as_ref())? {
                Some(backend) => backend.completion(params)?,
                None => {
                    let session = local_session(&query_args.source)?;
                    session.completion(&query_args.file, position_of(&query_args))?
                }
            };

            match query_args.format {
                OutputFormat::Text => {
                    for name in &names {
                        println!("{name}");
                    }
                    Ok(())
                }
                OutputFormat::Json => print_json(&names),
            }
        }
        Some(Commands::Rename(mut rename_args)) => {
            if let Some(ref config) = cli_config {
                apply_source_defaults(config, &mut rename_args.position.source);
            }

            let query_args = &rename_args.position;
            let params = RenameParams {
                path: query_args.file.clone(),
                position: position_of(query_args),
                new_name: rename_args.new_name.clone(),
            };
            let plan: Option<RenamePlan> = match query_backend(query_args, cli_config.as_ref())? {
                Some(backend) => backend.rename(params)?,
                None => {
                    let session = local_session(&query_args.source)?;
                    session.rename(
                        &query_args.file,
                        position_of(query_args),
                        &rename_args.new_name,
                    )?
                }
            };

            match query_args.format {
                OutputFormat::Text => {
                    match &plan {
                        Some(plan) => {
                            for (path, edits) in &plan.edits {
                                println!("{}: {} edits", path.display(), edits.len());
                            }
                        }
                        None => println!("rename rejected"),
                    }
                    Ok(())
                }
                OutputFormat::Json => print_json(&plan),
            }
        }
        Some(Commands::Serve(mut serve_args)) => {
            if let Some(ref config) = cli_config {
                apply_source_defaults(config, &mut serve_args.source);
            }

            let addr_str = serve_args
                .addr
                .or_else(|| serve_addr_from_config(cli_config.as_ref()))
                .unwrap_or_else(|| DEFAULT_SERVE_ADDR.to_string());
            let addr: SocketAddr = addr_str
                .parse()
                .with_context(|| format!("invalid listen address {addr_str}"))?;

            println!("Starting svindex HTTP server on http://{addr}");

            let session = Arc::new(local_session(&serve_args.source)?);
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()?;
            runtime.block_on(server::run(addr, session))?;
            Ok(())
        }
        None => {
            let mut cmd = Cli::command();
            cmd.print_help()?;
            println!();
            Ok(())
        }
    }
}

fn local_session(source: &SourceArgs) -> Result<IndexSession> {
    let workspace_root = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    let session = IndexSession::new(source.to_workspace_config(), workspace_root)?;
    Ok(session)
}

fn query_backend(
    query_args: &PositionArgs,
    cli_config: Option<&CliConfig>,
) -> Result<Option<HttpQueryBackend>> {
    match effective_server_url(query_args.server.as_deref(), query_args.no_server, cli_config) {
        Some(url) => Ok(Some(HttpQueryBackend::new(url)?)),
        None => Ok(None),
    }
}

fn serve_addr_from_config(config: Option<&CliConfig>) -> Option<String> {
    config
        .and_then(|c| c.serve.as_ref())
        .and_then(|serve| serve.addr.clone())
}

fn position_of(query_args: &PositionArgs) -> TextPosition {
    TextPosition::new(query_args.line, query_args.character)
}

fn position_params(query_args: &PositionArgs) -> PositionParams {
    PositionParams {
        path: query_args.file.clone(),
        position: position_of(query_args),
    }
}

fn format_location(location: &SrcLocation) -> String {
    format!(
        "{}:{}:{}-{}:{}",
        location.path.display(),
        location.range.start.line,
        location.range.start.character,
        location.range.end.line,
        location.range.end.character
    )
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    serde_json::to_writer(std::io::stdout(), value)?;
    println!();
    Ok(())
}

/// Log to stderr so stdout stays machine-readable. `RUST_LOG` wins over
/// the -v count.
fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .try_init();
}
