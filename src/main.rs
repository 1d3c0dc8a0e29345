//! chronicle-ql CLI
//!
//! Command-line front end for the Chronicle query parser:
//! - Parse and pretty-print queries
//! - Show the resolved time range
//! - Show the residual WHERE predicate
//! - List referenced columns per table

use std::io::Read;
use std::path::PathBuf;

use anyhow::Context;
use chronicle_ql::config::{generate_default_config, Config, LoggingConfig};
use chronicle_ql::query::{parse_query_with, tokenize, Query};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "chronicle-ql")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Parse and analyse Chronicle time-series queries")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file (default: search standard locations)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Output format (table, json)
    #[arg(short, long, global = true)]
    pub format: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Parse a query and print it in canonical form
    Parse {
        /// Query text, or "-" to read stdin
        query: String,
    },

    /// Print the lexer's token stream
    Tokens {
        /// Query text, or "-" to read stdin
        query: String,
    },

    /// Print the time range a query scans
    Range {
        /// Query text, or "-" to read stdin
        query: String,
    },

    /// Print the WHERE predicate left after time bounds are removed
    Where {
        /// Query text, or "-" to read stdin
        query: String,
    },

    /// Print referenced columns per table
    Columns {
        /// Query text, or "-" to read stdin
        query: String,
    },

    /// Generate default config file
    Config {
        /// Output path (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load_with_env(path)?,
        None => Config::load_default(),
    };
    init_logging(&config.logging);

    let json = cli.format.as_deref().unwrap_or(&config.output.format) == "json";
    let options = config.parser.options();

    match cli.command {
        Commands::Parse { query } => {
            let query = parse(&query, &options)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&query)?);
            } else {
                println!("{}", query);
            }
        }

        Commands::Tokens { query } => {
            let text = read_query(&query)?;
            let tokens = tokenize(&text)?;
            if json {
                let tokens: Vec<_> = tokens
                    .iter()
                    .map(|t| {
                        serde_json::json!({
                            "kind": format!("{:?}", t.kind),
                            "text": t.text,
                            "position": t.position,
                        })
                    })
                    .collect();
                println!("{}", serde_json::to_string_pretty(&tokens)?);
            } else {
                for token in &tokens {
                    println!(
                        "{:>4}:{:<4} {:<32} {}",
                        token.position.line,
                        token.position.column,
                        format!("{:?}", token.kind),
                        token.text
                    );
                }
            }
        }

        Commands::Range { query } => {
            let query = parse(&query, &options)?;
            let range = query.time_range()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&range)?);
            } else {
                println!("start: {}", range.start.format("%Y-%m-%dT%H:%M:%S%.3fZ"));
                println!("end:   {}", range.end.format("%Y-%m-%dT%H:%M:%S%.3fZ"));
            }
        }

        Commands::Where { query } => {
            let query = parse(&query, &options)?;
            let residual = query.where_condition()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&residual)?);
            } else {
                match residual {
                    Some(cond) => println!("{}", cond),
                    None => println!("(none)"),
                }
            }
        }

        Commands::Columns { query } => {
            let query = parse(&query, &options)?;
            let columns = query.referenced_columns();
            if json {
                println!("{}", serde_json::to_string_pretty(&columns)?);
            } else {
                for (table, names) in &columns {
                    let names: Vec<&str> = names.iter().map(String::as_str).collect();
                    println!("{}: {}", table, names.join(", "));
                }
            }
        }

        Commands::Config { output } => {
            let content = generate_default_config();
            match output {
                Some(path) => {
                    std::fs::write(&path, content)
                        .with_context(|| format!("writing {}", path.display()))?;
                    println!("Config written to {}", path.display());
                }
                None => print!("{}", content),
            }
        }
    }

    Ok(())
}

fn parse(query: &str, options: &chronicle_ql::query::ParserOptions) -> anyhow::Result<Query> {
    let text = read_query(query)?;
    let query = parse_query_with(&text, options)?;
    tracing::info!("Parsed query over {} table(s)", query.from.len());
    Ok(query)
}

fn read_query(arg: &str) -> anyhow::Result<String> {
    if arg != "-" {
        return Ok(arg.to_string());
    }
    let mut text = String::new();
    std::io::stdin()
        .read_to_string(&mut text)
        .context("reading query from stdin")?;
    Ok(text)
}

/// Logs go to stderr so command output stays machine-readable
fn init_logging(config: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(format!("chronicle_ql={}", config.level))
    });

    let json = config.format == "json";
    let json_layer = json.then(|| {
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
    });
    let pretty_layer = (!json).then(|| tracing_subscriber::fmt::layer().with_writer(std::io::stderr));

    tracing_subscriber::registry()
        .with(filter)
        .with(json_layer)
        .with(pretty_layer)
        .init();
}
