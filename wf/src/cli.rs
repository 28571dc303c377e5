//! CLI argument parsing for wildforge

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "wf")]
#[command(author, version, about = "Wildcard prompt template engine", long_about = None)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Log debug output to stderr
    #[arg(short, long)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Expand a template into a prompt
    Expand {
        /// Template text (reads --file when omitted)
        template: Option<String>,

        /// Read the template from a file
        #[arg(short, long, conflicts_with = "template")]
        file: Option<PathBuf>,

        /// Seed (default: config default-seed, else random)
        #[arg(short, long)]
        seed: Option<u64>,

        /// Number of prompts, with consecutive seeds
        #[arg(short = 'n', long, default_value = "1")]
        count: usize,

        /// Prior context (JSON) whose values are reused
        #[arg(long)]
        context: Option<PathBuf>,

        /// Resolve this wildcard again instead of reusing it
        #[arg(long = "reroll", value_name = "NAME")]
        reroll: Vec<String>,

        /// Entropy for --reroll (default: random)
        #[arg(long)]
        reroll_seed: Option<u64>,

        /// Pin a wildcard to one of its values
        #[arg(long = "swap", value_name = "NAME=VALUE", value_parser = parse_swap)]
        swap: Vec<(String, String)>,

        /// Write the resulting context (JSON) for a later reroll
        #[arg(long)]
        save_context: Option<PathBuf>,

        /// Output format
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },

    /// List all wildcards
    List,

    /// Show a normalized wildcard definition
    Show {
        /// Wildcard name
        #[arg(required = true)]
        name: String,
    },

    /// List the values a wildcard could take under a context
    Options {
        /// Wildcard name
        #[arg(required = true)]
        name: String,

        /// Context (JSON) to evaluate requires against
        #[arg(long)]
        context: Option<PathBuf>,
    },

    /// Print the dependency graph
    Graph {
        #[arg(long, value_enum, default_value_t = GraphFormat::Text)]
        format: GraphFormat,
    },

    /// Validate all wildcards, or an edited definition before saving it
    Check {
        /// Wildcard the candidate replaces
        #[arg(requires = "candidate")]
        name: Option<String>,

        /// Edited definition file (.json or .txt)
        #[arg(long, requires = "name")]
        candidate: Option<PathBuf>,
    },

    /// Show which wildcards the templates use
    Used {
        /// Template directory (default: config templates.dir)
        #[arg(long)]
        templates: Option<PathBuf>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Prompt text only
    Text,
    /// One line per segment with provenance
    Segments,
    /// Segments, context and warnings as JSON
    Json,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum GraphFormat {
    Text,
    Dot,
    Json,
}

fn parse_swap(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((name, value)) if !name.is_empty() => Ok((name.to_string(), value.to_string())),
        _ => Err(format!("expected NAME=VALUE, got '{}'", raw)),
    }
}
