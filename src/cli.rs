use std::path::PathBuf;

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;

#[derive(Debug, Parser)]
#[command(
    name = "docsift",
    about = "Index a directory of documents and search it by similarity or exact match"
)]
pub struct Cli {
    /// Override the XDG data directory
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Increase log verbosity (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Only log warnings and errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Build the index from a document directory and save it
    Index(IndexArgs),
    /// Rank documents by similarity to a query
    Query(QueryArgs),
    /// Find every line matching a query, tolerating hyphens and spaces
    Search(SearchArgs),
    /// Show the saved index and the last build
    Status(StatusArgs),
    /// Read and write persisted settings
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Generate shell completions
    #[command(hide = true)]
    Completions(CompletionsArgs),
}

// -- Index --

#[derive(Debug, Parser)]
pub struct IndexArgs {
    /// Document root (defaults to the `documents_dir` setting)
    pub root: Option<PathBuf>,

    /// Override the vocabulary size cap
    #[arg(long)]
    pub max_features: Option<usize>,
}

// -- Query --

#[derive(Debug, Parser)]
pub struct QueryArgs {
    /// The query text
    pub text: String,

    /// Number of results (defaults to the `top_k` setting)
    #[arg(short = 'n', long)]
    pub count: Option<usize>,

    /// Output results as JSON
    #[arg(long)]
    pub json: bool,
}

// -- Search --

#[derive(Debug, Parser)]
pub struct SearchArgs {
    /// The text to look for
    pub text: String,

    /// Page of results to show (1-based)
    #[arg(long, default_value = "1")]
    pub page: usize,

    /// Results per page (defaults to the `top_k` setting)
    #[arg(long)]
    pub per_page: Option<usize>,

    /// Lines of context per match, counting the match line
    #[arg(long)]
    pub context_lines: Option<usize>,

    /// Output results as JSON
    #[arg(long)]
    pub json: bool,
}

// -- Status --

#[derive(Debug, Parser)]
pub struct StatusArgs {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

// -- Config --

#[derive(Debug, Subcommand)]
pub enum ConfigAction {
    /// Print the effective value of a setting
    Get {
        key: String,
    },
    /// Persist a setting in config.redb
    Set {
        key: String,
        value: String,
    },
    /// Remove a persisted setting (revert to default)
    Unset {
        key: String,
    },
    /// List persisted settings
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

// -- Completions --

#[derive(Debug, Parser)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    #[arg(value_enum)]
    pub shell: Shell,
}

impl CompletionsArgs {
    /// Generate shell completions and print to stdout.
    pub fn generate(&self) {
        let mut cmd = Cli::command();
        clap_complete::generate(
            self.shell,
            &mut cmd,
            "docsift",
            &mut std::io::stdout(),
        );
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    #[test]
    fn parse_search_defaults() {
        let cli = Cli::parse_from(["docsift", "search", "bow-tie"]);
        match cli.command {
            Command::Search(args) => {
                assert_eq!(args.text, "bow-tie");
                assert_eq!(args.page, 1);
                assert_eq!(args.per_page, None);
                assert_eq!(args.context_lines, None);
                assert!(!args.json);
            }
            _ => panic!("expected search command"),
        }
    }

    #[test]
    fn parse_query_with_count() {
        let cli =
            Cli::parse_from(["docsift", "-v", "query", "reactor", "-n", "3"]);
        assert_eq!(cli.verbose, 1);
        match cli.command {
            Command::Query(args) => assert_eq!(args.count, Some(3)),
            _ => panic!("expected query command"),
        }
    }

    #[test]
    fn quiet_conflicts_with_verbose() {
        assert!(
            Cli::try_parse_from(["docsift", "-q", "-v", "status"]).is_err()
        );
    }

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }
}
