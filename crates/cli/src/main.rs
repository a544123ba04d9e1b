//! Filvyn CLI: the main entry point.
//!
//! Commands:
//! - `init`: Write a default config file
//! - `chat`: Talk to the assistant from the terminal
//! - `put`: Store a file in the piece store and print its CID
//! - `get`: Fetch a piece by CID
//! - `notes`: List a user's saved notes
//! - `status`: Show configuration

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;

#[derive(Parser)]
#[command(
    name = "filvyn",
    about = "Filvyn: conversational notes on content-addressed storage",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default config file
    Init {
        /// Overwrite an existing config file
        #[arg(long)]
        force: bool,
    },

    /// Chat with the assistant
    Chat {
        /// User id the conversation and notes belong to
        #[arg(short, long, env = "FILVYN_USER", default_value = "console")]
        user: String,
    },

    /// Store a file in the piece store
    Put {
        /// File to upload
        file: PathBuf,
    },

    /// Fetch a piece by CID
    Get {
        /// Piece CID
        cid: String,

        /// Write to this file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// List saved notes
    Notes {
        /// Whose notes to list
        #[arg(short, long, env = "FILVYN_USER", default_value = "console")]
        user: String,

        /// Only notes with this tag
        #[arg(short, long)]
        tag: Option<String>,
    },

    /// Show configuration
    Status,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "info" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter));
    if cli.json_logs {
        tracing_subscriber::fmt().json().with_env_filter(env_filter).init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    }

    match cli.command {
        Commands::Init { force } => commands::init::run(force).await?,
        Commands::Chat { user } => commands::chat::run(user).await?,
        Commands::Put { file } => commands::piece::put(file).await?,
        Commands::Get { cid, output } => commands::piece::get(cid, output).await?,
        Commands::Notes { user, tag } => commands::notes::run(user, tag).await?,
        Commands::Status => commands::status::run().await?,
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_notes_with_tag() {
        let cli = Cli::try_parse_from(["filvyn", "notes", "--user", "42", "--tag", "recipe"]).unwrap();
        match cli.command {
            Commands::Notes { user, tag } => {
                assert_eq!(user, "42");
                assert_eq!(tag.as_deref(), Some("recipe"));
            }
            _ => panic!("expected notes"),
        }
    }

    #[test]
    fn parses_get_with_global_verbose() {
        let cli = Cli::try_parse_from(["filvyn", "get", "baga6ea4sea1", "-o", "out.json", "-v"]).unwrap();
        assert!(cli.verbose);
        match cli.command {
            Commands::Get { cid, output } => {
                assert_eq!(cid, "baga6ea4sea1");
                assert_eq!(output, Some(PathBuf::from("out.json")));
            }
            _ => panic!("expected get"),
        }
    }

    #[test]
    fn put_requires_a_file() {
        assert!(Cli::try_parse_from(["filvyn", "put"]).is_err());
    }
}
