use std::path::PathBuf;

use aroha_core::{Role, VERSION};
use clap::{ArgAction, Args, Parser, Subcommand};
use clap_complete::Shell;

/// Aroha - encrypted local conversation store for the Aroha voice assistant
#[derive(Parser)]
#[command(name = "aroha")]
#[command(author, version = VERSION, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to the config file
    #[arg(long, global = true, env = "AROHA_CONFIG", value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Path to the conversation store (overrides AROHA_DB_PATH)
    #[arg(long, global = true, value_name = "PATH")]
    pub db: Option<PathBuf>,

    /// Quiet mode (minimal output)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// More log output (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create the store, generating a key file if no secret is configured
    Init,

    /// Generate a new master secret
    Keygen(KeygenArgs),

    /// Start a new session and print its id
    Begin {
        /// Participant label stored (encrypted) with the session
        #[arg(long)]
        label: Option<String>,
    },

    /// List conversation sessions
    Sessions {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the turns of a session
    History(HistoryArgs),

    /// Append a turn to a session
    Record(RecordArgs),

    /// Read or change a setting flag
    Flag {
        #[command(subcommand)]
        command: FlagCommand,
    },

    /// Show crisis resources and log that they were shown
    Crisis(CrisisArgs),

    /// Delete a session and all of its records
    Delete {
        /// Session id
        #[arg(value_name = "SESSION")]
        session: String,
    },

    /// Check store integrity and try to decrypt every record
    Check {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_name = "SHELL")]
        shell: Shell,
    },
}

/// Arguments for the `keygen` command
#[derive(Args)]
pub struct KeygenArgs {
    /// Write ENCRYPTION_KEY=<secret> into this dotenv file instead of printing it
    #[arg(long, value_name = "PATH")]
    pub env_file: Option<PathBuf>,
}

/// Arguments for the `history` command
#[derive(Args)]
pub struct HistoryArgs {
    /// Session id
    #[arg(value_name = "SESSION")]
    pub session: String,

    /// Only show the last N turns
    #[arg(long, value_name = "N")]
    pub limit: Option<usize>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `record` command
#[derive(Args)]
pub struct RecordArgs {
    /// Session id (created on first use)
    #[arg(value_name = "SESSION")]
    pub session: String,

    /// Who spoke: user or assistant
    #[arg(long, default_value = "user")]
    pub role: Role,

    /// Emotion tag from the classifier
    #[arg(long, value_name = "TAG")]
    pub emotion: Option<String>,

    /// Turn content
    #[arg(value_name = "TEXT")]
    pub text: String,
}

#[derive(Subcommand)]
pub enum FlagCommand {
    /// Print the current value of a flag
    Get {
        #[arg(value_name = "NAME")]
        name: String,
    },
    /// Set a flag
    Set {
        #[arg(value_name = "NAME")]
        name: String,
        #[arg(value_name = "VALUE")]
        value: String,
    },
}

/// Arguments for the `crisis` command
#[derive(Args)]
pub struct CrisisArgs {
    /// Session the resources are shown in
    #[arg(value_name = "SESSION")]
    pub session: String,

    /// Emotion tag that triggered the display
    #[arg(long, value_name = "TAG")]
    pub emotion: Option<String>,

    /// List previously logged accesses instead of showing resources
    #[arg(long)]
    pub log: bool,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_record_parses_role() {
        let cli = Cli::try_parse_from([
            "aroha",
            "record",
            "s1",
            "--role",
            "assistant",
            "--emotion",
            "calm",
            "I'm here for you",
        ])
        .unwrap();
        match cli.command {
            Commands::Record(args) => {
                assert_eq!(args.role, Role::Assistant);
                assert_eq!(args.emotion.as_deref(), Some("calm"));
                assert_eq!(args.text, "I'm here for you");
            }
            _ => panic!("expected record command"),
        }
    }

    #[test]
    fn test_record_rejects_unknown_role() {
        assert!(Cli::try_parse_from(["aroha", "record", "s1", "--role", "system", "hi"]).is_err());
    }

    #[test]
    fn test_verbose_counts() {
        let cli = Cli::try_parse_from(["aroha", "-vv", "sessions"]).unwrap();
        assert_eq!(cli.verbose, 2);
    }
}
