//! Command-line arguments.

use clap::{Args, Parser, Subcommand, ValueEnum};

/// Send a message to a TCP server and print what comes back.
#[derive(Debug, Parser)]
#[command(name = "tcp-client", author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Send a message to the server.
    Message(MessageArgs),
    /// Send an empty message to the server.
    Empty(EmptyArgs),
}

#[derive(Debug, Args)]
pub struct MessageArgs {
    /// Server host.
    #[arg(long, value_name = "URL")]
    pub host: String,

    /// Server port.
    #[arg(long)]
    pub port: u16,

    /// Message to send.
    #[arg(long)]
    pub message: String,

    #[command(flatten)]
    pub common: CommonArgs,
}

#[derive(Debug, Args)]
pub struct EmptyArgs {
    /// Server host.
    #[arg(value_name = "HOST")]
    pub host: String,

    /// Server port.
    #[arg(value_name = "PORT")]
    pub port: u16,

    #[command(flatten)]
    pub common: CommonArgs,
}

/// Options shared by every subcommand.
#[derive(Debug, Args)]
pub struct CommonArgs {
    /// Seconds to wait for responses before closing.
    #[arg(long, default_value_t = 2, value_name = "SECONDS")]
    pub wait: u64,

    /// Print connection events to the console.
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set, value_name = "BOOL")]
    pub verbose: bool,

    /// Enable debug logging for the client library.
    #[arg(long)]
    pub debug: bool,

    /// Log every raw read and write.
    #[arg(long)]
    pub wiretap: bool,

    /// Which I/O backend to use.
    #[arg(long, value_enum, default_value_t = BackendKind::Stream)]
    pub backend: BackendKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum BackendKind {
    /// Queue the message and report responses as they arrive.
    Stream,
    /// Wait for the response to the message.
    Transaction,
}

/// A resolved invocation: what to send and how.
#[derive(Debug)]
pub struct Invocation {
    pub host: String,
    pub port: u16,
    pub message: Option<String>,
    pub common: CommonArgs,
}

impl From<Command> for Invocation {
    fn from(command: Command) -> Self {
        match command {
            Command::Message(args) => Self {
                host: args.host,
                port: args.port,
                message: Some(args.message),
                common: args.common,
            },
            Command::Empty(args) => Self {
                host: args.host,
                port: args.port,
                message: None,
                common: args.common,
            },
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn message_defaults() {
        let cli = Cli::try_parse_from([
            "tcp-client", "message", "--host", "localhost", "--port", "7", "--message", "ping",
        ])
        .unwrap();
        let inv = Invocation::from(cli.command);
        assert_eq!(inv.host, "localhost");
        assert_eq!(inv.port, 7);
        assert_eq!(inv.message.as_deref(), Some("ping"));
        assert_eq!(inv.common.wait, 2);
        assert!(inv.common.verbose);
        assert!(!inv.common.debug);
        assert!(!inv.common.wiretap);
        assert_eq!(inv.common.backend, BackendKind::Stream);
    }

    #[test]
    fn empty_takes_positional_host_and_port() {
        let cli = Cli::try_parse_from([
            "tcp-client",
            "empty",
            "example.org",
            "9000",
            "--verbose",
            "false",
            "--backend",
            "transaction",
            "--wait",
            "0",
        ])
        .unwrap();
        let inv = Invocation::from(cli.command);
        assert_eq!(inv.host, "example.org");
        assert_eq!(inv.port, 9000);
        assert!(inv.message.is_none());
        assert!(!inv.common.verbose);
        assert_eq!(inv.common.wait, 0);
        assert_eq!(inv.common.backend, BackendKind::Transaction);
    }

    #[test]
    fn message_requires_message() {
        let result =
            Cli::try_parse_from(["tcp-client", "message", "--host", "localhost", "--port", "7"]);
        assert!(result.is_err());
    }
}
