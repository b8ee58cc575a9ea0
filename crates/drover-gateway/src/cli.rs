use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "drover", version, about = "Drover — operations chat agent")]
pub(crate) struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Also write full-detail JSONL traces to this file.
    #[arg(long, global = true)]
    pub trace_file: Option<PathBuf>,
}

#[derive(Subcommand)]
pub(crate) enum Commands {
    /// Run the gateway: poll the channel relay and answer messages.
    Start,
    Check {
        /// Output format: human (default) or json
        #[arg(long, default_value = "human")]
        format: String,
    },
    /// Run one message through the agent locally and print the reply.
    Send {
        /// Conversation thread id to run under.
        #[arg(short, long)]
        thread: String,
        text: String,
    },
    /// List conversation threads with a saved checkpoint.
    Threads,
    Version,
}
