use clap::Parser;
use std::path::PathBuf;

#[derive(Debug, Clone, Parser)]
#[command(name = "kb-bridge")]
#[command(about = "Telegram webhook bridge to a FastGPT knowledge base")]
pub struct CliArgs {
    #[arg(long, help = "Load environment variables from this file instead of ./.env")]
    pub env_file: Option<PathBuf>,

    #[arg(long, help = "Do not register the webhook with Telegram on startup")]
    pub skip_webhook_setup: bool,

    #[arg(long, help = "Emit logs as JSON")]
    pub json_logs: bool,

    #[arg(long, short, help = "Enable verbose output")]
    pub verbose: bool,
}
