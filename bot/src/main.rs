use chatbot::chat::FileChatSink;
use chatbot::config::{BotConfig, Credentials};
use chatbot::dispatch::{run_session, SessionEnd};
use chatbot::shutdown::{termination_signal, ShutdownCoordinator};
use chatbot::transport::UdpPeer;
use clap::Parser;
use log::{info, warn};
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(
    about = "Headless bot that logs in-game chat",
    long_about = None,
    disable_help_flag = true,
    disable_version_flag = true
)]
struct Args {
    /// Player name to log in as
    #[arg(allow_hyphen_values = true)]
    username: String,

    /// Account password; an empty string registers without one
    #[arg(allow_hyphen_values = true)]
    password: String,

    /// Server address as host:port
    #[arg(allow_hyphen_values = true)]
    address: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) => {
            // Usage problems are reported but are not failures
            e.print()?;
            return Ok(());
        }
    };

    let config = BotConfig::from_env()?;
    let credentials = Credentials::new(args.username, args.password, args.address);

    info!("Starting chat bot...");
    info!("Logging chat to: {}", config.chat_log.display());
    let sink = FileChatSink::open(&config.chat_log)?;

    info!("Connecting to: {}", credentials.server);
    let peer = UdpPeer::connect(&credentials.server, config.idle_timeout).await?;

    ShutdownCoordinator::new(Arc::clone(&peer)).spawn(termination_signal());

    match run_session(peer, credentials, &config, sink).await? {
        SessionEnd::Denied { reason } => warn!("Server denied access: {}", reason),
        end => info!("Session ended: {}", end),
    }

    Ok(())
}
