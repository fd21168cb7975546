use anyhow::Context;
use async_trait::async_trait;
use clap::{Parser, Subcommand};
use pagehook::events::{DeliveryReceipt, PostBack, ReadReceipt, TextMessage};
use pagehook::handlers::{EventHandler, HandlerRegistry, HandlerResult, ReplyContext};
use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "pagehook")]
#[command(about = "Pagehook CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version
    Version,

    /// Run the webhook endpoint with a demo echo bot: text messages are answered with the same text, receipts are logged.
    Serve {
        /// Config file path (default: PAGEHOOK_CONFIG_PATH or ~/.pagehook/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,

        /// HTTP port (default from config or 8080)
        #[arg(long, short)]
        port: Option<u16>,
    },

    /// Print the X-Hub-Signature value for a request body, for exercising a local endpoint.
    Sign {
        /// App secret the endpoint verifies with
        #[arg(long, short)]
        secret: String,

        /// Body file (default: read stdin)
        #[arg(value_name = "FILE")]
        file: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Version) => {
            println!("pagehook {}", env!("CARGO_PKG_VERSION"));
        }
        Some(Commands::Serve { config, port }) => {
            if let Err(e) = run_serve(config, port).await {
                log::error!("serve failed: {:#}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Sign { secret, file }) => match run_sign(&secret, file) {
            Ok(header) => println!("{}", header),
            Err(e) => {
                log::error!("sign failed: {:#}", e);
                std::process::exit(1);
            }
        },
        None => {
            println!("Run with --help for usage");
        }
    }
}

async fn run_serve(config_path: Option<PathBuf>, port: Option<u16>) -> anyhow::Result<()> {
    let (mut config, path) = pagehook::config::load_config(config_path)?;
    if let Some(p) = port {
        config.gateway.port = p;
    }
    log::info!("loaded config from {}", path.display());

    let registry = Arc::new(HandlerRegistry::new());
    register_echo_bot(&registry).await;
    pagehook::gateway::run_gateway(config, registry).await
}

/// Answers every text message with its own text.
struct EchoBot;

#[async_trait]
impl EventHandler<TextMessage> for EchoBot {
    async fn handle(&self, msg: TextMessage, reply: ReplyContext) -> HandlerResult {
        if msg.is_echo {
            return Ok(());
        }
        log::info!("message {} from {}: {:?}", msg.id, msg.meta.sender, msg.body);
        let text = match (&msg.selected_quick_reply, msg.body.is_empty()) {
            (Some(payload), _) => format!("you picked {}", payload),
            (None, true) => format!("received {} attachment(s)", msg.attachments.len()),
            (None, false) => msg.body.clone(),
        };
        reply.text(text).await?;
        Ok(())
    }
}

async fn register_echo_bot(registry: &HandlerRegistry) {
    registry.register::<TextMessage, _>(EchoBot).await;
    registry
        .register_delivery_handler(|receipt: DeliveryReceipt, _reply: ReplyContext| async move {
            log::info!(
                "delivered to {}: {} message(s) up to {}",
                receipt.meta.sender,
                receipt.message_ids.len(),
                receipt.watermark
            );
            HandlerResult::Ok(())
        })
        .await;
    registry
        .register_read_handler(|receipt: ReadReceipt, _reply: ReplyContext| async move {
            log::info!("read by {} up to {}", receipt.meta.sender, receipt.watermark);
            HandlerResult::Ok(())
        })
        .await;
    registry
        .register_postback_handler(|postback: PostBack, reply: ReplyContext| async move {
            log::info!("postback from {}: {}", postback.meta.sender, postback.payload);
            reply.text(format!("postback {}", postback.payload)).await?;
            HandlerResult::Ok(())
        })
        .await;
}

fn run_sign(secret: &str, file: Option<PathBuf>) -> anyhow::Result<String> {
    let body = match file {
        Some(path) => std::fs::read(&path).with_context(|| format!("reading {}", path.display()))?,
        None => {
            let mut buf = Vec::new();
            std::io::stdin().read_to_end(&mut buf)?;
            buf
        }
    };
    Ok(pagehook::signature::sign(&body, secret))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_reads_body_file() {
        let path = std::env::temp_dir().join(format!("pagehook-sign-{}.json", std::process::id()));
        std::fs::write(&path, b"{}").expect("write body");
        let header = run_sign("secret", Some(path.clone())).expect("sign");
        let _ = std::fs::remove_file(&path);
        assert_eq!(header, pagehook::signature::sign(b"{}", "secret"));
    }

    #[test]
    fn sign_reports_unreadable_file_with_path() {
        let path = std::env::temp_dir().join("pagehook-sign-missing").join("body.json");
        let err = run_sign("secret", Some(path.clone())).expect_err("missing file");
        assert_eq!(err.to_string(), format!("reading {}", path.display()));
        assert!(err.chain().count() >= 2);
    }
}
