//! crosspost: fan out a message (text plus optional image) to Telegram
//! channels/groups and Slack channels, with optional Notion-driven content
//! and destinations.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use crosspost_core::{
    config::Config,
    content, deliver,
    domain::{Backend, BatchResult, ContentPayload, Destination},
    ports::{InputPrompt, NullGate, PromptKind},
    report, resolve,
    session::{Session, SessionManager},
};
use crosspost_notion::NotionClient;
use crosspost_slack::SlackClient;
use crosspost_telegram::TelegramGateway;

#[derive(Debug, Parser)]
#[command(
    name = "crosspost",
    about = "Fan out a message to Telegram and Slack destinations"
)]
struct Args {
    /// Message text to send.
    #[arg(long)]
    text: Option<String>,

    /// Local file to attach.
    #[arg(long)]
    file: Option<PathBuf>,

    /// Notion page link; its text and first image become the payload.
    #[arg(long)]
    notion_url: Option<String>,

    /// Telegram channels (handles, links or ids), comma separated.
    #[arg(long, value_delimiter = ',')]
    telegram_channels: Vec<String>,

    /// Telegram group display names, comma separated.
    #[arg(long, value_delimiter = ',')]
    telegram_groups: Vec<String>,

    /// Slack channel keys, comma separated.
    #[arg(long, value_delimiter = ',')]
    slack_channels: Vec<String>,

    /// Pick group/channel destinations from the contact database by
    /// category tag (replaces --telegram-groups and --slack-channels).
    #[arg(long, value_delimiter = ',')]
    tags: Vec<String>,

    /// Print the prepared payload without sending.
    #[arg(long)]
    preview: bool,

    /// List the category tags known to the contact database and exit.
    #[arg(long)]
    list_tags: bool,
}

/// Reads login handshake answers from the terminal.
///
/// One shared reader for the whole handshake, so input buffered ahead of a
/// prompt is not lost between questions.
struct StdinPrompt {
    stdin: tokio::sync::Mutex<BufReader<tokio::io::Stdin>>,
}

impl StdinPrompt {
    fn new() -> Self {
        Self {
            stdin: tokio::sync::Mutex::new(BufReader::new(tokio::io::stdin())),
        }
    }
}

#[async_trait::async_trait]
impl InputPrompt for StdinPrompt {
    async fn request_input(&self, kind: PromptKind) -> crosspost_core::Result<String> {
        let label = match kind {
            PromptKind::Phone => "Phone (with country code): ",
            PromptKind::LoginCode => "Login code: ",
            PromptKind::Password => "Password: ",
        };

        let mut stdout = tokio::io::stdout();
        stdout.write_all(label.as_bytes()).await?;
        stdout.flush().await?;

        let mut line = String::new();
        self.stdin.lock().await.read_line(&mut line).await?;
        Ok(line.trim().to_string())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    crosspost_core::logging::init("crosspost");

    let args = Args::parse();
    let cfg = Config::load()?;

    if args.list_tags {
        let notion = notion_client(&cfg)?;
        use crosspost_core::ports::ContactLookup;
        for tag in notion.categories().await? {
            println!("{tag}");
        }
        return Ok(());
    }

    let payload = build_payload(&args, &cfg).await?;

    if args.preview {
        println!(
            "text:\n{}",
            if payload.text.is_empty() {
                "[no text]"
            } else {
                &payload.text
            }
        );
        match &payload.attachment {
            Some(path) => println!("attachment: {}", path.display()),
            None => println!("attachment: none"),
        }
        return Ok(());
    }

    if payload.is_empty() {
        anyhow::bail!("{}", crosspost_core::Error::EmptyPayload);
    }

    let destinations = gather_destinations(&args, &cfg).await?;
    let (tg_channels, tg_groups, slack_channels) = resolve::partition(&destinations);

    let telegram_active = !tg_channels.is_empty() || !tg_groups.is_empty();
    let slack_active = !slack_channels.is_empty();
    if !telegram_active && !slack_active {
        anyhow::bail!(
            "no destinations given; use --telegram-channels, --telegram-groups, \
             --slack-channels or --tags"
        );
    }

    // The two backends have independent sessions; their batches run in
    // parallel while sends within each batch stay serialized.
    let (telegram_result, slack_result) = tokio::join!(
        async {
            if !telegram_active {
                return Ok(None);
            }
            run_telegram(&cfg, &payload, &tg_channels, &tg_groups)
                .await
                .map(Some)
        },
        async {
            if !slack_active {
                return Ok(None);
            }
            run_slack(&cfg, &payload, &slack_channels).await.map(Some)
        },
    );

    let mut failed = false;
    for (backend, outcome) in [
        (Backend::Telegram, telegram_result),
        (Backend::Slack, slack_result),
    ] {
        match outcome {
            Ok(None) => {}
            Ok(Some(batch)) => {
                println!("{}", report::render(backend, &batch));
                if !batch.errors.is_empty() {
                    failed = true;
                }
            }
            Err(e) => {
                eprintln!("{backend}: {e}");
                failed = true;
            }
        }
    }

    if failed {
        std::process::exit(1);
    }
    Ok(())
}

async fn run_telegram(
    cfg: &Config,
    payload: &ContentPayload,
    channels: &[String],
    groups: &[String],
) -> crosspost_core::Result<BatchResult> {
    let gateway = Arc::new(TelegramGateway::new(
        cfg.telegram_api_id.as_str(),
        cfg.telegram_api_hash.as_str(),
        cfg.session_file.clone(),
    ));
    let manager = SessionManager::new(
        cfg.telegram_credentials(),
        gateway.clone(),
        Arc::new(StdinPrompt::new()),
        gateway.clone(),
    );

    let session = manager.get_session().await?;
    let recipients = resolve::resolve_telegram(gateway.as_ref(), channels, groups).await?;
    deliver::deliver_all(&session, &recipients, payload, &NullGate).await
}

async fn run_slack(
    cfg: &Config,
    payload: &ContentPayload,
    channels: &[String],
) -> crosspost_core::Result<BatchResult> {
    let slack = Arc::new(SlackClient::new(
        cfg.slack_bot_token.as_str(),
        cfg.http_timeout,
    )?);
    let session = Session::new(Backend::Slack, slack);
    let recipients = resolve::resolve_slack(channels);
    deliver::deliver_all(&session, &recipients, payload, &NullGate).await
}

/// Manual destination lists come from the CLI with env-var fallbacks; tag
/// selection replaces the group/Slack lists with contacts from the database
/// while manually entered channels stay in effect.
async fn gather_destinations(args: &Args, cfg: &Config) -> anyhow::Result<Vec<Destination>> {
    let mut destinations: Vec<Destination> = Vec::new();
    destinations.extend(
        merge(&args.telegram_channels, &cfg.telegram_channels)
            .into_iter()
            .map(Destination::TelegramChannel),
    );

    if args.tags.is_empty() {
        destinations.extend(
            merge(&args.telegram_groups, &cfg.telegram_groups)
                .into_iter()
                .map(Destination::TelegramGroup),
        );
        destinations.extend(
            merge(&args.slack_channels, &cfg.slack_channels)
                .into_iter()
                .map(Destination::SlackChannel),
        );
    } else {
        let notion = notion_client(cfg)?;
        destinations.extend(
            resolve::wanted_from_tags(&notion, Backend::Telegram, &args.tags)
                .await?
                .into_iter()
                .map(Destination::TelegramGroup),
        );
        destinations.extend(
            resolve::wanted_from_tags(&notion, Backend::Slack, &args.tags)
                .await?
                .into_iter()
                .map(Destination::SlackChannel),
        );
    }

    Ok(destinations)
}

async fn build_payload(args: &Args, cfg: &Config) -> anyhow::Result<ContentPayload> {
    if let Some(link) = &args.notion_url {
        let notion = notion_client(cfg)?;
        // One fetch serves both backend batches.
        let payload = content::fetch_document(&notion, &notion, link).await?;
        return Ok(payload);
    }

    Ok(content::manual(
        args.text.as_deref().unwrap_or(""),
        args.file.as_deref(),
    )?)
}

fn notion_client(cfg: &Config) -> crosspost_core::Result<NotionClient> {
    NotionClient::new(
        cfg.notion_api_token.as_str(),
        cfg.notion_database_id.as_str(),
        cfg.http_timeout,
    )
}

fn merge(primary: &[String], fallback: &[String]) -> Vec<String> {
    let cleaned: Vec<String> = primary
        .iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();
    if cleaned.is_empty() {
        fallback.to_vec()
    } else {
        cleaned
    }
}
