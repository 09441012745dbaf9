mod bridge;

use bridge::Bridge;
use clap::{Parser, Subcommand};
use herald_campaign::{JobProcessor, Reporter, SessionManager};
use herald_channels::whatsapp::{generate_qr_terminal, WhatsAppTransport};
use herald_core::{
    config::{self, Config},
    event::{Event, SessionStatus},
    job::{JobRequest, JobStatus},
    phone::PhoneNormalizer,
    traits::Transport,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::info;

#[derive(Parser)]
#[command(
    name = "herald",
    version,
    about = "Herald: bulk WhatsApp campaigns with pause, resume and stop"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to config file.
    #[arg(short, long, default_value = "config.toml")]
    config: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the JSON-lines bridge on stdin/stdout.
    Serve,
    /// Link this device by scanning a QR code.
    Pair,
    /// Send a single message.
    Send {
        /// Recipient phone number in any common format.
        #[arg(long)]
        to: String,
        /// Message text (caption when an attachment is given).
        #[arg(short, long)]
        message: String,
        /// Local path or http(s) URL of a media file.
        #[arg(short, long)]
        attachment: Option<String>,
    },
    /// Run a campaign described by a JSON job file.
    Campaign {
        /// Path to the job file.
        file: String,
    },
    /// Show configuration and pairing state.
    Status,
}

/// How long one-shot commands wait for the session to come up.
const READY_TIMEOUT: Duration = Duration::from_secs(60);

/// Wired-up runtime shared by every subcommand.
struct Core {
    transport: Arc<WhatsAppTransport>,
    session: Arc<SessionManager>,
    processor: Arc<JobProcessor>,
    normalizer: PhoneNormalizer,
    events: mpsc::Receiver<Event>,
}

fn build_core(cfg: &Config) -> Core {
    let transport = Arc::new(WhatsAppTransport::new(
        cfg.whatsapp.clone(),
        &cfg.herald.data_dir,
    ));
    let (reporter, events) = Reporter::channel(cfg.campaign.event_buffer);
    let session = Arc::new(SessionManager::new(transport.clone(), reporter.clone()));
    let normalizer = PhoneNormalizer::from_config(&cfg.phone);
    let processor = Arc::new(JobProcessor::new(
        session.clone(),
        reporter,
        normalizer.clone(),
        cfg.campaign.on_session_loss,
    ));
    Core {
        transport,
        session,
        processor,
        normalizer,
        events,
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cfg = config::load(&cli.config)?;

    // stdout belongs to the bridge protocol; logs go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cfg.herald.log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Serve => {
            let core = build_core(&cfg);
            info!("{} bridge starting", cfg.herald.name);
            let bridge = Arc::new(Bridge {
                session: core.session,
                processor: core.processor,
                normalizer: core.normalizer,
                default_pacing: cfg.campaign.default_pacing(),
            });
            bridge::serve(bridge, core.events).await?;
        }
        Commands::Pair => pair(build_core(&cfg)).await?,
        Commands::Send {
            to,
            message,
            attachment,
        } => {
            let mut core = build_core(&cfg);
            let address = core.normalizer.normalize(&to)?;
            bring_up(&mut core).await?;
            let result = match attachment {
                Some(source) => core.session.send_media(&address, &message, &source).await,
                None => core.session.send_text(&address, &message).await,
            };
            core.session.disconnect().await;
            result?;
            println!("Sent to {address}");
        }
        Commands::Campaign { file } => {
            let content = std::fs::read_to_string(&file)
                .map_err(|e| anyhow::anyhow!("cannot read {file}: {e}"))?;
            let request: JobRequest = serde_json::from_str(&content)?;
            let job = request.into_job(cfg.campaign.default_pacing());
            let mut core = build_core(&cfg);
            bring_up(&mut core).await?;
            let result = run_campaign(&mut core, job).await;
            core.session.disconnect().await;
            result?;
        }
        Commands::Status => {
            let core = build_core(&cfg);
            println!("Herald status\n");
            println!("  Config:       {}", cli.config);
            println!("  Data dir:     {}", config::shellexpand(&cfg.herald.data_dir));
            println!("  Device name:  {}", cfg.whatsapp.device_name);
            println!(
                "  Paired:       {}",
                if core.transport.has_credentials().await {
                    "yes"
                } else {
                    "no (run `herald pair`)"
                }
            );
            println!(
                "  Pacing:       {}-{} ms",
                cfg.campaign.min_delay_ms, cfg.campaign.max_delay_ms
            );
            println!("  Phone prefix: {} -> {}", cfg.phone.trunk_prefix, cfg.phone.country_code);
        }
    }

    Ok(())
}

/// Connect and show QR codes until the phone links this device.
async fn pair(mut core: Core) -> anyhow::Result<()> {
    core.session.connect().await?;
    let outcome = loop {
        let Some(event) = core.events.recv().await else {
            break Err(anyhow::anyhow!("event channel closed"));
        };
        match event {
            Event::QrCode(data) => {
                println!("{}", generate_qr_terminal(&data)?);
                println!("Scan with WhatsApp > Linked Devices > Link a Device\n");
            }
            Event::StatusChange(SessionStatus::Ready) => break Ok(()),
            Event::StatusChange(SessionStatus::Errored) => {
                let reason = core.session.last_error().unwrap_or_default();
                break Err(anyhow::anyhow!("pairing failed: {reason}"));
            }
            _ => {}
        }
    };
    core.session.disconnect().await;
    outcome?;
    println!("Paired. Session stored in {}", core.transport.session_dir().display());
    Ok(())
}

/// Connect with stored credentials and wait until the session is ready.
async fn bring_up(core: &mut Core) -> anyhow::Result<()> {
    if !core.transport.has_credentials().await {
        anyhow::bail!("this device is not paired yet; run `herald pair` first");
    }
    let mut status = core.session.subscribe();
    core.session.connect().await?;
    let reached = tokio::time::timeout(
        READY_TIMEOUT,
        status.wait_for(|s| {
            matches!(
                s,
                SessionStatus::Ready | SessionStatus::AwaitingAuth | SessionStatus::Errored
            )
        }),
    )
    .await
    .map_err(|_| anyhow::anyhow!("timed out waiting for the session"))?
    .map(|s| *s)?;

    match reached {
        SessionStatus::Ready => Ok(()),
        SessionStatus::AwaitingAuth => {
            core.session.disconnect().await;
            anyhow::bail!("stored session was rejected; run `herald pair` again")
        }
        other => {
            let reason = core.session.last_error().unwrap_or_default();
            anyhow::bail!("session {other}: {reason}")
        }
    }
}

/// Start the job and print progress until it finishes. Ctrl-C stops it.
async fn run_campaign(core: &mut Core, job: herald_core::job::Job) -> anyhow::Result<()> {
    let job_id = core.processor.start(job)?;
    println!("Campaign {job_id} started");

    let mut interrupted = false;
    loop {
        tokio::select! {
            event = core.events.recv() => match event {
                Some(Event::JobProgress(snap)) => {
                    println!(
                        "[{}/{}] ok {} failed {} ({:?})",
                        snap.processed, snap.total, snap.success, snap.failed, snap.status
                    );
                    if snap.status == JobStatus::Completed {
                        break;
                    }
                }
                Some(Event::JobErrorDetail(detail)) => {
                    eprintln!("  {} failed: {}", detail.phone, detail.error);
                }
                Some(Event::StatusChange(status)) => info!("session: {status}"),
                Some(_) => {}
                None => anyhow::bail!("event channel closed"),
            },
            _ = tokio::signal::ctrl_c(), if !interrupted => {
                interrupted = true;
                println!("Stopping campaign after the current message...");
                core.processor.stop();
            }
        }
    }
    Ok(())
}
