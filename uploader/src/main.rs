//! Session Uploader CLI - attach recordings and files to a class session
//!
//! # Commands
//!
//! ```bash
//! session-uploader upload --class C1 --session S4 week4.pdf slides.pptx
//! session-uploader upload --class C1 --session S4 --record lecture.mp4
//! session-uploader session S4              # Show session details
//! session-uploader download F12 --name notes.pdf --output ./downloads
//! session-uploader image avatar.png        # Upload an image to the CDN
//! session-uploader config                  # Show effective configuration
//! ```
//!
//! Logging goes through `RUST_LOG` (default `info`); Ctrl-C cancels an
//! upload in progress.

use clap::{Parser, Subcommand};
use futures::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use session_uploader::config::DEFAULT_CONCURRENCY;
use session_uploader::{
    format_file_size, AppContext, Config, NoticeBoard, SelectedFile, SessionDetails,
    SessionUploadView, UploadSource, UploadTab,
};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio_stream::wrappers::{BroadcastStream, WatchStream};
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(name = "session-uploader")]
#[command(about = "Upload lecture recordings and course files to a session", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Upload files (or one recording) to a session
    Upload {
        /// Class id
        #[arg(short, long)]
        class: String,

        /// Session id
        #[arg(short, long)]
        session: String,

        /// Upload a single video recording instead of course files
        #[arg(long)]
        record: bool,

        /// Upload several files at once
        #[arg(short, long)]
        parallel: bool,

        /// Maximum uploads in flight with --parallel (default: 3)
        #[arg(long, value_name = "N")]
        concurrency: Option<usize>,

        /// Files to upload
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Show session details
    Session {
        /// Session id
        id: String,
    },

    /// Download a stored file
    Download {
        /// File id
        file_id: String,

        /// Local file name (default: downloaded_file)
        #[arg(short, long)]
        name: Option<String>,

        /// Target directory (default: current directory)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Upload an image to the CDN and print its URL
    Image {
        /// Image file
        path: PathBuf,
    },

    /// Show the effective configuration
    Config,
}

#[tokio::main]
async fn main() {
    // Load .env file (if present)
    dotenvy::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Upload {
            class,
            session,
            record,
            parallel,
            concurrency,
            files,
        } => {
            let limit = concurrency.or(parallel.then_some(DEFAULT_CONCURRENCY));
            cmd_upload(&class, &session, record, limit, files).await
        }

        Commands::Session { id } => cmd_session(&id).await,

        Commands::Download {
            file_id,
            name,
            output,
        } => cmd_download(&file_id, name.as_deref(), output.as_deref()).await,

        Commands::Image { path } => cmd_image(&path).await,

        Commands::Config => cmd_config(),
    };

    if let Err(e) = result {
        eprintln!("❌ Error: {}", e);
        std::process::exit(1);
    }
}

fn context() -> Result<AppContext, Box<dyn std::error::Error>> {
    let config = Config::from_env()?;
    Ok(AppContext::init(config)?)
}

async fn cmd_upload(
    class_id: &str,
    session_id: &str,
    record: bool,
    concurrency: Option<usize>,
    files: Vec<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    let ctx = context()?;
    let tab = if record { UploadTab::Recordings } else { UploadTab::Files };

    // The view owns the only sender, so notices end when it is dropped
    let board = NoticeBoard::new();
    let notices = board.subscribe();
    let mut view = SessionUploadView::new(
        class_id,
        session_id,
        tab,
        ctx.coordinator(),
        ctx.session_client(),
        board,
    );
    if let Some(limit) = concurrency {
        view = view.with_concurrency(limit);
    }

    let details = view.refresh().await?;
    eprintln!("📚 {}", session_title(details));

    let mut selected = Vec::with_capacity(files.len());
    for path in files {
        let file = SelectedFile::inspect(UploadSource::from_path(&path))
            .await
            .map_err(|e| format!("{}: {}", path.display(), e))?;
        eprintln!("   📄 {} ({})", file.name, file.size_label());
        selected.push(file);
    }

    match tab {
        UploadTab::Files => view.select_files(selected)?,
        UploadTab::Recordings => {
            if view.recording_locked() {
                return Err("this session already has a recording (Already Uploaded)".into());
            }
            if selected.len() > 1 {
                return Err("only one recording can be uploaded at a time".into());
            }
            if let Some(file) = selected.pop() {
                view.select_recording(file)?;
            }
        }
    }

    // Notices and progress are rendered from their own tasks
    let pb = ProgressBar::new(100);
    pb.set_style(upload_style());
    pb.set_message("Uploading");
    pb.enable_steady_tick(Duration::from_millis(120));

    let notice_bar = pb.clone();
    let mut notices = BroadcastStream::new(notices);
    let notice_task = tokio::spawn(async move {
        while let Some(item) = notices.next().await {
            // a lagged receiver just skips what it missed
            if let Ok(notice) = item {
                notice_bar.suspend(|| {
                    eprintln!("{} {}", notice.level.emoji(), notice.message);
                });
            }
        }
    });

    let progress_bar = pb.clone();
    let mut progress = WatchStream::new(view.watch_progress());
    let progress_task = tokio::spawn(async move {
        while let Some(pct) = progress.next().await {
            progress_bar.set_position(u64::from(pct));
        }
    });

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_signal.cancel();
        }
    });

    let result = view.submit(&cancel).await;
    let session = view.session().cloned();

    // Closing both channels lets the render tasks drain and finish
    drop(view);
    let _ = progress_task.await;
    let _ = notice_task.await;
    pb.finish_and_clear();

    let receipts = result?;
    for receipt in &receipts {
        println!("✅ {} → {}", receipt.file_name, ctx.config().media_link(&receipt.url));
    }
    if let Some(ref details) = session {
        print_session(ctx.config(), details);
    }

    eprintln!("\n✨ Done!");
    Ok(())
}

async fn cmd_session(session_id: &str) -> Result<(), Box<dyn std::error::Error>> {
    let ctx = context()?;
    let details = ctx.session_client().get_session(session_id).await?;
    print_session(ctx.config(), &details);
    Ok(())
}

async fn cmd_download(
    file_id: &str,
    name: Option<&str>,
    output: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    let ctx = context()?;
    let dir = output.unwrap_or_else(|| Path::new("."));

    eprintln!("📥 Downloading file {}", file_id);
    let path = ctx.session_client().download_to(file_id, name, dir).await?;
    eprintln!("💾 Saved to: {}", path.display());
    Ok(())
}

async fn cmd_image(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let ctx = context()?;
    let uploader = ctx.image_uploader()?;

    eprintln!("🖼️  Uploading image: {}", path.display());
    let url = uploader.upload_file(path).await?;
    println!("{}", url);
    Ok(())
}

fn cmd_config() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::from_env()?;

    println!("📋 {}\n", config.product_name);
    println!("API:          {}", config.api_url);
    println!("Media:        {}", config.media_url);
    println!("CDN:          {}", config.cdn_url);
    println!("CDN name:     {}", config.cdn_name.as_deref().unwrap_or("(not set)"));
    println!("CDN preset:   {}", config.cdn_preset.as_deref().unwrap_or("(not set)"));
    match config.request_timeout {
        Some(t) => println!("Timeout:      {}s", t.as_secs()),
        None => println!("Timeout:      none"),
    }
    if let Some(ref link) = config.support_facebook {
        println!("Facebook:     {}", link);
    }
    if let Some(ref link) = config.support_zalo {
        println!("Zalo:         {}", link);
    }
    Ok(())
}

fn upload_style() -> ProgressStyle {
    ProgressStyle::with_template(
        "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos:>3}% {msg}",
    )
    .map(|style| style.progress_chars("=> "))
    .unwrap_or_else(|_| ProgressStyle::default_bar())
}

fn session_title(details: &SessionDetails) -> String {
    format!(
        "Session {} - {} {} ({})",
        details.session_number,
        details.class_info.class_code,
        details.class_info.class_name,
        details.date_label()
    )
}

fn print_session(config: &Config, details: &SessionDetails) {
    println!("\n📚 {}", session_title(details));
    if let Some(ref slot) = details.slot {
        println!("   Slot: {}", slot);
    }

    if details.has_recording() {
        println!("\n🎬 Recordings ({}):", details.records.len());
        for record in &details.records {
            println!(
                "   {} {}",
                record.record_id,
                record.duration.as_deref().unwrap_or("")
            );
        }
    } else {
        println!("\n🎬 No recording yet");
    }

    if details.files.is_empty() {
        println!("\n📁 No files yet");
    } else {
        println!("\n📁 Files ({}):", details.files.len());
        for file in &details.files {
            println!(
                "   {} ({}) {}",
                file.file_name,
                format_file_size(file.file_size),
                config.media_link(&file.file_url)
            );
        }
    }
}
