//! drivekit CLI - Command line access to Google Drive.
//!
//! Authorizes once through the browser, stores the refresh token, and then
//! reads, uploads, lists and creates folders without asking again.

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use futures::StreamExt;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use drivekit_common::FileId;
use drivekit_drive::{DriveConfig, DriveService, LoopbackAuthenticator};

#[derive(Parser)]
#[command(name = "drivekit")]
#[command(about = "drivekit - Google Drive from the command line")]
#[command(version)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long)]
    verbose: bool,

    /// JSON configuration file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Token file (default: ~/.config/drivekit/token.json).
    #[arg(short, long, global = true)]
    token: Option<PathBuf>,

    /// OAuth client secret JSON, used when no stored token is usable.
    #[arg(long, global = true)]
    credentials: Option<PathBuf>,

    /// Print the authorization URL instead of opening a browser.
    #[arg(long, global = true)]
    no_browser: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Authorize and store a token.
    Auth,

    /// Delete the stored token.
    Logout,

    /// Download a file.
    Read {
        /// File ID.
        #[arg(short, long)]
        id: String,

        /// Write to this path instead of stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Upload a local file.
    Upload {
        /// Local file to upload.
        #[arg(short, long)]
        file: PathBuf,

        /// Parent folder ID.
        #[arg(short, long, default_value = "root")]
        parent: String,
    },

    /// List the contents of a folder.
    Ls {
        /// Folder ID.
        #[arg(short, long, default_value = "root")]
        folder: String,
    },

    /// Create a folder.
    Mkdir {
        /// Folder name.
        #[arg(short, long)]
        name: String,

        /// Parent folder ID.
        #[arg(short, long, default_value = "root")]
        parent: String,
    },

    /// Generate shell completions.
    Completions {
        /// Target shell.
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    if let Commands::Completions { shell } = cli.command {
        clap_complete::generate(shell, &mut Cli::command(), "drivekit", &mut std::io::stdout());
        return Ok(());
    }

    let service = build_service(&cli).await?;

    match cli.command {
        Commands::Auth => cmd_auth(&service).await,
        Commands::Logout => cmd_logout(&service).await,
        Commands::Read { id, output } => cmd_read(&service, &id, output.as_deref()).await,
        Commands::Upload { file, parent } => cmd_upload(&service, &file, &parent).await,
        Commands::Ls { folder } => cmd_ls(&service, &folder).await,
        Commands::Mkdir { name, parent } => cmd_mkdir(&service, &name, &parent).await,
        Commands::Completions { .. } => Ok(()),
    }
}

/// Resolve configuration: file first, then flags on top.
async fn build_service(cli: &Cli) -> Result<DriveService> {
    let mut config = match &cli.config {
        Some(path) => DriveConfig::load(path)
            .await
            .context("Failed to load configuration")?,
        None => {
            let token_path = match &cli.token {
                Some(path) => path.clone(),
                None => DriveConfig::default_token_path()
                    .context("No config directory; pass --token")?,
            };
            DriveConfig::new(token_path)
        }
    };

    if let Some(token) = &cli.token {
        config.token_path = token.clone();
    }
    if let Some(credentials) = &cli.credentials {
        config.credentials_path = Some(credentials.clone());
    }

    let authenticator = if cli.no_browser {
        LoopbackAuthenticator::new().without_browser()
    } else {
        LoopbackAuthenticator::new()
    };

    Ok(DriveService::with_authenticator(config, authenticator))
}

fn parse_id(id: &str) -> Result<FileId> {
    FileId::new(id).context("Invalid file ID")
}

/// Authorize and store a token.
async fn cmd_auth(service: &DriveService) -> Result<()> {
    let handle = service.authorize().await.context("Authorization failed")?;

    println!("Authorized.");
    println!("  Client: {}", handle.client_id());
    println!("  Token: {}", service.credentials().token_path().display());

    Ok(())
}

/// Delete the stored token.
async fn cmd_logout(service: &DriveService) -> Result<()> {
    if service.forget().await.context("Failed to remove token")? {
        println!("Stored token removed.");
    } else {
        println!("No stored token.");
    }

    Ok(())
}

/// Download a file.
async fn cmd_read(service: &DriveService, id: &str, output: Option<&Path>) -> Result<()> {
    let id = parse_id(id)?;

    match output {
        Some(path) => {
            info!("Downloading {} to {}", id, path.display());

            let mut stream = service
                .read_file_stream(&id)
                .await
                .context("Failed to read file")?;
            let mut file = tokio::fs::File::create(path)
                .await
                .context("Failed to create output file")?;

            let mut total = 0usize;
            while let Some(chunk) = stream.next().await {
                let chunk = chunk.context("Download interrupted")?;
                file.write_all(&chunk).await?;
                total += chunk.len();
            }
            file.flush().await?;

            println!("Downloaded {} ({} bytes)", path.display(), total);
        }
        None => {
            let content = service.read_file(&id).await.context("Failed to read file")?;
            let mut stdout = tokio::io::stdout();
            stdout.write_all(&content).await?;
            stdout.flush().await?;
        }
    }

    Ok(())
}

/// Upload a local file.
async fn cmd_upload(service: &DriveService, file: &Path, parent: &str) -> Result<()> {
    info!("Uploading {}", file.display());

    let parent = parse_id(parent)?;
    let id = service
        .upload_file(file, &parent)
        .await
        .context("Failed to upload file")?;

    println!("Uploaded {} as {}", file.display(), id);

    Ok(())
}

/// List the contents of a folder.
async fn cmd_ls(service: &DriveService, folder: &str) -> Result<()> {
    let folder = parse_id(folder)?;
    let files = service
        .list_files(&folder)
        .await
        .context("Failed to list folder")?;

    if files.is_empty() {
        println!("Folder is empty.");
    } else {
        for entry in files {
            println!("  {}  {}", entry.id, entry.name);
        }
    }

    Ok(())
}

/// Create a folder.
async fn cmd_mkdir(service: &DriveService, name: &str, parent: &str) -> Result<()> {
    info!("Creating folder: {}", name);

    let parent = parse_id(parent)?;
    let id = service
        .create_folder(name, &parent)
        .await
        .context("Failed to create folder")?;

    println!("Folder created: {} ({})", name, id);

    Ok(())
}
