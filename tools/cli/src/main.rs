//! nexus CLI - Command line interface for git-backed encrypted vaults.
//!
//! `connect` caches an encrypted session locally so the file commands that
//! follow do not prompt for the password again; `disconnect` removes it.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use nexusvault_common::{Error, SensitiveBytes, VaultOwner, VaultPath};
use nexusvault_crypto::KdfParams;
use nexusvault_storage::{GitStore, RawHttpFetcher};
use nexusvault_vault::{
    download_shared, read_shared, transfer_vault, ClientConfig, EntryKind, Session,
    SessionCache, Settings, ShareString, VaultOperations,
};

#[derive(Parser)]
#[command(name = "nexus")]
#[command(about = "Nexus - Encrypted file vault on a git remote")]
#[command(version)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long)]
    verbose: bool,

    /// Client configuration file.
    #[arg(long, env = "NEXUS_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialise a new vault on the owner's remote.
    Setup {
        /// Vault owner (account name on the remote).
        #[arg(short, long)]
        owner: String,

        /// Private SSH key allowed to push to the remote.
        #[arg(short, long)]
        key: PathBuf,

        /// KDF strength: "interactive", "moderate", or "sensitive".
        #[arg(short, long, default_value = "moderate")]
        strength: String,
    },

    /// Authenticate and cache the session locally.
    Connect {
        /// Vault owner.
        #[arg(short, long)]
        owner: String,
    },

    /// Remove the cached session.
    Disconnect,

    /// Encrypt a local file into the vault.
    Upload {
        /// Local file to upload.
        source: PathBuf,

        /// Destination path in the vault.
        dest: String,

        /// Overwrite without asking.
        #[arg(short, long)]
        yes: bool,
    },

    /// Decrypt a file (or a folder with --dir) to local disk.
    Download {
        /// Path in the vault.
        path: String,

        /// Local destination.
        #[arg(default_value = ".")]
        dest: PathBuf,

        /// Download every file under a folder.
        #[arg(short, long)]
        dir: bool,
    },

    /// Print a file to stdout.
    Read {
        /// Path in the vault.
        path: String,
    },

    /// Delete a file from the vault.
    Delete {
        /// Path in the vault.
        path: String,
    },

    /// Erase every file and all history.
    Purge {
        /// Purge without asking.
        #[arg(short, long)]
        yes: bool,
    },

    /// List every entry in the vault.
    Ls,

    /// Find files whose path contains a string.
    Search {
        query: String,
    },

    /// Create a share string for a file.
    Share {
        /// Path in the vault.
        path: String,

        /// Hand out the raw file key instead of publishing a pointer.
        #[arg(long)]
        direct: bool,
    },

    /// Fetch a file from a share string.
    GetShared {
        share: String,

        /// Local destination; prints to stdout when omitted.
        dest: Option<PathBuf>,
    },

    /// Show vault statistics, or details of one file.
    Info {
        /// Path in the vault.
        path: Option<String>,
    },

    /// Copy every file of one vault into another.
    Transfer {
        /// Source vault owner.
        #[arg(long)]
        from: String,

        /// Destination vault owner.
        #[arg(long)]
        to: String,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

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
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Error: failed to install logger: {}", e);
    }

    if let Err(e) = run(cli).await {
        eprintln!("Error: {:#}", e);
        std::process::exit(exit_code(&e));
    }
}

/// Exit code of the first vault error in the chain, 1 otherwise.
fn exit_code(error: &anyhow::Error) -> i32 {
    error
        .chain()
        .find_map(|cause| cause.downcast_ref::<Error>())
        .map(|e| e.kind().exit_code())
        .unwrap_or(1)
}

async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config.clone().or_else(ClientConfig::default_path);
    let config = match &config_path {
        Some(path) => ClientConfig::load(path).context("Failed to load configuration")?,
        None => ClientConfig::default(),
    };
    let cache = SessionCache::new(config.cache_dir()?);
    let store = build_store(&config)?;

    match cli.command {
        Commands::Setup {
            owner,
            key,
            strength,
        } => cmd_setup(&config, &store, &cache, &owner, &key, &strength).await,

        Commands::Connect { owner } => cmd_connect(&store, &cache, &owner).await,

        Commands::Disconnect => cmd_disconnect(&cache),

        Commands::Upload { source, dest, yes } => {
            cmd_upload(&config, &store, &cache, &source, &dest, yes).await
        }

        Commands::Download { path, dest, dir } => {
            cmd_download(&config, &store, &cache, &path, &dest, dir).await
        }

        Commands::Read { path } => cmd_read(&config, &store, &cache, &path).await,

        Commands::Delete { path } => cmd_delete(&config, &store, &cache, &path).await,

        Commands::Purge { yes } => cmd_purge(&config, &store, &cache, yes).await,

        Commands::Ls => cmd_ls(&config, &store, &cache),

        Commands::Search { query } => cmd_search(&config, &store, &cache, &query),

        Commands::Share { path, direct } => {
            cmd_share(&config, &store, &cache, &path, direct).await
        }

        Commands::GetShared { share, dest } => cmd_get_shared(&store, &share, dest).await,

        Commands::Info { path } => cmd_info(&config, &store, &cache, path.as_deref()).await,

        Commands::Transfer { from, to } => cmd_transfer(&config, &store, &from, &to).await,
    }
}

fn build_store(config: &ClientConfig) -> Result<GitStore> {
    let mut store = GitStore::new(config.resolver(), config.branch.clone());
    if let Some(template) = &config.raw_url_template {
        let raw = RawHttpFetcher::new(template.clone(), config.branch.clone())
            .context("Invalid raw URL template")?;
        store = store.with_raw_fetcher(raw);
    }
    Ok(store)
}

/// Prompt for password securely.
fn prompt_password(prompt: &str) -> Result<SensitiveBytes> {
    let password = rpassword::prompt_password(prompt).context("Failed to read password")?;
    Ok(SensitiveBytes::new(password.into_bytes()))
}

/// Ask a y/N question on stderr and read the answer from stdin.
fn ask(prompt: &str) -> bool {
    eprint!("{} [y/N] ", prompt);
    let _ = std::io::stderr().flush();
    let mut answer = String::new();
    if std::io::stdin().lock().read_line(&mut answer).is_err() {
        return false;
    }
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

fn parse_owner(owner: &str) -> Result<VaultOwner> {
    VaultOwner::new(owner).context("Invalid vault owner")
}

fn parse_path(path: &str) -> Result<VaultPath> {
    VaultPath::parse(path).context("Invalid vault path")
}

/// The cached session, or an authentication error when not connected.
fn load_session(cache: &SessionCache) -> Result<Session> {
    cache
        .load()
        .context("Failed to read the session cache")?
        .ok_or_else(|| {
            Error::Authentication("Not connected. Run `nexus connect` first".to_string()).into()
        })
}

async fn cmd_setup(
    config: &ClientConfig,
    store: &GitStore,
    cache: &SessionCache,
    owner: &str,
    key: &Path,
    strength: &str,
) -> Result<()> {
    let kdf_params = match strength {
        "interactive" => KdfParams::interactive(),
        "moderate" => KdfParams::moderate(),
        "sensitive" => KdfParams::sensitive(),
        _ => {
            anyhow::bail!("Invalid strength. Use: interactive, moderate, or sensitive");
        }
    };
    let owner = parse_owner(owner)?;
    let signing_key = SensitiveBytes::new(
        std::fs::read(key).with_context(|| format!("Failed to read key {}", key.display()))?,
    );

    let password = prompt_password("Enter new vault password: ")?;
    let confirm = prompt_password("Confirm password: ")?;
    if password.as_bytes() != confirm.as_bytes() {
        anyhow::bail!("Passwords do not match");
    }

    info!("Setting up vault for {}", owner);
    let settings = Settings {
        kdf_params,
        ..Settings::default()
    };
    let mut session = Session::setup(
        store,
        &config.resolver(),
        owner,
        password,
        signing_key,
        settings,
    )
    .await
    .context("Failed to set up vault")?;
    session.attach_cache(cache.clone());
    session.persist().context("Failed to cache session")?;

    println!("Vault created for {}.", session.owner());
    println!("  Remote: {}", session.remote(&config.resolver()));
    Ok(())
}

async fn cmd_connect(store: &GitStore, cache: &SessionCache, owner: &str) -> Result<()> {
    let owner = parse_owner(owner)?;
    let password = prompt_password("Enter vault password: ")?;

    let mut session = Session::connect(store, owner, password)
        .await
        .context("Failed to connect")?;
    session.attach_cache(cache.clone());
    session.persist().context("Failed to cache session")?;

    let counts = session.index().statistics();
    println!(
        "Connected to {} ({} files, {} folders).",
        session.owner(),
        counts.files,
        counts.folders
    );
    Ok(())
}

fn cmd_disconnect(cache: &SessionCache) -> Result<()> {
    match cache.load().context("Failed to read the session cache")? {
        Some(session) => {
            let owner = session.owner().to_string();
            session.disconnect()?;
            println!("Disconnected from {}.", owner);
        }
        None => {
            cache.clear()?;
            println!("No active session.");
        }
    }
    Ok(())
}

async fn cmd_upload(
    config: &ClientConfig,
    store: &GitStore,
    cache: &SessionCache,
    source: &Path,
    dest: &str,
    yes: bool,
) -> Result<()> {
    let mut session = load_session(cache)?;
    let dest_path = parse_path(dest)?;
    let content = tokio::fs::read(source)
        .await
        .with_context(|| format!("Failed to read {}", source.display()))?;

    let resolver = config.resolver();
    let mut ops = VaultOperations::new(&mut session, store, &resolver);
    let report = ops
        .upload(&dest_path, &content, |prompt: &str| yes || ask(prompt))
        .await
        .context("Failed to upload file")?;

    let verb = if report.overwritten { "Replaced" } else { "Uploaded" };
    println!("{} {} ({} bytes)", verb, dest_path, content.len());
    Ok(())
}

async fn cmd_download(
    config: &ClientConfig,
    store: &GitStore,
    cache: &SessionCache,
    path: &str,
    dest: &Path,
    dir: bool,
) -> Result<()> {
    let mut session = load_session(cache)?;
    let vault_path = parse_path(path)?;
    let resolver = config.resolver();
    let ops = VaultOperations::new(&mut session, store, &resolver);

    if dir {
        let written = ops
            .download_directory(&vault_path, dest)
            .await
            .context("Failed to download folder")?;
        println!("Downloaded {} files into {}", written.len(), dest.display());
    } else {
        let written = ops
            .download_file(&vault_path, dest)
            .await
            .context("Failed to download file")?;
        println!("Downloaded {} to {}", vault_path, written.display());
    }
    Ok(())
}

async fn cmd_read(
    config: &ClientConfig,
    store: &GitStore,
    cache: &SessionCache,
    path: &str,
) -> Result<()> {
    let mut session = load_session(cache)?;
    let vault_path = parse_path(path)?;
    let resolver = config.resolver();
    let ops = VaultOperations::new(&mut session, store, &resolver);

    let mut stdout = tokio::io::stdout();
    ops.read_to(&vault_path, &mut stdout)
        .await
        .context("Failed to read file")?;
    Ok(())
}

async fn cmd_delete(
    config: &ClientConfig,
    store: &GitStore,
    cache: &SessionCache,
    path: &str,
) -> Result<()> {
    let mut session = load_session(cache)?;
    let vault_path = parse_path(path)?;
    let resolver = config.resolver();
    let mut ops = VaultOperations::new(&mut session, store, &resolver);

    let report = ops
        .delete(&vault_path)
        .await
        .context("Failed to delete file")?;
    if report.blob_was_missing {
        println!("Removed {} from the index (its data was already gone)", vault_path);
    } else {
        println!("Deleted {}", vault_path);
    }
    Ok(())
}

async fn cmd_purge(
    config: &ClientConfig,
    store: &GitStore,
    cache: &SessionCache,
    yes: bool,
) -> Result<()> {
    let mut session = load_session(cache)?;
    let resolver = config.resolver();
    let mut ops = VaultOperations::new(&mut session, store, &resolver);

    ops.purge(|prompt: &str| yes || ask(prompt))
        .await
        .context("Failed to purge vault")?;
    println!("Vault purged.");
    Ok(())
}

fn cmd_ls(config: &ClientConfig, store: &GitStore, cache: &SessionCache) -> Result<()> {
    let mut session = load_session(cache)?;
    let resolver = config.resolver();
    let ops = VaultOperations::new(&mut session, store, &resolver);

    let entries = ops.list()?;
    if entries.is_empty() {
        println!("Vault is empty.");
    }
    for (path, kind) in entries {
        let depth = path.components().len().saturating_sub(1);
        let name = path.name().unwrap_or_default();
        match kind {
            EntryKind::Folder => println!("{}{}/", "  ".repeat(depth), name),
            EntryKind::File => println!("{}{}", "  ".repeat(depth), name),
        }
    }
    Ok(())
}

fn cmd_search(
    config: &ClientConfig,
    store: &GitStore,
    cache: &SessionCache,
    query: &str,
) -> Result<()> {
    let mut session = load_session(cache)?;
    let resolver = config.resolver();
    let ops = VaultOperations::new(&mut session, store, &resolver);

    let hits = ops.search(query)?;
    if hits.is_empty() {
        println!("No files match '{}'.", query);
    }
    for (path, storage_id) in hits {
        println!("{}  ({})", path, storage_id);
    }
    Ok(())
}

async fn cmd_share(
    config: &ClientConfig,
    store: &GitStore,
    cache: &SessionCache,
    path: &str,
    direct: bool,
) -> Result<()> {
    let mut session = load_session(cache)?;
    let vault_path = parse_path(path)?;
    let resolver = config.resolver();
    let mut ops = VaultOperations::new(&mut session, store, &resolver);

    let share = if direct {
        ops.share_direct(&vault_path)
    } else {
        ops.share(&vault_path).await
    }
    .context("Failed to share file")?;
    println!("{}", share);
    Ok(())
}

async fn cmd_get_shared(store: &GitStore, share: &str, dest: Option<PathBuf>) -> Result<()> {
    let share = ShareString::parse(share).context("Invalid share string")?;
    match dest {
        Some(dest) => {
            let written = download_shared(store, &share, &dest)
                .await
                .context("Failed to fetch shared file")?;
            println!("Saved {}", written.display());
        }
        None => {
            let file = read_shared(store, &share)
                .await
                .context("Failed to fetch shared file")?;
            write_terminated(&mut std::io::stdout().lock(), &file.content)?;
        }
    }
    Ok(())
}

/// Write `content`, ending it with a newline if it lacks one.
fn write_terminated(out: &mut impl Write, content: &[u8]) -> std::io::Result<()> {
    out.write_all(content)?;
    if content.last() != Some(&b'\n') {
        out.write_all(b"\n")?;
    }
    out.flush()
}

async fn cmd_info(
    config: &ClientConfig,
    store: &GitStore,
    cache: &SessionCache,
    path: Option<&str>,
) -> Result<()> {
    let mut session = load_session(cache)?;
    let resolver = config.resolver();
    let ops = VaultOperations::new(&mut session, store, &resolver);

    match path {
        Some(path) => {
            let info = ops
                .file_info(&parse_path(path)?)
                .await
                .context("Failed to read file info")?;
            println!("File Information:");
            println!("  Name: {}", info.name);
            println!("  Path: {}", info.path);
            println!("  Storage ID: {}", info.storage_id);
            println!("  Encrypted size: {} bytes", info.encrypted_size);
            println!("  Wrapped key: {}", info.wrapped_key);
        }
        None => {
            let stats = ops.stats();
            println!("Vault Information:");
            println!("  Owner: {}", stats.owner);
            println!("  Remote: {}", ops.session().remote(&resolver));
            println!("  Files: {}", stats.counts.files);
            println!("  Folders: {}", stats.counts.folders);
            println!(
                "  Commit author: {} <{}>",
                stats.settings.commit_author_name, stats.settings.commit_author_email
            );
            println!("  KDF Parameters:");
            println!("    Memory: {} KiB", stats.settings.kdf_params.memory_cost);
            println!("    Time: {} iterations", stats.settings.kdf_params.time_cost);
            println!("    Parallelism: {}", stats.settings.kdf_params.parallelism);
        }
    }
    Ok(())
}

async fn cmd_transfer(config: &ClientConfig, store: &GitStore, from: &str, to: &str) -> Result<()> {
    let source = parse_owner(from)?;
    let dest = parse_owner(to)?;
    let source_password = prompt_password(&format!("Password for {}: ", source))?;
    let dest_password = prompt_password(&format!("Password for {}: ", dest))?;

    info!("Transferring vault {} to {}", source, dest);
    let report = transfer_vault(
        store,
        &config.resolver(),
        source,
        source_password,
        dest,
        dest_password,
    )
    .await
    .context("Failed to transfer vault")?;
    println!(
        "Transferred {} files (commit {}).",
        report.files, report.commit
    );
    Ok(())
}
