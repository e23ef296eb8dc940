use anyhow::{Context, Result, bail};
use objcopy::{
    CopyBackend, ObjectPath, RequestPayer, StoreClient,
    config::{AppConfig, Command},
    services::local_store::LocalStore,
};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::{fs, path::Path, str::FromStr, sync::Arc, time::Duration};
use tokio_util::io::ReaderStream;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // --- Parse config ---
    let (cfg, args) = AppConfig::from_env_and_args()?;
    tracing::debug!("Starting objcopy with config: {:?}", cfg);

    // --- Ensure storage directory exists ---
    if !Path::new(&cfg.storage_dir).exists() {
        fs::create_dir_all(&cfg.storage_dir)?;
        tracing::info!("Created storage directory at {}", cfg.storage_dir);
    }

    // --- Initialize SQLite connection ---
    let db_path = cfg
        .database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("file:");
    if let Some(parent) = Path::new(db_path).parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent)?;
            tracing::info!("Created missing directory {:?}", parent);
        }
    }

    let connect_options = SqliteConnectOptions::from_str(&cfg.database_url)
        .with_context(|| format!("parsing database URL `{}`", cfg.database_url))?
        .create_if_missing(true);
    let db = Arc::new(
        SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(connect_options)
            .await
            .context("connecting to metadata database")?,
    );

    let store = LocalStore::new(db, cfg.storage_dir.clone())
        .with_presign_secret(cfg.presign_secret.clone());

    // --- Handle migration mode ---
    if args.migrate {
        store.migrate().await.context("running schema migration")?;
        tracing::info!("Database migration complete.");
        return Ok(());
    }

    let Some(command) = args.command else {
        bail!("no command given; run with --help for usage");
    };

    let client = StoreClient::new(Arc::new(store), cfg.engine_config()?)?;
    run(&client, command).await
}

async fn run(client: &StoreClient<LocalStore>, command: Command) -> Result<()> {
    match command {
        Command::Mb { bucket } => {
            let created = client
                .store()
                .create_local_bucket(&bucket)
                .await
                .with_context(|| format!("creating bucket `{}`", bucket))?;
            println!("{}", created.location());
        }
        Command::Put {
            file,
            destination,
            content_type,
        } => {
            let destination = parse_path(&destination)?;
            let reader = tokio::fs::File::open(&file)
                .await
                .with_context(|| format!("opening {}", file.display()))?;
            let object = client
                .store()
                .put_object_stream(&destination, content_type, ReaderStream::new(reader))
                .await
                .with_context(|| format!("uploading to `{}`", destination))?;
            println!("{}", object.etag.unwrap_or_default());
        }
        Command::Get {
            source,
            output,
            requester_pays,
        } => {
            let source = parse_path(&source)?;
            let data = client
                .get_object(&source, RequestPayer::from_flag(requester_pays))
                .await?;
            tokio::fs::write(&output, &data)
                .await
                .with_context(|| format!("writing {}", output.display()))?;
        }
        Command::Head {
            path,
            requester_pays,
        } => {
            let path = parse_path(&path)?;
            let head = client
                .store()
                .head_object(&path, RequestPayer::from_flag(requester_pays))
                .await
                .with_context(|| format!("head `{}`", path))?;
            println!("{}", serde_json::to_string_pretty(&head)?);
        }
        Command::Rm { path } => {
            let path = parse_path(&path)?;
            client.delete(&path).await?;
        }
        Command::Cp {
            source,
            destination,
            validate_etag,
            requester_pays,
        } => {
            let source = parse_path(&source)?;
            let destination = parse_path(&destination)?;
            client
                .copy(
                    &source,
                    &destination,
                    validate_etag,
                    RequestPayer::from_flag(requester_pays),
                )
                .await?;
            tracing::info!("Copied {} to {}", source.full_path(), destination.full_path());
        }
        Command::Newer {
            source,
            destination,
            requester_pays,
        } => {
            let source = parse_path(&source)?;
            let destination = parse_path(&destination)?;
            let newer = client
                .is_src_newer(&source, &destination, RequestPayer::from_flag(requester_pays))
                .await?;
            println!("{}", newer);
        }
        Command::Presign { path, expires_secs } => {
            let path = parse_path(&path)?;
            let url = client
                .presigned_url(&path, Duration::from_secs(expires_secs))
                .await?;
            println!("{}", url);
        }
    }
    Ok(())
}

fn parse_path(raw: &str) -> Result<ObjectPath> {
    ObjectPath::parse(raw).with_context(|| format!("parsing object path `{}`", raw))
}
