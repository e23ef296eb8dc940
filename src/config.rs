use crate::copy::{
    DEFAULT_MAX_CONCURRENT_PARTS, DEFAULT_MULTIPART_CHUNK_SIZE, EngineConfig,
    SINGLE_PART_COPY_LIMIT,
};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::{env, path::PathBuf, str::FromStr};

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub storage_dir: String,
    pub database_url: String,
    pub presign_secret: String,
    pub chunk_size: u64,
    pub max_concurrent_parts: usize,
    pub single_part_copy_limit: u64,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug)]
#[command(author, version, about = "Server-side object copies against a local object store")]
pub struct Args {
    /// Directory where object payloads are stored (overrides OBJCOPY_STORAGE_DIR)
    #[arg(long, global = true)]
    pub storage_dir: Option<String>,

    /// Metadata database URL (overrides OBJCOPY_DATABASE_URL)
    #[arg(long, global = true)]
    pub database_url: Option<String>,

    /// Multipart chunk size in bytes (overrides OBJCOPY_CHUNK_SIZE)
    #[arg(long, global = true)]
    pub chunk_size: Option<u64>,

    /// Part copies in flight at once (overrides OBJCOPY_MAX_CONCURRENT_PARTS)
    #[arg(long, global = true)]
    pub max_concurrent_parts: Option<usize>,

    /// Largest object copied in one request (overrides OBJCOPY_SINGLE_PART_COPY_LIMIT)
    #[arg(long, global = true)]
    pub single_part_copy_limit: Option<u64>,

    /// Create the metadata schema and exit
    #[arg(long)]
    pub migrate: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Create a bucket
    Mb { bucket: String },
    /// Upload a local file
    Put {
        file: PathBuf,
        destination: String,
        #[arg(long)]
        content_type: Option<String>,
    },
    /// Download an object to a local file
    Get {
        source: String,
        output: PathBuf,
        #[arg(long)]
        requester_pays: bool,
    },
    /// Print object metadata as JSON
    Head {
        path: String,
        #[arg(long)]
        requester_pays: bool,
    },
    /// Delete an object
    Rm { path: String },
    /// Copy an object inside the store
    Cp {
        source: String,
        destination: String,
        /// Compare source and destination ETags after copying
        #[arg(long)]
        validate_etag: bool,
        #[arg(long)]
        requester_pays: bool,
    },
    /// Report whether the source is newer than the destination
    Newer {
        source: String,
        destination: String,
        #[arg(long)]
        requester_pays: bool,
    },
    /// Print a presigned read URL
    Presign {
        path: String,
        #[arg(long, default_value_t = 3600)]
        expires_secs: u64,
    },
}

impl AppConfig {
    /// Parse environment variables + CLI args.
    pub fn from_env_and_args() -> Result<(Self, Args)> {
        let args = Args::parse();
        let cfg = Self::from_sources(&args, |name| env::var(name).ok())?;
        Ok((cfg, args))
    }

    /// Merge `args` over the variables returned by `lookup` over defaults.
    pub fn from_sources(args: &Args, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let env_storage =
            lookup("OBJCOPY_STORAGE_DIR").unwrap_or_else(|| "./data/objects".into());
        let env_db = lookup("OBJCOPY_DATABASE_URL")
            .unwrap_or_else(|| "sqlite://./data/meta/objcopy.db".into());
        let presign_secret = lookup("OBJCOPY_PRESIGN_SECRET").unwrap_or_default();
        let env_chunk = parse_var(&lookup, "OBJCOPY_CHUNK_SIZE", DEFAULT_MULTIPART_CHUNK_SIZE)?;
        let env_parts = parse_var(
            &lookup,
            "OBJCOPY_MAX_CONCURRENT_PARTS",
            DEFAULT_MAX_CONCURRENT_PARTS,
        )?;
        let env_limit = parse_var(
            &lookup,
            "OBJCOPY_SINGLE_PART_COPY_LIMIT",
            SINGLE_PART_COPY_LIMIT,
        )?;

        Ok(Self {
            storage_dir: args.storage_dir.clone().unwrap_or(env_storage),
            database_url: args.database_url.clone().unwrap_or(env_db),
            presign_secret,
            chunk_size: args.chunk_size.unwrap_or(env_chunk),
            max_concurrent_parts: args.max_concurrent_parts.unwrap_or(env_parts),
            single_part_copy_limit: args.single_part_copy_limit.unwrap_or(env_limit),
        })
    }

    /// Copy engine settings, validated.
    pub fn engine_config(&self) -> Result<EngineConfig> {
        let cfg = EngineConfig {
            single_part_copy_limit: self.single_part_copy_limit,
            chunk_size: self.chunk_size,
            max_concurrent_parts: self.max_concurrent_parts,
            abort_on_failure: true,
        };
        cfg.validate().context("validating copy engine settings")?;
        Ok(cfg)
    }
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(name) {
        Some(value) => value
            .parse::<T>()
            .with_context(|| format!("parsing {} value `{}`", name, value)),
        None => Ok(default),
    }
}
