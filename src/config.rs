use crate::services::retention::{
    DEFAULT_CAP, DEFAULT_DELETE_BATCH, DEFAULT_PAGE_SIZE, RetentionOptions,
};
use anyhow::{Context, Result, bail};
use clap::{Parser, ValueEnum};
use std::{env, str::FromStr};

/// Which services hold objects and records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum BackendKind {
    /// SQLite metadata + local disk, served by this process.
    Local,
    /// Supabase Storage + PostgREST.
    Supabase,
}

impl FromStr for BackendKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" => Ok(BackendKind::Local),
            "supabase" => Ok(BackendKind::Supabase),
            other => bail!("unknown backend `{}` (expected `local` or `supabase`)", other),
        }
    }
}

/// One-shot maintenance pass selectable from the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CleanupPolicy {
    /// Keep the newest `cap` images, drop the rest and their rows.
    Retention,
    /// Drop objects no row references.
    Orphans,
}

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub backend: BackendKind,
    pub bucket: String,
    pub folder: String,
    pub object_prefix: String,
    pub table: String,
    pub retention_cap: usize,
    pub page_size: usize,
    pub delete_batch_size: usize,
    pub storage_dir: String,
    pub database_url: String,
    /// Base of public object URLs for the local backend.
    pub public_base_url: String,
    pub supabase_url: Option<String>,
    pub supabase_service_key: Option<String>,
    pub openai_api_key: Option<String>,
    pub openai_base_url: String,
    pub image_model: String,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug, Default)]
#[command(author, version, about = "AI Vision Gallery service")]
pub struct Args {
    /// Host to bind to (overrides VISION_GALLERY_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides VISION_GALLERY_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Storage/table backend (overrides VISION_GALLERY_BACKEND)
    #[arg(long, value_enum)]
    pub backend: Option<BackendKind>,

    /// Bucket holding generated images (overrides VISION_GALLERY_BUCKET)
    #[arg(long)]
    pub bucket: Option<String>,

    /// Most recent images to keep (overrides VISION_GALLERY_RETENTION_CAP, 0 = keep none)
    #[arg(long)]
    pub retention_cap: Option<usize>,

    /// Directory where local objects are stored (overrides VISION_GALLERY_STORAGE_DIR)
    #[arg(long)]
    pub storage_dir: Option<String>,

    /// Database URL for the local backend (overrides VISION_GALLERY_DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// Run migrations and exit
    #[arg(long)]
    pub migrate: bool,

    /// Run one cleanup pass, print its report and exit
    #[arg(long, value_enum)]
    pub cleanup: Option<CleanupPolicy>,
}

/// Parse `VISION_GALLERY_<name>` or fall back to `default`.
fn env_parsed<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let key = format!("VISION_GALLERY_{}", name);
    match env::var(&key) {
        Ok(value) => value
            .trim()
            .parse::<T>()
            .map_err(|err| anyhow::anyhow!("{}", err))
            .with_context(|| format!("parsing {} value `{}`", key, value)),
        Err(env::VarError::NotPresent) => Ok(default),
        Err(err) => Err(err).with_context(|| format!("reading {}", key)),
    }
}

fn env_string(name: &str, default: &str) -> String {
    env::var(format!("VISION_GALLERY_{}", name)).unwrap_or_else(|_| default.into())
}

fn env_optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and the
    /// one-shot flags.
    pub fn from_env_and_args() -> Result<(Self, Args)> {
        let args = Args::parse();
        let cfg = Self::from_env_with(&args)?;
        Ok((cfg, args))
    }

    /// Merge `args` over the environment over defaults.
    pub fn from_env_with(args: &Args) -> Result<Self> {
        // --- Environment fallback ---
        let env_port = env_parsed("PORT", 3000u16)?;
        let env_backend = env_parsed("BACKEND", BackendKind::Local)?;
        let env_cap = env_parsed("RETENTION_CAP", DEFAULT_CAP)?;

        // --- Merge ---
        let host = args.host.clone().unwrap_or_else(|| env_string("HOST", "0.0.0.0"));
        let port = args.port.unwrap_or(env_port);
        let public_base_url = env::var("VISION_GALLERY_PUBLIC_BASE_URL").unwrap_or_else(|_| {
            let public_host = if host == "0.0.0.0" { "localhost" } else { host.as_str() };
            format!("http://{}:{}", public_host, port)
        });

        let cfg = Self {
            backend: args.backend.unwrap_or(env_backend),
            bucket: args
                .bucket
                .clone()
                .unwrap_or_else(|| env_string("BUCKET", "education-images")),
            folder: env_string("FOLDER", "generated"),
            object_prefix: env_string("OBJECT_PREFIX", "ai-vision"),
            table: env_string("TABLE", "generated_images"),
            retention_cap: args.retention_cap.unwrap_or(env_cap),
            page_size: env_parsed("PAGE_SIZE", DEFAULT_PAGE_SIZE)?,
            delete_batch_size: env_parsed("DELETE_BATCH_SIZE", DEFAULT_DELETE_BATCH)?,
            storage_dir: args
                .storage_dir
                .clone()
                .unwrap_or_else(|| env_string("STORAGE_DIR", "./data/objects")),
            database_url: args.database_url.clone().unwrap_or_else(|| {
                env_string("DATABASE_URL", "sqlite://./data/meta/vision_gallery.db")
            }),
            public_base_url,
            supabase_url: env_optional("SUPABASE_URL"),
            supabase_service_key: env_optional("SUPABASE_SERVICE_ROLE_KEY"),
            openai_api_key: env_optional("OPENAI_API_KEY"),
            openai_base_url: env_string("OPENAI_BASE_URL", "https://api.openai.com"),
            image_model: env_string("IMAGE_MODEL", "gpt-image-1"),
            host,
            port,
        };
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<()> {
        if self.page_size == 0 {
            bail!("VISION_GALLERY_PAGE_SIZE must be at least 1");
        }
        if self.delete_batch_size == 0 {
            bail!("VISION_GALLERY_DELETE_BATCH_SIZE must be at least 1");
        }
        if self.bucket.trim().is_empty() {
            bail!("bucket name must not be empty");
        }
        Ok(())
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn retention_options(&self) -> RetentionOptions {
        RetentionOptions {
            cap: self.retention_cap,
            page_size: self.page_size,
            delete_batch_size: self.delete_batch_size,
            tracked_only: true,
        }
    }

    /// Supabase project URL and service key, both required for that backend.
    pub fn supabase_credentials(&self) -> Result<(&str, &str)> {
        let url = self
            .supabase_url
            .as_deref()
            .context("SUPABASE_URL is not set")?;
        let key = self
            .supabase_service_key
            .as_deref()
            .context("SUPABASE_SERVICE_ROLE_KEY is not set")?;
        Ok((url, key))
    }
}
