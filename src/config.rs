use anyhow::{Context, Result};
use clap::Parser;
use std::env;

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub hostname: String,
    pub directory: String,
    pub silent: bool,
    pub key: Option<String>,
    pub cert: Option<String>,
    pub cors: Option<String>,
    pub index_document: Option<String>,
    pub error_document: Option<String>,
    pub remove_buckets_on_close: bool,
    pub virtual_host_suffix: Option<String>,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug)]
#[command(author, version, about = "Local S3-compatible object storage emulator")]
pub struct Args {
    /// Host to bind to (overrides OBJECT_STORE_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides OBJECT_STORE_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Directory where objects and their metadata are stored (overrides OBJECT_STORE_DIRECTORY)
    #[arg(long)]
    pub directory: Option<String>,

    /// Suppress request logging
    #[arg(long)]
    pub silent: bool,

    /// Path to a TLS private key; serve HTTPS when combined with --cert
    #[arg(long)]
    pub key: Option<String>,

    /// Path to a TLS certificate; serve HTTPS when combined with --key
    #[arg(long)]
    pub cert: Option<String>,

    /// Path to a CORS configuration XML document applied server-wide
    #[arg(long)]
    pub cors: Option<String>,

    /// Server-wide static-website index document name
    #[arg(long)]
    pub index_document: Option<String>,

    /// Server-wide static-website error document name
    #[arg(long)]
    pub error_document: Option<String>,

    /// Empty the data directory on clean shutdown
    #[arg(long)]
    pub remove_buckets_on_close: bool,

    /// Domain suffix used to recognize virtual-hosted-style bucket requests
    #[arg(long)]
    pub virtual_host_suffix: Option<String>,
}

impl AppConfig {
    /// Merge environment variables and CLI arguments into a resolved config.
    /// CLI flags take precedence over environment variables, which take
    /// precedence over hard defaults.
    pub fn from_env_and_args() -> Result<Self> {
        let args = Args::parse();

        let env_host = env::var("OBJECT_STORE_HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let env_port = match env::var("OBJECT_STORE_PORT") {
            Ok(value) => value
                .parse::<u16>()
                .with_context(|| format!("parsing OBJECT_STORE_PORT value `{}`", value))?,
            Err(env::VarError::NotPresent) => 3000,
            Err(err) => return Err(err).context("reading OBJECT_STORE_PORT"),
        };
        let env_directory =
            env::var("OBJECT_STORE_DIRECTORY").unwrap_or_else(|_| "./data".into());

        let host = args.host.unwrap_or(env_host);
        let port = args.port.unwrap_or(env_port);

        Ok(Self {
            hostname: host.clone(),
            host,
            port,
            directory: args.directory.unwrap_or(env_directory),
            silent: args.silent || env::var("OBJECT_STORE_SILENT").is_ok(),
            key: args.key.or_else(|| env::var("OBJECT_STORE_TLS_KEY").ok()),
            cert: args.cert.or_else(|| env::var("OBJECT_STORE_TLS_CERT").ok()),
            cors: args.cors.or_else(|| env::var("OBJECT_STORE_CORS").ok()),
            index_document: args
                .index_document
                .or_else(|| env::var("OBJECT_STORE_INDEX_DOCUMENT").ok()),
            error_document: args
                .error_document
                .or_else(|| env::var("OBJECT_STORE_ERROR_DOCUMENT").ok()),
            remove_buckets_on_close: args.remove_buckets_on_close
                || env::var("OBJECT_STORE_REMOVE_BUCKETS_ON_CLOSE").is_ok(),
            virtual_host_suffix: args
                .virtual_host_suffix
                .or_else(|| env::var("OBJECT_STORE_VIRTUAL_HOST_SUFFIX").ok()),
        })
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
