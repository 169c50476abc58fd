use anyhow::bail;
use axum::http::HeaderValue;
use clap::{Parser, ValueEnum};
use core::num::NonZeroUsize;
use core::time::Duration;
use offload_core::{dispatch::FANOUT_WIDTH, pool::PoolConfig};
use std::path::PathBuf;

/// Output format of the log subscriber.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Multi-line, human readable.
    Pretty,
    /// One JSON object per event.
    Json,
}

/// Backend of the user store.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    /// SQLite database at `DATABASE_URL`. Records survive restarts.
    Sqlite,
    /// Process-local map. Records are lost on shutdown.
    Memory,
}

/// Runtime configuration for the `offload-server` binary.
///
/// All values are parsed from CLI arguments or environment variables (a
/// `.env` file is loaded first), with defaults matching the reference
/// benchmark workloads.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "offload-server",
    version,
    about = "An HTTP server contrasting blocking, offloaded and parallel CPU work"
)]
pub struct CliArgs {
    /// Address to listen on.
    ///
    /// Environment variable: `SERVER_ADDR`
    #[arg(long, env = "SERVER_ADDR", default_value_t = String::from("0.0.0.0:3000"))]
    pub server_addr: String,

    /// Maximum number of live worker threads across all requests.
    ///
    /// A parallel request needs four workers at once, so the value must be at
    /// least four. Requests wait for capacity when the cap is reached.
    ///
    /// Environment variable: `MAX_WORKERS`
    #[arg(long, env = "MAX_WORKERS", default_value_t = 256)]
    pub max_workers: usize,

    /// Deadline, in milliseconds, for collecting offloaded results. Unset
    /// means no deadline.
    ///
    /// Environment variable: `WORKER_TIMEOUT_MS`
    #[arg(long, env = "WORKER_TIMEOUT_MS")]
    pub worker_timeout_ms: Option<u64>,

    /// File served by `/video-serving`.
    ///
    /// Environment variable: `VIDEO_PATH`
    #[arg(long, env = "VIDEO_PATH", default_value = "resources/video.mp4")]
    pub video_path: PathBuf,

    /// `Content-Type` sent with the video.
    ///
    /// Environment variable: `VIDEO_CONTENT_TYPE`
    #[arg(long, env = "VIDEO_CONTENT_TYPE", default_value_t = String::from("video/mp4"))]
    pub video_content_type: String,

    /// Size of the read window used while streaming the video.
    ///
    /// Environment variable: `STREAM_CHUNK_BYTES`
    #[arg(long, env = "STREAM_CHUNK_BYTES", default_value_t = 64 * 1024)]
    pub stream_chunk_bytes: usize,

    /// Random `f64`s allocated per unit of the `/memory-intensive` multiplier.
    ///
    /// Environment variable: `MEMORY_ELEMENTS_PER_UNIT`
    #[arg(long, env = "MEMORY_ELEMENTS_PER_UNIT", default_value_t = 10_000_000)]
    pub memory_elements_per_unit: usize,

    /// Objects generated per unit of the `/json-processing` multiplier.
    ///
    /// Environment variable: `JSON_ELEMENTS_PER_UNIT`
    #[arg(long, env = "JSON_ELEMENTS_PER_UNIT", default_value_t = 100_000)]
    pub json_elements_per_unit: usize,

    /// Backend of the user store.
    ///
    /// Environment variable: `USER_STORE`
    #[arg(long, env = "USER_STORE", value_enum, default_value_t = StoreBackend::Sqlite)]
    pub user_store: StoreBackend,

    /// SQLite connection URL of the user store. The file is created if it
    /// does not exist.
    ///
    /// Environment variable: `DATABASE_URL`
    #[arg(long, env = "DATABASE_URL", default_value_t = String::from("sqlite://db.sqlite"))]
    pub database_url: String,

    /// Size of the user store's connection pool.
    ///
    /// Environment variable: `DATABASE_MAX_CONNECTIONS`
    #[arg(long, env = "DATABASE_MAX_CONNECTIONS", default_value_t = 5)]
    pub database_max_connections: u32,

    /// Seconds to wait for live workers to exit on shutdown.
    ///
    /// Environment variable: `SHUTDOWN_TIMEOUT`
    #[arg(long, env = "SHUTDOWN_TIMEOUT", default_value_t = 3)]
    pub shutdown_timeout: u64,

    /// Log output format.
    ///
    /// Environment variable: `LOG_FORMAT`
    #[arg(long, env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Pretty)]
    pub log_format: LogFormat,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub server_addr: String,
    pub pool: PoolConfig,
    pub worker_timeout: Option<Duration>,
    pub video_path: PathBuf,
    pub video_content_type: HeaderValue,
    pub stream_chunk_bytes: usize,
    pub memory_elements_per_unit: usize,
    pub json_elements_per_unit: usize,
    pub user_store: StoreBackend,
    pub database_url: String,
    pub database_max_connections: u32,
    pub log_format: LogFormat,
}

impl TryFrom<CliArgs> for ServerConfig {
    type Error = anyhow::Error;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        if args.max_workers < FANOUT_WIDTH {
            bail!(
                "MAX_WORKERS ({}) must be at least {FANOUT_WIDTH} to serve parallel requests",
                args.max_workers
            );
        }

        if args.stream_chunk_bytes == 0 {
            bail!("STREAM_CHUNK_BYTES must be greater than 0");
        }

        if args.worker_timeout_ms == Some(0) {
            bail!("WORKER_TIMEOUT_MS must be greater than 0 when set");
        }

        if args.database_max_connections == 0 {
            bail!("DATABASE_MAX_CONNECTIONS must be greater than 0");
        }

        let Ok(video_content_type) = HeaderValue::from_str(&args.video_content_type) else {
            bail!(
                "VIDEO_CONTENT_TYPE ({:?}) is not a valid header value",
                args.video_content_type
            );
        };

        Ok(Self {
            server_addr: args.server_addr,
            pool: PoolConfig {
                max_workers: NonZeroUsize::new(args.max_workers),
                shutdown_timeout: Duration::from_secs(args.shutdown_timeout),
            },
            worker_timeout: args.worker_timeout_ms.map(Duration::from_millis),
            video_path: args.video_path,
            video_content_type,
            stream_chunk_bytes: args.stream_chunk_bytes,
            memory_elements_per_unit: args.memory_elements_per_unit,
            json_elements_per_unit: args.json_elements_per_unit,
            user_store: args.user_store,
            database_url: args.database_url,
            database_max_connections: args.database_max_connections,
            log_format: args.log_format,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(extra: &[&str]) -> CliArgs {
        CliArgs::parse_from(std::iter::once("offload-server").chain(extra.iter().copied()))
    }

    #[test]
    fn explicit_flags_are_applied() {
        let config = ServerConfig::try_from(args(&[
            "--server-addr",
            "127.0.0.1:8080",
            "--max-workers",
            "8",
            "--worker-timeout-ms",
            "250",
            "--video-path",
            "/tmp/clip.mp4",
            "--log-format",
            "json",
            "--user-store",
            "memory",
            "--database-url",
            "sqlite:///var/lib/offload/users.db",
        ]))
        .unwrap();

        assert_eq!(config.server_addr, "127.0.0.1:8080");
        assert_eq!(config.pool.max_workers, NonZeroUsize::new(8));
        assert_eq!(config.worker_timeout, Some(Duration::from_millis(250)));
        assert_eq!(config.video_path, PathBuf::from("/tmp/clip.mp4"));
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.user_store, StoreBackend::Memory);
        assert_eq!(config.database_url, "sqlite:///var/lib/offload/users.db");
    }

    #[test]
    fn store_defaults_to_sqlite() {
        let config = ServerConfig::try_from(args(&[])).unwrap();
        assert_eq!(config.user_store, StoreBackend::Sqlite);
        assert_eq!(config.database_max_connections, 5);
        assert!(ServerConfig::try_from(args(&["--database-max-connections", "0"])).is_err());
    }

    #[test]
    fn cap_below_fanout_width_is_rejected() {
        let err = ServerConfig::try_from(args(&["--max-workers", "3"])).unwrap_err();
        assert!(err.to_string().contains("MAX_WORKERS"));
    }

    #[test]
    fn zero_chunk_and_zero_timeout_are_rejected() {
        assert!(ServerConfig::try_from(args(&["--stream-chunk-bytes", "0"])).is_err());
        assert!(ServerConfig::try_from(args(&["--worker-timeout-ms", "0"])).is_err());
    }

    #[test]
    fn invalid_content_type_is_rejected() {
        let err =
            ServerConfig::try_from(args(&["--video-content-type", "video/mp4\n"])).unwrap_err();
        assert!(err.to_string().contains("VIDEO_CONTENT_TYPE"));
    }
}
