use std::path::PathBuf;
use std::time::Duration;

use audioforma_cloud::SupabaseConfig;
use audioforma_core::artifacts::ArtifactSet;
use audioforma_core::progress::ProgressSettings;
use audioforma_core::validation::DurationPolicy;
use audioforma_db::StoreConfig;
use audioforma_pipeline::OrchestratorSettings;
use audioforma_separator::DemucsConfig;

/// Server configuration loaded from environment variables.
///
/// All fields have defaults suitable for local development. Invalid values
/// panic at startup.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `8000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS`.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    /// Bound on draining running jobs at shutdown (default: `30`).
    pub shutdown_timeout_secs: u64,
    /// Request body limit for uploads (default: 200 MiB).
    pub max_upload_bytes: usize,
    /// Root directory holding one workspace per job.
    pub workspace_dir: PathBuf,
    /// Interval of the stale-workspace sweep (default: `900`).
    pub sweep_interval_secs: u64,
    /// ffprobe executable.
    pub ffprobe_program: String,
    pub store: StoreConfig,
    pub demucs: DemucsConfig,
    pub orchestrator: OrchestratorSettings,
    /// Blob store, enabled only when all three Supabase variables are set.
    pub supabase: Option<SupabaseConfig>,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                     | Default                                       |
    /// |-----------------------------|-----------------------------------------------|
    /// | `HOST`                      | `0.0.0.0`                                     |
    /// | `PORT`                      | `8000`                                        |
    /// | `CORS_ORIGINS`              | `http://localhost:5173,http://localhost:3000` |
    /// | `REQUEST_TIMEOUT_SECS`      | `30`                                          |
    /// | `SHUTDOWN_TIMEOUT_SECS`     | `30`                                          |
    /// | `MAX_UPLOAD_BYTES`          | `209715200`                                   |
    /// | `WORKSPACE_DIR`             | `temp`                                        |
    /// | `STATUS_STORE`              | `file` (`file`, `memory`, `postgres`)         |
    /// | `JOBS_DIR`                  | `jobs`                                        |
    /// | `DATABASE_URL`              | required for `postgres`                       |
    /// | `DATABASE_MAX_CONNECTIONS`  | `10`                                          |
    /// | `MIN_DURATION_SECS`         | `29`                                          |
    /// | `MAX_DURATION_SECS`         | `900`                                         |
    /// | `RESULT_RETENTION_SECS`     | `3600`                                        |
    /// | `ERROR_RETENTION_SECS`      | `0`                                           |
    /// | `SWEEP_INTERVAL_SECS`       | `900`                                         |
    /// | `PROCESSING_TIMEOUT_SECS`   | unset                                         |
    /// | `DEMUCS_PROGRAM`            | `python3`                                     |
    /// | `DEMUCS_ARGS`               | `-m demucs.separate`                          |
    /// | `DEMUCS_MODEL`              | `mdx_extra`                                   |
    /// | `FFPROBE_PROGRAM`           | `ffprobe`                                     |
    /// | `SUPABASE_URL`, `SUPABASE_SERVICE_ROLE_KEY`, `SUPABASE_BUCKET` | unset  |
    pub fn from_env() -> Self {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());

        let port: u16 = std::env::var("PORT")
            .unwrap_or_else(|_| "8000".into())
            .parse()
            .expect("PORT must be a valid u16");

        let cors_origins: Vec<String> = std::env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:5173,http://localhost:3000".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let request_timeout_secs: u64 = parse_var("REQUEST_TIMEOUT_SECS", "30");
        let shutdown_timeout_secs: u64 = parse_var("SHUTDOWN_TIMEOUT_SECS", "30");
        let max_upload_bytes: usize = parse_var("MAX_UPLOAD_BYTES", "209715200");
        let sweep_interval_secs: u64 = parse_var("SWEEP_INTERVAL_SECS", "900");
        assert!(sweep_interval_secs > 0, "SWEEP_INTERVAL_SECS must be positive");

        let workspace_dir =
            PathBuf::from(std::env::var("WORKSPACE_DIR").unwrap_or_else(|_| "temp".into()));

        let store = store_from_env();

        let min_secs: f64 = parse_var("MIN_DURATION_SECS", "29");
        let max_secs: f64 = parse_var("MAX_DURATION_SECS", "900");
        let duration_policy = DurationPolicy::new(min_secs, max_secs)
            .unwrap_or_else(|e| panic!("MIN_DURATION_SECS/MAX_DURATION_SECS: {e}"));

        let processing_timeout = std::env::var("PROCESSING_TIMEOUT_SECS")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .map(|v| {
                Duration::from_secs(
                    v.trim()
                        .parse()
                        .expect("PROCESSING_TIMEOUT_SECS must be a valid u64"),
                )
            });

        let defaults = DemucsConfig::default();
        let demucs = DemucsConfig {
            program: std::env::var("DEMUCS_PROGRAM").unwrap_or(defaults.program),
            args: std::env::var("DEMUCS_ARGS")
                .map(|v| v.split_whitespace().map(str::to_string).collect())
                .unwrap_or(defaults.args),
            model: std::env::var("DEMUCS_MODEL").unwrap_or(defaults.model),
            timeout: processing_timeout,
            artifacts: ArtifactSet::default(),
        };

        let orchestrator = OrchestratorSettings {
            duration_policy,
            progress: ProgressSettings::default(),
            result_retention: Duration::from_secs(parse_var("RESULT_RETENTION_SECS", "3600")),
            error_retention: Duration::from_secs(parse_var("ERROR_RETENTION_SECS", "0")),
            max_download_bytes: max_upload_bytes as u64,
            ..OrchestratorSettings::default()
        };

        let ffprobe_program =
            std::env::var("FFPROBE_PROGRAM").unwrap_or_else(|_| "ffprobe".into());

        Self {
            host,
            port,
            cors_origins,
            request_timeout_secs,
            shutdown_timeout_secs,
            max_upload_bytes,
            workspace_dir,
            sweep_interval_secs,
            ffprobe_program,
            store,
            demucs,
            orchestrator,
            supabase: supabase_from_env(),
        }
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

fn parse_var<T>(name: &str, default: &str) -> T
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let raw = std::env::var(name).unwrap_or_else(|_| default.to_string());
    raw.trim()
        .parse()
        .unwrap_or_else(|e| panic!("{name} has an invalid value '{raw}': {e}"))
}

fn store_from_env() -> StoreConfig {
    let backend = std::env::var("STATUS_STORE").unwrap_or_else(|_| "file".into());
    match backend.trim() {
        "file" => StoreConfig::File {
            dir: PathBuf::from(std::env::var("JOBS_DIR").unwrap_or_else(|_| "jobs".into())),
        },
        "memory" => StoreConfig::Memory,
        "postgres" => StoreConfig::Postgres {
            database_url: std::env::var("DATABASE_URL")
                .expect("DATABASE_URL must be set when STATUS_STORE=postgres"),
            max_connections: parse_var("DATABASE_MAX_CONNECTIONS", "10"),
        },
        other => panic!("STATUS_STORE must be file, memory or postgres, got '{other}'"),
    }
}

fn supabase_from_env() -> Option<SupabaseConfig> {
    let var = |name: &str| std::env::var(name).ok().filter(|v| !v.trim().is_empty());
    match (
        var("SUPABASE_URL"),
        var("SUPABASE_SERVICE_ROLE_KEY"),
        var("SUPABASE_BUCKET"),
    ) {
        (Some(url), Some(service_role_key), Some(bucket)) => Some(SupabaseConfig {
            url,
            service_role_key,
            bucket,
        }),
        (None, None, None) => None,
        _ => {
            tracing::warn!(
                "Incomplete Supabase configuration, serving artifacts from local disk"
            );
            None
        }
    }
}
