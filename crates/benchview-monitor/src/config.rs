use crate::arbiter::ArbiterConfig;
use benchview_core::JobStatus;
use clap::Parser;
use std::time::Duration;
use thiserror::Error;
use url::Url;

#[derive(Parser, Debug, Clone)]
#[command(name = "benchview-monitor", about = "Live timeline view for benchmark runs")]
pub struct Args {
    #[arg(long = "job", env = "BENCHVIEW_JOBS", value_delimiter = ',')]
    pub jobs: Vec<String>,
    #[arg(long, env = "BENCHVIEW_API_BASE", default_value = "http://127.0.0.1:8080")]
    pub api_base: String,
    #[arg(long, env = "BENCHVIEW_PUSH_URL", default_value = "")]
    pub push_url: String,
    #[arg(long, env = "BENCHVIEW_JOB_STATUS", default_value = "")]
    pub job_status: String,
    #[arg(long, env = "BENCHVIEW_FAST_POLL_SECS", default_value_t = 2)]
    pub fast_poll_secs: u64,
    #[arg(long, env = "BENCHVIEW_PUSH_LIVE_POLL_SECS", default_value_t = 15)]
    pub push_live_poll_secs: u64,
    #[arg(long, env = "BENCHVIEW_JOB_STATUS_POLL_SECS", default_value_t = 5)]
    pub job_status_poll_secs: u64,
    #[arg(long, env = "BENCHVIEW_CACHE_TTL_MS", default_value_t = 1000)]
    pub cache_ttl_ms: u64,
    #[arg(long, env = "BENCHVIEW_REQUEST_TIMEOUT_SECS", default_value_t = 10)]
    pub request_timeout_secs: u64,
    #[arg(long, env = "BENCHVIEW_MIN_CELL_WIDTH", default_value_t = 24)]
    pub min_cell_width: u16,
    #[arg(long, env = "BENCHVIEW_CLIENT_ID", default_value = "")]
    pub client_id: String,
    #[arg(long, env = "BENCHVIEW_LOG_DIR", default_value = "")]
    pub log_dir: String,
    #[arg(long, default_value_t = false)]
    pub debug: bool,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("at least one --job is required")]
    NoJobs,
    #[error("invalid push url '{raw}': {reason}")]
    InvalidPushUrl { raw: String, reason: String },
    #[error("push url must use ws or wss, got '{0}'")]
    UnsupportedPushScheme(String),
    #[error("{0} must be greater than zero")]
    ZeroInterval(&'static str),
}

#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub jobs: Vec<String>,
    pub api_base: String,
    pub push_url: Option<Url>,
    pub fixed_job_status: Option<JobStatus>,
    pub arbiter: ArbiterConfig,
    pub job_status_poll: Duration,
    pub cache_ttl: Duration,
    pub request_timeout: Duration,
    pub min_cell_width: u16,
    pub client_id: String,
    pub log_dir: String,
    pub log_stdout: bool,
    pub debug: bool,
}

impl MonitorConfig {
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_args(Args::parse())
    }

    pub fn from_args(args: Args) -> Result<Self, ConfigError> {
        let jobs: Vec<String> = args
            .jobs
            .iter()
            .map(|job| job.trim())
            .filter(|job| !job.is_empty())
            .map(str::to_string)
            .collect();
        if jobs.is_empty() {
            return Err(ConfigError::NoJobs);
        }
        for (name, value) in [
            ("fast poll interval", args.fast_poll_secs),
            ("push-live poll interval", args.push_live_poll_secs),
            ("job status poll interval", args.job_status_poll_secs),
            ("request timeout", args.request_timeout_secs),
        ] {
            if value == 0 {
                return Err(ConfigError::ZeroInterval(name));
            }
        }

        Ok(Self {
            jobs,
            api_base: args.api_base.trim().to_string(),
            push_url: parse_push_url(&args.push_url)?,
            fixed_job_status: non_empty(&args.job_status).map(JobStatus::from),
            arbiter: ArbiterConfig {
                fast_poll: Duration::from_secs(args.fast_poll_secs),
                push_live_poll: Duration::from_secs(args.push_live_poll_secs),
            },
            job_status_poll: Duration::from_secs(args.job_status_poll_secs),
            cache_ttl: Duration::from_millis(args.cache_ttl_ms),
            request_timeout: Duration::from_secs(args.request_timeout_secs),
            min_cell_width: args.min_cell_width.max(1),
            client_id: non_empty(&args.client_id)
                .map(str::to_string)
                .unwrap_or_else(|| format!("benchview-{}", std::process::id())),
            log_dir: args.log_dir.trim().to_string(),
            log_stdout: env_true("BENCHVIEW_LOG_STDOUT"),
            debug: args.debug || env_true("BENCHVIEW_DEBUG"),
        })
    }
}

fn non_empty(value: &str) -> Option<&str> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then_some(trimmed)
}

fn parse_push_url(raw: &str) -> Result<Option<Url>, ConfigError> {
    let Some(raw) = non_empty(raw) else {
        return Ok(None);
    };
    let url = Url::parse(raw).map_err(|err| ConfigError::InvalidPushUrl {
        raw: raw.to_string(),
        reason: err.to_string(),
    })?;
    match url.scheme() {
        "ws" | "wss" => Ok(Some(url)),
        other => Err(ConfigError::UnsupportedPushScheme(other.to_string())),
    }
}

pub fn env_true(key: &str) -> bool {
    match std::env::var(key) {
        Ok(value) => matches!(
            value.trim().to_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        ),
        Err(_) => false,
    }
}
