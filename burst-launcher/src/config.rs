//! Launcher tuning
//!
//! Defines the timing and retry knobs of a launch: polling intervals,
//! startup and job deadlines, and the retry budgets of log collection and
//! cluster teardown. What job to run comes from the command line instead.

use std::time::Duration;

/// Launcher configuration
///
/// All timeouts and intervals are configurable to allow tuning for
/// different clusters (a local kind cluster vs a freshly created GKE one).
#[derive(Debug, Clone)]
pub struct Config {
    /// How often pods are listed while watching a MiniCluster
    pub poll_interval: Duration,

    /// How long the expected pods may take to appear and start
    pub startup_timeout: Duration,

    /// Overall deadline for the job, measured from submission
    pub job_timeout: Duration,

    /// How long a created cluster may take to become ready
    pub provision_timeout: Duration,

    /// How often the provider is asked about a cluster being created
    pub provision_poll_interval: Duration,

    /// Retries for a pod log fetch that failed transiently
    pub log_retries: u32,

    /// First delay between log fetch retries (doubled each time)
    pub log_retry_backoff: Duration,

    /// Attempts at destroying an owned cluster
    pub destroy_retries: u32,

    /// Consecutive failed pod listings tolerated before the watch gives up
    pub max_poll_failures: u32,

    /// How long log streams may run on once the watch has ended
    pub collect_grace: Duration,

    /// Per-request timeout of the GKE, metadata server and manifest fetches
    pub http_timeout: Duration,
}

impl Config {
    /// Creates a new configuration with defaults
    pub fn new() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            startup_timeout: Duration::from_secs(600), // 10 minutes
            job_timeout: Duration::from_secs(3600),    // 1 hour
            provision_timeout: Duration::from_secs(1800),
            provision_poll_interval: Duration::from_secs(15),
            log_retries: 5,
            log_retry_backoff: Duration::from_millis(1000),
            destroy_retries: 3,
            max_poll_failures: 5,
            collect_grace: Duration::from_secs(30),
            http_timeout: Duration::from_secs(60),
        }
    }

    /// Creates configuration from environment variables
    ///
    /// Every variable is optional:
    /// - BURST_POLL_INTERVAL (seconds, default: 5)
    /// - BURST_STARTUP_TIMEOUT (seconds, default: 600)
    /// - BURST_JOB_TIMEOUT (seconds, default: 3600)
    /// - BURST_PROVISION_TIMEOUT (seconds, default: 1800)
    /// - BURST_PROVISION_POLL_INTERVAL (seconds, default: 15)
    /// - BURST_LOG_RETRIES (default: 5)
    /// - BURST_LOG_RETRY_BACKOFF_MS (milliseconds, default: 1000)
    /// - BURST_DESTROY_RETRIES (default: 3)
    /// - BURST_MAX_POLL_FAILURES (default: 5)
    /// - BURST_COLLECT_GRACE (seconds, default: 30)
    /// - BURST_HTTP_TIMEOUT (seconds, default: 60)
    ///
    /// A variable that is set but does not parse is an error rather than a
    /// silent fallback.
    pub fn from_env() -> anyhow::Result<Self> {
        let defaults = Self::new();

        Ok(Self {
            poll_interval: env_secs("BURST_POLL_INTERVAL")?.unwrap_or(defaults.poll_interval),
            startup_timeout: env_secs("BURST_STARTUP_TIMEOUT")?
                .unwrap_or(defaults.startup_timeout),
            job_timeout: env_secs("BURST_JOB_TIMEOUT")?.unwrap_or(defaults.job_timeout),
            provision_timeout: env_secs("BURST_PROVISION_TIMEOUT")?
                .unwrap_or(defaults.provision_timeout),
            provision_poll_interval: env_secs("BURST_PROVISION_POLL_INTERVAL")?
                .unwrap_or(defaults.provision_poll_interval),
            log_retries: env_parse("BURST_LOG_RETRIES")?.unwrap_or(defaults.log_retries),
            log_retry_backoff: env_parse::<u64>("BURST_LOG_RETRY_BACKOFF_MS")?
                .map(Duration::from_millis)
                .unwrap_or(defaults.log_retry_backoff),
            destroy_retries: env_parse("BURST_DESTROY_RETRIES")?
                .unwrap_or(defaults.destroy_retries),
            max_poll_failures: env_parse("BURST_MAX_POLL_FAILURES")?
                .unwrap_or(defaults.max_poll_failures),
            collect_grace: env_secs("BURST_COLLECT_GRACE")?.unwrap_or(defaults.collect_grace),
            http_timeout: env_secs("BURST_HTTP_TIMEOUT")?.unwrap_or(defaults.http_timeout),
        })
    }

    /// Validates the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.poll_interval.is_zero() {
            anyhow::bail!("poll_interval must be greater than 0");
        }

        if self.provision_poll_interval.is_zero() {
            anyhow::bail!("provision_poll_interval must be greater than 0");
        }

        if self.startup_timeout.is_zero() || self.job_timeout.is_zero() {
            anyhow::bail!("startup_timeout and job_timeout must be greater than 0");
        }

        if self.startup_timeout > self.job_timeout {
            anyhow::bail!(
                "startup_timeout ({:?}) cannot exceed job_timeout ({:?})",
                self.startup_timeout,
                self.job_timeout
            );
        }

        if self.http_timeout.is_zero() {
            anyhow::bail!("http_timeout must be greater than 0");
        }

        if self.destroy_retries == 0 {
            anyhow::bail!("destroy_retries must be at least 1");
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> anyhow::Result<Option<T>> {
    match std::env::var(name) {
        Ok(value) => value
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| anyhow::anyhow!("{} has an invalid value: {:?}", name, value)),
        Err(_) => Ok(None),
    }
}

fn env_secs(name: &str) -> anyhow::Result<Option<Duration>> {
    Ok(env_parse::<u64>(name)?.map(Duration::from_secs))
}
