#![forbid(unsafe_code)]
#![warn(missing_docs)]
//! Runtime configuration shared by the dispatcher, the scanner and the CLI.
//!
//! A [`LedgerConfig`] is built once at startup (usually from command line flags) and
//! then handed by reference to whatever needs it.

use std::{
    io::{self, Error, ErrorKind},
    path::{Path, PathBuf},
    time::Duration,
};

use log::LevelFilter;
use log4rs::{
    append::{
        console::ConsoleAppender,
        rolling_file::{
            policy::compound::{
                roll::fixed_window::FixedWindowRoller, trigger::size::SizeTrigger, CompoundPolicy,
            },
            RollingFileAppender,
        },
    },
    config::{Appender, Root},
    encode::pattern::PatternEncoder,
    filter::threshold::ThresholdFilter,
    Config,
};

/// Endpoint used when no `--server` is given.
pub const DEFAULT_ENDPOINT: &str = "https://bhs01.network.gosh.sh";
/// Records requested per feed page.
pub const DEFAULT_PAGE_SIZE: u32 = 50;
/// Pause between two feed page requests.
pub const DEFAULT_PAGE_DELAY: Duration = Duration::from_millis(300);
/// How long one message may wait for finalization before it is reported as expired.
pub const DEFAULT_MESSAGE_TIMEOUT: Duration = Duration::from_secs(120);
/// Number of confirmation trackers allowed to run at once.
pub const DEFAULT_CONCURRENCY_LIMIT: usize = 100;
/// File name of the debug log, created inside the data directory.
pub const DEFAULT_LOGFILE_NAME: &str = "ledger-tools.debug.log";
/// Directory name used under the home directory when no data dir is given.
pub const DEFAULT_DATA_DIR_NAME: &str = ".ledger-tools";

/// Errors raised while turning user input into configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The endpoint could not be parsed as a URI.
    #[error("invalid endpoint {endpoint:?}: {reason}")]
    InvalidEndpoint {
        /// what the user passed
        endpoint: String,
        /// parser message
        reason: String,
    },
    /// At least one endpoint is required.
    #[error("no endpoints configured")]
    NoEndpoints,
}

/// Builds an endpoint URI from user input.
///
/// A missing scheme defaults to `https://`. `None` gives [`DEFAULT_ENDPOINT`].
pub fn construct_endpoint_uri(server: Option<String>) -> Result<http::Uri, ConfigError> {
    let s = match server {
        Some(s) => {
            let s = s.trim().trim_end_matches('/').to_string();
            if s.starts_with("http") {
                s
            } else {
                "https://".to_string() + &s
            }
        }
        None => DEFAULT_ENDPOINT.to_string(),
    };
    s.parse::<http::Uri>()
        .map_err(|e| ConfigError::InvalidEndpoint {
            endpoint: s.clone(),
            reason: e.to_string(),
        })
}

/// Configuration data needed to talk to the network and to run batches and scans.
#[derive(Clone, Debug)]
pub struct LedgerConfig {
    /// Endpoints of the ledger network, queried in order.
    pub endpoints: Vec<http::Uri>,
    /// How many of `endpoints` a message is sent to.
    pub sending_endpoint_count: usize,
    /// The directory where logfiles will be created. Defaults to `~/.ledger-tools`.
    pub data_dir: Option<PathBuf>,
    /// The filename of the logfile. This will be created in the `data_dir`.
    pub logfile_name: PathBuf,
    /// Feed page size for scans.
    pub page_size: u32,
    /// Pause between scan pages.
    pub page_delay: Duration,
    /// Per message confirmation timeout.
    pub message_timeout: Duration,
    /// Global concurrency budget for the dispatcher.
    pub concurrency_limit: usize,
    /// Lets the feed answer from blocks that are not yet finalized.
    pub allow_latest_inconsistent_data: bool,
}

impl LedgerConfig {
    /// Config for the given endpoints with every tunable at its default.
    pub fn new(endpoints: Vec<http::Uri>) -> Result<Self, ConfigError> {
        if endpoints.is_empty() {
            return Err(ConfigError::NoEndpoints);
        }
        let sending_endpoint_count = endpoints.len();
        Ok(LedgerConfig {
            endpoints,
            sending_endpoint_count,
            data_dir: None,
            logfile_name: DEFAULT_LOGFILE_NAME.into(),
            page_size: DEFAULT_PAGE_SIZE,
            page_delay: DEFAULT_PAGE_DELAY,
            message_timeout: DEFAULT_MESSAGE_TIMEOUT,
            concurrency_limit: DEFAULT_CONCURRENCY_LIMIT,
            allow_latest_inconsistent_data: false,
        })
    }

    /// Create an unconnected (to any server) config, for tests and offline tools.
    pub fn create_unconnected(dir: Option<PathBuf>) -> LedgerConfig {
        LedgerConfig {
            endpoints: vec![http::Uri::default()],
            sending_endpoint_count: 1,
            data_dir: dir,
            logfile_name: DEFAULT_LOGFILE_NAME.into(),
            page_size: DEFAULT_PAGE_SIZE,
            page_delay: DEFAULT_PAGE_DELAY,
            message_timeout: DEFAULT_MESSAGE_TIMEOUT,
            concurrency_limit: DEFAULT_CONCURRENCY_LIMIT,
            allow_latest_inconsistent_data: false,
        }
    }

    /// Set the data directory from a path string.
    pub fn set_data_dir(&mut self, dir_str: String) {
        self.data_dir = Some(PathBuf::from(dir_str));
    }

    /// Resolves (and creates) the data directory.
    pub fn get_data_dir(&self) -> io::Result<Box<Path>> {
        let location = match &self.data_dir {
            Some(dir) => dir.clone(),
            None => {
                let mut home = dirs::home_dir().ok_or_else(|| {
                    log::info!("Couldn't determine home dir!");
                    Error::new(ErrorKind::NotFound, "Couldn't determine home directory")
                })?;
                home.push(DEFAULT_DATA_DIR_NAME);
                home
            }
        };
        std::fs::create_dir_all(&location)?;
        Ok(location.into_boxed_path())
    }

    /// Path of the debug log.
    pub fn get_log_path(&self) -> io::Result<Box<Path>> {
        let mut log_path = self.get_data_dir()?.into_path_buf();
        log_path.push(&self.logfile_name);
        Ok(log_path.into_boxed_path())
    }

    /// Build the Logging config
    pub fn get_log_config(&self) -> io::Result<Config> {
        let window_size = 3; // log0, log1, log2
        let fixed_window_roller = FixedWindowRoller::builder()
            .build(
                &format!("{}{{}}", self.get_log_path()?.to_string_lossy()),
                window_size,
            )
            .map_err(|e| Error::new(ErrorKind::Other, format!("{}", e)))?;
        let size_limit = 5 * 1024 * 1024; // 5MB as max log file size to roll
        let size_trigger = SizeTrigger::new(size_limit);
        let compound_policy =
            CompoundPolicy::new(Box::new(size_trigger), Box::new(fixed_window_roller));

        Config::builder()
            .appender(
                Appender::builder()
                    .filter(Box::new(ThresholdFilter::new(LevelFilter::Info)))
                    .build(
                        "logfile",
                        Box::new(
                            RollingFileAppender::builder()
                                .encoder(Box::new(PatternEncoder::new("{d} {l}::{m}{n}")))
                                .build(self.get_log_path()?, Box::new(compound_policy))?,
                        ),
                    ),
            )
            .appender(
                Appender::builder()
                    .filter(Box::new(ThresholdFilter::new(LevelFilter::Info)))
                    .build(
                        "stdout",
                        Box::new(
                            ConsoleAppender::builder()
                                .encoder(Box::new(PatternEncoder::new("{m}{n}")))
                                .build(),
                        ),
                    ),
            )
            .build(
                Root::builder()
                    .appender("logfile")
                    .appender("stdout")
                    .build(LevelFilter::Debug),
            )
            .map_err(|e| Error::new(ErrorKind::Other, format!("{}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(Some("bhs01.network.gosh.sh".to_string()), "https://bhs01.network.gosh.sh/" ; "missing scheme")]
    #[test_case(Some("http://localhost:8080/".to_string()), "http://localhost:8080/" ; "explicit scheme")]
    #[test_case(None, "https://bhs01.network.gosh.sh/" ; "default")]
    fn endpoint_uri(input: Option<String>, expected: &str) {
        let uri = construct_endpoint_uri(input).unwrap();
        assert_eq!(uri.to_string(), expected);
    }

    #[test]
    fn bad_endpoint_is_an_error() {
        assert!(matches!(
            construct_endpoint_uri(Some("http://bad host".to_string())),
            Err(ConfigError::InvalidEndpoint { .. })
        ));
    }

    #[test]
    fn new_requires_endpoints() {
        assert!(matches!(
            LedgerConfig::new(vec![]),
            Err(ConfigError::NoEndpoints)
        ));
    }

    #[test]
    fn new_config_sends_to_every_endpoint() {
        let endpoints = vec![
            construct_endpoint_uri(Some("a.example".to_string())).unwrap(),
            construct_endpoint_uri(Some("b.example".to_string())).unwrap(),
        ];
        let config = LedgerConfig::new(endpoints).unwrap();
        assert_eq!(config.sending_endpoint_count, 2);
    }

    #[test]
    fn log_path_is_inside_data_dir() {
        let dir = tempfile::tempdir().unwrap();
        let config = LedgerConfig::create_unconnected(Some(dir.path().to_path_buf()));
        let log_path = config.get_log_path().unwrap();
        assert!(log_path.starts_with(dir.path()));
        assert!(log_path.ends_with(DEFAULT_LOGFILE_NAME));
        assert!(config.get_log_config().is_ok());
    }
}
