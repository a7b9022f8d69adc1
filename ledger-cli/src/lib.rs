#![forbid(unsafe_code)]
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{self, Arg, ArgAction, ArgMatches};
use ledger_netutils::signer::{KeyPairSigner, SigningError};
use ledger_netutils::{
    Cursor, FetchError, GraphqlConnector, LedgerBoundary, MessageTypeFilter, PageQuery,
};
use ledger_status::progress::LogObserver;
use ledger_sync::{filter_by_function, AbiError, AbiSchema, BodyDecoder, Scanner};
use ledgerconfig::{ConfigError, LedgerConfig};
use ledgerlib::{
    chunk_requests, dispatch_chunks, replay, requests_from_dir, BatchReport, DispatchConfigError,
    DispatchSettings, ReplayBatches, ReplaySettings,
};

pub mod version;

pub fn build_clap_app() -> clap::Command {
    clap::Command::new("Ledger CLI").version(version::VERSION)
        .subcommand_required(true)
        .arg(Arg::new("server")
            .long("server")
            .value_name("server")
            .help("GraphQL endpoint of the network. Repeat to send to several endpoints.")
            .global(true)
            .action(ArgAction::Append))
        .arg(Arg::new("sending-endpoints")
            .long("sending-endpoints")
            .value_name("count")
            .value_parser(clap::value_parser!(usize))
            .global(true)
            .help("How many of the servers each message is sent to. Defaults to all of them."))
        .arg(Arg::new("data-dir")
            .long("data-dir")
            .value_name("data-dir")
            .global(true)
            .help("Absolute path to use as data directory for the debug log"))
        .arg(Arg::new("timeout-secs")
            .long("timeout-secs")
            .value_name("seconds")
            .value_parser(clap::value_parser!(u64))
            .global(true)
            .help("Seconds one message may wait for finalization before it counts as expired"))
        .arg(Arg::new("concurrency")
            .long("concurrency")
            .value_name("count")
            .value_parser(clap::value_parser!(usize))
            .global(true)
            .help("Messages tracked at the same time"))
        .arg(Arg::new("page-size")
            .long("page-size")
            .value_name("count")
            .value_parser(clap::value_parser!(u32))
            .global(true)
            .help("Records per feed page"))
        .subcommand(clap::Command::new("send")
            .about("Submit every payload in a directory and follow each message until it is final")
            .arg(Arg::new("payload-dir")
                .long("payload-dir")
                .value_name("dir")
                .required(true)
                .help("Directory of encoded payloads, one message per file, labelled by file name"))
            .arg(Arg::new("chunk-size")
                .long("chunk-size")
                .value_name("count")
                .value_parser(clap::value_parser!(usize))
                .default_value("0")
                .help("Dispatch the payloads in concurrent groups of this size. 0 sends one group."))
            .arg(Arg::new("interval-ms")
                .long("interval-ms")
                .value_name("millis")
                .value_parser(clap::value_parser!(u64))
                .help("Resend the whole directory on this interval"))
            .arg(Arg::new("count")
                .long("count")
                .value_name("count")
                .value_parser(clap::value_parser!(usize))
                .requires("interval-ms")
                .help("Stop replaying after this many rounds"))
            .arg(Arg::new("secret")
                .long("secret")
                .value_name("hex")
                .help("Hex ed25519 secret key to sign messages with")))
        .subcommand(clap::Command::new("scan")
            .about("Print the message history of an account as JSON, newest first")
            .arg(Arg::new("address")
                .long("address")
                .value_name("address")
                .required(true))
            .arg(Arg::new("msg-type")
                .long("msg-type")
                .value_name("type")
                .value_parser(parse_msg_type)
                .action(ArgAction::Append)
                .help("ExtIn, ExtOut, IntIn or IntOut. Repeat for several. Defaults to all."))
            .arg(Arg::new("all")
                .long("all")
                .action(ArgAction::SetTrue)
                .help("Keep paging until the feed is exhausted"))
            .arg(Arg::new("cursor")
                .long("cursor")
                .value_name("cursor")
                .help("Continue after a cursor printed by an earlier scan"))
            .arg(Arg::new("max-records")
                .long("max-records")
                .value_name("count")
                .value_parser(clap::value_parser!(usize))
                .help("Stop paging once this many records were read"))
            .arg(Arg::new("abi")
                .long("abi")
                .value_name("file")
                .help("ABI JSON used to decode message bodies"))
            .arg(Arg::new("function")
                .long("function")
                .value_name("name")
                .requires("abi")
                .help("Keep only messages that decode to this function or event"))
            .arg(Arg::new("output")
                .long("output")
                .value_name("file")
                .help("Write the JSON here instead of stdout")))
}

fn parse_msg_type(s: &str) -> Result<MessageTypeFilter, String> {
    s.parse::<MessageTypeFilter>()
}

#[allow(missing_docs)] // error types document themselves
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("{0}")]
    Config(#[from] ConfigError),
    #[error("{0}")]
    Dispatch(#[from] DispatchConfigError),
    #[error("bad secret key: {0}")]
    Signing(#[from] SigningError),
    #[error("{0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Abi(#[from] AbiError),
    #[error("scan failed: {0}")]
    Fetch(#[from] FetchError),
    #[error("could not write json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("no command given")]
    MissingCommand,
}

/// Arguments of `send`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SendArgs {
    pub payload_dir: PathBuf,
    pub chunk_size: usize,
    pub interval: Option<Duration>,
    pub count: Option<usize>,
    pub secret: Option<String>,
}

/// Arguments of `scan`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScanArgs {
    pub address: String,
    pub msg_types: Vec<MessageTypeFilter>,
    pub all: bool,
    pub cursor: Option<Cursor>,
    pub max_records: Option<usize>,
    pub abi: Option<PathBuf>,
    pub function: Option<String>,
    pub output: Option<PathBuf>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CliCommand {
    Send(SendArgs),
    Scan(ScanArgs),
}

/// This type turns the parsed command line into a [`LedgerConfig`] plus the command to run.
pub struct ConfigTemplate {
    pub config: LedgerConfig,
    pub command: CliCommand,
}

impl ConfigTemplate {
    pub fn fill(matches: ArgMatches) -> Result<Self, CliError> {
        // global flags are readable from the subcommand wherever they were given
        let (name, sub) = matches.subcommand().ok_or(CliError::MissingCommand)?;
        let endpoints = match sub.get_many::<String>("server") {
            Some(servers) => servers
                .map(|server| ledgerconfig::construct_endpoint_uri(Some(server.clone())))
                .collect::<Result<Vec<_>, _>>()?,
            None => vec![ledgerconfig::construct_endpoint_uri(None)?],
        };
        let mut config = LedgerConfig::new(endpoints)?;
        if let Some(dir) = sub.get_one::<String>("data-dir") {
            config.set_data_dir(dir.clone());
        }
        if let Some(count) = sub.get_one::<usize>("sending-endpoints") {
            config.sending_endpoint_count = *count;
        }
        if let Some(secs) = sub.get_one::<u64>("timeout-secs") {
            config.message_timeout = Duration::from_secs(*secs);
        }
        if let Some(limit) = sub.get_one::<usize>("concurrency") {
            config.concurrency_limit = *limit;
        }
        if let Some(page_size) = sub.get_one::<u32>("page-size") {
            config.page_size = *page_size;
        }

        let command = match name {
            "send" => CliCommand::Send(SendArgs {
                payload_dir: sub
                    .get_one::<String>("payload-dir")
                    .map(PathBuf::from)
                    .unwrap_or_default(),
                chunk_size: sub.get_one::<usize>("chunk-size").copied().unwrap_or(0),
                interval: sub
                    .get_one::<u64>("interval-ms")
                    .map(|millis| Duration::from_millis(*millis)),
                count: sub.get_one::<usize>("count").copied(),
                secret: sub.get_one::<String>("secret").cloned(),
            }),
            "scan" => CliCommand::Scan(ScanArgs {
                address: sub
                    .get_one::<String>("address")
                    .cloned()
                    .unwrap_or_default(),
                msg_types: sub
                    .get_many::<MessageTypeFilter>("msg-type")
                    .map(|types| types.copied().collect())
                    .unwrap_or_default(),
                all: sub.get_flag("all"),
                cursor: sub.get_one::<String>("cursor").cloned().map(Cursor),
                max_records: sub.get_one::<usize>("max-records").copied(),
                abi: sub.get_one::<String>("abi").map(PathBuf::from),
                function: sub.get_one::<String>("function").cloned(),
                output: sub.get_one::<String>("output").map(PathBuf::from),
            }),
            _ => return Err(CliError::MissingCommand),
        };
        log::debug!("Endpoints: {:?}", config.endpoints);
        Ok(ConfigTemplate { config, command })
    }

    fn connector(&self, secret: Option<&str>) -> Result<GraphqlConnector, CliError> {
        let mut connector = GraphqlConnector::new(self.config.endpoints.clone())
            .with_sending_endpoint_count(self.config.sending_endpoint_count);
        if let Some(secret) = secret {
            connector = connector.with_signer(Arc::new(KeyPairSigner::from_hex_secret(secret)?));
        }
        Ok(connector)
    }

    /// Runs the command against the configured endpoints.
    pub async fn run(&self) -> Result<(), CliError> {
        match &self.command {
            CliCommand::Send(args) => {
                let connector = self.connector(args.secret.as_deref())?;
                send(&connector, &self.config, args).await?;
            }
            CliCommand::Scan(args) => {
                let connector = self.connector(None)?;
                let json = scan(&connector, &self.config, args).await?;
                match &args.output {
                    Some(path) => std::fs::write(path, json)?,
                    None => println!("{json}"),
                }
            }
        }
        Ok(())
    }
}

/// Dispatches the payload directory once per chunk set, or repeatedly when an interval
/// is given. Returns the reports of every dispatch, each already logged.
pub async fn send<B: LedgerBoundary>(
    boundary: &B,
    config: &LedgerConfig,
    args: &SendArgs,
) -> Result<Vec<BatchReport>, CliError> {
    let requests = requests_from_dir(&args.payload_dir)?;
    let settings = DispatchSettings::from_config(config)?;
    let observer = LogObserver;

    let Some(interval) = args.interval else {
        let reports = dispatch_chunks(
            boundary,
            chunk_requests(requests, args.chunk_size),
            settings,
            &observer,
        )
        .await;
        for report in &reports {
            report.log();
        }
        if reports.len() > 1 {
            if let Some(combined) = BatchReport::combined_stats(&reports) {
                log::info!("{combined}");
            }
        }
        return Ok(reports);
    };

    let mut rounds = ReplayBatches::new(requests);
    let mut reports = Vec::new();
    replay(
        boundary,
        settings,
        ReplaySettings {
            interval,
            max_invocations: args.count,
        },
        &observer,
        |invocation| rounds.round(invocation),
        |invocation, report| {
            log::info!("Replay {invocation} finished");
            report.log();
            reports.push(report);
        },
    )
    .await;
    Ok(reports)
}

/// Scans the account and renders the kept records as pretty JSON.
pub async fn scan<B: LedgerBoundary>(
    boundary: &B,
    config: &LedgerConfig,
    args: &ScanArgs,
) -> Result<String, CliError> {
    let schema = args.abi.as_ref().map(AbiSchema::from_path).transpose()?;
    let mut query = PageQuery::new(args.address.clone())
        .with_msg_types(args.msg_types.clone())
        .with_page_size(config.page_size);
    query.allow_latest_inconsistent_data = config.allow_latest_inconsistent_data;
    if let Some(max_records) = args.max_records {
        query = query.with_max_records(max_records);
    }

    let decoder = schema.as_ref().map(|schema| schema as &dyn BodyDecoder);
    let result = Scanner::new(boundary)
        .with_page_delay(config.page_delay)
        .scan_from(&query, args.cursor.clone(), decoder, args.all)
        .await?;
    if result.has_more {
        if let Some(cursor) = &result.cursor {
            log::info!("More records before cursor {cursor}");
        }
    }
    let records = match &args.function {
        Some(name) => filter_by_function(result.records, name),
        None => result.records,
    };
    Ok(serde_json::to_string_pretty(&records)?)
}

pub fn run_cli() {
    let template = match ConfigTemplate::fill(build_clap_app().get_matches()) {
        Ok(template) => template,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };
    // Initialize logging
    match template.config.get_log_config() {
        Ok(log_config) => {
            if let Err(e) = log4rs::init_config(log_config) {
                eprintln!("Could not initialize logging: {e}")
            }
        }
        Err(e) => eprintln!("Could not initialize logging: {e}"),
    }
    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Could not start the runtime: {e}");
            std::process::exit(1);
        }
    };
    if let Err(e) = runtime.block_on(template.run()) {
        log::error!("{e}");
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledger_netutils::feed::MSG_TYPE_INTERNAL;
    use ledger_testutils::{Behaviour, MockBoundary, MockFeed};

    fn fill(args: &[&str]) -> Result<ConfigTemplate, CliError> {
        let matches = build_clap_app()
            .try_get_matches_from(std::iter::once("ledger-cli").chain(args.iter().copied()))
            .map_err(|_| CliError::MissingCommand)?;
        ConfigTemplate::fill(matches)
    }

    #[test]
    fn send_flags_fill_config() {
        let template = fill(&[
            "send",
            "--payload-dir",
            "/tmp/payloads",
            "--server",
            "node-a.example.com",
            "--server",
            "node-b.example.com",
            "--sending-endpoints",
            "1",
            "--concurrency",
            "8",
            "--timeout-secs",
            "30",
            "--interval-ms",
            "500",
            "--count",
            "2",
        ])
        .unwrap();

        assert_eq!(template.config.endpoints.len(), 2);
        assert_eq!(template.config.sending_endpoint_count, 1);
        assert_eq!(template.config.concurrency_limit, 8);
        assert_eq!(template.config.message_timeout, Duration::from_secs(30));
        assert_eq!(
            template.command,
            CliCommand::Send(SendArgs {
                payload_dir: PathBuf::from("/tmp/payloads"),
                chunk_size: 0,
                interval: Some(Duration::from_millis(500)),
                count: Some(2),
                secret: None,
            })
        );
    }

    #[test]
    fn scan_flags_fill_command() {
        let template = fill(&[
            "scan",
            "--address",
            "0:abc",
            "--msg-type",
            "IntIn",
            "--msg-type",
            "ExtOut",
            "--all",
            "--abi",
            "commit.abi.json",
            "--function",
            "deployNewSnapshot",
        ])
        .unwrap();

        match template.command {
            CliCommand::Scan(args) => {
                assert_eq!(args.address, "0:abc");
                assert_eq!(
                    args.msg_types,
                    [MessageTypeFilter::IntIn, MessageTypeFilter::ExtOut]
                );
                assert!(args.all);
                assert_eq!(args.function.as_deref(), Some("deployNewSnapshot"));
            }
            other => panic!("expected scan, got {other:?}"),
        }
        assert_eq!(
            template.config.endpoints[0].to_string(),
            format!("{}/", ledgerconfig::DEFAULT_ENDPOINT)
        );
    }

    #[test]
    fn function_filter_requires_abi() {
        assert!(fill(&["scan", "--address", "0:abc", "--function", "f"]).is_err());
        assert!(fill(&["scan", "--address", "0:abc", "--msg-type", "Internal"]).is_err());
        assert!(fill(&[]).is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn send_dispatches_every_payload() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["a", "b", "c"] {
            std::fs::write(dir.path().join(format!("{name}.boc")), name).unwrap();
        }
        let boundary = MockBoundary::default()
            .with_behaviour("b", Behaviour::RejectAtSubmit("refused".to_string()));
        let config = LedgerConfig::create_unconnected(None);
        let args = SendArgs {
            payload_dir: dir.path().to_path_buf(),
            chunk_size: 2,
            interval: None,
            count: None,
            secret: None,
        };

        let reports = send(&boundary, &config, &args).await.unwrap();

        assert_eq!(reports.len(), 2);
        let combined = BatchReport::combined_stats(&reports).unwrap();
        assert_eq!(combined.success_count, 2);
        assert_eq!(combined.failure_count, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn replayed_send_reports_each_round() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.boc"), b"a").unwrap();
        let boundary = MockBoundary::default();
        let config = LedgerConfig::create_unconnected(None);
        let args = SendArgs {
            payload_dir: dir.path().to_path_buf(),
            chunk_size: 0,
            interval: Some(Duration::from_secs(1)),
            count: Some(3),
            secret: None,
        };

        let reports = send(&boundary, &config, &args).await.unwrap();

        assert_eq!(reports.len(), 3);
        let submissions = boundary.submissions();
        assert_eq!(submissions.len(), 3);
        assert!(submissions.iter().all(|label| label.starts_with("a-")));
        let distinct = submissions.iter().collect::<std::collections::HashSet<_>>();
        assert_eq!(distinct.len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn scan_renders_json() {
        let records = vec![
            MockFeed::record("older", MSG_TYPE_INTERNAL, "0x1", None),
            MockFeed::record("newer", MSG_TYPE_INTERNAL, "0x2", None),
        ];
        let boundary = MockBoundary::default().with_feed(MockFeed::from_records(records));
        let config = LedgerConfig::create_unconnected(None);
        let args = ScanArgs {
            address: "0:abc".to_string(),
            msg_types: Vec::new(),
            all: true,
            cursor: None,
            max_records: None,
            abi: None,
            function: None,
            output: None,
        };

        let json = scan(&boundary, &config, &args).await.unwrap();

        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed[0]["message"]["id"], "newer");
        assert_eq!(parsed[1]["message"]["id"], "older");
        assert!(parsed[0]["decoded"].is_null());
    }
}
