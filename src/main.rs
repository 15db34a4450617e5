use clap::Parser;
use kafka_dispatch::kafka::{ChannelHandler, DeliveryReport, FlushOutcome};
use kafka_dispatch::{Error, KafkaProducer, ProducerConfig, Result};
use std::io::{self, BufRead};
use std::path::PathBuf;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

#[derive(Parser, Debug)]
#[command(name = "kafka-dispatch")]
#[command(about = "Produce messages to Kafka and report their delivery", long_about = None)]
struct Args {
    #[arg(short, long, value_name = "FILE", help = "TOML file with a [producer] table")]
    config: Option<PathBuf>,

    #[arg(short = 's', long = "set", value_name = "KEY=VALUE", value_parser = parse_option, help = "Override a producer option")]
    options: Vec<(String, String)>,

    #[arg(short, long, help = "Partition key (random UUID per message when omitted)")]
    key: Option<String>,

    #[arg(long, help = "Print each delivery report as a JSON line")]
    reports: bool,

    #[arg(short, long, help = "Enable JSON output for logs")]
    json_logs: bool,

    #[arg(short, long, help = "Verbose logging")]
    verbose: bool,

    topic: String,

    #[arg(help = "Messages to send; read line by line from stdin when omitted (blank lines are sent as empty messages)")]
    messages: Vec<String>,
}

#[derive(Debug, Default)]
struct ProduceSummary {
    accepted: usize,
    rejected: usize,
    first_rejection: Option<Error>,
    outcome: Option<FlushOutcome>,
}

#[derive(Debug, Default)]
struct DeliverySummary {
    delivered: usize,
    failed: usize,
    first_failure: Option<DeliveryReport>,
}

impl DeliverySummary {
    fn record(&mut self, report: DeliveryReport) {
        if report.succeeded() {
            self.delivered += 1;
        } else {
            self.failed += 1;
            self.first_failure.get_or_insert(report);
        }
    }

    fn total(&self) -> usize {
        self.delivered + self.failed
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(args.json_logs, args.verbose);

    info!("Starting kafka-dispatch");

    let mut config = match &args.config {
        Some(path) => {
            info!("Loading configuration from {:?}", path);
            match ProducerConfig::from_file(path) {
                Ok(cfg) => {
                    info!("Configuration loaded successfully");
                    cfg
                }
                Err(e) => {
                    error!("Failed to load configuration: {}", e);
                    return Err(e);
                }
            }
        }
        None => ProducerConfig::default(),
    };
    config.merge(args.options.iter().cloned());

    info!(
        brokers = ?config.broker_addresses(),
        client_id = config.client_id().unwrap_or_default(),
        topic = %args.topic,
        "Configuration summary"
    );

    let (handler, mut receiver) = ChannelHandler::channel();
    let producer = KafkaProducer::builder()
        .config(config)
        .handler(handler)
        .build_shared()?;

    let summary = tokio::task::block_in_place(|| {
        let source = message_source(args.messages.clone(), io::stdin().lock());
        produce_all(&producer, &args.topic, args.key.as_deref(), source)
    })?;

    let deliveries = collect_reports(&producer, &mut receiver, summary.accepted, args.reports).await;

    info!(
        accepted = summary.accepted,
        rejected = summary.rejected,
        delivered = deliveries.delivered,
        failed = deliveries.failed,
        unconfirmed = summary.accepted.saturating_sub(deliveries.total()),
        "Finished"
    );

    if let Some(rejection) = summary.first_rejection {
        return Err(rejection);
    }
    if let Some(outcome) = summary.outcome {
        outcome.ensure_drained()?;
    }
    if let Some(report) = deliveries.first_failure {
        report.into_result()?;
    }

    Ok(())
}

/// Messages from the command line, or one per stdin line when none were given.
fn message_source<'a, R: BufRead + 'a>(
    messages: Vec<String>,
    input: R,
) -> Box<dyn Iterator<Item = io::Result<String>> + 'a> {
    if messages.is_empty() {
        Box::new(input.lines())
    } else {
        Box::new(messages.into_iter().map(Ok))
    }
}

/// Produces every message, then flushes once more before returning.
fn produce_all(
    producer: &KafkaProducer,
    topic: &str,
    key: Option<&str>,
    messages: impl Iterator<Item = io::Result<String>>,
) -> Result<ProduceSummary> {
    let mut summary = ProduceSummary::default();

    for message in messages {
        let message = message?;
        match producer.produce(topic, &message, key) {
            Ok(()) => summary.accepted += 1,
            Err(e @ Error::EnqueueRejected { .. }) => {
                warn!(error = %e, "Message rejected");
                summary.rejected += 1;
                summary.first_rejection.get_or_insert(e);
            }
            Err(e) => return Err(e),
        }
    }

    summary.outcome = Some(producer.flush());
    Ok(summary)
}

async fn collect_reports(
    producer: &KafkaProducer,
    receiver: &mut UnboundedReceiver<DeliveryReport>,
    expected: usize,
    print: bool,
) -> DeliverySummary {
    let wait = producer.flush_policy().worst_case();
    let mut summary = DeliverySummary::default();

    while summary.total() < expected {
        match tokio::time::timeout(wait, receiver.recv()).await {
            Ok(Some(report)) => {
                if print {
                    match serde_json::to_string(&report) {
                        Ok(line) => println!("{}", line),
                        Err(e) => warn!("Failed to serialize delivery report: {}", e),
                    }
                }
                summary.record(report);
            }
            Ok(None) => break,
            Err(_) => {
                warn!(
                    missing = expected - summary.total(),
                    "Gave up waiting for delivery reports"
                );
                break;
            }
        }
    }

    summary
}

fn parse_option(s: &str) -> std::result::Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => Ok((key.trim().to_string(), value.to_string())),
        _ => Err(format!("expected KEY=VALUE, got '{}'", s)),
    }
}

fn init_logging(json: bool, verbose: bool) {
    let env_filter = if verbose {
        EnvFilter::new("kafka_dispatch=debug,info")
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("kafka_dispatch=info,warn"))
    };

    let fmt_layer = if json {
        tracing_subscriber::fmt::layer()
            .json()
            .flatten_event(true)
            .with_current_span(false)
            .with_span_list(false)
            .with_writer(io::stderr)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_target(false)
            .with_thread_ids(false)
            .with_thread_names(false)
            .with_writer(io::stderr)
            .boxed()
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}
