//! replay - drive the pipelines from an NDJSON event file
//!
//! Stands in for the partition broker during development: events are read
//! from a file, spread over synthetic partitions, and pushed through the
//! real `open`/`process`/`close` contract with a logging checkpointer.
//! Sinks are live - bulk bodies and blobs go wherever the config points.
//!
//! Event lines look like:
//!
//! ```json
//! {"type":"SerilogEvent","messageId":"m1","body":{"message":"...","@timestamp":"..."}}
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use clap::{Args, ValueEnum};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::info;

use siphon_config::Config;
use siphon_pipeline::{
    CheckpointError, Checkpointer, IndexerFactory, IndexerOptions, OpenSchemaFactory,
    OpenSchemaOptions, PartitionContext, ProcessorFactory,
};
use siphon_protocol::RawEvent;
use siphon_sinks::elasticsearch::{ElasticsearchClient, ElasticsearchConfig};
use siphon_sinks::openschema::{
    AzureBlobStore, BlobStore, Compression, HttpNotificationSender, Notifier,
};

/// Arguments for the replay command
#[derive(Args, Debug)]
pub struct ReplayArgs {
    /// Path to configuration file
    #[arg(short, long, default_value = "configs/siphon.toml")]
    pub config: PathBuf,

    /// Path to the NDJSON event file
    #[arg(short, long)]
    pub events: PathBuf,

    /// Which pipeline(s) to drive
    #[arg(short, long, value_enum, default_value_t = PipelineChoice::Both)]
    pub pipeline: PipelineChoice,

    /// Number of synthetic partitions
    #[arg(long, default_value_t = 4)]
    pub partitions: usize,

    /// Events per process call
    #[arg(long, default_value_t = 100)]
    pub batch_size: usize,
}

/// Pipeline selector
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum PipelineChoice {
    /// Bulk-indexing pipeline only
    Elasticsearch,
    /// Blob + notification pipeline only
    Openschema,
    /// Both pipelines, sequentially
    Both,
}

/// One line of the replay file
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventLine {
    #[serde(rename = "type")]
    event_type: Option<String>,
    message_id: Option<String>,
    timestamp: Option<String>,
    source: Option<String>,
    enqueued_at: Option<DateTime<Utc>>,
    body: serde_json::Value,
    partition: Option<usize>,
}

impl EventLine {
    fn into_raw_event(self) -> (Option<usize>, RawEvent) {
        let body = match &self.body {
            serde_json::Value::String(s) => s.clone().into_bytes(),
            other => other.to_string().into_bytes(),
        };

        let mut event = RawEvent::new(body, self.enqueued_at.unwrap_or_else(Utc::now));
        if let Some(t) = self.event_type {
            event = event.with_property("Type", t);
        }
        if let Some(m) = self.message_id {
            event = event.with_property("MessageId", m);
        }
        if let Some(t) = self.timestamp {
            event = event.with_property("Timestamp", t);
        }
        if let Some(s) = self.source {
            event = event.with_property("Source", s);
        }
        (self.partition, event)
    }
}

/// Checkpointer that logs instead of talking to a state store
struct LoggingCheckpointer;

#[async_trait]
impl Checkpointer for LoggingCheckpointer {
    async fn checkpoint(&self, partition_id: &str) -> Result<(), CheckpointError> {
        info!(partition = %partition_id, "checkpoint (replay)");
        Ok(())
    }
}

/// Run the replay
pub async fn run(args: ReplayArgs) -> Result<()> {
    let config = Config::from_file(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;

    let partitions = read_partitions(&args)?;
    let total: usize = partitions.iter().map(Vec::len).sum();
    info!(
        events = total,
        partitions = args.partitions,
        batch_size = args.batch_size,
        "replay starting"
    );

    let run_es = args.pipeline != PipelineChoice::Openschema;
    let run_openschema = args.pipeline != PipelineChoice::Elasticsearch;

    if run_es {
        if !config.elasticsearch.enabled {
            bail!("elasticsearch pipeline requested but disabled in config");
        }
        let factory = build_indexer_factory(&config)?;
        drive(&factory, &partitions, args.batch_size, "elasticsearch").await?;
    }

    if run_openschema {
        if !config.openschema.enabled {
            bail!("openschema pipeline requested but disabled in config");
        }
        let factory = build_openschema_factory(&config)?;
        drive(&factory, &partitions, args.batch_size, "openschema").await?;
    }

    info!("replay complete");
    Ok(())
}

/// Read the event file and spread lines over synthetic partitions
fn read_partitions(args: &ReplayArgs) -> Result<Vec<Vec<RawEvent>>> {
    let contents = std::fs::read_to_string(&args.events)
        .with_context(|| format!("reading {}", args.events.display()))?;

    let partition_count = args.partitions.max(1);
    let mut partitions: Vec<Vec<RawEvent>> = vec![Vec::new(); partition_count];

    for (index, line) in contents.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let parsed: EventLine = serde_json::from_str(line)
            .with_context(|| format!("parsing event line {}", index + 1))?;
        let (explicit, event) = parsed.into_raw_event();
        let slot = explicit.unwrap_or(index) % partition_count;
        partitions[slot].push(event);
    }

    Ok(partitions)
}

/// Build the Elasticsearch factory from config
fn build_indexer_factory(config: &Config) -> Result<IndexerFactory> {
    let section = &config.elasticsearch;

    let mut sink_config = ElasticsearchConfig::new(section.url.clone());
    sink_config.stats_enabled = section.stats_enabled;
    if let (Some(username), Some(password)) = (&section.username, &section.password) {
        sink_config = sink_config.with_basic_auth(username, password);
    }

    let client = ElasticsearchClient::new(sink_config).context("building elasticsearch client")?;
    let options = IndexerOptions {
        stats_enabled: section.stats_enabled,
        checkpoint_interval: section.checkpoint_interval(),
        max_failed_doc_retries: section.max_failed_doc_retries,
        max_abandoned_doc_retries: section.max_abandoned_doc_retries,
    };

    Ok(IndexerFactory::new(Arc::new(client), options))
}

/// Build the OpenSchema factory from config
fn build_openschema_factory(config: &Config) -> Result<OpenSchemaFactory> {
    let section = &config.openschema;
    let http = reqwest::Client::new();

    let mut accounts: Vec<Arc<dyn BlobStore>> = Vec::new();
    for raw in section.account_strings() {
        let store = AzureBlobStore::from_connection_string(raw, http.clone())
            .context("parsing blob account credentials")?;
        accounts.push(Arc::new(store));
    }

    let notifier = Notifier::new(
        Arc::new(HttpNotificationSender::new(
            http,
            section.notification_endpoint.clone(),
        )),
        section.instrumentation_key.clone(),
    );

    let mut options = OpenSchemaOptions::new(
        section.base_container.clone(),
        section.buffer_capacity_bytes,
        section.log_schema_id()?,
        section.interactions_schema_id()?,
    );
    options.stats_enabled = section.stats_enabled;
    options.checkpoint_interval = section.checkpoint_interval();
    options.compression = if section.compress {
        Compression::Gzip
    } else {
        Compression::None
    };

    Ok(OpenSchemaFactory::new(accounts, notifier, options))
}

/// Drive one pipeline over every partition through the host contract
async fn drive(
    factory: &dyn ProcessorFactory,
    partitions: &[Vec<RawEvent>],
    batch_size: usize,
    label: &str,
) -> Result<()> {
    let checkpointer = Arc::new(LoggingCheckpointer);

    for (index, events) in partitions.iter().enumerate() {
        if events.is_empty() {
            continue;
        }

        let ctx = PartitionContext::new(
            index.to_string(),
            checkpointer.clone(),
            CancellationToken::new(),
        );
        let mut processor = factory
            .create(ctx)
            .await
            .with_context(|| format!("{label}: creating processor for partition {index}"))?;

        processor
            .open()
            .await
            .with_context(|| format!("{label}: opening partition {index}"))?;

        for chunk in events.chunks(batch_size.max(1)) {
            processor
                .process(chunk.to_vec())
                .await
                .with_context(|| format!("{label}: processing batch on partition {index}"))?;
        }

        processor
            .close(siphon_pipeline::CloseReason::Shutdown)
            .await
            .with_context(|| format!("{label}: closing partition {index}"))?;

        info!(pipeline = label, partition = index, events = events.len(), "partition replayed");
    }

    Ok(())
}
