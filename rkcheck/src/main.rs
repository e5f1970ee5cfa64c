//! `rkcheck`: validate that a StorageClass / VolumeSnapshotClass pair can
//! snapshot a volume and restore it into a new one.

mod config;

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use libcsicheck::backend::kubernetes::KubeCluster;
use libcsicheck::{RunParams, RunReport, SnapshotRestoreArgs, SnapshotRestoreSteps};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::CHECK_CONFIG;

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Parser, Debug)]
#[command(name = "rkcheck", version, about = "CSI snapshot/restore check")]
pub struct CheckArgs {
    /// StorageClass of the volume under test
    #[arg(long = "storageclass", value_name = "NAME")]
    pub storage_class: String,

    /// VolumeSnapshotClass used to snapshot the volume
    #[arg(long = "volumesnapshotclass", value_name = "NAME")]
    pub volume_snapshot_class: String,

    /// Namespace the test objects are created in
    #[arg(short, long, default_value = "default")]
    pub namespace: String,

    /// UID the test pods run as
    #[arg(long = "runAsUser", value_name = "UID")]
    pub run_as_user: Option<i64>,

    /// Container image of the test pods (default from RKCHECK_DEFAULT_IMAGE)
    #[arg(long, value_name = "IMAGE")]
    pub image: Option<String>,

    /// Leave the created objects in place
    #[arg(long)]
    pub skip_cleanup: bool,

    /// Read the data back from the restored pod and compare it
    #[arg(long)]
    pub validate_data: bool,

    /// Report format
    #[arg(short, long, value_enum, default_value = "text")]
    pub output: OutputFormat,

    /// Readiness timeout in seconds (default from RKCHECK_READY_TIMEOUT_SECS)
    #[arg(long, value_name = "SECS")]
    pub timeout_secs: Option<u64>,

    /// Emit logs as JSON
    #[arg(long)]
    pub log_json: bool,
}

impl CheckArgs {
    fn to_run_args(&self) -> SnapshotRestoreArgs {
        SnapshotRestoreArgs {
            namespace: self.namespace.clone(),
            storage_class: self.storage_class.clone(),
            volume_snapshot_class: self.volume_snapshot_class.clone(),
            run_as_user: self.run_as_user,
            container_image: self
                .image
                .clone()
                .unwrap_or_else(|| CHECK_CONFIG.default_image.clone()),
        }
    }
}

fn init_tracing(json: bool) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());
    let registry = tracing_subscriber::registry().with(env_filter);
    // Logs go to stderr so stdout carries only the report.
    if json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(std::io::stderr)
                    .json()
                    .with_target(true),
            )
            .init();
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(false),
            )
            .init();
    }
}

async fn check(cli: CheckArgs) -> Result<bool> {
    let args = cli.to_run_args();
    let wait = CHECK_CONFIG.wait_policy(cli.timeout_secs);

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("received Ctrl+C, cancelling");
            on_signal.cancel();
        }
    });

    let cluster = Arc::new(
        KubeCluster::try_default(wait)
            .await
            .context("failed to connect to the Kubernetes API server")?,
    );
    let mut steps = SnapshotRestoreSteps::from_cluster(cluster.clone()).with_ready_wait(wait);
    if cli.validate_data {
        steps = steps.with_data_reader(cluster.clone());
    }

    let params = RunParams::generate();
    info!(snapshot = %params.snapshot_name, "starting snapshot/restore check");
    let result = steps.run(&args, &params, &cancel).await;
    let report = RunReport::new(&args, &result);

    if cli.skip_cleanup {
        info!("skipping cleanup");
    } else {
        cluster.cleanup(&report.results).await;
    }

    match cli.output {
        OutputFormat::Text => print!("{report}"),
        OutputFormat::Json => println!(
            "{}",
            serde_json::to_string_pretty(&report).context("failed to encode report")?
        ),
    }
    Ok(report.passed())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = CheckArgs::parse();
    init_tracing(cli.log_json);

    match check(cli).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::from(2)
        }
    }
}
