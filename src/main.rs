//! Limitador Operator - keeps Limitador rate-limiting services in sync with their CRDs

use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use futures::StreamExt;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{ConfigMap, PersistentVolumeClaim, Service};
use k8s_openapi::api::policy::v1::PodDisruptionBudget;
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::api::{Patch, PatchParams};
use kube::runtime::controller::Action;
use kube::runtime::reflector::ObjectRef;
use kube::runtime::watcher::Config as WatcherConfig;
use kube::runtime::Controller;
use kube::{Api, Client, CustomResourceExt};

use limitador_operator::config::{
    default_resource_requirements, OperatorConfig, RedisUrlMode, DEFAULT_ERROR_REQUEUE_SECS,
    DEFAULT_IMAGE_REPOSITORY, DEFAULT_MIGRATION_RETRY_SECS, DEFAULT_RESYNC_SECS,
};
use limitador_operator::controller::{error_policy, reconcile, Context};
use limitador_operator::crd::Limitador;
use limitador_operator::telemetry::{
    init_telemetry, LogFormat, PodIdentity, TelemetryConfig, SERVICE_NAME,
};
use limitador_operator::FIELD_MANAGER;

/// Limitador Operator - reconciles Limitador rate-limiting services
#[derive(Parser, Debug)]
#[command(name = "limitador-operator", version, about, long_about = None)]
struct Cli {
    /// Print the Limitador CRD manifest and exit
    #[arg(long)]
    crd: bool,

    #[command(flatten)]
    controller: ControllerArgs,

    #[command(flatten)]
    telemetry: TelemetryArgs,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run as controller (default mode)
    Controller,
}

/// Controller settings
#[derive(Args, Debug)]
struct ControllerArgs {
    /// Limitador image repository; the instance version is used as the tag
    #[arg(long, env = "LIMITADOR_IMAGE_REPOSITORY", default_value = DEFAULT_IMAGE_REPOSITORY)]
    image_repository: String,

    /// Seconds between periodic resyncs of a healthy instance
    #[arg(long, env = "LIMITADOR_RESYNC_SECS", default_value_t = DEFAULT_RESYNC_SECS)]
    resync_secs: u64,

    /// Seconds between checks while a legacy migration waits for availability
    #[arg(
        long,
        env = "LIMITADOR_MIGRATION_RETRY_SECS",
        default_value_t = DEFAULT_MIGRATION_RETRY_SECS
    )]
    migration_retry_secs: u64,

    /// Seconds before retrying an instance after a failed pass
    #[arg(
        long,
        env = "LIMITADOR_ERROR_REQUEUE_SECS",
        default_value_t = DEFAULT_ERROR_REQUEUE_SECS
    )]
    error_requeue_secs: u64,

    /// How the Redis URL is handed to Limitador
    #[arg(long, env = "LIMITADOR_REDIS_URL_MODE", value_enum, default_value_t = RedisUrlMode::EnvReference)]
    redis_url_mode: RedisUrlMode,

    /// Do not install or update the CRD on startup
    #[arg(long, env = "LIMITADOR_SKIP_CRD_INSTALL")]
    skip_crd_install: bool,
}

/// Logging and trace export settings
#[derive(Args, Debug)]
struct TelemetryArgs {
    /// Log line format
    #[arg(long, env = "LIMITADOR_LOG_FORMAT", value_enum, default_value_t = LogFormat::Json)]
    log_format: LogFormat,

    /// Log filter directive, e.g. `info,limitador_operator=trace`; overrides RUST_LOG
    #[arg(long, env = "LIMITADOR_LOG_FILTER")]
    log_filter: Option<String>,

    /// OTLP collector endpoint; spans and metrics are exported only when set
    #[arg(long, env = "OTEL_EXPORTER_OTLP_ENDPOINT")]
    otlp_endpoint: Option<String>,
}

impl TelemetryArgs {
    fn telemetry_config(&self) -> TelemetryConfig {
        TelemetryConfig {
            service_name: SERVICE_NAME.to_string(),
            log_format: self.log_format,
            log_filter: self.log_filter.clone(),
            otlp_endpoint: self.otlp_endpoint.clone(),
            identity: PodIdentity::from_env(),
        }
    }
}

impl ControllerArgs {
    fn operator_config(&self) -> OperatorConfig {
        OperatorConfig {
            image_repository: self.image_repository.clone(),
            default_resources: default_resource_requirements(),
            resync_interval: Duration::from_secs(self.resync_secs),
            error_requeue_interval: Duration::from_secs(self.error_requeue_secs),
            migration_retry_interval: Duration::from_secs(self.migration_retry_secs),
            redis_url_mode: self.redis_url_mode,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.crd {
        let crd = serde_yaml::to_string(&Limitador::crd())
            .map_err(|e| anyhow::anyhow!("Failed to serialize CRD: {}", e))?;
        println!("{crd}");
        return Ok(());
    }

    let _telemetry = init_telemetry(cli.telemetry.telemetry_config())?;

    match cli.command {
        Some(Commands::Controller) | None => run_controller(cli.controller).await,
    }
}

/// Server-side apply the Limitador CRD
async fn ensure_crd_installed(client: &Client) -> anyhow::Result<()> {
    let crds: Api<CustomResourceDefinition> = Api::all(client.clone());
    let params = PatchParams::apply(FIELD_MANAGER).force();
    let crd = Limitador::crd();
    let name = crd.metadata.name.clone().unwrap_or_default();

    tracing::info!(crd = %name, "Installing Limitador CRD...");
    crds.patch(&name, &params, &Patch::Apply(&crd))
        .await
        .map_err(|e| anyhow::anyhow!("Failed to install Limitador CRD: {}", e))?;

    Ok(())
}

fn log_reconcile_result<E: std::fmt::Debug>(
    result: Result<(ObjectRef<Limitador>, Action), E>,
) -> futures::future::Ready<()> {
    match result {
        Ok((obj, action)) => {
            tracing::debug!(limitador = %obj.name, ?action, "Limitador reconciliation completed");
        }
        Err(e) => {
            tracing::error!(error = ?e, "Limitador reconciliation error");
        }
    }
    futures::future::ready(())
}

async fn run_controller(args: ControllerArgs) -> anyhow::Result<()> {
    tracing::info!("Limitador controller starting...");

    let client = Client::try_default()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create Kubernetes client: {}", e))?;

    if args.skip_crd_install {
        tracing::info!("Skipping CRD installation");
    } else {
        ensure_crd_installed(&client).await?;
    }

    let config = args.operator_config();
    tracing::info!(
        image_repository = %config.image_repository,
        resync_secs = config.resync_interval.as_secs(),
        redis_url_mode = ?config.redis_url_mode,
        "Operator configuration loaded"
    );

    let ctx = Arc::new(Context::new(client.clone(), config));
    let watcher_config = || WatcherConfig::default().timeout(25);

    Controller::new(Api::<Limitador>::all(client.clone()), watcher_config())
        .owns(Api::<Deployment>::all(client.clone()), watcher_config())
        .owns(Api::<Service>::all(client.clone()), watcher_config())
        .owns(Api::<ConfigMap>::all(client.clone()), watcher_config())
        .owns(Api::<PodDisruptionBudget>::all(client.clone()), watcher_config())
        .owns(Api::<PersistentVolumeClaim>::all(client), watcher_config())
        .shutdown_on_signal()
        .run(reconcile, error_policy, ctx)
        .for_each(log_reconcile_result)
        .await;

    tracing::info!("Limitador controller shutting down");
    Ok(())
}
