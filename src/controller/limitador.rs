//! Limitador controller implementation
//!
//! This module contains the reconciliation logic for Limitador resources.
//! Each pass reads the instance fresh, applies every owned object through its
//! mutators, stamps pods with the current limits version, advances the legacy
//! name migration and finally recomputes status.

use std::sync::Arc;
use std::time::Duration;

use kube::runtime::controller::Action;
use kube::{Client, ResourceExt};
use tracing::{debug, error, info, instrument, warn};

use crate::client::{delete_if_exists, ClusterClient, KubeClusterClient};
use crate::config::OperatorConfig;
use crate::crd::Limitador;
use crate::mutator::{
    reconcile_resource, CONFIG_MAP_MUTATORS, DEPLOYMENT_MUTATORS, PDB_MUTATORS, PVC_MUTATORS,
    SERVICE_MUTATORS,
};
use crate::propagation::propagate_config_version;
use crate::registry::{KindRegistry, ResourceKind};
use crate::resources::{
    build_desired, config_map_name, deployment_name, pdb_name, pvc_name, service_name,
};
use crate::status::update_status;
use crate::storage::resolve_storage;
use crate::upgrade::{migrate_legacy_resources, MigrationOutcome};
use crate::Error;

/// Requeue delay after a write conflict
pub const CONFLICT_REQUEUE: Duration = Duration::from_secs(1);

/// Controller context containing shared state and clients
///
/// The context is shared across all reconciliation calls. Nothing in it is
/// mutated by a pass.
pub struct Context {
    /// Cluster client for API operations (trait object for testability)
    pub client: Arc<dyn ClusterClient>,
    /// Logical kind to API resource mapping
    pub registry: Arc<KindRegistry>,
    /// Operator-wide settings
    pub config: Arc<OperatorConfig>,
}

impl Context {
    /// Create a new controller context with the given Kubernetes client
    pub fn new(client: Client, config: OperatorConfig) -> Self {
        Self {
            client: Arc::new(KubeClusterClient::new(client)),
            registry: Arc::new(KindRegistry::standard()),
            config: Arc::new(config),
        }
    }

    /// Create a context for testing with a custom cluster client
    #[cfg(test)]
    pub fn for_testing(client: Arc<dyn ClusterClient>, config: OperatorConfig) -> Self {
        Self {
            client,
            registry: Arc::new(KindRegistry::standard()),
            config: Arc::new(config),
        }
    }
}

/// Reconcile a Limitador resource
///
/// Spec-pass failures are written to the Ready condition before they decide
/// the returned action. Configuration problems wait for the periodic resync,
/// conflicts requeue immediately, anything else goes to [`error_policy`].
#[instrument(skip(limitador, ctx), fields(limitador = %limitador.name_any()))]
pub async fn reconcile(limitador: Arc<Limitador>, ctx: Arc<Context>) -> Result<Action, Error> {
    let name = limitador.name_any();
    let namespace = limitador.namespace().unwrap_or_default();
    debug!(%namespace, "reconciling limitador");

    let current = match ctx.client.get_limitador(&namespace, &name).await? {
        Some(current) if current.metadata.deletion_timestamp.is_none() => current,
        _ => {
            info!(%namespace, "limitador deleted, removing owned objects");
            delete_owned_objects(&ctx, &namespace, &name).await;
            return Ok(Action::await_change());
        }
    };

    let (spec_error, migration) = match reconcile_spec(&ctx, &current).await {
        Ok(outcome) => (None, outcome),
        Err(e) if e.is_conflict() => {
            debug!(error = %e, "write conflict, requeueing");
            return Ok(Action::requeue(CONFLICT_REQUEUE));
        }
        Err(e) => {
            warn!(error = %e, "failed to apply spec");
            (Some(e), MigrationOutcome::NotNeeded)
        }
    };

    match update_status(
        ctx.client.as_ref(),
        &ctx.registry,
        &current,
        spec_error.as_ref(),
    )
    .await
    {
        Ok(_) => {}
        Err(e) if e.is_conflict() => {
            debug!(error = %e, "status write conflict, requeueing");
            return Ok(Action::requeue(CONFLICT_REQUEUE));
        }
        Err(e) => return Err(spec_error.unwrap_or(e)),
    }

    if let Some(e) = spec_error {
        if e.is_configuration() {
            return Ok(Action::requeue(ctx.config.resync_interval));
        }
        return Err(e);
    }

    match migration {
        MigrationOutcome::Retry(reason) => {
            debug!(%reason, "legacy migration pending");
            Ok(Action::requeue(ctx.config.migration_retry_interval))
        }
        MigrationOutcome::NotNeeded | MigrationOutcome::Completed => {
            Ok(Action::requeue(ctx.config.resync_interval))
        }
    }
}

/// Apply every owned object of an instance
///
/// Storage is resolved first so a bad secret reference stops the pass before
/// any write. The claim is applied before the workload that mounts it.
async fn reconcile_spec(ctx: &Context, limitador: &Limitador) -> Result<MigrationOutcome, Error> {
    let client = ctx.client.as_ref();
    let registry = ctx.registry.as_ref();
    let name = limitador.name_any();
    let namespace = limitador.namespace().unwrap_or_default();

    let storage = resolve_storage(client, limitador, ctx.config.redis_url_mode).await?;
    let desired = build_desired(limitador, &storage, &ctx.config)?;

    let service = reconcile_resource(client, registry, &desired.service, SERVICE_MUTATORS).await?;
    let pvc = reconcile_resource(client, registry, &desired.pvc, PVC_MUTATORS).await?;
    let deployment =
        reconcile_resource(client, registry, &desired.deployment, DEPLOYMENT_MUTATORS).await?;

    let config_map =
        reconcile_resource(client, registry, &desired.config_map, CONFIG_MAP_MUTATORS).await?;
    let mut stamped = 0;
    if let Some(config_map) = config_map.object() {
        stamped = propagate_config_version(client, registry, &namespace, &name, config_map).await?;
    }

    let pdb = reconcile_resource(client, registry, &desired.pdb, PDB_MUTATORS).await?;

    let writes = [
        service.wrote(),
        pvc.wrote(),
        deployment.wrote(),
        config_map.wrote(),
        pdb.wrote(),
    ]
    .into_iter()
    .filter(|wrote| *wrote)
    .count();
    if writes > 0 || stamped > 0 {
        info!(%namespace, writes, pods = stamped, "applied spec changes");
    }

    migrate_legacy_resources(client, registry, limitador).await
}

/// Best-effort removal of everything an instance owns
async fn delete_owned_objects(ctx: &Context, namespace: &str, name: &str) {
    let owned = [
        (ResourceKind::Deployment, deployment_name(name)),
        (ResourceKind::Service, service_name(name)),
        (ResourceKind::ConfigMap, config_map_name(name)),
        (ResourceKind::PodDisruptionBudget, pdb_name(name)),
        (ResourceKind::PersistentVolumeClaim, pvc_name(name)),
    ];

    for (kind, object) in owned {
        match delete_if_exists(ctx.client.as_ref(), &ctx.registry, kind, namespace, &object).await
        {
            Ok(true) => debug!(%kind, %object, "deleted owned object"),
            Ok(false) => {}
            Err(e) => warn!(%kind, %object, error = %e, "failed to delete owned object"),
        }
    }
}

/// Error policy for the controller
///
/// Called when reconciliation returns an error. Retryable errors come back
/// after the fixed error delay; anything else waits for the periodic resync
/// or a change to the instance. Backoff beyond that is left to the runtime.
pub fn error_policy(limitador: Arc<Limitador>, error: &Error, ctx: Arc<Context>) -> Action {
    error!(
        ?error,
        limitador = %limitador.name_any(),
        retryable = error.is_retryable(),
        "reconciliation failed"
    );
    if error.is_retryable() {
        Action::requeue(ctx.config.error_requeue_interval)
    } else {
        Action::requeue(ctx.config.resync_interval)
    }
}
