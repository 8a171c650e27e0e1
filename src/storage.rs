//! Storage strategy resolver
//!
//! Turns the instance's storage configuration into the launch arguments,
//! environment, volumes and rollout strategy of the Limitador workload.
//!
//! Disk storage holds an exclusive file lock on its volume, so it must roll
//! out with Recreate: a surge replica would fail to acquire the lock and
//! crash loop. Every other backend rolls out with RollingUpdate.

use k8s_openapi::api::apps::v1::{DeploymentStrategy, RollingUpdateDeployment};
use k8s_openapi::api::core::v1::{
    EnvVar, EnvVarSource, PersistentVolumeClaimVolumeSource, SecretKeySelector, Volume,
    VolumeMount,
};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::ResourceExt;
use tracing::debug;

use crate::client::ClusterClient;
use crate::config::RedisUrlMode;
use crate::crd::{DiskStorage, Limitador, SecretRef, StorageMode};
use crate::resources::pvc_name;
use crate::Error;

/// Mount path of the counter volume for disk storage
pub const DISK_PATH: &str = "/var/lib/limitador/data";

/// Name of the counter volume for disk storage
pub const STORAGE_VOLUME_NAME: &str = "storage";

/// Environment variable carrying the Redis URL into the container
pub const REDIS_URL_ENV: &str = "LIMITADOR_OPERATOR_REDIS_URL";

/// Secret key holding the Redis URL
pub const REDIS_URL_KEY: &str = "URL";

/// Everything the workload needs to run against one storage backend
#[derive(Clone, Debug, PartialEq)]
pub struct StorageStrategy {
    /// Resolved backend
    pub mode: StorageMode,
    /// Storage subcommand and its arguments, appended after the config path
    pub args: Vec<String>,
    /// Extra container environment
    pub env: Vec<EnvVar>,
    /// Extra container volume mounts
    pub volume_mounts: Vec<VolumeMount>,
    /// Extra pod volumes
    pub volumes: Vec<Volume>,
    /// Rollout strategy safe for this backend
    pub rollout: DeploymentStrategy,
}

/// Where the Redis URL comes from at process start
#[derive(Clone, Debug, PartialEq)]
enum RedisUrl {
    /// Resolved by the kubelet from a secret key
    FromSecret { secret_name: String },
    /// Literal URL
    Inline(String),
}

/// Resolve the storage strategy for an instance
///
/// Redis-backed modes read the referenced secret to make sure the URL is
/// present before any object is written.
pub async fn resolve_storage(
    client: &dyn ClusterClient,
    limitador: &Limitador,
    url_mode: RedisUrlMode,
) -> Result<StorageStrategy, Error> {
    let storage = limitador.spec.storage.clone().unwrap_or_default();
    let name = limitador.name_any();
    let namespace = limitador.namespace().unwrap_or_default();

    let mode = storage.mode()?;
    debug!(limitador = %name, %mode, "resolving storage strategy");

    match mode {
        StorageMode::InMemory => Ok(in_memory_strategy()),
        StorageMode::Disk => Ok(disk_strategy(
            storage.disk.as_ref().unwrap_or(&DiskStorage::default()),
            &pvc_name(&name),
        )),
        StorageMode::Redis => {
            let secret_ref = storage.redis.and_then(|r| r.config_secret_ref);
            let url = redis_url(client, &namespace, secret_ref.as_ref(), url_mode).await?;
            Ok(redis_strategy(StorageMode::Redis, url, Vec::new()))
        }
        StorageMode::RedisCached => {
            let cached = storage.redis_cached.unwrap_or_default();
            let url =
                redis_url(client, &namespace, cached.config_secret_ref.as_ref(), url_mode).await?;
            let options = cached.options.map(|o| o.to_args()).unwrap_or_default();
            Ok(redis_strategy(StorageMode::RedisCached, url, options))
        }
    }
}

/// Strategy for in-memory counters
pub fn in_memory_strategy() -> StorageStrategy {
    StorageStrategy {
        mode: StorageMode::InMemory,
        args: vec![StorageMode::InMemory.to_string()],
        env: Vec::new(),
        volume_mounts: Vec::new(),
        volumes: Vec::new(),
        rollout: rolling_update(),
    }
}

/// Strategy for counters on a persistent volume claim
pub fn disk_strategy(disk: &DiskStorage, claim_name: &str) -> StorageStrategy {
    let mut args = vec![StorageMode::Disk.to_string(), DISK_PATH.to_string()];
    if let Some(optimize) = disk.optimize {
        args.push("--optimize".to_string());
        args.push(optimize.to_string());
    }

    StorageStrategy {
        mode: StorageMode::Disk,
        args,
        env: Vec::new(),
        volume_mounts: vec![VolumeMount {
            name: STORAGE_VOLUME_NAME.to_string(),
            mount_path: DISK_PATH.to_string(),
            ..Default::default()
        }],
        volumes: vec![Volume {
            name: STORAGE_VOLUME_NAME.to_string(),
            persistent_volume_claim: Some(PersistentVolumeClaimVolumeSource {
                claim_name: claim_name.to_string(),
                read_only: None,
            }),
            ..Default::default()
        }],
        rollout: recreate(),
    }
}

fn redis_strategy(mode: StorageMode, url: RedisUrl, options: Vec<String>) -> StorageStrategy {
    let (url_arg, env) = match url {
        RedisUrl::FromSecret { secret_name } => (
            format!("$({REDIS_URL_ENV})"),
            vec![EnvVar {
                name: REDIS_URL_ENV.to_string(),
                value_from: Some(EnvVarSource {
                    secret_key_ref: Some(SecretKeySelector {
                        name: secret_name,
                        key: REDIS_URL_KEY.to_string(),
                        optional: None,
                    }),
                    ..Default::default()
                }),
                ..Default::default()
            }],
        ),
        RedisUrl::Inline(url) => (url, Vec::new()),
    };

    let mut args = vec![mode.to_string(), url_arg];
    args.extend(options);

    StorageStrategy {
        mode,
        args,
        env,
        volume_mounts: Vec::new(),
        volumes: Vec::new(),
        rollout: rolling_update(),
    }
}

/// Validate the secret reference and work out how the URL is delivered
async fn redis_url(
    client: &dyn ClusterClient,
    default_namespace: &str,
    secret_ref: Option<&SecretRef>,
    url_mode: RedisUrlMode,
) -> Result<RedisUrl, Error> {
    let secret_ref = secret_ref
        .filter(|r| !r.name.is_empty())
        .ok_or_else(|| {
            Error::configuration_for_field(
                "configSecretRef",
                "there's no configSecretRef set for the redis storage",
            )
        })?;

    let namespace = secret_ref
        .namespace
        .as_deref()
        .filter(|ns| !ns.is_empty())
        .unwrap_or(default_namespace);

    if url_mode == RedisUrlMode::EnvReference && namespace != default_namespace {
        return Err(Error::configuration_for_field(
            "configSecretRef.namespace",
            format!(
                "secret {namespace}/{} must live in namespace {default_namespace} to be referenced from the pod environment",
                secret_ref.name
            ),
        ));
    }

    let secret = client
        .get_secret(namespace, &secret_ref.name)
        .await?
        .ok_or_else(|| Error::not_found("Secret", format!("{namespace}/{}", secret_ref.name)))?;

    let missing_url = || {
        Error::configuration_for_field(
            REDIS_URL_KEY,
            format!(
                "the storage config secret {namespace}/{} does not have the `{REDIS_URL_KEY}` field",
                secret_ref.name
            ),
        )
    };

    let url = match secret.data.as_ref().and_then(|d| d.get(REDIS_URL_KEY)) {
        Some(bytes) => String::from_utf8(bytes.0.clone()).map_err(|_| {
            Error::configuration_for_field(REDIS_URL_KEY, "the redis URL is not valid UTF-8")
        })?,
        None => secret
            .string_data
            .as_ref()
            .and_then(|d| d.get(REDIS_URL_KEY))
            .cloned()
            .ok_or_else(missing_url)?,
    };

    match url_mode {
        RedisUrlMode::EnvReference => Ok(RedisUrl::FromSecret {
            secret_name: secret_ref.name.clone(),
        }),
        RedisUrlMode::Inline => Ok(RedisUrl::Inline(url)),
    }
}

fn rolling_update() -> DeploymentStrategy {
    DeploymentStrategy {
        type_: Some("RollingUpdate".to_string()),
        rolling_update: Some(RollingUpdateDeployment {
            max_surge: Some(IntOrString::String("25%".to_string())),
            max_unavailable: Some(IntOrString::String("25%".to_string())),
        }),
    }
}

fn recreate() -> DeploymentStrategy {
    DeploymentStrategy {
        type_: Some("Recreate".to_string()),
        rolling_update: None,
    }
}
