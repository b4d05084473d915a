//! Managed resource reconciler
//!
//! One generic controller drives every managed kind through the same loop:
//! finalizer, connect, observe, then create, update or delete through the
//! kind's [`ExternalClient`], and finally a status patch with the outcome.

use crate::controlplane::connector::Connector;
use crate::controlplane::metrics::Metrics;
use crate::crd::{
    annotation_timestamp, create_incomplete, set_condition, Condition, DeletionPolicy,
    EXTERNAL_CREATE_FAILED_ANNOTATION, EXTERNAL_CREATE_PENDING_ANNOTATION,
    EXTERNAL_CREATE_SUCCEEDED_ANNOTATION, EXTERNAL_NAME_ANNOTATION, FINALIZER,
};
use crate::domain::ports::{ConnectionDetails, ExternalClient, ManagedResource};
use crate::error::{Error, ErrorAction, Result};
use backoff::ExponentialBackoffBuilder;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use k8s_openapi::api::core::v1::Secret as KubeSecret;
use kube::api::{Patch, PatchParams};
use kube::runtime::controller::Action;
use kube::runtime::finalizer::{finalizer, Event};
use kube::runtime::watcher;
use kube::runtime::Controller;
use kube::{Api, ResourceExt};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};

/// Field manager used for server side apply
const FIELD_MANAGER: &str = "provider-cloudian";

// =============================================================================
// Configuration
// =============================================================================

/// Controller configuration
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Interval between observations of an up to date resource
    pub poll_interval: Duration,
    /// Timeout of each Cloudian API call
    pub request_timeout: Duration,
    /// Requeue delay after a transient failure
    pub error_backoff: Duration,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(60),
            request_timeout: Duration::from_secs(30),
            error_backoff: Duration::from_secs(15),
        }
    }
}

/// State shared by every reconcile of every kind
pub struct Context {
    pub kube: kube::Client,
    pub connector: Connector,
    pub config: ControllerConfig,
    pub metrics: Metrics,
}

impl Context {
    pub fn new(kube: kube::Client, config: ControllerConfig, metrics: Metrics) -> Self {
        Self {
            connector: Connector::new(kube.clone(), config.request_timeout),
            kube,
            config,
            metrics,
        }
    }
}

// =============================================================================
// Controller
// =============================================================================

/// Run the controller for kind `K` until shutdown.
pub async fn run<K: ManagedResource>(ctx: Arc<Context>) -> Result<()> {
    let kind = K::kind(&()).to_string();
    let api: Api<K> = Api::all(ctx.kube.clone());

    // Fail fast when the CRD is not installed
    api.list(&kube::api::ListParams::default().limit(1))
        .await
        .map_err(|e| Error::Configuration(format!("{} CRD is not queryable: {}", kind, e)))?;

    info!(kind = %kind, "Starting controller");

    Controller::new(api, watcher::Config::default().any_semantic())
        .shutdown_on_signal()
        .run(reconcile::<K>, error_policy::<K>, ctx)
        .for_each(|result| async move {
            match result {
                Ok((object, _)) => debug!(object = %object, "Reconciled"),
                Err(e) => warn!(error = %e, "Reconcile failed"),
            }
        })
        .await;

    info!(kind = %kind, "Controller stopped");
    Ok(())
}

async fn reconcile<K: ManagedResource>(resource: Arc<K>, ctx: Arc<Context>) -> Result<Action> {
    let kind = K::kind(&()).to_string();
    let _timer = ctx
        .metrics
        .reconcile_duration
        .with_label_values(&[kind.as_str()])
        .start_timer();
    ctx.metrics.reconciliations.with_label_values(&[kind.as_str()]).inc();

    let api: Api<K> = Api::all(ctx.kube.clone());
    finalizer(&api, FINALIZER, resource, |event| async {
        match event {
            Event::Apply(resource) => apply(resource, &ctx).await,
            Event::Cleanup(resource) => cleanup(resource, &ctx).await,
        }
    })
    .await
    .map_err(|e| Error::Finalizer(Box::new(e)))
}

fn error_policy<K: ManagedResource>(resource: Arc<K>, error: &Error, ctx: Arc<Context>) -> Action {
    let kind = K::kind(&()).to_string();
    warn!(
        kind = %kind,
        name = %resource.name_any(),
        error = %error,
        transient = error.is_transient(),
        "Reconcile error"
    );
    ctx.metrics
        .failures
        .with_label_values(&[kind.as_str(), error.kind()])
        .inc();

    match error.action() {
        ErrorAction::RequeueWithBackoff => Action::requeue(ctx.config.error_backoff),
        ErrorAction::RequeueAfter(delay) => Action::requeue(delay),
        ErrorAction::NoRequeue => Action::await_change(),
    }
}

// =============================================================================
// Apply & Cleanup
// =============================================================================

#[instrument(skip_all, fields(kind = %K::kind(&()), name = %resource.name_any()))]
async fn apply<K: ManagedResource>(resource: Arc<K>, ctx: &Context) -> Result<Action> {
    let resource = resource.as_ref();
    match observe_and_converge(resource, ctx).await {
        Ok(action) => Ok(action),
        Err(e) => {
            let status = Status::new(resource).with(Condition::reconcile_error(e.to_string()));
            if let Err(patch_error) = status.patch(resource, ctx).await {
                error!(error = %patch_error, "Cannot record reconcile error");
            }
            Err(e)
        }
    }
}

async fn observe_and_converge<K: ManagedResource>(resource: &K, ctx: &Context) -> Result<Action> {
    let kind = K::kind(&()).to_string();

    // A creation whose outcome was never recorded may have left an external
    // resource nothing points at; creating again would leak it.
    if create_incomplete(resource.meta()) {
        return Err(Error::CreateIncomplete {
            annotation: EXTERNAL_CREATE_PENDING_ANNOTATION,
        });
    }

    let client = ctx.connector.connect(resource.resource_spec()).await?;
    let external = K::external(client);

    let observation = external.observe(resource).await?;

    if !observation.resource_exists {
        info!("Creating external resource");
        patch_annotations(resource, &create_pending_annotations(Utc::now()), ctx).await?;

        let creation = match external.create(resource).await {
            Ok(creation) => creation,
            Err(e) => {
                let failed = create_failed_annotations(Utc::now());
                if let Err(patch_error) = patch_annotations(resource, &failed, ctx).await {
                    error!(error = %patch_error, "Cannot record failed creation");
                }
                return Err(e);
            }
        };
        ctx.metrics
            .external_operations
            .with_label_values(&[kind.as_str(), "create"])
            .inc();

        record_creation(resource, creation.external_name.as_deref(), ctx).await?;
        publish_connection_details(resource, creation.connection_details, ctx).await?;

        Status::new(resource)
            .with(Condition::creating())
            .with(Condition::reconcile_success())
            .patch(resource, ctx)
            .await?;

        // Observe again soon to confirm the creation
        return Ok(Action::requeue(Duration::from_secs(5)));
    }

    publish_connection_details(resource, observation.connection_details, ctx).await?;

    if !observation.resource_up_to_date {
        info!(diff = %observation.diff, "Updating external resource");
        external.update(resource).await?;
        ctx.metrics
            .external_operations
            .with_label_values(&[kind.as_str(), "update"])
            .inc();
    }

    let mut status = Status::new(resource)
        .with(Condition::available())
        .with(Condition::reconcile_success());
    status.at_provider = observation.at_provider;
    status.patch(resource, ctx).await?;

    Ok(Action::requeue(ctx.config.poll_interval))
}

#[instrument(skip_all, fields(kind = %K::kind(&()), name = %resource.name_any()))]
async fn cleanup<K: ManagedResource>(resource: Arc<K>, ctx: &Context) -> Result<Action> {
    let resource = resource.as_ref();
    if resource.resource_spec().deletion_policy == DeletionPolicy::Orphan {
        info!("Deletion policy is Orphan, leaving external resource in place");
        return Ok(Action::await_change());
    }

    let kind = K::kind(&()).to_string();
    let client = ctx.connector.connect(resource.resource_spec()).await?;
    let external: Box<dyn ExternalClient<K>> = K::external(client);

    Status::new(resource)
        .with(Condition::deleting())
        .patch(resource, ctx)
        .await?;

    let observation = external.observe(resource).await?;
    if observation.resource_exists {
        info!("Deleting external resource");
        if let Err(e) = external.delete(resource).await {
            let status = Status::new(resource).with(Condition::reconcile_error(e.to_string()));
            if let Err(patch_error) = status.patch(resource, ctx).await {
                error!(error = %patch_error, "Cannot record reconcile error");
            }
            return Err(e);
        }
        ctx.metrics
            .external_operations
            .with_label_values(&[kind.as_str(), "delete"])
            .inc();
    }

    Ok(Action::await_change())
}

// =============================================================================
// Kubernetes Side Effects
// =============================================================================

type Annotations = BTreeMap<&'static str, String>;

fn create_pending_annotations(now: DateTime<Utc>) -> Annotations {
    BTreeMap::from([(EXTERNAL_CREATE_PENDING_ANNOTATION, annotation_timestamp(now))])
}

fn create_failed_annotations(now: DateTime<Utc>) -> Annotations {
    BTreeMap::from([(EXTERNAL_CREATE_FAILED_ANNOTATION, annotation_timestamp(now))])
}

fn create_succeeded_annotations(external_name: Option<&str>, now: DateTime<Utc>) -> Annotations {
    let mut annotations =
        BTreeMap::from([(EXTERNAL_CREATE_SUCCEEDED_ANNOTATION, annotation_timestamp(now))]);
    if let Some(external_name) = external_name {
        annotations.insert(EXTERNAL_NAME_ANNOTATION, external_name.to_string());
    }
    annotations
}

async fn patch_annotations<K: ManagedResource>(
    resource: &K,
    annotations: &Annotations,
    ctx: &Context,
) -> Result<()> {
    let api: Api<K> = Api::all(ctx.kube.clone());
    let patch = serde_json::json!({ "metadata": { "annotations": annotations } });
    api.patch(&resource.name_any(), &PatchParams::default(), &Patch::Merge(&patch))
        .await?;
    Ok(())
}

/// Record the external name and the successful creation in one patch.
///
/// The external resource exists at this point, so the patch is retried
/// before giving up. If it still fails the pending annotation stays newest
/// and later reconciles refuse to create a second resource.
async fn record_creation<K: ManagedResource>(
    resource: &K,
    external_name: Option<&str>,
    ctx: &Context,
) -> Result<()> {
    let annotations = &create_succeeded_annotations(external_name, Utc::now());
    let policy = ExponentialBackoffBuilder::new()
        .with_initial_interval(Duration::from_millis(200))
        .with_max_elapsed_time(Some(Duration::from_secs(10)))
        .build();

    backoff::future::retry(policy, move || async move {
        patch_annotations(resource, annotations, ctx)
            .await
            .map_err(|e| {
                warn!(error = %e, "Cannot record external name, retrying");
                backoff::Error::transient(e)
            })
    })
    .await
}

/// Write connection details to `writeConnectionSecretToRef`, owned by `resource`.
async fn publish_connection_details<K: ManagedResource>(
    resource: &K,
    details: ConnectionDetails,
    ctx: &Context,
) -> Result<()> {
    if details.is_empty() {
        return Ok(());
    }
    let Some(target) = &resource.resource_spec().write_connection_secret_to_ref else {
        debug!("Connection details are discarded, writeConnectionSecretToRef is not set");
        return Ok(());
    };

    let secret = connection_secret(resource, &target.name, &target.namespace, details);
    let api: Api<KubeSecret> = Api::namespaced(ctx.kube.clone(), &target.namespace);
    api.patch(
        &target.name,
        &PatchParams::apply(FIELD_MANAGER).force(),
        &Patch::Apply(&secret),
    )
    .await?;

    debug!(secret = %format!("{}/{}", target.namespace, target.name), "Published connection details");
    Ok(())
}

fn connection_secret<K: ManagedResource>(
    resource: &K,
    name: &str,
    namespace: &str,
    details: ConnectionDetails,
) -> KubeSecret {
    let string_data: BTreeMap<String, String> = details
        .into_iter()
        .map(|(key, value)| (key, value.reveal().to_string()))
        .collect();

    KubeSecret {
        metadata: kube::api::ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            owner_references: resource.controller_owner_ref(&()).map(|owner| vec![owner]),
            ..Default::default()
        },
        string_data: Some(string_data),
        type_: Some("connection.crossplane.io/v1alpha1".to_string()),
        ..Default::default()
    }
}

// =============================================================================
// Status
// =============================================================================

/// Status patch built from the current conditions of a resource.
struct Status {
    conditions: Vec<Condition>,
    at_provider: Option<serde_json::Value>,
}

impl Status {
    fn new<K: ManagedResource>(resource: &K) -> Self {
        Self {
            conditions: resource.conditions().to_vec(),
            at_provider: None,
        }
    }

    fn with(mut self, condition: Condition) -> Self {
        set_condition(&mut self.conditions, condition);
        self
    }

    fn to_patch(&self) -> serde_json::Value {
        let mut status = serde_json::json!({ "conditions": self.conditions });
        if let Some(at_provider) = &self.at_provider {
            status["atProvider"] = at_provider.clone();
        }
        serde_json::json!({ "status": status })
    }

    async fn patch<K: ManagedResource>(&self, resource: &K, ctx: &Context) -> Result<()> {
        let api: Api<K> = Api::all(ctx.kube.clone());
        api.patch_status(
            &resource.name_any(),
            &PatchParams::default(),
            &Patch::Merge(&self.to_patch()),
        )
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cloudian::Secret;
    use crate::crd::{
        AccessKey, AccessKeyParameters, AccessKeySpec, ConditionReason, ConditionType, ResourceSpec,
    };

    fn access_key() -> AccessKey {
        let mut key = AccessKey::new(
            "alice-key",
            AccessKeySpec {
                resource: ResourceSpec::default(),
                for_provider: AccessKeyParameters {
                    group_id: "QA".into(),
                    user_id: "alice".into(),
                },
            },
        );
        key.metadata.uid = Some("6c1c6a4e-1d3c-4d0a-9a47-2f2f3f0b9e11".into());
        key
    }

    #[test]
    fn test_status_patch_merges_conditions() {
        let key = access_key();

        let mut status = Status::new(&key)
            .with(Condition::creating())
            .with(Condition::reconcile_success())
            .with(Condition::available());
        status.at_provider = Some(serde_json::json!({"id": "AK1"}));

        let patch = status.to_patch();
        let conditions = patch["status"]["conditions"].as_array().unwrap();
        assert_eq!(conditions.len(), 2);
        assert_eq!(conditions[0]["type"], "Ready");
        assert_eq!(conditions[0]["reason"], "Available");
        assert_eq!(conditions[1]["type"], "Synced");
        assert_eq!(patch["status"]["atProvider"]["id"], "AK1");

        assert_eq!(status.conditions[0].type_, ConditionType::Ready);
        assert_eq!(status.conditions[1].reason, ConditionReason::ReconcileSuccess);
    }

    #[test]
    fn test_status_patch_without_observation() {
        let patch = Status::new(&access_key())
            .with(Condition::reconcile_error("boom"))
            .to_patch();

        assert!(patch["status"].get("atProvider").is_none());
        assert_eq!(patch["status"]["conditions"][0]["message"], "boom");
    }

    #[test]
    fn test_connection_secret_is_owned_and_revealed() {
        let details = ConnectionDetails::from([
            ("access_key_id".to_string(), Secret::new("AK1")),
            ("secret_access_key".to_string(), Secret::new("SK1")),
        ]);

        let secret = connection_secret(&access_key(), "alice-s3", "team-a", details);

        assert_eq!(secret.metadata.namespace.as_deref(), Some("team-a"));
        let owner = &secret.metadata.owner_references.unwrap()[0];
        assert_eq!(owner.kind, "AccessKey");
        assert_eq!(owner.controller, Some(true));
        let data = secret.string_data.unwrap();
        assert_eq!(data["secret_access_key"], "SK1");
    }

    fn meta_with(annotations: &[&Annotations]) -> kube::api::ObjectMeta {
        let merged = annotations
            .iter()
            .flat_map(|a| a.iter())
            .map(|(key, value)| (key.to_string(), value.clone()))
            .collect();
        kube::api::ObjectMeta {
            annotations: Some(merged),
            ..Default::default()
        }
    }

    #[test]
    fn test_create_annotations_settle_pending_creation() {
        let started = Utc::now();
        let finished = started + chrono::Duration::milliseconds(250);
        let pending = create_pending_annotations(started);

        // Crashed or lost the annotation patch after creating
        assert!(create_incomplete(&meta_with(&[&pending])));

        let succeeded = create_succeeded_annotations(Some("AK1"), finished);
        let meta = meta_with(&[&pending, &succeeded]);
        assert!(!create_incomplete(&meta));
        assert_eq!(crate::crd::external_name(&meta), Some("AK1"));

        let failed = create_failed_annotations(finished);
        assert!(!create_incomplete(&meta_with(&[&pending, &failed])));

        // A retry after an earlier failure is pending again
        let retry = create_pending_annotations(finished + chrono::Duration::seconds(1));
        assert!(create_incomplete(&meta_with(&[&failed, &retry])));
    }

    #[test]
    fn test_succeeded_annotations_without_external_name() {
        let annotations = create_succeeded_annotations(None, Utc::now());
        assert_eq!(annotations.len(), 1);
        assert!(annotations.contains_key(EXTERNAL_CREATE_SUCCEEDED_ANNOTATION));
    }

    #[test]
    fn test_default_config() {
        let config = ControllerConfig::default();
        assert_eq!(config.poll_interval, Duration::from_secs(60));
        assert!(config.error_backoff < config.poll_interval);
    }
}
