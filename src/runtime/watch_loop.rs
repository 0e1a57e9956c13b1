//! # Watch Loop
//!
//! Controller watch loop that monitors `GrowthbookInstance` resources and
//! triggers reconciliation when they, their selected children, or the
//! Secrets they read change.

use crate::controller::reconciler::watches::{instances_referencing_secret, instances_selecting};
use crate::controller::reconciler::{reconcile, Reconciler, ReconcilerError};
use crate::crd::{
    GrowthbookClient, GrowthbookFeature, GrowthbookInstance, GrowthbookOrganization,
    GrowthbookUser,
};
use crate::runtime::error_policy::{handle_reconciliation_error, handle_watch_stream_error};
use crate::runtime::initialization::InitializationResult;
use crate::runtime::triggers::{Decision, TriggerTracker};
use futures::StreamExt;
use k8s_openapi::api::core::v1::Secret;
use kube::api::Api;
use kube::{Client, Resource, ResourceExt};
use kube_runtime::controller::{self, Action};
use kube_runtime::reflector::{self, ObjectRef, Store};
use kube_runtime::{watcher, Controller, WatchStreamExt};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn, Instrument};

/// Initial and maximum delay after a throttled watch (milliseconds)
const WATCH_BACKOFF_START_MS: u64 = 500;
const WATCH_BACKOFF_MAX_MS: u64 = 30_000;

/// Reflector stores of the kinds whose Secrets an Instance reads
struct SecretOwners {
    users: Store<GrowthbookUser>,
    clients: Store<GrowthbookClient>,
}

/// Run the controller watch loop
///
/// Sets up the Kubernetes controller to watch `GrowthbookInstance` resources
/// and the related kinds, handles graceful shutdown and restarts the watch
/// when its stream ends.
pub async fn run_watch_loop(init: InitializationResult) -> Result<(), anyhow::Error> {
    let InitializationResult {
        client,
        instances,
        reconciler,
        server_state,
        config,
    } = init;

    let backoff_duration_ms = Arc::new(AtomicU64::new(WATCH_BACKOFF_START_MS));

    let shutdown_server_state = Arc::clone(&server_state);
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        info!("Received shutdown signal (SIGINT/SIGTERM), initiating graceful shutdown...");
        shutdown_server_state.is_ready.store(false, Ordering::Relaxed);
        info!("Marked server as not ready, waiting for in-flight reconciliations to complete...");
    });

    let secret_owners = config
        .watch_secrets
        .then(|| start_secret_owner_reflectors(&client));

    loop {
        if !server_state.is_ready.load(Ordering::Relaxed) {
            info!("Shutdown requested, exiting watch loop");
            break;
        }

        let watch_span = tracing::span!(
            tracing::Level::INFO,
            "controller.watch",
            operation = "watch_loop"
        );

        let backoff = Arc::clone(&backoff_duration_ms);
        let restart_delay = config.watch_restart_delay();
        let controller_future = build_controller(
            &client,
            instances.clone(),
            &reconciler,
            secret_owners.as_ref(),
        )
        .shutdown_on_signal()
        .run(
            create_reconcile_fn,
            handle_reconciliation_error,
            Arc::clone(&reconciler),
        )
        .filter_map(move |x| {
            let backoff = Arc::clone(&backoff);
            async move {
                match &x {
                    Ok(_) => {
                        backoff.store(WATCH_BACKOFF_START_MS, Ordering::Relaxed);
                        debug!("watch.event.success");
                        Some(x)
                    }
                    Err(e) => {
                        let error_string = format!("{e:?}");
                        handle_watch_stream_error(
                            &error_string,
                            &backoff,
                            WATCH_BACKOFF_MAX_MS,
                            restart_delay,
                        )
                        .await
                        .map(|()| x)
                    }
                }
            }
        })
        .for_each(|_| futures::future::ready(()));

        info!("Starting controller watch loop...");
        controller_future.instrument(watch_span).await;

        if !server_state.is_ready.load(Ordering::Relaxed) {
            info!("Shutdown requested, exiting watch loop");
            break;
        }

        warn!(
            "Controller watch stream ended, restarting in {} seconds...",
            restart_delay.as_secs()
        );
        tokio::time::sleep(restart_delay).await;
    }

    info!("Controller stopped gracefully");
    Ok(())
}

/// Instance controller with watches on every related kind
fn build_controller(
    client: &Client,
    instances: Api<GrowthbookInstance>,
    reconciler: &Reconciler,
    secret_owners: Option<&SecretOwners>,
) -> Controller<GrowthbookInstance> {
    let controller = Controller::new(instances, watcher::Config::default().any_semantic())
        .with_config(
            controller::Config::default()
                .concurrency(reconciler.config.max_concurrent_reconciliations),
        );
    let store = controller.store();
    let triggers = &reconciler.triggers;

    let controller = controller
        .watches(
            Api::<GrowthbookOrganization>::all(client.clone()),
            watcher::Config::default(),
            selecting_mapper(store.clone(), triggers.clone()),
        )
        .watches(
            Api::<GrowthbookUser>::all(client.clone()),
            watcher::Config::default(),
            selecting_mapper(store.clone(), triggers.clone()),
        )
        .watches(
            Api::<GrowthbookFeature>::all(client.clone()),
            watcher::Config::default(),
            selecting_mapper(store.clone(), triggers.clone()),
        )
        .watches(
            Api::<GrowthbookClient>::all(client.clone()),
            watcher::Config::default(),
            selecting_mapper(store.clone(), triggers.clone()),
        );

    match secret_owners {
        Some(owners) => {
            let users = owners.users.clone();
            let clients = owners.clients.clone();
            let triggers = triggers.clone();
            controller.watches(
                Api::<Secret>::all(client.clone()),
                watcher::Config::default(),
                move |secret: Secret| {
                    mark_related(
                        &triggers,
                        instances_referencing_secret(
                            &store.state(),
                            &users.state(),
                            &clients.state(),
                            &secret,
                        ),
                    )
                },
            )
        }
        None => controller,
    }
}

/// Keep User and Client caches for resolving Secret changes
fn start_secret_owner_reflectors(client: &Client) -> SecretOwners {
    let (users, users_writer) = reflector::store::<GrowthbookUser>();
    let (clients, clients_writer) = reflector::store::<GrowthbookClient>();

    let user_events = watcher(Api::<GrowthbookUser>::all(client.clone()), watcher::Config::default())
        .default_backoff()
        .reflect(users_writer)
        .applied_objects();
    tokio::spawn(user_events.for_each(|_| futures::future::ready(())));

    let client_events =
        watcher(Api::<GrowthbookClient>::all(client.clone()), watcher::Config::default())
            .default_backoff()
            .reflect(clients_writer)
            .applied_objects();
    tokio::spawn(client_events.for_each(|_| futures::future::ready(())));

    SecretOwners { users, clients }
}

fn selecting_mapper<K: Resource + 'static>(
    store: Store<GrowthbookInstance>,
    triggers: TriggerTracker,
) -> impl Fn(K) -> Vec<ObjectRef<GrowthbookInstance>> + Send + Sync + 'static {
    move |object: K| mark_related(&triggers, instances_selecting(&store.state(), &object))
}

fn mark_related(
    triggers: &TriggerTracker,
    instances: Vec<ObjectRef<GrowthbookInstance>>,
) -> Vec<ObjectRef<GrowthbookInstance>> {
    for instance in &instances {
        triggers.mark_related(&format!(
            "{}/{}",
            instance.namespace.as_deref().unwrap_or_default(),
            instance.name
        ));
    }
    instances
}

/// Classify the request and run a pass when it warrants one. Skipped
/// requests hand back the requeue that is still pending.
fn create_reconcile_fn(
    obj: Arc<GrowthbookInstance>,
    ctx: Arc<Reconciler>,
) -> impl std::future::Future<Output = Result<Action, ReconcilerError>> + Send {
    let name = obj.name_any();
    let namespace = obj.namespace().unwrap_or_default();
    let key = format!("{namespace}/{name}");

    async move {
        match ctx.triggers.classify(&key, &obj) {
            Decision::Skip(pending) => {
                debug!(
                    resource.name = name.as_str(),
                    resource.namespace = namespace.as_str(),
                    generation = obj.metadata.generation.unwrap_or(0),
                    "Skipping reconciliation - no spec, child or schedule change"
                );
                Ok(pending.map_or_else(Action::await_change, Action::requeue))
            }
            Decision::Reconcile(trigger) => {
                let span = tracing::info_span!(
                    "reconcile",
                    resource.name = name.as_str(),
                    resource.namespace = namespace.as_str(),
                    resource.kind = "GrowthbookInstance",
                    resource.generation = obj.metadata.generation.unwrap_or(0),
                    trigger = trigger.as_str()
                );
                reconcile(obj, ctx, trigger).instrument(span).await
            }
        }
    }
}
