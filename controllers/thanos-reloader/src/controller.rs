//! Main controller implementation.
//!
//! This module contains the `Controller` struct that wires the ConfigMap
//! watcher to the reload worker and owns both background tasks.

use crate::classifier::ChangeClassifier;
use crate::config::Settings;
use crate::error::ControllerError;
use crate::state::{StateWatch, StatusBoard};
use crate::trigger::{ReloadQueue, ReloadWorker, RetryTrigger};
use crate::watcher::Dispatcher;
use futures::Stream;
use k8s_openapi::api::core::v1::ConfigMap;
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Api, Client, Config};
use kube_runtime::{WatchStreamExt, watcher};
use reload_client::{ReloadClient, ReloadClientTrait};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{Instrument, error, info, info_span, warn};

/// Builds cluster credentials from `path`, falling back to the in-cluster
/// service account.
pub async fn load_kube_config(path: &Path) -> Result<Config, ControllerError> {
    let from_file = match Kubeconfig::read_from(path) {
        Ok(kubeconfig) => Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
            .await
            .map_err(|e| e.to_string()),
        Err(e) => Err(e.to_string()),
    };

    match from_file {
        Ok(config) => {
            info!("Using kubeconfig {}", path.display());
            Ok(config)
        }
        Err(file_err) => {
            warn!("Cannot use kubeconfig {}: {}; trying in-cluster config", path.display(), file_err);
            Config::incluster().map_err(|e| {
                error!("Cannot get a kubeconfig.");
                ControllerError::Credentials(format!("{}: {}; in-cluster: {}", path.display(), file_err, e))
            })
        }
    }
}

/// Main controller for the Thanos rules ConfigMap.
#[derive(Debug)]
pub struct Controller {
    dispatcher: JoinHandle<Result<(), ControllerError>>,
    worker: JoinHandle<()>,
    status: StatusBoard,
}

impl Controller {
    /// Creates a controller from settings and starts watching.
    pub async fn new(settings: &Settings, shutdown: oneshot::Receiver<()>) -> Result<Self, ControllerError> {
        info!("Initializing Thanos reloader");

        // Create Kubernetes client
        let kube_config = load_kube_config(&settings.kube_config_file).await?;
        let kube_client = Client::try_from(kube_config)?;

        // Create reload client
        let reload_client = Arc::new(ReloadClient::new(&settings.reload_url)?);
        info!("Reload endpoint: {}", reload_client.endpoint());

        let configmap_api: Api<ConfigMap> = Api::namespaced(kube_client, &settings.namespace);
        let events = watcher(configmap_api, watcher::Config::default()).default_backoff();

        Ok(Self::start(events, reload_client, ChangeClassifier::default(), shutdown))
    }

    /// Spawns the dispatcher over `events` and the reload worker over `client`.
    pub fn start<S, C>(
        events: S,
        client: Arc<C>,
        classifier: ChangeClassifier,
        shutdown: oneshot::Receiver<()>,
    ) -> Self
    where
        S: Stream<Item = Result<watcher::Event<ConfigMap>, watcher::Error>> + Send + 'static,
        C: ReloadClientTrait + 'static,
    {
        let status = StatusBoard::new();
        let (queue, requests) = ReloadQueue::bounded();

        let worker = ReloadWorker::new(RetryTrigger::new(client), status.clone());
        let worker = tokio::spawn(worker.run(requests).instrument(info_span!("reload_worker")));

        let dispatcher = Dispatcher::new(classifier, queue, status.clone());
        let dispatcher = tokio::spawn(
            dispatcher
                .run(events, shutdown)
                .instrument(info_span!("dispatcher")),
        );

        Self {
            dispatcher,
            worker,
            status,
        }
    }

    /// Subscribes to controller state changes.
    pub fn state(&self) -> StateWatch {
        self.status.subscribe()
    }

    /// Runs the controller until shutdown.
    ///
    /// A reload sequence already running when the watcher stops is allowed to
    /// finish before this returns; a pending one is dropped.
    pub async fn run(self) -> Result<(), ControllerError> {
        info!("Thanos reloader running");

        let watched = self
            .dispatcher
            .await
            .map_err(|e| ControllerError::Watch(format!("ConfigMap watcher panicked: {}", e)))?;

        info!("Waiting for in-flight reloads to finish");
        if let Err(e) = self.worker.await {
            error!("Reload worker panicked: {}", e);
        }

        watched
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::ControllerState;
    use crate::test_utils::{create_rules_configmap, create_test_configmap, create_unlabeled_configmap};
    use crate::trigger::RELOAD_INTERVAL;
    use futures::stream::{self, StreamExt};
    use reload_client::MockReloadClient;
    use std::time::Duration;
    use tokio::time::Instant;

    const ENDPOINT: &str = "http://localhost:10902/-/reload";

    type WatchItem = Result<watcher::Event<ConfigMap>, watcher::Error>;

    /// Initial list containing `listed`, then `events`, then an idle watch.
    fn watch_stream(
        listed: Vec<ConfigMap>,
        events: Vec<watcher::Event<ConfigMap>>,
    ) -> impl Stream<Item = WatchItem> + Send + 'static {
        let mut all = vec![watcher::Event::Init];
        all.extend(listed.into_iter().map(watcher::Event::InitApply));
        all.push(watcher::Event::InitDone);
        all.extend(events);
        stream::iter(all.into_iter().map(Ok)).chain(stream::pending())
    }

    fn start(
        stream: impl Stream<Item = WatchItem> + Send + 'static,
        client: &Arc<MockReloadClient>,
    ) -> (Controller, oneshot::Sender<()>) {
        let (stop_tx, stop_rx) = oneshot::channel();
        let controller = Controller::start(stream, client.clone(), ChangeClassifier::default(), stop_rx);
        (controller, stop_tx)
    }

    #[tokio::test(start_paused = true)]
    async fn test_added_rules_configmap_sends_ten_reloads() {
        let client = Arc::new(MockReloadClient::new(ENDPOINT));
        let start_at = Instant::now();
        let (controller, stop) = start(
            watch_stream(vec![], vec![watcher::Event::Apply(create_rules_configmap("1"))]),
            &client,
        );

        tokio::time::sleep(Duration::from_secs(150)).await;

        let times = client.call_times();
        assert_eq!(times.len(), 10);
        let first = times[0].duration_since(start_at);
        assert!(first >= RELOAD_INTERVAL && first < RELOAD_INTERVAL + Duration::from_secs(1));
        for pair in times.windows(2) {
            let gap = pair[1].duration_since(pair[0]);
            assert!(gap >= RELOAD_INTERVAL && gap < RELOAD_INTERVAL + Duration::from_secs(1));
        }

        stop.send(()).expect("controller stopped early");
        controller.run().await.expect("controller failed");
    }

    #[tokio::test(start_paused = true)]
    async fn test_added_other_configmap_sends_nothing() {
        let client = Arc::new(MockReloadClient::new(ENDPOINT));
        let (controller, stop) = start(
            watch_stream(
                vec![create_test_configmap("other", &[("name", "other")], "1")],
                vec![watcher::Event::Apply(create_unlabeled_configmap("plain", "2"))],
            ),
            &client,
        );

        tokio::time::sleep(Duration::from_secs(150)).await;
        assert_eq!(client.call_count(), 0);

        stop.send(()).expect("controller stopped early");
        controller.run().await.expect("controller failed");
    }

    #[tokio::test(start_paused = true)]
    async fn test_same_version_update_sends_nothing() {
        let client = Arc::new(MockReloadClient::new(ENDPOINT));
        // Listed without the label, so the initial add is not relevant
        let listed = create_test_configmap("thanos-ruler-rules", &[("name", "pending")], "5");
        let (controller, stop) = start(
            watch_stream(vec![listed], vec![watcher::Event::Apply(create_rules_configmap("5"))]),
            &client,
        );

        tokio::time::sleep(Duration::from_secs(150)).await;
        assert_eq!(client.call_count(), 0);

        stop.send(()).expect("controller stopped early");
        controller.run().await.expect("controller failed");
    }

    #[tokio::test(start_paused = true)]
    async fn test_update_to_non_matching_label_sends_nothing() {
        let client = Arc::new(MockReloadClient::new(ENDPOINT));
        let relabelled = create_test_configmap("thanos-ruler-rules", &[("name", "other")], "2");
        let (controller, stop) = start(
            watch_stream(vec![create_rules_configmap("1")], vec![watcher::Event::Apply(relabelled)]),
            &client,
        );

        tokio::time::sleep(Duration::from_secs(250)).await;
        // All ten come from the initial add; the relabelling update adds none
        assert_eq!(client.call_count(), 10);

        stop.send(()).expect("controller stopped early");
        controller.run().await.expect("controller failed");
    }

    #[tokio::test(start_paused = true)]
    async fn test_relevant_update_then_relabel() {
        let client = Arc::new(MockReloadClient::new(ENDPOINT));
        let listed = create_test_configmap("thanos-ruler-rules", &[("name", "pending")], "1");
        let relabelled = create_test_configmap("thanos-ruler-rules", &[("name", "other")], "3");
        let (controller, stop) = start(
            watch_stream(
                vec![listed],
                vec![
                    watcher::Event::Apply(create_rules_configmap("2")),
                    watcher::Event::Apply(relabelled),
                ],
            ),
            &client,
        );

        tokio::time::sleep(Duration::from_secs(250)).await;
        // Only the 1 -> 2 update matched
        assert_eq!(client.call_count(), 10);

        stop.send(()).expect("controller stopped early");
        controller.run().await.expect("controller failed");
    }

    #[tokio::test(start_paused = true)]
    async fn test_deleted_rules_configmap_sends_nothing() {
        let client = Arc::new(MockReloadClient::new(ENDPOINT));
        let listed = create_test_configmap("thanos-ruler-rules", &[("name", "pending")], "1");
        let (controller, stop) = start(
            watch_stream(vec![listed], vec![watcher::Event::Delete(create_rules_configmap("2"))]),
            &client,
        );

        tokio::time::sleep(Duration::from_secs(150)).await;
        assert_eq!(client.call_count(), 0);

        stop.send(()).expect("controller stopped early");
        controller.run().await.expect("controller failed");
    }

    #[tokio::test(start_paused = true)]
    async fn test_unreachable_endpoint_keeps_watching() {
        let client = Arc::new(MockReloadClient::unreachable(ENDPOINT));
        let (controller, stop) = start(
            watch_stream(vec![], vec![watcher::Event::Apply(create_rules_configmap("1"))]),
            &client,
        );
        let state = controller.state();

        tokio::time::sleep(Duration::from_secs(150)).await;

        assert_eq!(client.call_count(), 10);
        assert_eq!(state.current(), ControllerState::Watching);
        assert!(!controller.dispatcher.is_finished());

        stop.send(()).expect("controller stopped early");
        controller.run().await.expect("controller failed");
        assert_eq!(state.current(), ControllerState::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn test_becomes_ready_after_initial_list() {
        let client = Arc::new(MockReloadClient::new(ENDPOINT));
        let (controller, stop) = start(watch_stream(vec![], vec![]), &client);
        let mut state = controller.state();

        assert!(state.ready().await);
        assert_eq!(state.current(), ControllerState::Watching);

        drop(stop);
        controller.run().await.expect("controller failed");
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_lets_running_sequence_finish() {
        let client = Arc::new(MockReloadClient::new(ENDPOINT));
        let (controller, stop) = start(
            watch_stream(vec![], vec![watcher::Event::Apply(create_rules_configmap("1"))]),
            &client,
        );

        tokio::time::sleep(Duration::from_secs(25)).await;
        assert_eq!(client.call_count(), 2);

        stop.send(()).expect("controller stopped early");
        controller.run().await.expect("controller failed");

        assert_eq!(client.call_count(), 10);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_drops_pending_reload() {
        let client = Arc::new(MockReloadClient::new(ENDPOINT));
        let started = Instant::now();
        let later_change = stream::once(async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok::<_, watcher::Error>(watcher::Event::Apply(create_rules_configmap("2")))
        });
        let (controller, stop) = start(
            watch_stream(vec![], vec![watcher::Event::Apply(create_rules_configmap("1"))])
                .take(3)
                .chain(later_change)
                .chain(stream::pending()),
            &client,
        );

        tokio::time::sleep(Duration::from_secs(25)).await;
        assert_eq!(client.call_count(), 2);

        stop.send(()).expect("controller stopped early");
        controller.run().await.expect("controller failed");

        assert_eq!(client.call_count(), 10);
        assert!(started.elapsed() < RELOAD_INTERVAL * 11);
    }

    #[tokio::test(start_paused = true)]
    async fn test_watch_errors_do_not_stop_the_dispatcher() {
        let client = Arc::new(MockReloadClient::new(ENDPOINT));
        let events: Vec<WatchItem> = vec![
            Ok(watcher::Event::Init),
            Ok(watcher::Event::InitDone),
            Err(watcher::Error::NoResourceVersion),
            Ok(watcher::Event::Apply(create_rules_configmap("1"))),
        ];
        let (controller, stop) = start(stream::iter(events).chain(stream::pending()), &client);

        tokio::time::sleep(Duration::from_secs(150)).await;

        assert_eq!(client.call_count(), 10);
        assert!(!controller.dispatcher.is_finished());

        stop.send(()).expect("controller stopped early");
        controller.run().await.expect("controller failed");
    }

    #[tokio::test(start_paused = true)]
    async fn test_stream_end_is_an_error() {
        let client = Arc::new(MockReloadClient::new(ENDPOINT));
        let (stop_tx, stop_rx) = oneshot::channel();
        let events: Vec<WatchItem> = vec![Ok(watcher::Event::Init), Ok(watcher::Event::InitDone)];
        let controller = Controller::start(
            stream::iter(events),
            client,
            ChangeClassifier::default(),
            stop_rx,
        );

        let result = controller.run().await;
        drop(stop_tx);

        assert!(matches!(result, Err(ControllerError::Watch(_))));
    }
}
