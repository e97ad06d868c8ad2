use crate::application::polling::{PollUpdate, PollingController};
use crate::application::use_cases::list_builds::ListBuildsInteractor;
use crate::domain::errors::TravisError;
use crate::domain::external_apis::host::ErrorApi;
use crate::domain::external_apis::travis::TravisCiApi;
use crate::domain::models::build::Build;
use crate::domain::models::entity::RepoSlug;
use crate::domain::models::settings::CiDomain;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// A single build: fetch it, restart it, or hand out watchers that keep it fresh.
pub struct WatchBuildInteractor<A: TravisCiApi + 'static> {
    api: Arc<A>,
    list: Arc<ListBuildsInteractor<A>>,
    error_api: Arc<dyn ErrorApi>,
    interval: Duration,
}

async fn fetch_build<A: TravisCiApi + 'static>(
    api: &A,
    list: &ListBuildsInteractor<A>,
    slug: &RepoSlug,
    ci_domain: CiDomain,
    build_id: u64,
) -> Result<Build, TravisError> {
    let response = api.get_build(build_id).await?;
    list.transform(slug, ci_domain, std::slice::from_ref(&response))
        .pop()
        .ok_or_else(|| TravisError::request(None, format!("build {build_id} was not returned")))
}

impl<A: TravisCiApi + 'static> WatchBuildInteractor<A> {
    pub fn new(
        api: Arc<A>,
        list: Arc<ListBuildsInteractor<A>>,
        error_api: Arc<dyn ErrorApi>,
        interval: Duration,
    ) -> Self {
        Self {
            api,
            list,
            error_api,
            interval,
        }
    }

    /// Build `build_id` of the repository named in the saved settings.
    #[tracing::instrument(name = "WatchBuildInteractor::get_build", skip(self))]
    pub async fn get_build(&self, build_id: u64) -> Result<Build, TravisError> {
        let (slug, ci_domain) = self.list.settings().ready_repo()?;
        fetch_build(self.api.as_ref(), self.list.as_ref(), &slug, ci_domain, build_id)
        .await
        .inspect_err(|e| self.error_api.post(e))
    }

    pub async fn restart_build(&self, build_id: u64) {
        self.list.restart_build(build_id).await;
    }

    /// A watcher with its own polling loop, for one consumer.
    pub fn watcher(&self) -> BuildWatcher<A> {
        BuildWatcher {
            api: Arc::clone(&self.api),
            list: Arc::clone(&self.list),
            poller: PollingController::new(Arc::clone(&self.error_api))
                .with_interval(self.interval),
            watched: None,
        }
    }
}

/// Keeps one build fresh for its owner. Dropping it stops the loop.
pub struct BuildWatcher<A: TravisCiApi + 'static> {
    api: Arc<A>,
    list: Arc<ListBuildsInteractor<A>>,
    poller: PollingController<Build>,
    watched: Option<u64>,
}

impl<A: TravisCiApi + 'static> BuildWatcher<A> {
    /// Starts refreshing `build_id`. Returns `false` while another build is watched.
    ///
    /// Repository and CI domain are re-read from settings on every tick.
    pub fn start_polling(&mut self, build_id: u64) -> bool {
        let api = Arc::clone(&self.api);
        let list = Arc::clone(&self.list);
        let started = self.poller.start_polling(move || {
            let api = Arc::clone(&api);
            let list = Arc::clone(&list);
            async move {
                let (slug, ci_domain) = list.settings().ready_repo()?;
                fetch_build(api.as_ref(), list.as_ref(), &slug, ci_domain, build_id).await
            }
        });
        if started {
            self.watched = Some(build_id);
            tracing::info!("Watching build {}", build_id);
        }
        started
    }

    pub fn stop_polling(&mut self) {
        self.poller.stop_polling();
        self.watched = None;
    }

    pub fn watched_build(&self) -> Option<u64> {
        self.watched
    }

    pub fn subscribe(&self) -> watch::Receiver<PollUpdate<Build>> {
        self.poller.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::polling::POLL_INTERVAL;
    use crate::application::use_cases::list_builds::tests::{
        FakeTravisApi, RecordingErrorApi, ready_settings,
    };
    use crate::domain::models::settings::Settings;

    fn interactor(
        api: Arc<FakeTravisApi>,
    ) -> (WatchBuildInteractor<FakeTravisApi>, Arc<RecordingErrorApi>) {
        let errors = Arc::new(RecordingErrorApi::default());
        let list = Arc::new(ListBuildsInteractor::new(
            Arc::clone(&api),
            ready_settings(),
            errors.clone(),
        ));
        (
            WatchBuildInteractor::new(api, list, errors.clone(), POLL_INTERVAL),
            errors,
        )
    }

    async fn next_build(updates: &mut watch::Receiver<PollUpdate<Build>>) -> Build {
        loop {
            updates.changed().await.unwrap();
            if let Some(Ok(build)) = &*updates.borrow_and_update() {
                return build.clone();
            }
        }
    }

    #[tokio::test]
    async fn get_build_returns_a_row() {
        let (watch, _) = interactor(Arc::new(FakeTravisApi::with_history(3)));
        let build = watch.get_build(1002).await.unwrap();
        assert_eq!(build.id, "2");
        assert_eq!(build.status, "passed");
    }

    #[tokio::test]
    async fn unknown_build_is_posted_and_returned() {
        let (watch, errors) = interactor(Arc::new(FakeTravisApi::with_history(1)));
        let err = watch.get_build(9).await.unwrap_err();
        assert_eq!(err, TravisError::request(Some(404), "Not Found"));
        assert_eq!(errors.posted.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn restart_goes_through_the_api() {
        let api = Arc::new(FakeTravisApi::with_history(1));
        let (watch, _) = interactor(api.clone());
        watch.restart_build(1001).await;
        assert_eq!(*api.restarted.lock().unwrap(), vec![1001]);
    }

    #[tokio::test(start_paused = true)]
    async fn each_watcher_polls_its_own_build() {
        let (watch, _) = interactor(Arc::new(FakeTravisApi::with_history(2)));
        let mut first = watch.watcher();
        let mut second = watch.watcher();
        let mut first_updates = first.subscribe();
        let mut second_updates = second.subscribe();

        assert!(first.start_polling(1001));
        assert!(!first.start_polling(1002));
        assert!(second.start_polling(1002));
        assert_eq!(first.watched_build(), Some(1001));
        assert_eq!(second.watched_build(), Some(1002));

        assert_eq!(next_build(&mut first_updates).await.id, "1");
        assert_eq!(next_build(&mut second_updates).await.id, "2");
    }

    #[tokio::test(start_paused = true)]
    async fn switching_builds_drops_the_old_value() {
        let (watch, _) = interactor(Arc::new(FakeTravisApi::with_history(2)));
        let mut watcher = watch.watcher();
        let mut updates = watcher.subscribe();

        assert!(watcher.start_polling(1001));
        assert_eq!(next_build(&mut updates).await.id, "1");

        watcher.stop_polling();
        assert_eq!(watcher.watched_build(), None);
        assert!(watcher.start_polling(1002));
        assert!(updates.borrow().is_none());
        assert_eq!(next_build(&mut updates).await.id, "2");
    }

    #[tokio::test(start_paused = true)]
    async fn ticks_follow_saved_settings() {
        let (watch, _) = interactor(Arc::new(FakeTravisApi::with_history(1)));
        let mut watcher = watch.watcher();
        let mut updates = watcher.subscribe();

        watcher.start_polling(1001);
        let before = next_build(&mut updates).await;
        assert_eq!(
            before.build_url,
            "https://travis-ci.com/RoadieHQ/sample-service/builds/1001"
        );

        watch
            .list
            .settings()
            .save_settings(Settings {
                owner: "other".into(),
                repo: "repo2".into(),
                token: "xyz123".into(),
                ci_domain: CiDomain::TravisCiOrg,
            })
            .unwrap();
        let after = next_build(&mut updates).await;
        assert_eq!(after.build_url, "https://travis-ci.org/other/repo2/builds/1001");
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_the_watcher_stops_polling() {
        let api = Arc::new(FakeTravisApi::with_history(1));
        let (watch, errors) = interactor(api.clone());
        {
            let mut watcher = watch.watcher();
            let mut updates = watcher.subscribe();
            watcher.start_polling(1001);
            next_build(&mut updates).await;
        }
        // any tick after the drop would fail and be posted
        *api.fail_with.lock().unwrap() = Some(TravisError::request(Some(500), "boom"));
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(errors.posted.lock().unwrap().is_empty());
    }
}
