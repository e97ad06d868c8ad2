use crate::application::polling::PollingController;
use crate::application::use_cases::list_builds::{DEFAULT_PAGE_SIZE, ListBuildsInteractor};
use crate::domain::errors::TravisError;
use crate::domain::external_apis::host::ErrorApi;
use crate::domain::external_apis::travis::TravisCiApi;
use crate::domain::models::build::{Build, BuildsPage, PageCursor};
use crate::domain::models::entity::RepoSlug;
use anyhow::{Context, Error};
use async_stream::stream;
use futures_util::Stream;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamBuildsUseCaseInput {
    pub page: u32,
    pub page_size: u32,
}

impl Default for StreamBuildsUseCaseInput {
    fn default() -> Self {
        Self {
            page: 0,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

#[derive(Serialize, Debug, Clone)]
pub struct StreamBuildsUseCaseOutput {
    pub cursor: PageCursor,
    pub builds: Vec<Build>,
}

impl From<BuildsPage> for StreamBuildsUseCaseOutput {
    fn from(page: BuildsPage) -> Self {
        Self {
            cursor: page.cursor,
            builds: page.builds,
        }
    }
}

pub trait StreamBuildsUseCase {
    fn execute(
        &self,
        input: StreamBuildsUseCaseInput,
    ) -> impl Stream<Item = Result<StreamBuildsUseCaseOutput, Error>> + Send;
}

/// Build count last seen for a repository. The count only changes when the
/// configured repository does; new builds show up through the row count.
#[derive(Default)]
struct KnownTotal {
    entry: Mutex<Option<(RepoSlug, u64)>>,
}

impl KnownTotal {
    async fn get_or_load<A: TravisCiApi + 'static>(
        &self,
        list_builds: &ListBuildsInteractor<A>,
        slug: &RepoSlug,
    ) -> Result<u64, TravisError> {
        let mut entry = self.entry.lock().await;
        if let Some((_, total)) = entry.as_ref().filter(|(known, _)| known == slug) {
            return Ok(*total);
        }
        let total = list_builds.load_total(slug).await?;
        *entry = Some((slug.clone(), total));
        Ok(total)
    }
}

/// Keeps one page of builds of the configured repository fresh for a
/// long-lived consumer. Each stream owns its own polling loop, which stops
/// when the stream is dropped. Settings are re-read on every tick.
pub struct StreamBuildsInteractor<A: TravisCiApi + 'static> {
    list_builds: Arc<ListBuildsInteractor<A>>,
    error_api: Arc<dyn ErrorApi>,
    interval: Duration,
}

impl<A: TravisCiApi + 'static> StreamBuildsInteractor<A> {
    pub fn new(
        list_builds: Arc<ListBuildsInteractor<A>>,
        error_api: Arc<dyn ErrorApi>,
        interval: Duration,
    ) -> Self {
        Self {
            list_builds,
            error_api,
            interval,
        }
    }
}

impl<A: TravisCiApi + 'static> StreamBuildsUseCase for StreamBuildsInteractor<A> {
    fn execute(
        &self,
        input: StreamBuildsUseCaseInput,
    ) -> impl Stream<Item = Result<StreamBuildsUseCaseOutput, Error>> + Send {
        let list_builds = Arc::clone(&self.list_builds);
        let known_total = Arc::new(KnownTotal::default());
        let poller: PollingController<BuildsPage> =
            PollingController::new(Arc::clone(&self.error_api)).with_interval(self.interval);

        stream! {
            let mut updates = poller.subscribe();
            let StreamBuildsUseCaseInput { page, page_size } = input;
            tracing::info!("Streaming builds (page {}, size {})", page, page_size);

            poller.start_polling(move || {
                let list_builds = Arc::clone(&list_builds);
                let known_total = Arc::clone(&known_total);
                async move {
                    let (slug, ci_domain) = list_builds.settings().ready_repo()?;
                    let total = known_total.get_or_load(&list_builds, &slug).await?;
                    list_builds
                        .load_rows(&slug, ci_domain, page, page_size, total)
                        .await
                }
            });

            loop {
                if let Err(e) = updates.changed().await.context("Polling loop ended") {
                    yield Err(e);
                    break;
                }
                let update = updates.borrow_and_update().clone();
                match update {
                    Some(Ok(page)) => {
                        tracing::debug!("Yielding {} builds", page.builds.len());
                        yield Ok(page.into());
                    }
                    Some(Err(e)) => yield Err(Error::new(e).context("Failed to fetch builds")),
                    None => {}
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::polling::POLL_INTERVAL;
    use crate::application::settings_store::SettingsStore;
    use crate::infrastructures::adapters::secondary::host::storage::MemorySessionStorage;
    use crate::application::use_cases::list_builds::tests::{
        FakeTravisApi, RecordingErrorApi, ready_settings,
    };
    use crate::domain::models::settings::{CiDomain, Settings};
    use futures_util::StreamExt;

    fn interactor(api: Arc<FakeTravisApi>) -> StreamBuildsInteractor<FakeTravisApi> {
        let errors = Arc::new(RecordingErrorApi::default());
        let list = Arc::new(ListBuildsInteractor::new(api, ready_settings(), errors.clone()));
        StreamBuildsInteractor::new(list, errors, POLL_INTERVAL)
    }

    fn other_repo() -> Settings {
        Settings {
            owner: "other".into(),
            repo: "repo2".into(),
            token: "xyz123".into(),
            ci_domain: CiDomain::TravisCiOrg,
        }
    }

    fn input() -> StreamBuildsUseCaseInput {
        StreamBuildsUseCaseInput::default()
    }

    #[tokio::test(start_paused = true)]
    async fn yields_a_fresh_page_per_poll() {
        let api = Arc::new(FakeTravisApi::with_history(12));
        let use_case = interactor(api.clone());
        let stream = use_case.execute(input());
        tokio::pin!(stream);

        let first = stream.next().await.unwrap().unwrap();
        assert_eq!(first.builds.len(), 5);
        assert_eq!(first.cursor.total, 12);
        assert_eq!(first.builds[0].id, "12");

        let second = stream.next().await.unwrap().unwrap();
        assert_eq!(second.builds.len(), 5);
        assert_eq!(second.cursor.total, 12);
        // the total side request only runs on the first poll
        let requests = api.requests.lock().unwrap();
        let limits: Vec<_> = requests.iter().map(|r| r.limit).collect();
        assert_eq!(limits, [1, 5, 5]);
    }

    #[tokio::test(start_paused = true)]
    async fn saved_settings_retarget_the_next_poll() {
        let api = Arc::new(FakeTravisApi::with_history(3));
        let use_case = interactor(api.clone());
        let stream = use_case.execute(input());
        tokio::pin!(stream);

        let before = stream.next().await.unwrap().unwrap();
        assert_eq!(
            before.builds[0].build_url,
            "https://travis-ci.com/RoadieHQ/sample-service/builds/1003"
        );

        use_case.list_builds.settings().save_settings(other_repo()).unwrap();
        let after = stream.next().await.unwrap().unwrap();
        assert_eq!(
            after.builds[0].build_url,
            "https://travis-ci.org/other/repo2/builds/1003"
        );

        let requests = api.requests.lock().unwrap();
        let last_two: Vec<_> = requests[requests.len() - 2..]
            .iter()
            .map(|r| (r.repo_slug.to_string(), r.limit))
            .collect();
        // a new repository gets its own total
        assert_eq!(
            last_two,
            [("other/repo2".to_string(), 1), ("other/repo2".to_string(), 5)]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn missing_credentials_are_yielded_until_saved() {
        let api = Arc::new(FakeTravisApi::with_history(2));
        let errors = Arc::new(RecordingErrorApi::default());
        let store = Arc::new(SettingsStore::new(Arc::new(MemorySessionStorage::default())));
        let list = Arc::new(ListBuildsInteractor::new(api.clone(), Arc::clone(&store), errors.clone()));
        let use_case = StreamBuildsInteractor::new(list, errors, POLL_INTERVAL);
        let stream = use_case.execute(input());
        tokio::pin!(stream);

        let err = stream.next().await.unwrap().unwrap_err();
        assert!(format!("{err:#}").contains("No credentials provided"));
        assert!(api.requests.lock().unwrap().is_empty());

        store.save_settings(other_repo()).unwrap();
        let page = stream.next().await.unwrap().unwrap();
        assert_eq!(page.builds.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn failures_are_yielded_without_ending_the_stream() {
        let api = Arc::new(FakeTravisApi::with_history(3));
        *api.fail_with.lock().unwrap() = Some(TravisError::request(Some(502), "Bad Gateway"));
        let use_case = interactor(api.clone());
        let stream = use_case.execute(input());
        tokio::pin!(stream);

        let err = stream.next().await.unwrap().unwrap_err();
        assert!(err.to_string().contains("Failed to fetch builds"));

        *api.fail_with.lock().unwrap() = None;
        let page = stream.next().await.unwrap().unwrap();
        assert_eq!(page.builds.len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_the_stream_stops_polling() {
        let api = Arc::new(FakeTravisApi::with_history(3));
        let use_case = interactor(api.clone());
        {
            let stream = use_case.execute(input());
            tokio::pin!(stream);
            stream.next().await.unwrap().unwrap();
        }
        let before = api.requests.lock().unwrap().len();
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(api.requests.lock().unwrap().len(), before);
    }
}
