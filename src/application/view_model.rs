use crate::domain::models::build::{
    Build, BuildResponse, BuildSource, CommitInfo, RestartBuild, RestartHandle, StatusKind,
};
use std::sync::Arc;

/// Human label for a vendor build state. Codes outside the table pass through.
pub fn make_readable_status(status: Option<&str>) -> String {
    let Some(status) = status.filter(|s| !s.is_empty()) else {
        return String::new();
    };
    let label = match status {
        "retried" => "Retried",
        "canceled" => "Canceled",
        "infrastructure_fail" => "Infra fail",
        "timedout" => "Timedout",
        "not_run" => "Not run",
        "running" => "Running",
        "failed" => "Failed",
        "queued" => "Queued",
        "scheduled" => "Scheduled",
        "not_running" => "Not running",
        "no_tests" => "No tests",
        "fixed" => "Fixed",
        "success" => "Success",
        other => other,
    };
    label.to_string()
}

/// Indicator bucket for a status as shown next to the label.
pub fn status_kind(status: &str) -> StatusKind {
    match status.to_lowercase().as_str() {
        "queued" | "created" => StatusKind::Pending,
        "started" => StatusKind::Running,
        "failed" => StatusKind::Error,
        "passed" => StatusKind::Ok,
        _ => StatusKind::Warning,
    }
}

/// Builds table rows from vendor records, in input order.
///
/// `ci_base_url` is the public web UI root (`https://travis-ci.com/`) and
/// `project_name` the `owner/repo` slug; the vendor `@href` is appended to both.
pub fn transform(
    builds: &[BuildResponse],
    restart: &Arc<dyn RestartBuild>,
    ci_base_url: &str,
    project_name: &str,
) -> Vec<Build> {
    builds
        .iter()
        .map(|build| {
            let commit = build.commit.as_ref();
            let readable = make_readable_status(Some(&build.state));
            Build {
                id: build.number.clone(),
                build_id: build.id,
                build_name: commit.map(|c| c.message.clone()).unwrap_or_default(),
                source: BuildSource {
                    branch_name: build
                        .branch
                        .as_ref()
                        .map(|b| b.name.clone())
                        .unwrap_or_default(),
                    commit: CommitInfo {
                        hash: commit.map(|c| c.sha.clone()).unwrap_or_default(),
                        url: commit.map(|c| c.compare_url.clone()).unwrap_or_default(),
                    },
                },
                finished_at: build.finished_at,
                duration: build.duration,
                raw_status: build.state.clone(),
                status: readable,
                status_kind: status_kind(&build.state),
                build_url: format!("{ci_base_url}{project_name}{}", build.href),
                restart: RestartHandle::new(build.id, Arc::clone(restart)),
            }
        })
        .collect()
}
