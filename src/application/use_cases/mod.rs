pub mod list_builds;
pub mod stream_builds;
pub mod watch_build;
