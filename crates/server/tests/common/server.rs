//! Server test utilities.

use super::fixtures::test_audio_data;
use huzi_core::config::AppConfig;
use huzi_server::{AppState, create_router};
use std::path::PathBuf;
use tempfile::TempDir;

/// Landing page written into the static directory.
#[allow(dead_code)]
pub const TEST_INDEX_HTML: &str = "<!doctype html><title>huzi</title>";

/// A test server wrapper with all dependencies.
/// Note: #[allow(dead_code)] because each test file compiles common/ separately.
#[allow(dead_code)]
pub struct TestServer {
    pub router: axum::Router,
    pub state: AppState,
    pub public_dir: PathBuf,
    _temp_dir: TempDir,
}

#[allow(dead_code)]
impl TestServer {
    /// Create a test server in echo mode with the rate gate disabled.
    pub fn new() -> Self {
        Self::with_config(|_| {})
    }

    /// Create a test server with custom config modifications.
    ///
    /// The audio root and static directory point at a temporary `public/`
    /// holding the generated track and an index page.
    pub fn with_config<F>(modifier: F) -> Self
    where
        F: FnOnce(&mut AppConfig),
    {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");

        let public_dir = temp_dir.path().join("public");
        std::fs::create_dir_all(&public_dir).expect("Failed to create public directory");
        std::fs::write(public_dir.join("Andalusia.mp3"), test_audio_data())
            .expect("Failed to write test track");
        std::fs::write(public_dir.join("index.html"), TEST_INDEX_HTML)
            .expect("Failed to write index page");

        let mut config = AppConfig::for_testing();
        config.audio.root = public_dir.clone();
        config.server.static_dir = public_dir.clone();

        // Apply user modifications
        modifier(&mut config);

        let state = AppState::from_config(config).expect("Failed to build app state");
        let router = create_router(state.clone());

        Self {
            router,
            state,
            public_dir,
            _temp_dir: temp_dir,
        }
    }
}
