//! Caster construction against mock services

use feedcast::availability::AssumeAvailable;
use feedcast::config::BackendKind;
use feedcast::{
    CasterServices, Config, ConverterChain, FeedCaster, JsonFileStore, SourceResolver,
};
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;
use wiremock::MockServer;

/// Configuration writing below `data_dir` and converting through `converter`
///
/// The server binds an ephemeral loopback port.
pub fn test_config(data_dir: &Path, converter: &MockServer) -> Config {
    let mut config = Config {
        data_dir: data_dir.to_path_buf(),
        ..Default::default()
    };
    config.server.bind_address = [127, 0, 0, 1].into();
    config.server.port = 0;
    config.server.host = Some("podcasts.test:8080".to_string());
    config.retry.max_attempts = 0;
    config.converter.backends = vec![BackendKind::LoaderTo];
    config.converter.loader_base_url = converter.uri();
    config.converter.mimic_human = false;
    config.converter.poll_interval_ms = 10;
    config
}

/// Caster without yt-dlp, every link treated as available
pub fn create_caster(config: Config) -> FeedCaster {
    let services = CasterServices {
        resolver: SourceResolver::new(&config, None).expect("resolver"),
        converter: ConverterChain::from_config(&config, None).expect("converter chain"),
        availability: Arc::new(AssumeAvailable),
        store: Arc::new(JsonFileStore::in_dir(&config.data_dir)),
    };
    FeedCaster::from_parts(config, services)
}

/// Caster with its own temporary data directory
pub fn create_test_caster(converter: &MockServer) -> (FeedCaster, TempDir) {
    let temp_dir = tempfile::tempdir().expect("temp dir");
    let caster = create_caster(test_config(temp_dir.path(), converter));
    (caster, temp_dir)
}
