use scansense::ScanConfig;
use scansense::config::CONFIG_ENV;
use serial_test::serial;
use std::time::Duration;
use tempfile::TempDir;

#[test]
#[serial]
fn env_var_points_at_config_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("scan.toml");
    std::fs::write(
        &path,
        "[detection]\ndetector_timeout_ms = 300\n\n[registry]\ncheck_cooldown_hours = 1\n",
    )
    .unwrap();

    temp_env::with_var(CONFIG_ENV, Some(&path), || {
        assert_eq!(ScanConfig::config_file_path(), Some(path.clone()));
        let config = ScanConfig::load();
        assert_eq!(config.detection.timeout(), Some(Duration::from_millis(300)));
        assert_eq!(config.registry.check_cooldown_hours, 1);
        assert_eq!(config.registry.check_interval_hours, 24);
    });
}

#[test]
#[serial]
fn missing_file_means_defaults() {
    let dir = TempDir::new().unwrap();
    temp_env::with_var(CONFIG_ENV, Some(dir.path().join("absent.toml")), || {
        assert_eq!(ScanConfig::load(), ScanConfig::default());
    });
}

#[test]
#[serial]
fn broken_file_means_defaults() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("broken.toml");
    std::fs::write(&path, "detection = [").unwrap();
    temp_env::with_var(CONFIG_ENV, Some(&path), || {
        assert_eq!(ScanConfig::load(), ScanConfig::default());
    });
}

#[test]
#[serial]
fn empty_env_var_uses_platform_dir() {
    temp_env::with_var(CONFIG_ENV, Some(""), || {
        let expected = ScanConfig::config_dir().map(|dir| dir.join("config.toml"));
        assert_eq!(ScanConfig::config_file_path(), expected);
    });
}
