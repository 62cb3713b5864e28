// tests/config_env.rs
//
// Config loading through the environment override. Env mutation is process-
// global, so these run serialized.

use std::io::Write;

use serial_test::serial;

use trendcast::config::{AppConfig, ENV_CONFIG_PATH};

fn write_temp_toml(tag: &str, content: &str) -> std::path::PathBuf {
    let path = std::env::temp_dir().join(format!(
        "trendcast-config-{tag}-{}.toml",
        std::process::id()
    ));
    let mut f = std::fs::File::create(&path).expect("create temp config");
    f.write_all(content.as_bytes()).expect("write temp config");
    path
}

#[test]
#[serial]
fn env_path_override_wins() {
    let path = write_temp_toml(
        "override",
        r#"
        bind_addr = "0.0.0.0:9999"

        [scheduler]
        tick_secs = 60

        [policy]
        max_posts_per_window = 1
        "#,
    );
    std::env::set_var(ENV_CONFIG_PATH, &path);

    let cfg = AppConfig::load_default().expect("load via env override");
    assert_eq!(cfg.bind_addr, "0.0.0.0:9999");
    assert_eq!(cfg.scheduler.tick_secs, 60);
    assert_eq!(cfg.policy.max_posts_per_window, 1);
    // Untouched sections keep their defaults.
    assert_eq!(cfg.queue.retry_ceiling, 3);

    std::env::remove_var(ENV_CONFIG_PATH);
    let _ = std::fs::remove_file(path);
}

#[test]
#[serial]
fn env_path_to_missing_file_is_an_error() {
    std::env::set_var(ENV_CONFIG_PATH, "/nonexistent/trendcast.toml");
    let err = AppConfig::load_default().unwrap_err();
    assert!(err.to_string().contains(ENV_CONFIG_PATH));
    std::env::remove_var(ENV_CONFIG_PATH);
}

#[test]
#[serial]
fn no_env_and_no_file_falls_back_to_defaults() {
    std::env::remove_var(ENV_CONFIG_PATH);
    let cfg = AppConfig::load_default().expect("built-in defaults");
    assert_eq!(cfg.policy.quiet_start_hour, 23);
    assert_eq!(cfg.scheduler.enqueue_top, 5);
}

#[test]
#[serial]
fn out_of_range_quiet_hours_fail_at_load_not_at_runtime() {
    let path = write_temp_toml(
        "badhours",
        r#"
        [policy]
        quiet_end_hour = 24
        "#,
    );
    std::env::set_var(ENV_CONFIG_PATH, &path);
    let err = AppConfig::load_default().unwrap_err();
    assert!(format!("{err:#}").contains("0..=23"));
    std::env::remove_var(ENV_CONFIG_PATH);
    let _ = std::fs::remove_file(path);
}

#[test]
#[serial]
fn malformed_toml_is_rejected_with_path_context() {
    let path = write_temp_toml("broken", "this is not toml = = =");
    std::env::set_var(ENV_CONFIG_PATH, &path);
    let err = AppConfig::load_default().unwrap_err();
    assert!(err.to_string().contains("parsing config"));
    std::env::remove_var(ENV_CONFIG_PATH);
    let _ = std::fs::remove_file(path);
}
