use showsync::config::ConfigLoader;
use showsync::upstream::UpdatePeriod;
use std::{
    env, fs,
    path::PathBuf,
    sync::{Mutex, MutexGuard, OnceLock},
};
use tempfile::TempDir;

fn env_lock() -> &'static Mutex<()> {
    static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    LOCK.get_or_init(|| Mutex::new(()))
}

fn env_guard() -> MutexGuard<'static, ()> {
    env_lock()
        .lock()
        .unwrap_or_else(|poison| poison.into_inner())
}

const VARS: &[&str] = &[
    "SHOWSYNC_PROFILE",
    "SHOWSYNC_API_BIND_ADDR",
    "SHOWSYNC_LOG_LEVEL",
    "SHOWSYNC_OPERATOR_TOKEN",
    "SHOWSYNC_OPERATOR_TOKENS",
    "SHOWSYNC_WORKFLOW_CONCURRENCY_LIMIT",
    "SHOWSYNC_UPDATE_TIMER_PERIOD",
];

fn clear_env() {
    for var in VARS {
        unsafe {
            env::remove_var(var);
        }
    }
}

fn write_env_file(dir: &TempDir, name: &str, contents: &str) {
    let path = dir.path().join(name);
    fs::write(path, contents).unwrap();
}

fn empty_dir_loader() -> (TempDir, ConfigLoader) {
    let temp_dir = TempDir::new().unwrap();
    let loader = ConfigLoader::with_base_dir(PathBuf::from(temp_dir.path()));
    (temp_dir, loader)
}

#[test]
fn loads_defaults_when_no_env_present() {
    let _guard = env_guard();
    clear_env();

    let (_dir, loader) = empty_dir_loader();
    let cfg = loader.load().expect("config loads with defaults");

    assert_eq!(cfg.profile, "local");
    assert_eq!(cfg.api_bind_addr, "0.0.0.0:8080");
    assert_eq!(cfg.log_level, "info");
    assert_eq!(cfg.workflow.concurrency_limit, 10);
    assert_eq!(cfg.update_timer.period, UpdatePeriod::Day);
    assert!(cfg.operator_tokens.is_empty());
    cfg.bind_addr().expect("default bind addr parses");
    clear_env();
}

#[test]
fn layered_env_files_apply_in_order() {
    let _guard = env_guard();
    clear_env();

    let temp_dir = TempDir::new().unwrap();
    write_env_file(&temp_dir, ".env", "SHOWSYNC_API_BIND_ADDR=127.0.0.1:3000\n");
    write_env_file(
        &temp_dir,
        ".env.test",
        "SHOWSYNC_API_BIND_ADDR=192.168.0.10:5000\nSHOWSYNC_WORKFLOW_CONCURRENCY_LIMIT=4\n",
    );
    write_env_file(
        &temp_dir,
        ".env.test.local",
        "SHOWSYNC_API_BIND_ADDR=10.0.0.5:6000\n",
    );

    // Select profile via .env.local before profile-specific files load.
    write_env_file(
        &temp_dir,
        ".env.local",
        "SHOWSYNC_PROFILE=test\nSHOWSYNC_API_BIND_ADDR=127.0.0.1:4000\n",
    );

    let loader = ConfigLoader::with_base_dir(PathBuf::from(temp_dir.path()));
    let cfg = loader.load().expect("config loads with layered env files");

    assert_eq!(cfg.profile, "test");
    assert_eq!(cfg.api_bind_addr, "10.0.0.5:6000");
    assert_eq!(cfg.workflow.concurrency_limit, 4);
    clear_env();
}

#[test]
fn os_environment_has_highest_precedence() {
    let _guard = env_guard();
    clear_env();

    let temp_dir = TempDir::new().unwrap();
    write_env_file(
        &temp_dir,
        ".env",
        "SHOWSYNC_API_BIND_ADDR=127.0.0.1:3000\nSHOWSYNC_UPDATE_TIMER_PERIOD=week\n",
    );

    unsafe {
        env::set_var("SHOWSYNC_API_BIND_ADDR", "0.0.0.0:9090");
    }

    let loader = ConfigLoader::with_base_dir(PathBuf::from(temp_dir.path()));
    let cfg = loader.load().expect("config loads with env override");
    assert_eq!(cfg.api_bind_addr, "0.0.0.0:9090");
    assert_eq!(cfg.update_timer.period, UpdatePeriod::Week);

    clear_env();
}

#[test]
fn operator_tokens_accept_comma_separated_list() {
    let _guard = env_guard();
    clear_env();

    unsafe {
        env::set_var("SHOWSYNC_OPERATOR_TOKENS", "alpha, beta,,gamma");
    }

    let (_dir, loader) = empty_dir_loader();
    let cfg = loader.load().expect("config loads");
    assert_eq!(cfg.operator_tokens, vec!["alpha", "beta", "gamma"]);

    clear_env();
}

#[test]
fn non_local_profile_without_tokens_is_rejected() {
    let _guard = env_guard();
    clear_env();

    unsafe {
        env::set_var("SHOWSYNC_PROFILE", "production");
    }

    let (_dir, loader) = empty_dir_loader();
    let err = loader.load().expect_err("tokens are required outside local/test");
    assert!(format!("{}", err).contains("no operator tokens configured"));

    clear_env();
}

#[test]
fn invalid_update_period_returns_error() {
    let _guard = env_guard();
    clear_env();

    unsafe {
        env::set_var("SHOWSYNC_UPDATE_TIMER_PERIOD", "fortnight");
    }

    let (_dir, loader) = empty_dir_loader();
    let err = loader.load().expect_err("unknown period should fail");
    assert!(format!("{}", err).contains("invalid update period 'fortnight'"));

    clear_env();
}

#[test]
fn invalid_bind_addr_returns_error() {
    let _guard = env_guard();
    clear_env();

    unsafe {
        env::set_var("SHOWSYNC_API_BIND_ADDR", "not-an-addr");
    }
    let (_dir, loader) = empty_dir_loader();
    let err = loader.load().expect_err("invalid bind addr should fail");
    assert!(format!("{}", err).contains("invalid api bind address"));

    clear_env();
}
