use catalog_ingest::config::{ConfigError, ConfigLoader};
use std::{
    env, fs,
    path::PathBuf,
    sync::{Mutex, MutexGuard, OnceLock},
};
use tempfile::TempDir;

const VARS: &[&str] = &[
    "INGEST_PROFILE",
    "INGEST_LOG_LEVEL",
    "INGEST_DATABASE_URL",
    "INGEST_UPLOAD_DIR",
    "INGEST_ATTRIBUTE_PREFIX",
    "INGEST_DISCOUNT_TOLERANCE",
    "INGEST_DEFAULT_CATALOG_ID",
    "INGEST_CLEANUP_ON_COMPLETE",
];

fn env_lock() -> &'static Mutex<()> {
    static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    LOCK.get_or_init(|| Mutex::new(()))
}

fn env_guard() -> MutexGuard<'static, ()> {
    env_lock()
        .lock()
        .unwrap_or_else(|poison| poison.into_inner())
}

fn clear_env() {
    unsafe {
        for var in VARS {
            env::remove_var(var);
        }
    }
}

fn write_env_file(dir: &TempDir, name: &str, contents: &str) {
    let path = dir.path().join(name);
    fs::write(path, contents).unwrap();
}

#[test]
fn loads_defaults_when_no_env_present() {
    let _guard = env_guard();
    clear_env();

    let dir = TempDir::new().unwrap();
    let loader = ConfigLoader::with_base_dir(dir.path().to_path_buf());
    let cfg = loader.load().expect("config loads with defaults");

    assert_eq!(cfg.profile, "local");
    assert_eq!(cfg.log_level, "info");
    assert_eq!(cfg.ingest.attribute_prefix, "attr_");
    assert_eq!(cfg.ingest.upload_dir, PathBuf::from("uploads"));
    assert_eq!(cfg.ingest.discount_tolerance, 1.0);
    assert!(cfg.ingest.default_catalog_id.is_none());
    assert!(cfg.ingest.cleanup_on_complete);
    clear_env();
}

#[test]
fn layered_env_files_apply_in_order() {
    let _guard = env_guard();
    clear_env();

    let dir = TempDir::new().unwrap();
    write_env_file(
        &dir,
        ".env",
        "INGEST_PROFILE=test\nINGEST_LOG_LEVEL=warn\nINGEST_ATTRIBUTE_PREFIX=opt_\n",
    );
    write_env_file(&dir, ".env.local", "INGEST_LOG_LEVEL=debug\n");
    write_env_file(&dir, ".env.test", "INGEST_DISCOUNT_TOLERANCE=2.5\n");
    write_env_file(&dir, ".env.test.local", "INGEST_DEFAULT_CATALOG_ID=4\n");

    let loader = ConfigLoader::with_base_dir(dir.path().to_path_buf());
    let cfg = loader.load().expect("config loads");

    assert_eq!(cfg.profile, "test");
    assert_eq!(cfg.log_level, "debug");
    assert_eq!(cfg.ingest.attribute_prefix, "opt_");
    assert_eq!(cfg.ingest.discount_tolerance, 2.5);
    assert_eq!(cfg.ingest.default_catalog_id, Some(4));
    clear_env();
}

#[test]
fn process_env_overrides_files() {
    let _guard = env_guard();
    clear_env();

    let dir = TempDir::new().unwrap();
    write_env_file(
        &dir,
        ".env",
        "INGEST_UPLOAD_DIR=/srv/files\nINGEST_CLEANUP_ON_COMPLETE=true\n",
    );

    unsafe {
        env::set_var("INGEST_UPLOAD_DIR", "/tmp/uploads");
        env::set_var("INGEST_CLEANUP_ON_COMPLETE", "no");
    }

    let loader = ConfigLoader::with_base_dir(dir.path().to_path_buf());
    let cfg = loader.load().expect("config loads");

    assert_eq!(cfg.ingest.upload_dir, PathBuf::from("/tmp/uploads"));
    assert!(!cfg.ingest.cleanup_on_complete);
    clear_env();
}

#[test]
fn invalid_values_are_rejected() {
    let _guard = env_guard();
    clear_env();

    let dir = TempDir::new().unwrap();
    let loader = ConfigLoader::with_base_dir(dir.path().to_path_buf());

    unsafe {
        env::set_var("INGEST_DISCOUNT_TOLERANCE", "lots");
    }
    let err = loader.load().unwrap_err();
    assert!(matches!(
        err,
        ConfigError::InvalidValue {
            key: "INGEST_DISCOUNT_TOLERANCE",
            ..
        }
    ));

    unsafe {
        env::set_var("INGEST_DISCOUNT_TOLERANCE", "-1");
    }
    let err = loader.load().unwrap_err();
    assert!(matches!(err, ConfigError::InvalidDiscountTolerance { .. }));

    unsafe {
        env::remove_var("INGEST_DISCOUNT_TOLERANCE");
        env::set_var("INGEST_DEFAULT_CATALOG_ID", "0");
    }
    let err = loader.load().unwrap_err();
    assert!(matches!(err, ConfigError::InvalidDefaultCatalog { value: 0 }));

    unsafe {
        env::remove_var("INGEST_DEFAULT_CATALOG_ID");
        env::set_var("INGEST_ATTRIBUTE_PREFIX", "  ");
    }
    let err = loader.load().unwrap_err();
    assert!(matches!(err, ConfigError::EmptyAttributePrefix));

    clear_env();
}
