use std::ffi::OsString;

use blaze_config::{
    discover_config_path, load_for_workspace, with_config_env_lock, BlazeConfig,
    BLAZE_CONFIG_ENV_VAR,
};
use tempfile::tempdir;

struct EnvVarGuard {
    key: &'static str,
    prev: Option<OsString>,
}

impl EnvVarGuard {
    fn set(key: &'static str, value: &std::path::Path) -> Self {
        let prev = std::env::var_os(key);
        std::env::set_var(key, value);
        Self { key, prev }
    }

    fn unset(key: &'static str) -> Self {
        let prev = std::env::var_os(key);
        std::env::remove_var(key);
        Self { key, prev }
    }
}

impl Drop for EnvVarGuard {
    fn drop(&mut self) {
        match &self.prev {
            Some(v) => std::env::set_var(self.key, v),
            None => std::env::remove_var(self.key),
        }
    }
}

#[test]
fn missing_config_yields_defaults() {
    with_config_env_lock(|| {
        let _guard = EnvVarGuard::unset(BLAZE_CONFIG_ENV_VAR);
        let dir = tempdir().unwrap();

        let (config, path) = load_for_workspace(dir.path()).unwrap();
        assert_eq!(config, BlazeConfig::default());
        assert!(path.is_none());
    });
}

#[test]
fn blaze_toml_takes_precedence_over_dot_blaze_toml() {
    with_config_env_lock(|| {
        let _guard = EnvVarGuard::unset(BLAZE_CONFIG_ENV_VAR);
        let dir = tempdir().unwrap();
        std::fs::write(
            dir.path().join("blaze.toml"),
            "[sync]\nexpand_sync_to_working_set = true\n",
        )
        .unwrap();
        std::fs::write(dir.path().join(".blaze.toml"), "[sync]\n").unwrap();

        let path = discover_config_path(dir.path()).expect("config path");
        assert!(path.ends_with("blaze.toml"), "{}", path.display());
        assert!(!path.ends_with(".blaze.toml"), "{}", path.display());

        let (config, _) = load_for_workspace(dir.path()).unwrap();
        assert!(config.sync.expand_sync_to_working_set);
    });
}

#[test]
fn env_var_overrides_workspace_discovery() {
    with_config_env_lock(|| {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("blaze.toml"), "[build]\nflags = [\"--a\"]\n").unwrap();
        let custom = dir.path().join("custom.toml");
        std::fs::write(&custom, "[build]\nflags = [\"--b\"]\n").unwrap();
        let _guard = EnvVarGuard::set(BLAZE_CONFIG_ENV_VAR, &custom);

        let (config, path) = load_for_workspace(dir.path()).unwrap();
        assert_eq!(config.build.flags, vec!["--b".to_string()]);
        assert!(path.unwrap().ends_with("custom.toml"));
    });
}
