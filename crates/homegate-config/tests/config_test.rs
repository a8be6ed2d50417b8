#![allow(clippy::unwrap_used)]
// Integration tests for config loading, layering and saving.
//
// Loads run inside `figment::Jail` so environment overrides from one test
// never leak into another.

use std::path::Path;
use std::time::Duration;

use figment::Jail;
use pretty_assertions::assert_eq;

use homegate_config::{Config, ConfigError, LoggingConfig, load_config_from, save_config_to};

fn jail_err(err: ConfigError) -> figment::Error {
    err.to_string().into()
}

#[test]
fn test_missing_file_yields_defaults() {
    Jail::expect_with(|_| {
        let config = load_config_from(Path::new("absent.toml")).map_err(jail_err)?;
        assert_eq!(config, Config::default());

        let service = config.to_service_config();
        assert!(service.readiness.ready_for_device_operation);
        assert_eq!(service.default_commissioning_window, Duration::from_secs(180));
        Ok(())
    });
}

#[test]
fn test_file_values_override_defaults() {
    Jail::expect_with(|jail| {
        jail.create_file(
            "config.toml",
            r#"
                [service]
                commissioning_window_secs = 600
                ready_for_pairing = false

                [logging]
                filter = "homegate_core=debug"
                json = true
            "#,
        )?;

        let config = load_config_from(Path::new("config.toml")).map_err(jail_err)?;
        assert_eq!(config.service.commissioning_window_secs, 600);
        assert!(!config.service.ready_for_pairing);
        assert!(config.service.ready_for_device_operation);
        assert_eq!(
            config.logging,
            LoggingConfig {
                filter: "homegate_core=debug".into(),
                json: true,
            }
        );
        assert!(!config.to_service_config().readiness.pairing_ready());
        Ok(())
    });
}

#[test]
fn test_env_overrides_file() {
    Jail::expect_with(|jail| {
        jail.create_file("config.toml", "[service]\ncommissioning_window_secs = 600\n")?;
        jail.set_env("HOMEGATE_SERVICE__COMMISSIONING_WINDOW_SECS", "90");
        jail.set_env("HOMEGATE_LOGGING__FILTER", "warn");

        let config = load_config_from(Path::new("config.toml")).map_err(jail_err)?;
        assert_eq!(config.service.commissioning_window_secs, 90);
        assert_eq!(config.to_service_config().default_commissioning_window, Duration::from_secs(90));
        assert_eq!(config.logging.filter, "warn");
        Ok(())
    });
}

#[test]
fn test_zero_commissioning_window_is_rejected() {
    Jail::expect_with(|jail| {
        jail.create_file("config.toml", "[service]\ncommissioning_window_secs = 0\n")?;

        let err = load_config_from(Path::new("config.toml")).unwrap_err();
        assert!(
            matches!(err, ConfigError::Validation { ref field, .. } if field == "service.commissioning_window_secs"),
            "unexpected error: {err}"
        );
        Ok(())
    });
}

#[test]
fn test_malformed_toml_is_a_figment_error() {
    Jail::expect_with(|jail| {
        jail.create_file("config.toml", "[service\ncommissioning_window_secs = ")?;

        let err = load_config_from(Path::new("config.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Figment(_)), "unexpected error: {err}");
        Ok(())
    });
}

#[test]
fn test_saved_config_is_valid_toml() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("config.toml");

    let mut config = Config::default();
    config.service.commissioning_window_secs = 300;
    config.logging.json = true;
    save_config_to(&config, &path).unwrap();

    let written: Config = toml::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(written, config);
}

#[test]
fn test_save_refuses_invalid_config() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");

    let mut config = Config::default();
    config.service.commissioning_window_secs = 0;

    assert!(matches!(
        save_config_to(&config, &path),
        Err(ConfigError::Validation { .. })
    ));
    assert!(!path.exists());
}
