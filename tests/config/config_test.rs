//! Coverage for config parsing, file loading and path resolution.

use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

use tianxing_chatbot::chat::tianxing::ApiType;
use tianxing_chatbot::chat::UuidSource;
use tianxing_chatbot::config::{config_dir, Config, TianxingConfig};

#[test]
fn config_dir_resolves() {
    let dir = config_dir();
    assert!(dir.is_ok());
    let path = match dir {
        Ok(path) => path,
        Err(err) => panic!("config dir should resolve: {err}"),
    };
    assert!(path.ends_with(".tianxing-chatbot"));
}

#[test]
fn parse_full_config() {
    let toml_str = r#"
uuid = "6a2f41a3-c54c-fce8-32d2-0324e1c32e22"
chatbot = "tianxing:abc123"

[tianxing]
hostname = "proxy.local"
port = 8080
timeout_ms = 1500
api_type = "tuling"
address = "10.1.2.3"
"#;
    let parsed = Config::from_toml(toml_str);
    let config = match parsed {
        Ok(config) => config,
        Err(err) => panic!("full config should parse: {err}"),
    };

    assert_eq!(config.uuid(), "6a2f41a3-c54c-fce8-32d2-0324e1c32e22");
    assert_eq!(config.chatbot, "tianxing:abc123");
    assert_eq!(config.tianxing.api_type, ApiType::Tuling);
    assert_eq!(
        config.tianxing.address,
        Some(IpAddr::V4(Ipv4Addr::new(10, 1, 2, 3)))
    );

    let endpoint = config.tianxing.endpoint();
    assert_eq!(endpoint.hostname, "proxy.local");
    assert_eq!(endpoint.port, 8080);
    assert_eq!(endpoint.timeout, Duration::from_millis(1500));
}

#[test]
fn partial_config_uses_defaults() {
    let config = match Config::from_toml("chatbot = \"tianxing:k\"\n") {
        Ok(config) => config,
        Err(err) => panic!("partial config should parse: {err}"),
    };
    assert_eq!(config.tianxing, TianxingConfig::default());
    assert!(!config.uuid.is_empty());
}

#[test]
fn invalid_api_type_is_a_parse_error() {
    let parsed = Config::from_toml("[tianxing]\napi_type = \"gpt\"\n");
    assert!(parsed.is_err());
}

#[test]
fn missing_file_yields_defaults() {
    let tmp = tempfile::tempdir().expect("should create temp dir");
    let config = Config::load_from_file(&tmp.path().join("absent.toml"));
    let config = match config {
        Ok(config) => config,
        Err(err) => panic!("missing file should fall back to defaults: {err}"),
    };
    assert!(config.chatbot.is_empty());
    assert_eq!(config.tianxing.hostname, "api.tianapi.com");
}

#[test]
fn written_config_loads_back() {
    let tmp = tempfile::tempdir().expect("should create temp dir");
    let path = tmp.path().join("config.toml");
    let original = Config {
        chatbot: "tianxing:your_api_key".to_owned(),
        ..Config::default()
    };
    let rendered = original.to_toml().expect("should serialise");
    std::fs::write(&path, rendered).expect("should write config");

    let loaded = Config::load_from_file(&path).expect("should load config");
    assert_eq!(loaded.uuid, original.uuid);
    assert_eq!(loaded.chatbot, original.chatbot);
    assert_eq!(loaded.tianxing, original.tianxing);
}

#[test]
fn unreadable_toml_reports_path() {
    let tmp = tempfile::tempdir().expect("should create temp dir");
    let path = tmp.path().join("config.toml");
    std::fs::write(&path, "chatbot = [").expect("should write config");

    let err = match Config::load_from_file(&path) {
        Ok(_) => panic!("broken toml should fail"),
        Err(err) => err,
    };
    assert!(err.to_string().contains("config.toml"));
}
