//! Config files on disk

use std::io::Write;

use assert_matches::assert_matches;
use homedash::config::{Config, ConfigError, read_config_file};
use pretty_assertions::assert_eq;

#[test]
fn test_toml_file_with_defaults() {
    let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
    write!(
        file,
        r#"
[hypervisor]
endpoint = "https://10.0.0.2:8006"
user = "root@pam"
token_name = "dash"
token_value = "secret"

[router]
ip = "10.0.0.1"
interface_index = 12

[discord]
url = "https://discord.com/api/webhooks/1/abc"
"#
    )
    .unwrap();

    let config = Config::load(Some(file.path())).unwrap();

    assert_eq!(config.router.community, "public");
    assert_eq!(config.router.target(), "10.0.0.1:161");
    assert_eq!(config.proxy.group, "ExitNode");
    assert_eq!(config.aggregator.deadline_secs, 5);
    assert_eq!(
        config.hypervisor.auth_header(),
        "PVEAPIToken=root@pam!dash=secret"
    );
    assert!(config.discord.is_some());
}

#[test]
fn test_json_file() {
    let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
    write!(
        file,
        r#"{{
            "hypervisor": {{"endpoint": "https://pve:8006", "user": "u", "token_name": "t", "token_value": "v"}},
            "router": {{"ip": "fe80::1", "interface_index": 3, "retries": 1}},
            "proxy": {{"endpoint": "http://10.0.0.3:9090", "secret": "s"}},
            "aggregator": {{"deadline_secs": 8}}
        }}"#
    )
    .unwrap();

    let config = read_config_file(file.path()).unwrap();

    assert_eq!(config.router.target(), "[fe80::1]:161");
    assert_eq!(config.router.retries, 1);
    assert_eq!(config.proxy.secret.as_deref(), Some("s"));
    assert_eq!(config.aggregator.deadline_secs, 8);
    assert_eq!(config.aggregator.utc_offset_hours, 7);
}

#[test]
fn test_malformed_file_is_parse_error() {
    let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
    write!(file, "[router\nip = ").unwrap();

    assert_matches!(read_config_file(file.path()), Err(ConfigError::Parse(..)));
}

#[test]
fn test_missing_file_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("absent.toml");

    assert_matches!(read_config_file(&path), Err(ConfigError::Io(..)));
}
