use std::io::Write;

use mat_domain::config::{ConfigSeverity, McpConfig, McpTransportKind};

#[test]
fn default_config_has_no_servers() {
    let config = McpConfig::default();
    assert!(config.servers.is_empty());
    assert!(config.validate().is_empty());
}

#[test]
fn mixed_servers_parse_from_toml() {
    let toml_str = r#"
[[servers]]
id = "docker"
command = "/usr/local/bin/docker"
args = ["run", "-i", "--rm", "alpine/socat", "STDIO", "TCP:host.docker.internal:8811"]
allowed_tools = ["search_*"]

[[servers]]
id = "remote"
transport = "sse"
url = "https://tools.example.com/sse"
headers = { "X-Tenant" = "acme" }
cache_tools_list = false

[servers.auth]
type = "jwt"
secret_env = "REMOTE_MCP_SECRET"
"#;
    let config = McpConfig::from_toml_str(toml_str).unwrap();
    assert_eq!(config.servers.len(), 2);

    let docker = config.server("docker").unwrap();
    assert_eq!(docker.transport, McpTransportKind::Stdio);
    assert_eq!(docker.args.len(), 6);
    assert_eq!(docker.allowed_tools.as_deref(), Some(&["search_*".to_string()][..]));
    assert!(docker.cache_tools_list);

    let remote = config.server("remote").unwrap();
    assert_eq!(remote.transport, McpTransportKind::Sse);
    assert_eq!(remote.headers.get("X-Tenant").unwrap(), "acme");
    assert!(!remote.cache_tools_list);
    assert_eq!(remote.auth.as_ref().unwrap().secret_env.as_deref(), Some("REMOTE_MCP_SECRET"));

    assert!(config.validate().is_empty());
}

#[test]
fn load_reads_file_from_disk() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "[[servers]]\nid = \"echo\"\ncommand = \"echo\"").unwrap();

    let config = McpConfig::load(file.path()).unwrap();
    assert_eq!(config.servers[0].id, "echo");
}

#[test]
fn load_missing_file_is_io_error() {
    let err = McpConfig::load("/definitely/not/here.toml").unwrap_err();
    assert!(matches!(err, mat_domain::Error::Io(_)));
}

#[test]
fn validate_flags_missing_fields_and_duplicates() {
    let toml_str = r#"
[[servers]]
id = "a"

[[servers]]
id = "a"
transport = "sse"

[[servers]]
id = "b"
transport = "sse"
url = "http://localhost/sse"
auth = { type = "secret_key", secret = "inline" }
"#;
    let config = McpConfig::from_toml_str(toml_str).unwrap();
    let issues = config.validate();

    let errors: Vec<_> = issues
        .iter()
        .filter(|i| i.severity == ConfigSeverity::Error)
        .map(|i| i.field.as_str())
        .collect();
    assert!(errors.contains(&"servers[0].command"));
    assert!(errors.contains(&"servers[1].id"));
    assert!(errors.contains(&"servers[1].url"));

    let warnings: Vec<_> = issues
        .iter()
        .filter(|i| i.severity == ConfigSeverity::Warning)
        .map(|i| i.to_string())
        .collect();
    assert_eq!(warnings, vec!["[WARN] servers[2].auth.secret: inline secret in config file; prefer secret_env"]);
}
