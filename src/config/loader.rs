use std::{fs, path::Path};

use anyhow::{anyhow, bail, Result};
use regex::Regex;
use tracing::{debug, error};

use crate::config::providers::{GenericSourceValue, ServiceConfig};
use crate::config::settings::{LogFormat, LoggingConfig};

/// Load and validate config from YAML file
pub fn file_to_config(path: &Path) -> Result<ServiceConfig> {
    let content = fs::read_to_string(path)
        .map_err(|e| anyhow!("cannot read config '{}': {}", path.display(), e))?;

    let expanded = expand_env_vars(&content)?;
    parse_config(&expanded)
}

pub fn parse_config(content: &str) -> Result<ServiceConfig> {
    let mut service_config: ServiceConfig = serde_yaml::from_str(content)
        .inspect_err(|e| error!("parse config error: {}", e))?;

    // Apply defaults
    if service_config.settings.logging.is_none() {
        service_config.settings.logging = Some(LoggingConfig::new("info".to_owned(), LogFormat::Compact));
    }
    debug!("validation config ...");
    validate_service_config(&service_config)?;

    Ok(service_config)
}

pub fn validate_service_config(config: &ServiceConfig) -> Result<()> {
    let store = &config.settings.store;
    if store.mailbox_capacity == 0 {
        bail!("settings.mailbox_capacity must be greater than 0");
    }
    if store.default_timeout_ms == 0 {
        bail!("settings.default_timeout_ms must be greater than 0");
    }

    for (name, provider) in &config.providers {
        if provider.request.url.trim().is_empty() {
            bail!("provider '{}': request.url is empty", name);
        }
        if provider.request.form.is_some() && provider.request.body.is_some() {
            bail!("provider '{}': request.form and request.body are mutually exclusive", name);
        }

        let parse = &provider.parse;
        let pointers = std::iter::once(&parse.token_pointer)
            .chain(parse.ttl_pointer.iter())
            .chain(parse.extra.values());
        for pointer in pointers {
            if !pointer.starts_with('/') {
                bail!("provider '{}': JSON pointer '{}' must start with '/'", name, pointer);
            }
        }

        for (key, value) in &provider.credentials {
            if let GenericSourceValue::FromEnv { from_env } = value {
                if from_env.is_empty() {
                    bail!("provider '{}': credential '{}' has an empty from_env", name, key);
                }
            }
        }
    }
    Ok(())
}

/// Replace `${VAR}` and `${VAR:default}` with environment values
fn expand_env_vars(input: &str) -> Result<String> {
    let re = Regex::new(r"\$\{(\w+)(?::([^\}]+))?\}")?;
    let expanded = re.replace_all(input, |caps: &regex::Captures| {
        let var = &caps[1];
        let default = caps.get(2).map(|m| m.as_str()).unwrap_or("");
        std::env::var(var).unwrap_or_else(|_| default.to_string())
    });
    Ok(expanded.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const CONFIG: &str = r#"
settings:
  buffer_interval_seconds: 10
  metrics:
    is_enabled: true
providers:
  auth0:
    request:
      url: "${TOKEN_STORE_TEST_URL:http://localhost:1/oauth/token}"
      method: POST
      form:
        grant_type:
          value: client_credentials
    credentials:
      client_id:
        value: app
      client_secret:
        from_env: AUTH0_SECRET
    parse:
      token_pointer: /access_token
      ttl_pointer: /expires_in
      extra:
        token_type: /token_type
"#;

    #[test]
    fn loads_yaml_with_defaults_and_env_expansion() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(CONFIG.as_bytes()).unwrap();

        let config = file_to_config(file.path()).unwrap();
        let store = &config.settings.store;
        assert_eq!(store.buffer_interval_seconds, 10);
        assert_eq!(store.default_timeout_ms, 5000);
        assert_eq!(store.mailbox_capacity, 256);
        assert!(config.settings.metrics.is_enabled);
        assert_eq!(config.settings.metrics.path, "/metrics");
        assert_eq!(config.settings.logging.unwrap().format, LogFormat::Compact);

        let auth0 = &config.providers["auth0"];
        assert_eq!(auth0.request.url, "http://localhost:1/oauth/token");
        assert_eq!(auth0.request.method, http::Method::POST);
        assert_eq!(
            auth0.credentials["client_secret"],
            GenericSourceValue::FromEnv { from_env: "AUTH0_SECRET".to_owned() }
        );
        assert_eq!(auth0.parse.extra["token_type"], "/token_type");
    }

    #[test]
    fn rejects_relative_pointer() {
        let broken = CONFIG.replace("token_pointer: /access_token", "token_pointer: access_token");
        let err = parse_config(&broken).unwrap_err();
        assert!(err.to_string().contains("must start with '/'"));
    }

    #[test]
    fn rejects_zero_mailbox() {
        let broken = CONFIG.replace("buffer_interval_seconds: 10", "mailbox_capacity: 0");
        assert!(parse_config(&broken).is_err());
    }
}
