pub mod retry;

use anyhow::{Context, Result};
use config::{Environment, File, FileFormat};
use std::path::Path;
use tracing::info;

use crate::models::common::Config;

pub const ENV_PREFIX: &str = "INDEXER";

pub fn load_config<P: AsRef<Path>>(config_path: P) -> Result<Config> {
    let config_path = config_path.as_ref();
    info!("Config path: {}", config_path.to_string_lossy());

    // The file is optional so a deployment can be configured from the environment alone
    let config: Config = config::Config::builder()
        .add_source(
            File::from(config_path)
                .format(FileFormat::Yaml)
                .required(false),
        )
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true),
        )
        .build()
        .context("failed to read config")?
        .try_deserialize()
        .context("failed to parse config")?;

    config.validate().context("invalid config")?;

    Ok(config)
}

pub(crate) fn strip_html(error: &str) -> String {
    let lowered = error.to_ascii_lowercase();
    if !lowered.contains("<!doctype html") && !lowered.contains("<html") {
        return error.to_string();
    }

    // Drop the tags and keep the first non-empty line of text
    let mut text = String::with_capacity(error.len());
    let mut in_tag = false;
    for c in error.chars() {
        match c {
            '<' => in_tag = true,
            '>' if in_tag => {
                in_tag = false;
                text.push('\n');
            }
            _ if !in_tag => text.push(c),
            _ => {}
        }
    }

    text.lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or(error)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_strip_html_keeps_plain_text() {
        assert_eq!(strip_html("connection refused"), "connection refused");
    }

    #[test]
    fn test_strip_html_extracts_first_text_line() {
        let body = "<!doctype html>\n<html>\n<body>\n<h1>\n502 Bad Gateway\n</h1>\n</body>\n</html>";
        assert_eq!(strip_html(body), "502 Bad Gateway");
    }

    #[test]
    fn test_strip_html_single_line_page() {
        let body = "<HTML><body><h1>502 Bad Gateway</h1></body></HTML>";
        assert_eq!(strip_html(body), "502 Bad Gateway");
    }

    #[test]
    fn test_load_config_from_yaml() {
        let mut file = tempfile::Builder::new().suffix(".yml").tempfile().unwrap();
        writeln!(
            file,
            "address: \"0x742d35Cc6634C0532925a3b844Bc454e4438f44e\"\n\
             network: bsc\n\
             net: test\n\
             api_key: \"abc\"\n\
             page_size: 500\n\
             retry:\n  max_attempts: 2"
        )
        .unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.network().unwrap().to_string(), "bsc_test");
        assert_eq!(config.page_size, 500);
        assert_eq!(config.retry.max_attempts, 2);
        assert_eq!(config.retry.base_delay_ms, 1_000);
        assert_eq!(config.database_name, "scan_db");
        assert!(!config.metrics.enabled);
    }
}
