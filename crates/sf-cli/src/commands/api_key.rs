//! Stores the Gemini API key in the shared store.
//!
//! Written directly rather than through the daemon: the key is only read when
//! a question is asked, so no running process has to be told about it.

use std::io::Write;

use anyhow::{Context, Result};
use sf_db::Database;

use crate::Config;

pub fn run<W: Write>(writer: &mut W, config: &Config, key: &str) -> Result<()> {
    if let Some(parent) = config.database_path.parent() {
        std::fs::create_dir_all(parent).context("failed to create database directory")?;
    }
    let mut db = Database::open(&config.database_path)
        .with_context(|| format!("failed to open {}", config.database_path.display()))?;
    let key = key.trim();
    if key.is_empty() {
        db.set_gemini_api_key("")?;
        writeln!(writer, "Gemini API key removed")?;
        return Ok(());
    }
    // Rejects keys the client would refuse before storing them.
    sf_llm::Client::new(key).context("invalid API key")?;
    db.set_gemini_api_key(key)?;
    tracing::info!("gemini api key stored");
    writeln!(writer, "Gemini API key saved")?;
    if config.gemini_api_key.is_some() {
        writeln!(
            writer,
            "Note: the key from your configuration takes precedence over the stored one"
        )?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::test_support::test_config;

    #[test]
    fn saves_and_removes_key() {
        let temp = tempfile::tempdir().unwrap();
        let config = test_config(temp.path());

        let mut output = Vec::new();
        run(&mut output, &config, "  abc123  ").unwrap();
        assert_eq!(String::from_utf8(output).unwrap(), "Gemini API key saved\n");
        let db = Database::open(&config.database_path).unwrap();
        assert_eq!(db.gemini_api_key().unwrap().as_deref(), Some("abc123"));

        let mut output = Vec::new();
        run(&mut output, &config, "").unwrap();
        assert_eq!(String::from_utf8(output).unwrap(), "Gemini API key removed\n");
        assert_eq!(db.gemini_api_key().unwrap(), None);
    }

    #[test]
    fn configured_key_wins() {
        let temp = tempfile::tempdir().unwrap();
        let config = Config {
            gemini_api_key: Some("from-config".to_string()),
            ..test_config(temp.path())
        };
        let mut output = Vec::new();
        run(&mut output, &config, "stored").unwrap();
        assert!(String::from_utf8(output).unwrap().contains("takes precedence"));
    }
}
