//! Utility functions for the dirauth CLI

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use dirauth_core::settings;
use serde_json::Value;
use std::io::BufRead;

/// Format a datetime for display
pub fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Parse a command-line setting value: JSON if it parses, a string otherwise.
///
/// `true`, `10` and `"demand"` become JSON values; `ldap://host` stays a
/// string.
pub fn parse_setting_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

/// Hide secrets in displayed settings.
pub fn display_value(name: &str, value: &Value) -> Value {
    if name == settings::AUTH_PASSWORD && !value.is_null() {
        Value::String("********".to_string())
    } else {
        value.clone()
    }
}

/// Read a single line secret, without its line ending.
pub fn read_secret(mut reader: impl BufRead) -> Result<String> {
    let mut line = String::new();
    reader
        .read_line(&mut line)
        .context("Failed to read password from stdin")?;

    let secret = line.trim_end_matches(['\r', '\n']).to_string();
    if secret.is_empty() {
        bail!("No password given");
    }
    Ok(secret)
}

/// Join for display, with a marker for an empty list.
pub fn join_or_none<I, T>(items: I) -> String
where
    I: IntoIterator<Item = T>,
    T: ToString,
{
    let joined: Vec<String> = items.into_iter().map(|i| i.to_string()).collect();
    if joined.is_empty() {
        "(none)".to_string()
    } else {
        joined.join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_setting_value() {
        assert_eq!(parse_setting_value("true"), json!(true));
        assert_eq!(parse_setting_value("10"), json!(10));
        assert_eq!(parse_setting_value("\"demand\""), json!("demand"));
        assert_eq!(parse_setting_value("null"), Value::Null);
        assert_eq!(
            parse_setting_value("ldap://ldap.example.com"),
            json!("ldap://ldap.example.com")
        );
        assert_eq!(parse_setting_value("uid=%s"), json!("uid=%s"));
    }

    #[test]
    fn test_display_value_hides_password() {
        assert_eq!(
            display_value(settings::AUTH_PASSWORD, &json!("hunter2")),
            json!("********")
        );
        assert_eq!(display_value(settings::AUTH_PASSWORD, &Value::Null), Value::Null);
        assert_eq!(display_value(settings::URI, &json!("ldap://x")), json!("ldap://x"));
    }

    #[test]
    fn test_read_secret() {
        assert_eq!(read_secret("s3cret\n".as_bytes()).unwrap(), "s3cret");
        assert_eq!(read_secret("s3cret\r\n".as_bytes()).unwrap(), "s3cret");
        assert_eq!(read_secret(" padded \n".as_bytes()).unwrap(), " padded ");
        assert!(read_secret("\n".as_bytes()).is_err());
        assert!(read_secret("".as_bytes()).is_err());
    }

    #[test]
    fn test_join_or_none() {
        assert_eq!(join_or_none(Vec::<String>::new()), "(none)");
        assert_eq!(join_or_none(["a", "b"]), "a, b");
    }
}
