//! Parsing of text the toolchain container hands back: its declared
//! environment and the JVM properties dump.

use std::collections::BTreeMap;

use crate::error::{ConfigGenError, Result};

pub const JAVA_VERSION_PROPERTY: &str = "java.version";

/// Parses one `KEY=VALUE` declaration per line.
///
/// Blank lines and entries with an empty key are skipped, an entry without `=`
/// gets an empty value, and later declarations of a key replace earlier ones.
#[must_use]
pub fn parse_declared_env(raw: &str) -> BTreeMap<String, String> {
    let mut env = BTreeMap::new();
    for line in raw.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let (key, value) = line.split_once('=').unwrap_or((line, ""));
        if key.is_empty() {
            continue;
        }
        env.insert(key.to_string(), value.to_string());
    }
    env
}

/// Finds the value of `property` in `key = value` formatted output.
///
/// Lines that are not of that shape are ignored. When the property appears more
/// than once the last occurrence is returned.
#[must_use]
pub fn scan_property(output: &str, property: &str) -> Option<String> {
    output
        .lines()
        .filter_map(|line| {
            let (key, value) = line.split_once('=')?;
            (key.trim() == property).then(|| value.trim().to_string())
        })
        .filter(|value| !value.is_empty())
        .last()
}

/// Extracts the runtime version from a `-XshowSettings:properties` dump.
pub fn scan_java_version(output: &str) -> Result<String> {
    scan_property(output, JAVA_VERSION_PROPERTY).ok_or_else(|| {
        ConfigGenError::VersionUndetermined {
            property: JAVA_VERSION_PROPERTY.to_string(),
        }
    })
}
