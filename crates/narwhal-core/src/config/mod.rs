//! Loading of table definitions collections from disk or environment.
//!
//! Definitions collections are plain data; the caller chooses the type they
//! deserialize into. Files are parsed as YAML or JSON depending on their
//! extension, inline definitions are always JSON.

use std::path::Path;

use serde::de::DeserializeOwned;
use snafu::prelude::*;

use crate::error::{
    ConfigError, JsonParseSnafu, ReadFileSnafu, UnsupportedFormatSnafu, YamlParseSnafu,
};

/// Check if a path has a YAML extension.
pub fn is_yaml_file(path: &Path) -> bool {
    has_extension(path, &["yaml", "yml"])
}

fn has_extension(path: &Path, extensions: &[&str]) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| extensions.contains(&ext))
        .unwrap_or(false)
}

/// Load a definitions collection from a `.yaml`, `.yml` or `.json` file.
pub fn load_definitions_file<T: DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    let contents = std::fs::read_to_string(path).context(ReadFileSnafu { path })?;

    if is_yaml_file(path) {
        serde_yaml::from_str(&contents).context(YamlParseSnafu)
    } else if has_extension(path, &["json"]) {
        parse_definitions(&contents)
    } else {
        UnsupportedFormatSnafu { path }.fail()
    }
}

/// Parse an inline JSON definitions collection.
pub fn parse_definitions<T: DeserializeOwned>(contents: &str) -> Result<T, ConfigError> {
    serde_json::from_str(contents).context(JsonParseSnafu)
}
