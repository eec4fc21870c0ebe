use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("couldn't read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("couldn't parse {path}: {source}")]
    Yaml {
        path: PathBuf,
        source: serde_yaml::Error,
    },
}

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub algotester_api_key: String,
    pub algotester_subdomain: String,
    pub algotester_contest_id: u64,
    pub contest_package_path: PathBuf,
    #[serde(default = "default_polling_interval")]
    pub polling_interval: u64,
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default = "default_team_mapping_file")]
    pub team_mapping_file: PathBuf,
    #[serde(default = "default_problem_mapping_file")]
    pub problem_mapping_file: PathBuf,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub auth_username: String,
    pub auth_password: String,
}

fn default_polling_interval() -> u64 {
    30
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

fn default_team_mapping_file() -> PathBuf {
    PathBuf::from("./team_mapping.yaml")
}

fn default_problem_mapping_file() -> PathBuf {
    PathBuf::from("./problem_mapping.yaml")
}

fn default_host() -> String {
    "0.0.0.0".into()
}

fn default_port() -> u16 {
    8080
}

pub fn load_config(path: &Path) -> Result<Settings, ConfigError> {
    let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.into(),
        source,
    })?;
    serde_yaml::from_str(&text).map_err(|source| ConfigError::Yaml {
        path: path.into(),
        source,
    })
}

/// External id → internal id map. A missing file is an empty map, so the
/// bridge can run before the mapping files are generated.
pub fn load_mapping(path: &Path) -> Result<BTreeMap<String, String>, ConfigError> {
    if !path.exists() {
        return Ok(BTreeMap::new());
    }
    let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.into(),
        source,
    })?;
    let value: serde_yaml::Value =
        serde_yaml::from_str(&text).map_err(|source| ConfigError::Yaml {
            path: path.into(),
            source,
        })?;

    let mut mapping = BTreeMap::new();
    if let serde_yaml::Value::Mapping(entries) = value {
        for (key, value) in entries {
            if let (Some(key), Some(value)) = (scalar_to_string(&key), scalar_to_string(&value)) {
                mapping.insert(key, value);
            }
        }
    }
    Ok(mapping)
}

// Mapping files are hand-edited; ids that look numeric come back as YAML
// numbers and still have to match the string ids used everywhere else.
fn scalar_to_string(value: &serde_yaml::Value) -> Option<String> {
    match value {
        serde_yaml::Value::String(s) => Some(s.clone()),
        serde_yaml::Value::Number(n) => Some(n.to_string()),
        serde_yaml::Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn missing_mapping_file_is_empty() {
        let mapping = load_mapping(Path::new("/nonexistent/team_mapping.yaml")).unwrap();
        assert!(mapping.is_empty());
    }

    #[test]
    fn mapping_coerces_numeric_ids() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mapping.yaml");
        let mut file = fs::File::create(&path).unwrap();
        writeln!(file, "# Team mapping").unwrap();
        writeln!(file, "10197: team-1").unwrap();
        writeln!(file, "\"10212\": team-2").unwrap();
        drop(file);

        let mapping = load_mapping(&path).unwrap();
        assert_eq!(mapping.get("10197").map(String::as_str), Some("team-1"));
        assert_eq!(mapping.get("10212").map(String::as_str), Some("team-2"));
    }

    #[test]
    fn settings_apply_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(
            &path,
            concat!(
                "algotester_api_key: secret\n",
                "algotester_subdomain: icpc\n",
                "algotester_contest_id: 1375\n",
                "contest_package_path: ./package\n",
                "auth_username: feed\n",
                "auth_password: feed\n",
            ),
        )
        .unwrap();

        let settings = load_config(&path).unwrap();
        assert_eq!(settings.polling_interval, 30);
        assert_eq!(settings.port, 8080);
        assert_eq!(settings.data_dir, PathBuf::from("./data"));
    }
}
