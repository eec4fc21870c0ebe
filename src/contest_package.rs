use chrono::{DateTime, Duration, FixedOffset};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

mod error {
    use std::io;
    use std::path::PathBuf;
    use thiserror::Error;

    #[derive(Error, Debug)]
    pub enum PackageError {
        #[error("couldn't read {path}: {source}")]
        Io { path: PathBuf, source: io::Error },
        #[error("couldn't parse {path}: {source}")]
        Yaml {
            path: PathBuf,
            source: serde_yaml::Error,
        },
        #[error("couldn't parse {path}: {source}")]
        Json {
            path: PathBuf,
            source: serde_json::Error,
        },
        #[error("invalid contest start_time {value}: {source}")]
        StartTime {
            value: String,
            source: chrono::ParseError,
        },
    }
}

pub use error::PackageError;
pub use files::DurationSpec;

mod files {
    use serde::Deserialize;

    /// `contest.yaml` as written by contest admins; most fields optional,
    /// filled with CCS defaults on output.
    #[derive(Deserialize, Debug)]
    pub struct Contest {
        pub id: String,
        pub name: Option<String>,
        pub formal_name: Option<String>,
        pub start_time: Option<String>,
        pub duration: Option<DurationSpec>,
        pub scoreboard_freeze_duration: Option<DurationSpec>,
        pub penalty_time: Option<i64>,
    }

    /// Durations appear either as `H:MM:SS`-style strings or as a plain
    /// number of seconds.
    #[derive(Deserialize, Debug)]
    #[serde(untagged)]
    pub enum DurationSpec {
        Seconds(f64),
        Text(String),
    }

    #[derive(Deserialize, Debug)]
    pub struct Problem {
        pub id: String,
        pub label: String,
        pub name: String,
        pub rgb: Option<String>,
        pub color: Option<String>,
        pub time_limit: Option<f64>,
        pub test_data_count: Option<u32>,
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ContestInfo {
    pub id: String,
    pub name: String,
    pub formal_name: String,
    pub start_time: Option<String>,
    pub duration: String,
    pub scoreboard_freeze_duration: String,
    pub penalty_time: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct Problem {
    pub id: String,
    pub label: String,
    pub name: String,
    pub ordinal: usize,
    pub rgb: String,
    pub color: String,
    pub time_limit: f64,
    pub test_data_count: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Team {
    pub id: String,
    pub name: Option<String>,
    pub display_name: Option<String>,
    #[serde(default)]
    pub group_ids: Vec<String>,
    pub organization_id: Option<String>,
    pub icpc_id: Option<String>,
}

pub struct ContestPackage {
    contest: files::Contest,
    problems: Vec<files::Problem>,
    teams: Vec<Team>,
}

impl ContestPackage {
    pub fn load(package_path: &Path) -> Result<Self, PackageError> {
        let contest = read_yaml(&package_path.join("contest.yaml"))?;
        let problems = read_yaml(&package_path.join("problems.yaml"))?;

        let teams_path = package_path.join("teams.json");
        let teams = if teams_path.exists() {
            let text = fs::read_to_string(&teams_path).map_err(|source| PackageError::Io {
                path: teams_path.clone(),
                source,
            })?;
            serde_json::from_str(&text).map_err(|source| PackageError::Json {
                path: teams_path,
                source,
            })?
        } else {
            Vec::new()
        };

        Ok(ContestPackage {
            contest,
            problems,
            teams,
        })
    }

    pub fn contest_id(&self) -> &str {
        &self.contest.id
    }

    pub fn start_time(&self) -> Result<Option<DateTime<FixedOffset>>, PackageError> {
        match &self.contest.start_time {
            None => Ok(None),
            Some(value) => DateTime::parse_from_rfc3339(value)
                .map(Some)
                .map_err(|source| PackageError::StartTime {
                    value: value.clone(),
                    source,
                }),
        }
    }

    pub fn contest_info(&self) -> ContestInfo {
        let name = self
            .contest
            .name
            .clone()
            .or_else(|| self.contest.formal_name.clone())
            .unwrap_or_default();
        let formal_name = self
            .contest
            .formal_name
            .clone()
            .or_else(|| self.contest.name.clone())
            .unwrap_or_default();

        let start_time = self
            .start_time()
            .ok()
            .flatten()
            .map(|dt| format_absolute_time(&dt));

        let duration = self
            .contest
            .duration
            .as_ref()
            .map(parse_duration)
            .unwrap_or_else(|| Duration::hours(5));
        let freeze = self
            .contest
            .scoreboard_freeze_duration
            .as_ref()
            .map(parse_duration)
            .unwrap_or_else(|| Duration::hours(1));

        ContestInfo {
            id: self.contest.id.clone(),
            name,
            formal_name,
            start_time,
            duration: format_reltime(duration.num_milliseconds() as f64),
            scoreboard_freeze_duration: format_reltime(freeze.num_milliseconds() as f64),
            penalty_time: self.contest.penalty_time.unwrap_or(20),
        }
    }

    pub fn problems(&self) -> Vec<Problem> {
        self.problems
            .iter()
            .enumerate()
            .map(|(ordinal, p)| Problem {
                id: p.id.clone(),
                label: p.label.clone(),
                name: p.name.clone(),
                ordinal,
                rgb: p.rgb.clone().unwrap_or_else(|| "#000000".into()),
                color: p.color.clone().unwrap_or_else(|| "black".into()),
                time_limit: p.time_limit.unwrap_or(1.0),
                test_data_count: p.test_data_count.unwrap_or(1),
            })
            .collect()
    }

    pub fn problem_by_id(&self, problem_id: &str) -> Option<Problem> {
        self.problems().into_iter().find(|p| p.id == problem_id)
    }

    pub fn teams(&self) -> &[Team] {
        &self.teams
    }

    pub fn team_by_id(&self, team_id: &str) -> Option<&Team> {
        self.teams.iter().find(|t| t.id == team_id)
    }
}

fn read_yaml<T: for<'de> Deserialize<'de>>(path: &PathBuf) -> Result<T, PackageError> {
    let text = fs::read_to_string(path).map_err(|source| PackageError::Io {
        path: path.clone(),
        source,
    })?;
    serde_yaml::from_str(&text).map_err(|source| PackageError::Yaml {
        path: path.clone(),
        source,
    })
}

pub fn parse_duration(spec: &files::DurationSpec) -> Duration {
    match spec {
        files::DurationSpec::Seconds(s) => Duration::milliseconds((s * 1000.0) as i64),
        files::DurationSpec::Text(text) => {
            let parts: Vec<i64> = text
                .split(':')
                .map(|p| p.trim().parse().unwrap_or(0))
                .collect();
            match parts.as_slice() {
                [hours, minutes, seconds] => {
                    Duration::hours(*hours) + Duration::minutes(*minutes) + Duration::seconds(*seconds)
                }
                [minutes, seconds] => Duration::minutes(*minutes) + Duration::seconds(*seconds),
                [seconds] => Duration::seconds(*seconds),
                _ => Duration::zero(),
            }
        }
    }
}

/// CCS RELTIME: `H:MM:SS.sss`, hours unpadded.
pub fn format_reltime(ms: f64) -> String {
    let total_ms = ms as i64;
    let hours = total_ms / 3_600_000;
    let minutes = (total_ms % 3_600_000) / 60_000;
    let seconds = (total_ms % 60_000) / 1000;
    let millis = total_ms % 1000;
    format!("{}:{:02}:{:02}.{:03}", hours, minutes, seconds, millis)
}

/// CCS TIME: `yyyy-MM-ddTHH:mm:ss.SSS` plus `Z` or `±hh:mm`.
pub fn format_absolute_time(dt: &DateTime<FixedOffset>) -> String {
    let base = dt.format("%Y-%m-%dT%H:%M:%S").to_string();
    let millis = dt.timestamp_subsec_millis();

    let offset_seconds = dt.offset().local_minus_utc();
    let tz = if offset_seconds == 0 {
        "Z".to_string()
    } else {
        let sign = if offset_seconds >= 0 { '+' } else { '-' };
        let abs = offset_seconds.abs();
        format!("{}{:02}:{:02}", sign, abs / 3600, (abs % 3600) / 60)
    };

    format!("{}.{:03}{}", base, millis, tz)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reltime_formats_milliseconds() {
        assert_eq!(format_reltime(0.0), "0:00:00.000");
        assert_eq!(format_reltime(1250.0), "0:00:01.250");
        assert_eq!(format_reltime(5000.0), "0:00:05.000");
        assert_eq!(format_reltime(3_725_250.0), "1:02:05.250");
    }

    #[test]
    fn duration_parses_all_shapes() {
        let text = |s: &str| files::DurationSpec::Text(s.into());
        assert_eq!(parse_duration(&text("5:00:00")), Duration::hours(5));
        assert_eq!(parse_duration(&text("90:00")), Duration::minutes(90));
        assert_eq!(parse_duration(&text("45")), Duration::seconds(45));
        assert_eq!(
            parse_duration(&files::DurationSpec::Seconds(18000.0)),
            Duration::hours(5)
        );
    }

    #[test]
    fn absolute_time_formats_offset_and_utc() {
        let with_offset = DateTime::parse_from_rfc3339("2025-01-01T10:00:00+02:00").unwrap();
        assert_eq!(
            format_absolute_time(&with_offset),
            "2025-01-01T10:00:00.000+02:00"
        );

        let utc = DateTime::parse_from_rfc3339("2025-01-01T08:00:00Z").unwrap();
        assert_eq!(format_absolute_time(&utc), "2025-01-01T08:00:00.000Z");
    }

    fn write_package(dir: &Path) {
        fs::write(
            dir.join("contest.yaml"),
            concat!(
                "id: nwerc2025\n",
                "name: NWERC 2025\n",
                "start_time: \"2025-01-01T10:00:00+02:00\"\n",
                "duration: \"5:00:00\"\n",
                "scoreboard_freeze_duration: \"1:00:00\"\n",
            ),
        )
        .unwrap();
        fs::write(
            dir.join("problems.yaml"),
            concat!(
                "- id: accurate\n",
                "  label: A\n",
                "  name: Accurate Average\n",
                "  rgb: \"#FF0000\"\n",
                "  color: red\n",
                "- id: bouncy\n",
                "  label: B\n",
                "  name: Bouncy Ball\n",
            ),
        )
        .unwrap();
        fs::write(
            dir.join("teams.json"),
            r#"[{"id": "team-1", "name": "Rustaceans", "display_name": "The Rustaceans"}]"#,
        )
        .unwrap();
    }

    #[test]
    fn package_loads_and_formats() {
        let dir = tempfile::tempdir().unwrap();
        write_package(dir.path());

        let package = ContestPackage::load(dir.path()).unwrap();
        let contest = package.contest_info();
        assert_eq!(contest.id, "nwerc2025");
        assert_eq!(contest.formal_name, "NWERC 2025");
        assert_eq!(contest.duration, "5:00:00.000");
        assert_eq!(contest.penalty_time, 20);
        assert_eq!(
            contest.start_time.as_deref(),
            Some("2025-01-01T10:00:00.000+02:00")
        );

        let problems = package.problems();
        assert_eq!(problems.len(), 2);
        assert_eq!(problems[0].ordinal, 0);
        assert_eq!(problems[1].rgb, "#000000");
        assert!(package.problem_by_id("bouncy").is_some());
        assert!(package.problem_by_id("missing").is_none());

        assert_eq!(package.teams().len(), 1);
        assert_eq!(
            package.team_by_id("team-1").unwrap().display_name.as_deref(),
            Some("The Rustaceans")
        );
    }

    #[test]
    fn missing_teams_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        write_package(dir.path());
        fs::remove_file(dir.path().join("teams.json")).unwrap();

        let package = ContestPackage::load(dir.path()).unwrap();
        assert!(package.teams().is_empty());
    }
}
