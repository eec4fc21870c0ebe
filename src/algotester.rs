use crate::models::CellState;
use reqwest::header::{HeaderMap, HeaderValue};
use serde::{Deserialize, Deserializer};
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("scoreboard request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("invalid API key header")]
    ApiKey(#[from] reqwest::header::InvalidHeaderValue),
}

const PAGE_LIMIT: usize = 100;

/// Paginated client for the scoreboard endpoint. One page per request,
/// until a short page signals the end.
pub struct ScoreboardFetcher {
    client: reqwest::Client,
    base_url: String,
    contest_id: u64,
}

impl ScoreboardFetcher {
    pub fn new(api_key: &str, subdomain: &str, contest_id: u64) -> Result<Self, FetchError> {
        let mut headers = HeaderMap::new();
        headers.insert("X-Requested-With", HeaderValue::from_static("XMLHttpRequest"));
        headers.insert("X-API-Key", HeaderValue::from_str(api_key)?);

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(ScoreboardFetcher {
            client,
            base_url: format!(
                "https://{}.algotester.com/en/Contest/ListScoreboardWithAPI",
                subdomain
            ),
            contest_id,
        })
    }

    pub async fn fetch_scoreboard(&self) -> Result<Vec<RawRow>, FetchError> {
        let mut all_rows = Vec::new();
        let mut offset = 0;

        loop {
            let url = format!(
                "{}/{}?showUnofficial=False&offset={}&limit={}",
                self.base_url, self.contest_id, offset, PAGE_LIMIT
            );
            let page: ScoreboardPage = self
                .client
                .get(&url)
                .send()
                .await?
                .error_for_status()?
                .json()
                .await?;

            let count = page.rows.len();
            all_rows.extend(page.rows);

            if count < PAGE_LIMIT {
                break;
            }
            offset += PAGE_LIMIT;
        }

        Ok(all_rows)
    }
}

#[derive(Debug, Deserialize)]
struct ScoreboardPage {
    #[serde(default)]
    rows: Vec<RawRow>,
}

/// A scoreboard row as the platform serves it, PascalCase and all.
#[derive(Debug, Deserialize)]
pub struct RawRow {
    #[serde(rename = "Id", deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(rename = "Contestant", default)]
    pub contestant: Option<TextCell>,
    #[serde(rename = "IsUnofficial", default)]
    pub is_unofficial: bool,
    #[serde(rename = "Results", default)]
    pub results: BTreeMap<String, RawCell>,
}

#[derive(Debug, Deserialize)]
pub struct TextCell {
    #[serde(rename = "Text", default)]
    pub text: String,
}

#[derive(Debug, Deserialize)]
pub struct RawCell {
    #[serde(rename = "IsAccepted", default)]
    pub is_accepted: bool,
    #[serde(rename = "Attempts", default)]
    pub attempts: u32,
    #[serde(rename = "PendingAttempts", default)]
    pub pending_attempts: u32,
    #[serde(rename = "LastImprovementMs", default)]
    pub time_ms: f64,
}

/// A normalized row: the platform team id plus per-problem aggregate state,
/// keyed by the platform problem id.
#[derive(Debug, Clone)]
pub struct ScoreboardRow {
    pub team_id: String,
    pub team_name: String,
    pub results: BTreeMap<String, CellState>,
}

pub fn normalize_row(raw: &RawRow) -> ScoreboardRow {
    ScoreboardRow {
        team_id: raw.id.clone(),
        team_name: raw
            .contestant
            .as_ref()
            .map(|c| c.text.trim().to_string())
            .unwrap_or_default(),
        results: raw
            .results
            .iter()
            .map(|(problem_id, cell)| {
                (
                    problem_id.clone(),
                    CellState {
                        is_accepted: cell.is_accepted,
                        attempts: cell.attempts,
                        pending_attempts: cell.pending_attempts,
                        time_ms: cell.time_ms,
                    },
                )
            })
            .collect(),
    }
}

// Team ids have been observed both as JSON strings and as bare numbers.
fn string_or_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum StringOrNumber {
        String(String),
        Number(i64),
    }

    Ok(match StringOrNumber::deserialize(deserializer)? {
        StringOrNumber::String(s) => s,
        StringOrNumber::Number(n) => n.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_normalizes_pascal_case_fields() {
        let raw: RawRow = serde_json::from_str(
            r#"{
                "Id": "10197",
                "Contestant": {"Text": "  The Rustaceans "},
                "Rank": 1,
                "Score": 2,
                "Results": {
                    "500": {
                        "IsAccepted": true,
                        "Attempts": 1,
                        "PendingAttempts": 0,
                        "LastImprovementMs": 5000.0
                    }
                }
            }"#,
        )
        .unwrap();

        let row = normalize_row(&raw);
        assert_eq!(row.team_id, "10197");
        assert_eq!(row.team_name, "The Rustaceans");
        let cell = &row.results["500"];
        assert!(cell.is_accepted);
        assert_eq!(cell.attempts, 1);
        assert_eq!(cell.pending_attempts, 0);
        assert_eq!(cell.time_ms, 5000.0);
    }

    #[test]
    fn numeric_team_id_becomes_string() {
        let raw: RawRow = serde_json::from_str(r#"{"Id": 10212}"#).unwrap();
        assert_eq!(raw.id, "10212");
        assert!(raw.results.is_empty());
    }

    #[test]
    fn missing_result_fields_default_to_zero() {
        let raw: RawRow =
            serde_json::from_str(r#"{"Id": "1", "Results": {"500": {}}}"#).unwrap();
        let row = normalize_row(&raw);
        let cell = &row.results["500"];
        assert!(!cell.is_accepted);
        assert_eq!(cell.attempts, 0);
        assert_eq!(cell.time_ms, 0.0);
    }
}
