//! The owned feed-state aggregate: the append-only event log, the entity
//! indexes rebuilt from it, the previous-scoreboard map the reconciler
//! diffs against, and the id/token counters. Everything mutable lives here,
//! behind one lock owned by the caller.

use crate::contest_package::{format_absolute_time, format_reltime, ContestInfo, Problem, Team};
use crate::models::{
    judgement_id, submission_id, CellState, Event, Judgement, JudgementType, Language, Submission,
};
use chrono::{DateTime, Duration, FixedOffset};
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum TokenError {
    #[error("Invalid token format: {0}")]
    InvalidFormat(String),
    #[error("Invalid token: {0}")]
    Invalid(String),
    #[error("Unknown token: {0}")]
    Unknown(String),
}

#[derive(Error, Debug)]
pub enum PersistError {
    #[error("couldn't access {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("couldn't decode persisted state: {0}")]
    Decode(#[from] serde_json::Error),
}

const STATE_FILE: &str = "state.json";

/// What survives a restart: the log, the diff input, and the counters.
/// Entity indexes are rebuilt from the log on load.
#[derive(Serialize, Deserialize)]
struct PersistedState {
    events: Vec<Event>,
    previous_state: BTreeMap<String, BTreeMap<String, CellState>>,
    next_submission_id: u64,
    next_judgement_id: u64,
    next_token: u64,
}

pub struct FeedState {
    data_dir: PathBuf,
    contest_start: DateTime<FixedOffset>,
    pub(crate) events: Vec<Event>,
    pub(crate) previous: BTreeMap<String, BTreeMap<String, CellState>>,
    submissions: BTreeMap<String, Submission>,
    judgements: BTreeMap<String, Judgement>,
    judged_submissions: BTreeSet<String>,
    next_submission_id: u64,
    next_judgement_id: u64,
    next_token: u64,
}

impl FeedState {
    pub fn new(data_dir: &Path, contest_start: DateTime<FixedOffset>) -> Self {
        FeedState {
            data_dir: data_dir.into(),
            contest_start,
            events: Vec::new(),
            previous: BTreeMap::new(),
            submissions: BTreeMap::new(),
            judgements: BTreeMap::new(),
            judged_submissions: BTreeSet::new(),
            next_submission_id: 1,
            next_judgement_id: 1,
            next_token: 1,
        }
    }

    /// Rehydrate from the last persisted snapshot, or start empty if none
    /// has been written yet.
    pub fn load(data_dir: &Path, contest_start: DateTime<FixedOffset>) -> Result<Self, PersistError> {
        let mut state = FeedState::new(data_dir, contest_start);

        let path = data_dir.join(STATE_FILE);
        if !path.exists() {
            return Ok(state);
        }

        let text = fs::read_to_string(&path).map_err(|source| PersistError::Io {
            path: path.clone(),
            source,
        })?;
        let persisted: PersistedState = serde_json::from_str(&text)?;

        state.previous = persisted.previous_state;
        state.next_submission_id = persisted.next_submission_id;
        state.next_judgement_id = persisted.next_judgement_id;
        state.next_token = persisted.next_token;

        for event in &persisted.events {
            match event.kind.as_str() {
                "submissions" => {
                    let submission: Submission = serde_json::from_value(event.data.clone())?;
                    state.submissions.insert(submission.id.clone(), submission);
                }
                "judgements" => {
                    let judgement: Judgement = serde_json::from_value(event.data.clone())?;
                    state.judged_submissions.insert(judgement.submission_id.clone());
                    state.judgements.insert(judgement.id.clone(), judgement);
                }
                _ => {}
            }
        }
        state.events = persisted.events;

        debug!(
            "rehydrated {} events, {} submissions, {} judgements",
            state.events.len(),
            state.submissions.len(),
            state.judgements.len()
        );
        Ok(state)
    }

    /// Write the whole snapshot to a temporary file and rename it into
    /// place, so a crash never leaves the log and the previous-state map
    /// inconsistent with each other.
    pub fn save(&self) -> Result<(), PersistError> {
        fs::create_dir_all(&self.data_dir).map_err(|source| PersistError::Io {
            path: self.data_dir.clone(),
            source,
        })?;

        let persisted = PersistedState {
            events: self.events.clone(),
            previous_state: self.previous.clone(),
            next_submission_id: self.next_submission_id,
            next_judgement_id: self.next_judgement_id,
            next_token: self.next_token,
        };
        let text = serde_json::to_string(&persisted)?;

        let path = self.data_dir.join(STATE_FILE);
        let tmp_path = self.data_dir.join(format!("{}.tmp", STATE_FILE));
        fs::write(&tmp_path, text).map_err(|source| PersistError::Io {
            path: tmp_path.clone(),
            source,
        })?;
        fs::rename(&tmp_path, &path).map_err(|source| PersistError::Io { path, source })?;
        Ok(())
    }

    /// Seed the log with the static entities, in a fixed order, iff the log
    /// is empty. Restarting with a persisted log leaves it untouched.
    pub fn initialize_static_events(
        &mut self,
        contest: &ContestInfo,
        judgement_types: &[JudgementType],
        languages: &[Language],
        problems: &[Problem],
        teams: &[Team],
    ) {
        if !self.events.is_empty() {
            return;
        }

        let contest_id = contest.id.clone();
        self.add_event("contests", &contest_id, to_value(contest));
        for jt in judgement_types {
            self.add_event("judgement-types", &jt.id, to_value(jt));
        }
        for language in languages {
            self.add_event("languages", &language.id, to_value(language));
        }
        for problem in problems {
            self.add_event("problems", &problem.id, to_value(problem));
        }
        for team in teams {
            self.add_event("teams", &team.id, to_value(team));
        }
    }

    pub(crate) fn add_event(&mut self, kind: &str, id: &str, data: serde_json::Value) {
        let token = self.next_token.to_string();
        self.next_token += 1;
        self.events.push(Event {
            token,
            id: id.into(),
            kind: kind.into(),
            op: "create".into(),
            data,
        });
    }

    pub(crate) fn create_submission(
        &mut self,
        team_id: &str,
        problem_id: &str,
        contest_time_ms: f64,
    ) -> Submission {
        let id = submission_id(self.next_submission_id);
        self.next_submission_id += 1;

        let submission = Submission {
            id: id.clone(),
            team_id: team_id.into(),
            problem_id: problem_id.into(),
            // the scoreboard doesn't expose languages
            language_id: "cpp".into(),
            time: self.absolute_time(contest_time_ms),
            contest_time: format_reltime(contest_time_ms),
        };

        self.submissions.insert(id.clone(), submission.clone());
        self.add_event("submissions", &id, to_value(&submission));
        submission
    }

    pub(crate) fn create_judgement(
        &mut self,
        submission_id: &str,
        judgement_type_id: &str,
        contest_time_ms: f64,
    ) -> Judgement {
        let id = judgement_id(self.next_judgement_id);
        self.next_judgement_id += 1;

        let time = self.absolute_time(contest_time_ms);
        let contest_time = format_reltime(contest_time_ms);
        let judgement = Judgement {
            id: id.clone(),
            submission_id: submission_id.into(),
            judgement_type_id: judgement_type_id.into(),
            start_time: time.clone(),
            start_contest_time: contest_time.clone(),
            end_time: time,
            end_contest_time: contest_time,
        };

        self.judged_submissions.insert(submission_id.into());
        self.judgements.insert(id.clone(), judgement.clone());
        self.add_event("judgements", &id, to_value(&judgement));
        judgement
    }

    fn absolute_time(&self, contest_time_ms: f64) -> String {
        let instant = self.contest_start + Duration::milliseconds(contest_time_ms as i64);
        format_absolute_time(&instant)
    }

    /// Submissions of this pair that have no judgement yet, oldest first.
    pub(crate) fn pending_submissions(&self, team_id: &str, problem_id: &str) -> Vec<String> {
        let mut pending: Vec<&Submission> = self
            .submissions
            .values()
            .filter(|s| {
                s.team_id == team_id
                    && s.problem_id == problem_id
                    && !self.judged_submissions.contains(&s.id)
            })
            .collect();
        pending.sort_by_key(|s| crate::models::id_ordinal(&s.id));
        pending.into_iter().map(|s| s.id.clone()).collect()
    }

    pub fn validate_token(&self, token: &str) -> Result<u64, TokenError> {
        let value: i64 = token
            .parse()
            .map_err(|_| TokenError::InvalidFormat(token.into()))?;
        if value < 0 {
            return Err(TokenError::Invalid(token.into()));
        }
        let value = value as u64;
        if value > self.max_token() {
            return Err(TokenError::Unknown(token.into()));
        }
        Ok(value)
    }

    /// Events with token greater than the given one; the whole log when no
    /// token is given. Tokens are contiguous from 1, so the suffix starts
    /// at index `token`.
    pub fn events_since(&self, token: Option<&str>) -> Result<Vec<Event>, TokenError> {
        match token {
            None => Ok(self.events.clone()),
            Some(token) => {
                let value = self.validate_token(token)?;
                Ok(self.events[value as usize..].to_vec())
            }
        }
    }

    pub fn max_token(&self) -> u64 {
        self.next_token - 1
    }

    pub fn last_token(&self) -> Option<String> {
        self.events.last().map(|e| e.token.clone())
    }

    pub fn submission(&self, id: &str) -> Option<&Submission> {
        self.submissions.get(id)
    }

    pub fn submissions(&self) -> Vec<Submission> {
        let mut all: Vec<Submission> = self.submissions.values().cloned().collect();
        all.sort_by_key(|s| crate::models::id_ordinal(&s.id));
        all
    }

    pub fn judgement(&self, id: &str) -> Option<&Judgement> {
        self.judgements.get(id)
    }

    pub fn judgements(&self) -> Vec<Judgement> {
        let mut all: Vec<Judgement> = self.judgements.values().cloned().collect();
        all.sort_by_key(|j| crate::models::id_ordinal(&j.id));
        all
    }
}

fn to_value<T: Serialize>(entity: &T) -> serde_json::Value {
    serde_json::to_value(entity).expect("feed entities serialize to JSON")
}
