use serde::{Deserialize, Serialize};

pub const VERDICT_ACCEPTED: &str = "AC";
pub const VERDICT_WRONG_ANSWER: &str = "WA";

/// Aggregate judging state of one team/problem cell as the scoreboard
/// reports it. `attempts` counts rejected submissions only; an accepted
/// submission is the `is_accepted` flag on top of that.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CellState {
    pub is_accepted: bool,
    pub attempts: u32,
    pub pending_attempts: u32,
    pub time_ms: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Submission {
    pub id: String,
    pub team_id: String,
    pub problem_id: String,
    pub language_id: String,
    pub time: String,
    pub contest_time: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Judgement {
    pub id: String,
    pub submission_id: String,
    pub judgement_type_id: String,
    pub start_time: String,
    pub start_contest_time: String,
    pub end_time: String,
    pub end_contest_time: String,
}

/// One entry of the event feed. Entities are only ever created, so `op`
/// is always "create" and `data` is the created entity verbatim.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub token: String,
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub op: String,
    pub data: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JudgementType {
    pub id: String,
    pub name: String,
    pub penalty: bool,
    pub solved: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Language {
    pub id: String,
    pub name: String,
}

pub fn judgement_types() -> Vec<JudgementType> {
    fn jt(id: &str, name: &str, penalty: bool, solved: bool) -> JudgementType {
        JudgementType {
            id: id.into(),
            name: name.into(),
            penalty,
            solved,
        }
    }

    vec![
        jt("AC", "Accepted", false, true),
        jt("WA", "Wrong Answer", true, false),
        jt("TLE", "Time Limit Exceeded", true, false),
        jt("RTE", "Run-Time Error", true, false),
        jt("CE", "Compile Error", false, false),
    ]
}

pub fn languages() -> Vec<Language> {
    fn lang(id: &str, name: &str) -> Language {
        Language {
            id: id.into(),
            name: name.into(),
        }
    }

    vec![
        lang("c", "C"),
        lang("cpp", "C++"),
        lang("java", "Java"),
        lang("kotlin", "Kotlin"),
        lang("python3", "Python 3"),
    ]
}

pub fn submission_id(n: u64) -> String {
    format!("algotester-{}", n)
}

pub fn judgement_id(n: u64) -> String {
    format!("algotester-{}", n)
}

/// Numeric part of an `algotester-<n>` id, for creation-order sorting.
pub fn id_ordinal(id: &str) -> u64 {
    id.rsplit('-')
        .next()
        .and_then(|n| n.parse().ok())
        .unwrap_or(0)
}
