//! The snapshot-diff engine. Each poll hands every scoreboard row to
//! `process_scoreboard`, which compares the aggregate cell state against
//! the previously observed one and appends the submissions and judgements
//! needed to explain the difference. The reconstructed history always
//! lands back on the observed (attempts, pending, accepted) triple.

use crate::algotester::ScoreboardRow;
use crate::models::{CellState, Event, VERDICT_ACCEPTED, VERDICT_WRONG_ANSWER};
use crate::state::FeedState;
use log::debug;
use std::collections::BTreeMap;

pub type Mapping = BTreeMap<String, String>;

impl FeedState {
    /// Reconcile one poll batch. Rows and cells without a configured
    /// mapping are skipped without a trace. Returns the events appended
    /// by this batch.
    pub fn process_scoreboard(
        &mut self,
        rows: &[ScoreboardRow],
        team_mapping: &Mapping,
        problem_mapping: &Mapping,
    ) -> Vec<Event> {
        let first_new = self.events.len();

        for row in rows {
            let team_id = match team_mapping.get(&row.team_id) {
                Some(team_id) => team_id.clone(),
                None => {
                    debug!("skipping unmapped team {}", row.team_id);
                    continue;
                }
            };

            for (external_problem_id, cell) in &row.results {
                match problem_mapping.get(external_problem_id) {
                    Some(problem_id) => {
                        let problem_id = problem_id.clone();
                        self.process_cell(&team_id, &problem_id, cell);
                    }
                    None => debug!("skipping unmapped problem {}", external_problem_id),
                }
            }

            for (external_problem_id, cell) in &row.results {
                if let Some(problem_id) = problem_mapping.get(external_problem_id) {
                    self.previous
                        .entry(team_id.clone())
                        .or_default()
                        .insert(problem_id.clone(), cell.clone());
                }
            }
        }

        self.events[first_new..].to_vec()
    }

    fn process_cell(&mut self, team_id: &str, problem_id: &str, cell: &CellState) {
        let prev = self
            .previous
            .get(team_id)
            .and_then(|problems| problems.get(problem_id))
            .cloned();

        let prev = match prev {
            Some(prev) => prev,
            None => {
                // never observed: synthesize a plausible history instead
                // of diffing against zero at a single instant
                self.bootstrap_cell(team_id, problem_id, cell);
                return;
            }
        };

        let curr_judged = cell.attempts + u32::from(cell.is_accepted);
        let prev_judged = prev.attempts + u32::from(prev.is_accepted);
        let newly_accepted = cell.is_accepted && !prev.is_accepted;

        if cell.pending_attempts > prev.pending_attempts {
            // submission times are unknown, the poll's improvement time is
            // the best estimate available
            for _ in 0..(cell.pending_attempts - prev.pending_attempts) {
                self.create_submission(team_id, problem_id, cell.time_ms);
            }
        }

        let pending_resolved = prev.pending_attempts.saturating_sub(cell.pending_attempts);
        let new_judged = curr_judged.saturating_sub(prev_judged);

        if pending_resolved > 0 && new_judged > 0 {
            let pending = self.pending_submissions(team_id, problem_id);
            let judged_count = new_judged as usize;
            let wa_count = if newly_accepted {
                judged_count - 1
            } else {
                judged_count
            };

            for (i, submission_id) in pending.into_iter().take(judged_count).enumerate() {
                let verdict = if i < wa_count {
                    VERDICT_WRONG_ANSWER
                } else {
                    VERDICT_ACCEPTED
                };
                self.create_judgement(&submission_id, verdict, cell.time_ms);
            }
        }

        // judged submissions not explained by resolved pending ones were
        // never seen in flight; create them together with their judgement
        let direct = new_judged.saturating_sub(pending_resolved);
        if direct > 0 {
            let wa_count = if newly_accepted { direct - 1 } else { direct };
            for i in 0..direct {
                let submission = self.create_submission(team_id, problem_id, cell.time_ms);
                let verdict = if i < wa_count {
                    VERDICT_WRONG_ANSWER
                } else {
                    VERDICT_ACCEPTED
                };
                self.create_judgement(&submission.id, verdict, cell.time_ms);
            }
        }
    }

    /// First observation of a pair. Space the rejected submissions evenly
    /// over `(0, time_ms)`, put the accepted one at `time_ms` itself, and
    /// add the still-pending submissions last.
    fn bootstrap_cell(&mut self, team_id: &str, problem_id: &str, cell: &CellState) {
        if cell.attempts == 0 && cell.pending_attempts == 0 && !cell.is_accepted {
            return;
        }

        let total_judged = cell.attempts + u32::from(cell.is_accepted);
        let step = if total_judged > 0 {
            cell.time_ms / (total_judged + 1) as f64
        } else {
            cell.time_ms
        };

        for i in 0..cell.attempts {
            let time_ms = step * (i + 1) as f64;
            let submission = self.create_submission(team_id, problem_id, time_ms);
            self.create_judgement(&submission.id, VERDICT_WRONG_ANSWER, time_ms);
        }

        if cell.is_accepted {
            let submission = self.create_submission(team_id, problem_id, cell.time_ms);
            self.create_judgement(&submission.id, VERDICT_ACCEPTED, cell.time_ms);
        }

        for _ in 0..cell.pending_attempts {
            self.create_submission(team_id, problem_id, cell.time_ms);
        }
    }
}
