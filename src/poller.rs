use crate::algotester::{normalize_row, ScoreboardFetcher, ScoreboardRow};
use crate::reconcile::Mapping;
use crate::state::FeedState;
use log::{error, info};
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex};
use tokio::time::{sleep, Duration};

/// Drive the poll → diff → persist → signal cycle forever. A failed fetch
/// skips the cycle; the previous-state map is only touched by a complete
/// reconciliation pass.
pub async fn run(
    state: Arc<Mutex<FeedState>>,
    notify: broadcast::Sender<()>,
    fetcher: ScoreboardFetcher,
    team_mapping: Mapping,
    problem_mapping: Mapping,
    interval_secs: u64,
) {
    loop {
        match fetcher.fetch_scoreboard().await {
            Ok(raw_rows) => {
                let rows: Vec<ScoreboardRow> = raw_rows.iter().map(normalize_row).collect();

                let new_events = {
                    let mut state = state.lock().await;
                    let new_events =
                        state.process_scoreboard(&rows, &team_mapping, &problem_mapping);
                    if let Err(e) = state.save() {
                        error!("couldn't persist feed state: {}", e);
                        std::process::exit(1);
                    }
                    new_events
                };

                if !new_events.is_empty() {
                    notify.send(()).ok();
                    for event in &new_events {
                        match event.kind.as_str() {
                            "submissions" => info!(
                                "new submission: {} (team={}, problem={})",
                                event.id,
                                event.data["team_id"].as_str().unwrap_or("?"),
                                event.data["problem_id"].as_str().unwrap_or("?")
                            ),
                            "judgements" => info!(
                                "new judgement: {} (submission={}, result={})",
                                event.id,
                                event.data["submission_id"].as_str().unwrap_or("?"),
                                event.data["judgement_type_id"].as_str().unwrap_or("?")
                            ),
                            _ => {}
                        }
                    }
                }
            }
            Err(e) => error!("couldn't fetch scoreboard: {}", e),
        }

        sleep(Duration::from_secs(interval_secs)).await;
    }
}
