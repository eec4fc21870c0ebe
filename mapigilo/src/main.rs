//! Batch generator for the team and problem mapping files: pairs the
//! platform's scoreboard entries with the contest package entities by
//! position and writes the two YAML maps the bridge loads at startup.
//! Review the printed pairs and edit the files before trusting them.

use clap::Parser;
use eventofluo::algotester::{normalize_row, ScoreboardFetcher};
use eventofluo::config;
use eventofluo::contest_package::ContestPackage;
use lazy_static::lazy_static;
use regex::Regex;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(about = "Generate mapping files from the Algotester scoreboard")]
struct Args {
    /// Path to the configuration file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,
}

/// The public scoreboard page renders one `var formatter<problem id> =`
/// function per problem column, in display order. That is the only place
/// the problem ids appear outside authenticated responses.
fn extract_problem_ids(html: &str) -> Vec<String> {
    lazy_static! {
        static ref FORMATTER_REGEX: Regex = Regex::new(r"var formatter(\d+)\s*=").unwrap();
    }

    let mut seen = std::collections::BTreeSet::new();
    let mut ids = Vec::new();
    for captures in FORMATTER_REGEX.captures_iter(html) {
        let id = captures[1].to_string();
        if seen.insert(id.clone()) {
            ids.push(id);
        }
    }
    ids
}

fn write_mapping(path: &Path, header: &str, mapping: &BTreeMap<String, String>) {
    let mut text = format!("# {}\n\n", header);
    text.push_str(&serde_yaml::to_string(mapping).expect("mappings serialize to YAML"));
    fs::write(path, text).expect("couldn't write mapping file");
}

#[tokio::main]
async fn main() {
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info");
    }
    env_logger::init();

    let args = Args::parse();
    let settings = config::load_config(&args.config).expect("couldn't load configuration");

    println!(
        "Fetching problem list from HTML for contest {}...",
        settings.algotester_contest_id
    );
    let scoreboard_url = format!(
        "https://{}.algotester.com/en/Contest/ViewScoreboard/{}?showUnofficial=False",
        settings.algotester_subdomain, settings.algotester_contest_id
    );
    let html = reqwest::get(&scoreboard_url)
        .await
        .and_then(|response| response.error_for_status())
        .expect("couldn't fetch scoreboard page")
        .text()
        .await
        .expect("couldn't read scoreboard page");
    let external_problem_ids = extract_problem_ids(&html);

    println!(
        "Fetching scoreboard for contest {}...",
        settings.algotester_contest_id
    );
    let fetcher = ScoreboardFetcher::new(
        &settings.algotester_api_key,
        &settings.algotester_subdomain,
        settings.algotester_contest_id,
    )
    .expect("couldn't build scoreboard client");
    let raw_rows = fetcher
        .fetch_scoreboard()
        .await
        .expect("couldn't fetch scoreboard");
    let mut rows: Vec<_> = raw_rows.iter().map(normalize_row).collect();
    rows.sort_by(|a, b| a.team_id.cmp(&b.team_id));

    if rows.is_empty() {
        println!("No scoreboard data found!");
        return;
    }

    println!(
        "Loading contest package from {:?}...",
        settings.contest_package_path
    );
    let package =
        ContestPackage::load(&settings.contest_package_path).expect("couldn't load contest package");
    let problems = package.problems();
    let mut teams = package.teams().to_vec();
    teams.sort_by(|a, b| a.id.cmp(&b.id));

    println!(
        "\nFound {} problems on the platform, {} in the package",
        external_problem_ids.len(),
        problems.len()
    );
    println!(
        "Found {} teams on the platform, {} in the package",
        rows.len(),
        teams.len()
    );

    let mut problem_mapping = BTreeMap::new();
    println!("\nProposed problem mapping:");
    for (i, external_id) in external_problem_ids.iter().enumerate() {
        match problems.get(i) {
            Some(problem) => {
                println!("  {} -> {} ({})", external_id, problem.label, problem.id);
                problem_mapping.insert(external_id.clone(), problem.id.clone());
            }
            None => println!("  {} -> (no package problem left, skipped)", external_id),
        }
    }

    let mut team_mapping = BTreeMap::new();
    println!("\nProposed team mapping:");
    for (i, row) in rows.iter().enumerate() {
        match teams.get(i) {
            Some(team) => {
                println!(
                    "  {} ({}) -> {}",
                    row.team_id,
                    row.team_name,
                    team.id
                );
                team_mapping.insert(row.team_id.clone(), team.id.clone());
            }
            None => println!(
                "  {} ({}) -> (no package team left, skipped)",
                row.team_id, row.team_name
            ),
        }
    }

    write_mapping(
        &settings.problem_mapping_file,
        "Problem mapping: Algotester problem ID -> CCS problem ID",
        &problem_mapping,
    );
    println!(
        "\nWrote problem mapping to {:?}",
        settings.problem_mapping_file
    );

    write_mapping(
        &settings.team_mapping_file,
        "Team mapping: Algotester team ID -> CCS team ID",
        &team_mapping,
    );
    println!("Wrote team mapping to {:?}", settings.team_mapping_file);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn problem_ids_come_from_formatter_functions_in_order() {
        let html = r#"
            <script>
            var formatter10197 = function(value, row, index) {};
            var formatter10212 = function(value, row, index) {};
            var formatter10197 = function(value, row, index) {};
            </script>
        "#;
        assert_eq!(extract_problem_ids(html), vec!["10197", "10212"]);
    }

    #[test]
    fn pages_without_formatters_yield_nothing() {
        assert!(extract_problem_ids("<html></html>").is_empty());
    }
}
