use clap::Parser;

use actix_web::{web, App, HttpServer};
use chrono::Local;
use eventofluo::algotester::ScoreboardFetcher;
use eventofluo::config;
use eventofluo::contest_package::ContestPackage;
use eventofluo::models::{judgement_types, languages};
use eventofluo::poller;
use eventofluo::routes::{self, AppState};
use eventofluo::state::FeedState;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex};

#[derive(Parser)]
#[command(about = "Algotester to CCS event feed bridge")]
struct Args {
    /// Path to the configuration file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,
    /// Clear all persisted data on startup
    #[arg(long)]
    clear_data: bool,
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info");
    }
    env_logger::init();

    let args = Args::parse();
    let settings = config::load_config(&args.config).expect("couldn't load configuration");

    if args.clear_data && settings.data_dir.exists() {
        std::fs::remove_dir_all(&settings.data_dir).expect("couldn't clear data directory");
        log::info!("cleared data directory {:?}", settings.data_dir);
    }

    let package =
        ContestPackage::load(&settings.contest_package_path).expect("couldn't load contest package");
    let team_mapping =
        config::load_mapping(&settings.team_mapping_file).expect("couldn't load team mapping");
    let problem_mapping = config::load_mapping(&settings.problem_mapping_file)
        .expect("couldn't load problem mapping");
    log::info!(
        "loaded {} problems, {} teams, {} team mappings, {} problem mappings",
        package.problems().len(),
        package.teams().len(),
        team_mapping.len(),
        problem_mapping.len()
    );

    let contest_start = package
        .start_time()
        .expect("couldn't parse contest start_time")
        .unwrap_or_else(|| Local::now().into());

    let mut feed =
        FeedState::load(&settings.data_dir, contest_start).expect("couldn't load feed state");
    feed.initialize_static_events(
        &package.contest_info(),
        &judgement_types(),
        &languages(),
        &package.problems(),
        package.teams(),
    );
    feed.save().expect("couldn't persist feed state");
    let feed = Arc::new(Mutex::new(feed));

    let (notify, _) = broadcast::channel(16);

    let fetcher = ScoreboardFetcher::new(
        &settings.algotester_api_key,
        &settings.algotester_subdomain,
        settings.algotester_contest_id,
    )
    .expect("couldn't build scoreboard client");

    actix_web::rt::spawn(poller::run(
        feed.clone(),
        notify.clone(),
        fetcher,
        team_mapping,
        problem_mapping,
        settings.polling_interval,
    ));

    let bind_address = (settings.host.clone(), settings.port);
    let data = web::Data::new(AppState {
        settings,
        package,
        feed,
        notify,
    });

    log::info!("listening on {}:{}", bind_address.0, bind_address.1);
    HttpServer::new(move || App::new().app_data(data.clone()).configure(routes::configure))
        .bind(bind_address)?
        .run()
        .await
}
