use crate::auth::BasicUser;
use crate::broadcaster;
use crate::config::Settings;
use crate::contest_package::ContestPackage;
use crate::models;
use crate::state::FeedState;
use actix_web::error::{ErrorBadRequest, ErrorNotFound};
use actix_web::{get, web, HttpRequest, HttpResponse, Responder};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex};

pub struct AppState {
    pub settings: Settings,
    pub package: ContestPackage,
    pub feed: Arc<Mutex<FeedState>>,
    pub notify: broadcast::Sender<()>,
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(api_info)
        .service(get_contests)
        .service(get_contest)
        .service(get_judgement_types)
        .service(get_languages)
        .service(get_problems)
        .service(get_problem)
        .service(get_teams)
        .service(get_team)
        .service(get_submissions)
        .service(get_submission)
        .service(get_judgements)
        .service(get_judgement)
        .service(event_feed);
}

fn check_contest(data: &AppState, contest_id: &str) -> Result<(), actix_web::Error> {
    if data.package.contest_id() == contest_id {
        Ok(())
    } else {
        Err(ErrorNotFound("Contest not found"))
    }
}

#[get("/")]
async fn api_info(_user: BasicUser) -> impl Responder {
    web::Json(json!({
        "version": "draft",
        "version_url": "https://ccs-specs.icpc.io/draft/contest_api",
        "provider": {
            "name": "Algotester to CCS Event Feed",
        }
    }))
}

#[get("/contests")]
async fn get_contests(data: web::Data<AppState>, _user: BasicUser) -> impl Responder {
    web::Json(vec![data.package.contest_info()])
}

#[get("/contests/{contest_id}")]
async fn get_contest(
    data: web::Data<AppState>,
    path: web::Path<String>,
    _user: BasicUser,
) -> Result<impl Responder, actix_web::Error> {
    check_contest(&data, &path)?;
    Ok(web::Json(data.package.contest_info()))
}

#[get("/contests/{contest_id}/judgement-types")]
async fn get_judgement_types(
    data: web::Data<AppState>,
    path: web::Path<String>,
    _user: BasicUser,
) -> Result<impl Responder, actix_web::Error> {
    check_contest(&data, &path)?;
    Ok(web::Json(models::judgement_types()))
}

#[get("/contests/{contest_id}/languages")]
async fn get_languages(
    data: web::Data<AppState>,
    path: web::Path<String>,
    _user: BasicUser,
) -> Result<impl Responder, actix_web::Error> {
    check_contest(&data, &path)?;
    Ok(web::Json(models::languages()))
}

#[get("/contests/{contest_id}/problems")]
async fn get_problems(
    data: web::Data<AppState>,
    path: web::Path<String>,
    _user: BasicUser,
) -> Result<impl Responder, actix_web::Error> {
    check_contest(&data, &path)?;
    Ok(web::Json(data.package.problems()))
}

#[get("/contests/{contest_id}/problems/{problem_id}")]
async fn get_problem(
    data: web::Data<AppState>,
    path: web::Path<(String, String)>,
    _user: BasicUser,
) -> Result<impl Responder, actix_web::Error> {
    let (contest_id, problem_id) = path.into_inner();
    check_contest(&data, &contest_id)?;
    let problem = data
        .package
        .problem_by_id(&problem_id)
        .ok_or_else(|| ErrorNotFound("Problem not found"))?;
    Ok(web::Json(problem))
}

#[get("/contests/{contest_id}/teams")]
async fn get_teams(
    data: web::Data<AppState>,
    path: web::Path<String>,
    _user: BasicUser,
) -> Result<impl Responder, actix_web::Error> {
    check_contest(&data, &path)?;
    Ok(web::Json(data.package.teams().to_vec()))
}

#[get("/contests/{contest_id}/teams/{team_id}")]
async fn get_team(
    data: web::Data<AppState>,
    path: web::Path<(String, String)>,
    _user: BasicUser,
) -> Result<impl Responder, actix_web::Error> {
    let (contest_id, team_id) = path.into_inner();
    check_contest(&data, &contest_id)?;
    let team = data
        .package
        .team_by_id(&team_id)
        .ok_or_else(|| ErrorNotFound("Team not found"))?;
    Ok(web::Json(team.clone()))
}

#[get("/contests/{contest_id}/submissions")]
async fn get_submissions(
    data: web::Data<AppState>,
    path: web::Path<String>,
    _user: BasicUser,
) -> Result<impl Responder, actix_web::Error> {
    check_contest(&data, &path)?;
    let feed = data.feed.lock().await;
    Ok(web::Json(feed.submissions()))
}

#[get("/contests/{contest_id}/submissions/{submission_id}")]
async fn get_submission(
    data: web::Data<AppState>,
    path: web::Path<(String, String)>,
    _user: BasicUser,
) -> Result<impl Responder, actix_web::Error> {
    let (contest_id, submission_id) = path.into_inner();
    check_contest(&data, &contest_id)?;
    let feed = data.feed.lock().await;
    let submission = feed
        .submission(&submission_id)
        .ok_or_else(|| ErrorNotFound("Submission not found"))?;
    Ok(web::Json(submission.clone()))
}

#[get("/contests/{contest_id}/judgements")]
async fn get_judgements(
    data: web::Data<AppState>,
    path: web::Path<String>,
    _user: BasicUser,
) -> Result<impl Responder, actix_web::Error> {
    check_contest(&data, &path)?;
    let feed = data.feed.lock().await;
    Ok(web::Json(feed.judgements()))
}

#[get("/contests/{contest_id}/judgements/{judgement_id}")]
async fn get_judgement(
    data: web::Data<AppState>,
    path: web::Path<(String, String)>,
    _user: BasicUser,
) -> Result<impl Responder, actix_web::Error> {
    let (contest_id, judgement_id) = path.into_inner();
    check_contest(&data, &contest_id)?;
    let feed = data.feed.lock().await;
    let judgement = feed
        .judgement(&judgement_id)
        .ok_or_else(|| ErrorNotFound("Judgement not found"))?;
    Ok(web::Json(judgement.clone()))
}

#[derive(Deserialize)]
struct FeedQuery {
    since_token: Option<String>,
}

#[get("/contests/{contest_id}/event-feed")]
async fn event_feed(
    data: web::Data<AppState>,
    path: web::Path<String>,
    query: web::Query<FeedQuery>,
    req: HttpRequest,
    _user: BasicUser,
) -> Result<impl Responder, actix_web::Error> {
    check_contest(&data, &path)?;

    // reject bad tokens before any streaming begins
    if let Some(token) = &query.since_token {
        let feed = data.feed.lock().await;
        feed.validate_token(token)
            .map_err(|e| ErrorBadRequest(e.to_string()))?;
    }

    let peer = req
        .peer_addr()
        .map(|addr| addr.to_string())
        .unwrap_or_else(|| "unknown".into());
    let client = broadcaster::spawn_client(
        data.feed.clone(),
        data.notify.subscribe(),
        query.into_inner().since_token,
        peer,
    );

    Ok(HttpResponse::Ok()
        .content_type("application/x-ndjson")
        .streaming(client))
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::http::StatusCode;
    use actix_web::{test, App};
    use chrono::DateTime;
    use std::fs;
    use std::path::PathBuf;

    fn test_settings() -> Settings {
        Settings {
            algotester_api_key: "secret".into(),
            algotester_subdomain: "icpc".into(),
            algotester_contest_id: 1375,
            contest_package_path: PathBuf::from("unused"),
            polling_interval: 30,
            data_dir: PathBuf::from("unused"),
            team_mapping_file: PathBuf::from("unused"),
            problem_mapping_file: PathBuf::from("unused"),
            host: "127.0.0.1".into(),
            port: 8080,
            auth_username: "feed".into(),
            auth_password: "feed".into(),
        }
    }

    fn test_package(dir: &std::path::Path) -> ContestPackage {
        fs::write(
            dir.join("contest.yaml"),
            "id: nwerc2025\nname: NWERC 2025\nduration: \"5:00:00\"\n",
        )
        .unwrap();
        fs::write(
            dir.join("problems.yaml"),
            "- id: accurate\n  label: A\n  name: Accurate Average\n",
        )
        .unwrap();
        fs::write(dir.join("teams.json"), r#"[{"id": "team-1"}]"#).unwrap();
        ContestPackage::load(dir).unwrap()
    }

    fn test_app_state(dir: &std::path::Path) -> web::Data<AppState> {
        let mut feed = FeedState::new(
            dir,
            DateTime::parse_from_rfc3339("2025-01-01T10:00:00+02:00").unwrap(),
        );
        feed.create_submission("team-1", "accurate", 1000.0);
        let (notify, _) = broadcast::channel(16);
        web::Data::new(AppState {
            settings: test_settings(),
            package: test_package(dir),
            feed: Arc::new(Mutex::new(feed)),
            notify,
        })
    }

    fn authorization() -> (&'static str, String) {
        ("Authorization", format!("Basic {}", base64::encode("feed:feed")))
    }

    #[actix_web::test]
    async fn endpoints_require_credentials() {
        let dir = tempfile::tempdir().unwrap();
        let app = test::init_service(
            App::new()
                .app_data(test_app_state(dir.path()))
                .configure(configure),
        )
        .await;

        let resp = test::call_service(&app, test::TestRequest::get().uri("/contests").to_request())
            .await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        assert!(resp.headers().contains_key("WWW-Authenticate"));

        let resp = test::call_service(
            &app,
            test::TestRequest::get()
                .uri("/contests")
                .insert_header(("Authorization", "Basic bm90OnJpZ2h0"))
                .to_request(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[actix_web::test]
    async fn static_endpoints_serve_package_data() {
        let dir = tempfile::tempdir().unwrap();
        let app = test::init_service(
            App::new()
                .app_data(test_app_state(dir.path()))
                .configure(configure),
        )
        .await;

        let info: serde_json::Value = test::call_and_read_body_json(
            &app,
            test::TestRequest::get()
                .uri("/")
                .insert_header(authorization())
                .to_request(),
        )
        .await;
        assert_eq!(info["version"], "draft");

        let contests: serde_json::Value = test::call_and_read_body_json(
            &app,
            test::TestRequest::get()
                .uri("/contests")
                .insert_header(authorization())
                .to_request(),
        )
        .await;
        assert_eq!(contests[0]["id"], "nwerc2025");

        let resp = test::call_service(
            &app,
            test::TestRequest::get()
                .uri("/contests/other")
                .insert_header(authorization())
                .to_request(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        let problems: serde_json::Value = test::call_and_read_body_json(
            &app,
            test::TestRequest::get()
                .uri("/contests/nwerc2025/problems")
                .insert_header(authorization())
                .to_request(),
        )
        .await;
        assert_eq!(problems[0]["label"], "A");
    }

    #[actix_web::test]
    async fn submissions_come_from_the_feed_state() {
        let dir = tempfile::tempdir().unwrap();
        let app = test::init_service(
            App::new()
                .app_data(test_app_state(dir.path()))
                .configure(configure),
        )
        .await;

        let submissions: serde_json::Value = test::call_and_read_body_json(
            &app,
            test::TestRequest::get()
                .uri("/contests/nwerc2025/submissions")
                .insert_header(authorization())
                .to_request(),
        )
        .await;
        assert_eq!(submissions[0]["id"], "algotester-1");

        let resp = test::call_service(
            &app,
            test::TestRequest::get()
                .uri("/contests/nwerc2025/submissions/algotester-99")
                .insert_header(authorization())
                .to_request(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[actix_web::test]
    async fn event_feed_rejects_bad_tokens_before_streaming() {
        let dir = tempfile::tempdir().unwrap();
        let app = test::init_service(
            App::new()
                .app_data(test_app_state(dir.path()))
                .configure(configure),
        )
        .await;

        for uri in [
            "/contests/nwerc2025/event-feed?since_token=abc",
            "/contests/nwerc2025/event-feed?since_token=-1",
            "/contests/nwerc2025/event-feed?since_token=99",
        ] {
            let resp = test::call_service(
                &app,
                test::TestRequest::get()
                    .uri(uri)
                    .insert_header(authorization())
                    .to_request(),
            )
            .await;
            assert_eq!(resp.status(), StatusCode::BAD_REQUEST, "uri: {}", uri);
        }

        let resp = test::call_service(
            &app,
            test::TestRequest::get()
                .uri("/contests/nwerc2025/event-feed?since_token=1")
                .insert_header(authorization())
                .to_request(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(
            resp.headers().get("content-type").unwrap(),
            "application/x-ndjson"
        );
    }
}
