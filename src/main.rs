#![feature(proc_macro_hygiene, decl_macro)]


#[macro_use] extern crate lazy_static;
#[macro_use] extern crate log;
#[macro_use] extern crate rocket;


mod analytics_sys;
mod auth_sys;
mod captcha_sys;
mod geo;
mod logger;
mod report_route;
mod store;
mod task_scheduler;
mod tip_route;
mod util;



use std::{env, env::VarError, fs};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use rocket::Rocket;
use rocket::response::NamedFile;
use serde_json::Value as JsonValue;

use store::{MemoryStore, MissingReportPolicy};
use store::models::{Report, ReportStatus, SafetyTip};
use task_scheduler::JobRunnerBuilder;


const STATIC_DIR: &'static str = "static/";
const SEED_FILE: &'static str = "data/seed.json";


#[get("/")]
fn index() -> &'static str {
    "SafeZone Server"
}

#[get("/<file..>")]
fn get_static_file(file: PathBuf) -> Option<NamedFile> {
    NamedFile::open(Path::new(STATIC_DIR).join(file)).ok()
}


pub fn build_rocket(store: Arc<MemoryStore>, debug: bool) -> Rocket {
    let rocket = if debug {
        rocket::ignite()
            .mount("/", routes![captcha_sys::test_captcha])
    }
    else {
        rocket::ignite()
    };

    rocket
        .manage(store)
        .mount("/", routes![index])
        .mount(&format!("/{}", STATIC_DIR), routes![get_static_file])
        .mount("/", routes![
            captcha_sys::get_captcha,
        ])
        .mount("/", routes![
            report_route::get_report,
            report_route::get_report_map,
            report_route::get_reports_near,
            report_route::post_report,
            report_route::post_sos,
            report_route::post_upload_media,
            report_route::get_admin_report_list,
            report_route::post_report_status,
        ])
        .mount("/", routes![
            tip_route::get_tip,
            tip_route::get_tip_list,
            tip_route::post_tip,
        ])
        .mount("/", routes![
            auth_sys::post_login,
            auth_sys::post_logout,
            auth_sys::get_session,
        ])
        .mount("/", routes![
            analytics_sys::get_analytics,
        ])
}


fn load_store() -> MemoryStore {
    // Unknown ids on status updates are errors, not silent no-ops.
    let policy = MissingReportPolicy::Error;

    if !Path::new(SEED_FILE).exists() {
        return MemoryStore::new(policy);
    }

    let data: JsonValue = serde_json::from_str(&fs::read_to_string(SEED_FILE)
        .expect("Can't read seed.json"))
        .expect("Can't parse seed.json");
    let now = util::now_millis();

    let reports: Vec<Report> = data.get("reports")
        .and_then(|v| v.as_array())
        .map(|entries| entries.iter().map(|e| seed_report(e, now)).collect())
        .unwrap_or_else(Vec::new);
    let tips: Vec<SafetyTip> = data.get("tips")
        .and_then(|v| v.as_array())
        .map(|entries| entries.iter().map(|e| seed_tip(e, now)).collect())
        .unwrap_or_else(Vec::new);

    info!("Seeded store with {} reports and {} tips", reports.len(), tips.len());

    MemoryStore::with_data(policy, reports, tips)
}

// Seed entries carry relative ages so the demo data always lands inside
// the dashboard time windows.
fn seed_report(val: &JsonValue, now: i64) -> Report {
    let age_secs = val.get("age_secs").and_then(|v| v.as_i64()).unwrap_or(0);

    Report {
        id: val.get("id").and_then(|v| v.as_str())
            .expect("Seed report id missing").to_owned(),
        description: val.get("description").and_then(|v| v.as_str())
            .expect("Seed report description missing").to_owned(),
        latitude: val.get("latitude").and_then(|v| v.as_f64())
            .expect("Seed report latitude missing"),
        longitude: val.get("longitude").and_then(|v| v.as_f64())
            .expect("Seed report longitude missing"),
        address: val.get("address").and_then(|v| v.as_str()).map(str::to_owned),
        timestamp: now - age_secs * 1000,
        media_urls: None,
        status: val.get("status").and_then(|v| v.as_str())
            .map_or(ReportStatus::New, |s| {
                ReportStatus::parse(s).expect("Invalid seed report status")
            }),
        emergency: val.get("emergency").and_then(|v| v.as_bool()).unwrap_or(false),
        category: val.get("category").and_then(|v| v.as_str()).map(str::to_owned),
        anonymous_id: None,
    }
}

fn seed_tip(val: &JsonValue, now: i64) -> SafetyTip {
    let age_secs = val.get("age_secs").and_then(|v| v.as_i64()).unwrap_or(0);

    SafetyTip {
        id: val.get("id").and_then(|v| v.as_str())
            .expect("Seed tip id missing").to_owned(),
        title: val.get("title").and_then(|v| v.as_str())
            .expect("Seed tip title missing").to_owned(),
        content: val.get("content").and_then(|v| v.as_str())
            .expect("Seed tip content missing").to_owned(),
        category: val.get("category").and_then(|v| v.as_str())
            .expect("Seed tip category missing").to_owned(),
        timestamp: now - age_secs * 1000,
    }
}


fn main() {
    logger::init().expect("Logger initialization failed");

    let _sentry = env::var("SENTRY_DSN").ok()
        .map(|dsn| sentry::init(dsn.as_str()));

    let rocket_env = env::var("ROCKET_ENV")
        .or_else(|_| -> Result<String, VarError> {
            if cfg!(debug_assertions) {
                Ok("development".into())
            }
            else {
                Ok("production".into())
            }
        }).unwrap();

    let dbg_envs = ["dev", "development", "staging", "stage"];
    let debug = dbg_envs.iter().any(|&v| v == rocket_env);

    let store = Arc::new(load_store());

    let mut scheduler = JobRunnerBuilder::new().n_workers(2);
    report_route::init_report_sys(store.clone(), &mut scheduler);
    auth_sys::init_auth_sys(&mut scheduler);
    let scheduler = scheduler.build();

    let err = build_rocket(store, debug).launch();
    error!("Launch failed: {}", err);

    scheduler.shutdown();
}
