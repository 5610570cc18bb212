use std::{
    env,
    sync::Mutex,
    collections::HashMap,
    time::{Instant, Duration},
};
use rocket::{
    response::status::BadRequest,
    response::content::Json,
    request::Form,
    http::{Cookie, Cookies},
};
use serde_json::json;

use crate::util;
use crate::task_scheduler::{Job, JobRunnerBuilder};


type JsonResult = Result<Json<String>, BadRequest<String>>;
type StringResult = Result<String, BadRequest<String>>;


lazy_static! {
    static ref ADMIN_ID: String = {
        env::var("ADMIN_ID").expect("ADMIN_ID must be set")
    };
    static ref ADMIN_PWD: u64 = {
        let salted_pwd = env::var("ADMIN_PWD").expect("ADMIN_PWD must be set")
            + PASSWORD_HASH_SALT;
        util::calculate_hash(&salted_pwd)
    };
    static ref SESSION_MAP: Mutex<HashMap<String, Instant>> = {
        Mutex::new(HashMap::new())
    };
}

const PASSWORD_HASH_SALT: &'static str = "~~ SafeZone 17 2803";
const SESSION_COOKIE: &'static str = "admin_session";
const SESSION_DURATION: u64 = 60 * 30; // seconds
const SESSION_PURGE_PERIOD: u64 = 60 * 5;
const MAX_SESSION_MAP_SIZE: usize = 64;


fn check_admin(id: &str, pwd: &str) -> bool {
    let salted_pwd = pwd.to_owned() + PASSWORD_HASH_SALT;
    let hashed_pwd = util::calculate_hash(&salted_pwd);

    *ADMIN_ID == id && *ADMIN_PWD == hashed_pwd
}

fn session_alive(created_time: &Instant) -> bool {
    created_time.elapsed() < Duration::new(SESSION_DURATION, 0)
}

/// The admin gate every `/admin/*` data route goes through.
pub fn verify_admin_session(cookies: &mut Cookies) -> bool {
    if let Some(cookie) = cookies.get_private(SESSION_COOKIE) {
        let token = cookie.value().to_owned();
        let mut map = SESSION_MAP.lock().unwrap();

        match map.get(&token).copied() {
            Some(created_time) if session_alive(&created_time) => true,
            Some(_) => {
                map.remove(&token);
                cookies.remove_private(cookie);
                false
            },
            None => false,
        }
    }
    else {
        false
    }
}


pub fn init_auth_sys(scheduler: &mut JobRunnerBuilder) {
    scheduler.add_job(Job::new(session_purge_job,
        Duration::new(SESSION_PURGE_PERIOD, 0)));
}

fn session_purge_job() {
    let mut map = SESSION_MAP.lock().unwrap();
    let before = map.len();

    map.retain(|_, created_time| session_alive(created_time));

    if map.len() < before {
        info!("Purged {} expired admin sessions", before - map.len());
    }
}


#[derive(FromForm)]
pub struct LoginForm {
    admin_id: String,
    admin_pwd: String,
}


#[post("/admin/login", format="application/x-www-form-urlencoded", data="<form>")]
pub fn post_login(form: Option<Form<LoginForm>>, mut cookies: Cookies) -> StringResult {
    let form = match form {
        Some(form) => form,
        None => return Err(BadRequest(Some("Invalid form".into()))),
    };

    if !check_admin(&form.admin_id, &form.admin_pwd) {
        warn!("Rejected admin login for id '{}'", form.admin_id);
        return Err(BadRequest(Some("Authentication failed!".into())));
    }

    let token = loop {
        let token = util::generate_rand_id(32);
        let mut map = SESSION_MAP.lock().unwrap();

        if !map.contains_key(&token) {
            map.insert(token.clone(), Instant::now());

            if map.len() > MAX_SESSION_MAP_SIZE {
                map.retain(|_, created_time| session_alive(created_time));
            }

            break token;
        }
    };

    cookies.add_private(Cookie::new(SESSION_COOKIE, token));

    info!("Admin logged in");

    Ok("ok".into())
}

#[post("/admin/logout")]
pub fn post_logout(mut cookies: Cookies) -> StringResult {
    if let Some(cookie) = cookies.get_private(SESSION_COOKIE) {
        SESSION_MAP.lock().unwrap().remove(cookie.value());
        cookies.remove_private(cookie);
    }

    Ok("ok".into())
}

#[get("/admin/session")]
pub fn get_session(mut cookies: Cookies) -> JsonResult {
    Ok(Json(json!({
        "admin": verify_admin_session(&mut cookies),
    }).to_string()))
}
