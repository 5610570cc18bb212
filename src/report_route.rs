use std::{
    fs,
    io::{self, Read, Write},
    path::Path,
    sync::{Arc, RwLock},
    time::Duration,
};
use rocket::{
    response::{
        status::BadRequest,
        content::Json,
    },
    request::Form,
    http::Cookies,
    data::Data,
    State,
};
use serde_json::json;

use crate::auth_sys;
use crate::captcha_sys::verify_and_remove_captcha;
use crate::store::{MemoryStore, ReportFilter, TimeRange};
use crate::store::models::{NewReport, Report, ReportStatus};
use crate::task_scheduler::{Job, JobRunnerBuilder};
use crate::util;


type JsonResult = Result<Json<String>, BadRequest<String>>;
type StringResult = Result<String, BadRequest<String>>;


lazy_static! {
    static ref REPORT_MAP_CACHE: RwLock<String> = {
        RwLock::new(String::new())
    };
}

// Reports older than this are aged off the public map; the admin listing
// still sees everything.
const REPORT_MAP_WINDOW: i64 = 30 * 24 * 60 * 60; // seconds
const REPORT_MAP_REFRESH: u64 = 30;
const MEDIA_UPLOAD_LIMIT: usize = (8 * 1024 * 1024 / 3) * 4; // chars
const MAX_MEDIA_PER_REPORT: usize = 4;
pub const MEDIA_UPLOAD_DIR: &'static str = "upload/media/";
pub const MEDIA_PUBLIC_DIR: &'static str = "media/";

const SOS_DESCRIPTION: &'static str =
    "EMERGENCY SOS ALERT: Immediate assistance required.";
const SOS_CATEGORY: &'static str = "Emergency SOS";


fn make_json_result(json: String) -> JsonResult {
    Ok(Json(json))
}

fn make_json_error(err: String) -> JsonResult {
    Err(BadRequest(Some(err)))
}

fn make_string_result(txt: String) -> StringResult {
    Ok(txt)
}

fn make_string_error(err: String) -> StringResult {
    Err(BadRequest(Some(err)))
}


fn verify_coords_error(latitude: f64, longitude: f64) -> Option<&'static str> {
    if !latitude.is_finite() || latitude < -90.0 || latitude > 90.0 {
        Some("Latitude must be between -90 and 90")
    }
    else if !longitude.is_finite() || longitude < -180.0 || longitude > 180.0 {
        Some("Longitude must be between -180 and 180")
    }
    else {
        None
    }
}

fn verify_media_keys_error(keys: &str) -> Option<&'static str> {
    let keys = split_media_keys(keys);

    if keys.len() > MAX_MEDIA_PER_REPORT {
        Some("Too many media attachments")
    }
    else if keys.iter().any(|k| {
        k.find("..").is_some() || k.contains('/') || k.contains('\\') || k.len() > 256
    }) {
        Some("Invalid media key")
    }
    else {
        None
    }
}

fn split_media_keys(keys: &str) -> Vec<&str> {
    keys.split(',')
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .collect()
}


#[derive(FromForm)]
pub struct ReportForm {
    captcha: String,
    description: String,
    latitude: f64,
    longitude: f64,
    emergency: bool,
    address: Option<String>,
    category: Option<String>,
    anonymous_id: Option<String>,
    media_keys: Option<String>,
}

impl ReportForm {
    fn verify_error(&self) -> Option<&'static str> {
        if self.description.trim().is_empty() {
            Some("A description of the incident is required")
        }
        else if self.description.len() >= 65536 {
            Some("The maximum length of the description is 65536")
        }
        else if let Some(err) = verify_coords_error(self.latitude, self.longitude) {
            Some(err)
        }
        else if self.address.as_ref().map_or(false, |a| a.len() >= 1024) {
            Some("The maximum length of the address is 1024")
        }
        else if self.category.as_ref().map_or(false, |c| c.len() > 64) {
            Some("The maximum length of the category is 64")
        }
        else if self.anonymous_id.as_ref().map_or(false, |id| id.len() > 64) {
            Some("Invalid anonymous id")
        }
        else if let Some(err) = self.media_keys.as_ref()
            .and_then(|keys| verify_media_keys_error(keys)) {
            Some(err)
        }
        else {
            None
        }
    }
}


#[derive(FromForm)]
pub struct SosForm {
    latitude: f64,
    longitude: f64,
    address: Option<String>,
    anonymous_id: Option<String>,
}


#[derive(FromForm)]
pub struct StatusForm {
    id: String,
    status: ReportStatus,
}


pub fn init_report_sys(store: Arc<MemoryStore>, scheduler: &mut JobRunnerBuilder) {
    fs::create_dir_all(Path::new(crate::STATIC_DIR).join(MEDIA_PUBLIC_DIR))
        .and(fs::create_dir_all(Path::new(MEDIA_UPLOAD_DIR)))
        .expect("Initial directory creation failed");

    update_report_map(build_report_map(&store));

    scheduler.add_job(Job::new(move || {
        update_report_map(build_report_map(&store));
    }, Duration::new(REPORT_MAP_REFRESH, 0)));
}

fn build_report_map(store: &MemoryStore) -> String {
    let cutoff = util::now_millis() - REPORT_MAP_WINDOW * 1000;

    let part_jsons = store.reports_since(cutoff).iter()
        .map(|r| {
            json!({
                "id": r.id,
                "latitude": r.latitude,
                "longitude": r.longitude,
                "timestamp": r.timestamp,
                "status": r.status.as_str(),
                "emergency": r.emergency,
                "category": r.display_category(),
            })
        })
        .collect::<Vec<_>>();

    json!({
        "reports": part_jsons,
        "size": part_jsons.len(),
    }).to_string()
}

fn update_report_map(data: String) {
    *REPORT_MAP_CACHE.write().unwrap() = data;
}

fn report_json(r: &Report) -> serde_json::Value {
    json!({
        "id": r.id,
        "description": r.description,
        "latitude": r.latitude,
        "longitude": r.longitude,
        "address": r.address,
        "timestamp": r.timestamp,
        "media_urls": r.media_urls,
        "status": r.status.as_str(),
        "emergency": r.emergency,
        "category": r.category,
    })
}

fn admin_report_json(r: &Report) -> serde_json::Value {
    let mut val = report_json(r);
    val["anonymous_id"] = json!(r.anonymous_id);
    val
}


#[get("/report?<id>")]
pub fn get_report(id: String, store: State<Arc<MemoryStore>>) -> JsonResult {
    match store.get_report(&id) {
        Ok(r) => make_json_result(report_json(&r).to_string()),
        Err(err) => make_json_error(err.to_string()),
    }
}

#[get("/report-map")]
pub fn get_report_map() -> Json<String> {
    Json(REPORT_MAP_CACHE.read().unwrap().clone())
}

#[get("/reports-near?<lat>&<lng>&<radius>")]
pub fn get_reports_near(lat: f64, lng: f64, radius: f64,
    store: State<Arc<MemoryStore>>) -> JsonResult {

    if let Some(err) = verify_coords_error(lat, lng) {
        return make_json_error(err.to_string());
    }

    if !radius.is_finite() || radius < 0.0 {
        return make_json_error("Radius must be a non-negative number".into());
    }

    let part_jsons = store.reports_within(lat, lng, radius).iter()
        .map(report_json)
        .collect::<Vec<_>>();

    make_json_result(json!({
        "reports": part_jsons,
        "size": part_jsons.len(),
    }).to_string())
}

#[post("/report", format="application/x-www-form-urlencoded", data="<form>")]
pub fn post_report(form: Option<Form<ReportForm>>, cookies: Cookies,
    store: State<Arc<MemoryStore>>) -> StringResult {

    let form = match form {
        Some(form) => form,
        None => return make_string_error("Invalid form".into()),
    };

    if let Some(err) = form.verify_error() {
        return make_string_error(err.to_string());
    }

    if !verify_and_remove_captcha(cookies, &form.captcha) {
        return make_string_error("Wrong captcha".into());
    }

    let media_urls = match &form.media_keys {
        Some(keys) => {
            match publish_staged_media(keys) {
                Ok(urls) if urls.is_empty() => None,
                Ok(urls) => Some(urls),
                Err(err) => return make_string_error(err),
            }
        },
        None => None,
    };

    let report = store.insert_report(NewReport {
        description: form.description.clone(),
        latitude: form.latitude,
        longitude: form.longitude,
        address: form.address.clone(),
        media_urls,
        emergency: form.emergency,
        category: form.category.clone(),
        anonymous_id: form.anonymous_id.clone(),
    });

    update_report_map(build_report_map(store.inner()));

    if report.emergency {
        warn!("Emergency report {} at ({}, {})",
            report.id, report.latitude, report.longitude);
    }
    else {
        info!("New report {}", report.id);
    }

    make_string_result(report.id)
}

// No captcha on the SOS path.
#[post("/sos", format="application/x-www-form-urlencoded", data="<form>")]
pub fn post_sos(form: Option<Form<SosForm>>, store: State<Arc<MemoryStore>>)
    -> StringResult {

    let form = match form {
        Some(form) => form,
        None => return make_string_error("Invalid form".into()),
    };

    if let Some(err) = verify_coords_error(form.latitude, form.longitude) {
        return make_string_error(err.to_string());
    }

    let report = store.insert_report(NewReport {
        description: SOS_DESCRIPTION.into(),
        latitude: form.latitude,
        longitude: form.longitude,
        address: form.address.clone(),
        media_urls: None,
        emergency: true,
        category: Some(SOS_CATEGORY.into()),
        anonymous_id: form.anonymous_id.clone(),
    });

    update_report_map(build_report_map(store.inner()));

    warn!("Emergency SOS {} at ({}, {})",
        report.id, report.latitude, report.longitude);

    make_string_result(report.id)
}

/// Moves uploaded staging files into the public static tree and returns
/// their public paths, in the order the keys were given.
fn publish_staged_media(keys: &str) -> Result<Vec<String>, String> {
    let mut urls = Vec::new();

    for key in split_media_keys(keys) {
        let uploaded_file = Path::new(MEDIA_UPLOAD_DIR).join(key);

        if !uploaded_file.exists() {
            return Err("No uploaded media found".into());
        }

        let public_file = Path::new(MEDIA_PUBLIC_DIR).join(key);
        let move_result = fs::copy(&uploaded_file,
                Path::new(crate::STATIC_DIR).join(&public_file))
            .and(fs::remove_file(&uploaded_file));

        if let Err(err) = move_result {
            return Err(err.to_string());
        }

        match public_file.to_str() {
            Some(path) => urls.push(path.into()),
            None => return Err("Invalid public path".into()),
        }
    }

    Ok(urls)
}

#[post("/upload-media", format="plain", data="<data>")]
pub fn post_upload_media(data: Data) -> StringResult {
    // Read base64 encoded string.
    let mut file_data = data.open().take(MEDIA_UPLOAD_LIMIT as u64 + 1);
    let mut data_uri = String::new();
    let read_result = file_data.read_to_string(&mut data_uri);

    match read_result {
        Ok(bytes) if bytes <= MEDIA_UPLOAD_LIMIT => (),
        Ok(_) => return make_string_error("The file is too large".into()),
        Err(err) => return make_string_error(err.to_string()),
    }

    // Get file extension from the data uri.
    let ext_result = data_uri.split(',').nth(0)
        .and_then(|x| x.split('/').nth(1))
        .and_then(|x| x.split(';').nth(0));
    if ext_result.is_none() {
        return make_string_error("Invalid uri".into());
    }
    let ext = ext_result.unwrap();

    // Photos and voice notes only.
    let allowed_exts = &["jpeg", "jpg", "png", "bmp", "webp",
        "webm", "ogg", "mp3", "wav"];
    if !allowed_exts.iter().any(|&x| x == ext) {
        return make_string_error("Invalid extension".into());
    }

    // Decode base64 string to bytes.
    let decode_result = data_uri.split(',').nth(1)
        .ok_or("Invalid uri".to_owned())
        .and_then(|b64| base64::decode(b64).map_err(|err| err.to_string()));
    if let Err(err) = decode_result {
        return make_string_error(err);
    }
    let bytes = decode_result.unwrap();

    // Create unique key and file for the media.
    let (key, mut file) = loop {
        let key = util::generate_rand_id(32) + "." + ext;
        let path = Path::new(MEDIA_UPLOAD_DIR).join(&key);
        let file_result = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path);

        match file_result {
            Ok(file) => break (key, file),
            Err(ref err) if err.kind() == io::ErrorKind::AlreadyExists => continue,
            Err(err) => return make_string_error(err.to_string()),
        }
    };

    // Save bytes to file.
    match file.write_all(&bytes) {
        Ok(_) => make_string_result(key),
        Err(err) => make_string_error(err.to_string()),
    }
}

#[get("/admin/report-list?<q>&<category>&<status>&<emergency>&<range>")]
pub fn get_admin_report_list(q: Option<String>, category: Option<String>,
    status: Option<ReportStatus>, emergency: Option<bool>,
    range: Option<TimeRange>, mut cookies: Cookies,
    store: State<Arc<MemoryStore>>) -> JsonResult {

    if !auth_sys::verify_admin_session(&mut cookies) {
        return make_json_error("Authentication failed!".into());
    }

    let filter = ReportFilter {
        search: q.filter(|s| !s.is_empty()),
        category: category.filter(|c| !c.is_empty()),
        status,
        emergency,
        range: range.unwrap_or_default(),
    };

    let part_jsons = store.filter_reports(&filter).iter()
        .map(admin_report_json)
        .collect::<Vec<_>>();

    make_json_result(json!({
        "reports": part_jsons,
        "size": part_jsons.len(),
    }).to_string())
}

#[post("/admin/report-status", format="application/x-www-form-urlencoded", data="<form>")]
pub fn post_report_status(form: Option<Form<StatusForm>>, mut cookies: Cookies,
    store: State<Arc<MemoryStore>>) -> StringResult {

    if !auth_sys::verify_admin_session(&mut cookies) {
        return make_string_error("Authentication failed!".into());
    }

    let form = match form {
        Some(form) => form,
        None => return make_string_error("Invalid form".into()),
    };

    match store.update_report_status(&form.id, form.status) {
        Ok(updated) => {
            update_report_map(build_report_map(store.inner()));

            info!("Report {} moved to status '{}'", form.id, form.status.as_str());

            make_string_result(if updated { "1".into() } else { "0".into() })
        },
        Err(err) => make_string_error(err.to_string()),
    }
}
