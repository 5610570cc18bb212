use std::sync::Arc;

use rocket::{
    response::{
        status::BadRequest,
        content::Json,
    },
    request::Form,
    http::Cookies,
    State,
};
use serde_json::json;

use crate::auth_sys;
use crate::store::MemoryStore;
use crate::store::models::{NewSafetyTip, SafetyTip};


type JsonResult = Result<Json<String>, BadRequest<String>>;
type StringResult = Result<String, BadRequest<String>>;


#[derive(FromForm)]
pub struct TipForm {
    title: String,
    content: String,
    category: String,
}

impl TipForm {
    fn verify_error(&self) -> Option<&'static str> {
        let len_title = self.title.chars().count();

        if len_title < 2 {
            Some("Title must be at least 2 characters")
        }
        else if len_title > 120 {
            Some("Title can not be longer than 120 characters")
        }
        else if self.content.trim().is_empty() {
            Some("Tip content is required")
        }
        else if self.content.len() >= 65536 {
            Some("The maximum length of the content is 65536")
        }
        else if self.category.trim().is_empty() {
            Some("A category is required")
        }
        else if self.category.len() > 64 {
            Some("The maximum length of the category is 64")
        }
        else {
            None
        }
    }
}


fn tip_json(tip: &SafetyTip) -> serde_json::Value {
    json!({
        "id": tip.id,
        "title": tip.title,
        "content": tip.content,
        "category": tip.category,
        "timestamp": tip.timestamp,
    })
}


#[get("/tip?<id>")]
pub fn get_tip(id: String, store: State<Arc<MemoryStore>>) -> JsonResult {
    match store.get_tip(&id) {
        Ok(tip) => Ok(Json(tip_json(&tip).to_string())),
        Err(err) => Err(BadRequest(Some(err.to_string()))),
    }
}

#[get("/tip-list")]
pub fn get_tip_list(store: State<Arc<MemoryStore>>) -> Json<String> {
    let parts = store.tips().iter()
        .map(tip_json)
        .collect::<Vec<_>>();

    Json(json!({
        "tips": parts,
        "size": parts.len(),
    }).to_string())
}

#[post("/admin/tip", format="application/x-www-form-urlencoded", data="<form>")]
pub fn post_tip(form: Option<Form<TipForm>>, mut cookies: Cookies,
    store: State<Arc<MemoryStore>>) -> StringResult {

    if !auth_sys::verify_admin_session(&mut cookies) {
        return Err(BadRequest(Some("Authentication failed!".into())));
    }

    let form = match form {
        Some(form) => form,
        None => return Err(BadRequest(Some("Invalid form".into()))),
    };

    if let Some(err) = form.verify_error() {
        return Err(BadRequest(Some(err.to_string())));
    }

    let tip = store.insert_tip(NewSafetyTip {
        title: form.title.clone(),
        content: form.content.clone(),
        category: form.category.clone(),
    });

    info!("Published safety tip {}", tip.id);

    Ok(tip.id)
}
