use std::{
    sync::Mutex,
    collections::HashMap,
    time::{Instant, Duration},
};
use rocket::{
    http::{Cookie, Cookies, ContentType},
    response::Content,
};
use captcha::{self, Difficulty};

use crate::util;


lazy_static! {
    static ref ANSWER_MAP: Mutex<HashMap<String, CaptchaAnswer>> = {
        Mutex::new(HashMap::new())
    };
}

const CAPTCHA_COOKIE: &'static str = "captcha_id";
const MAX_MAP_SIZE: usize = 512;
const VALID_CAPTCHA_DURATION: u64 = 60 * 5;


struct CaptchaAnswer {
    answer: String,
    created_time: Instant,
}

impl CaptchaAnswer {
    fn new(answer: String) -> Self {
        CaptchaAnswer {
            answer,
            created_time: Instant::now(),
        }
    }

    fn is_expired(&self) -> bool {
        self.created_time.elapsed() > Duration::new(VALID_CAPTCHA_DURATION, 0)
    }
}


pub fn verify_and_remove_captcha(mut cookies: Cookies, user_answer: &str) -> bool {
    if let Some(cookie) = cookies.get_private(CAPTCHA_COOKIE) {
        let mut map = ANSWER_MAP.lock().unwrap();
        let opt_answer = map.remove(cookie.value());

        cookies.remove_private(cookie);

        match opt_answer {
            Some(answer) => !answer.is_expired() && answer.answer == user_answer,
            None => false,
        }
    }
    else {
        false
    }
}


#[get("/captcha")]
pub fn get_captcha(mut cookies: Cookies) -> Content<Vec<u8>> {
    let (answer, img_bytes) = captcha::gen(Difficulty::Medium)
        .as_tuple()
        .unwrap();

    let captcha_id = loop {
        let id = util::generate_rand_id(32);
        let mut map = ANSWER_MAP.lock().unwrap();

        if !map.contains_key(&id) {
            map.insert(id.clone(), CaptchaAnswer::new(answer));

            // Drop expired answers once the map gets big.
            if map.len() > MAX_MAP_SIZE {
                map.retain(|_, v| !v.is_expired());
            }

            break id;
        }
    };

    cookies.add_private(Cookie::new(CAPTCHA_COOKIE, captcha_id));

    Content(ContentType::PNG, img_bytes)
}

#[get("/test-captcha?<answer>")]
pub fn test_captcha(answer: String, cookies: Cookies) -> &'static str {
    if verify_and_remove_captcha(cookies, &answer) {
        "Success!"
    }
    else {
        "Fail!"
    }
}
