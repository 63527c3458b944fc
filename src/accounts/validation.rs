use lazy_static::lazy_static;
use regex::Regex;

use crate::error::FieldErrors;

pub const REQUIRED: &str = "This field is required.";

pub const USERNAME_MAX: usize = 150;
pub const EMAIL_MAX: usize = 254;
pub const NAME_MAX: usize = 150;
pub const PHONE_MAX: usize = 20;
pub const NATIONALITY_MAX: usize = 50;
pub const ADDRESS_MAX: usize = 255;
pub const CITY_MAX: usize = 100;
pub const STATE_MAX: usize = 100;
pub const POSTAL_CODE_MAX: usize = 20;
pub const COUNTRY_MAX: usize = 100;
pub const BIO_MAX: usize = 500;
pub const WEBSITE_MAX: usize = 200;
pub const BUSINESS_MAX: usize = 255;

lazy_static! {
    static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    static ref USERNAME_RE: Regex = Regex::new(r"^[\w.@+-]+$").unwrap();
    static ref URL_RE: Regex =
        Regex::new(r"^(?i)https?://[a-z0-9](?:[a-z0-9.-]*[a-z0-9])?(?::\d{1,5})?(?:[/?#]\S*)?$")
            .unwrap();
}

pub fn is_valid_email(email: &str) -> bool {
    EMAIL_RE.is_match(email)
}

pub fn is_valid_username(username: &str) -> bool {
    USERNAME_RE.is_match(username)
}

pub fn is_valid_url(url: &str) -> bool {
    URL_RE.is_match(url)
}

pub fn check_username(errors: &mut FieldErrors, username: &str) {
    if username.is_empty() {
        errors.add("username", REQUIRED);
    } else if username.chars().count() > USERNAME_MAX {
        errors.add("username", too_long(USERNAME_MAX));
    } else if !is_valid_username(username) {
        errors.add(
            "username",
            "Enter a valid username. This value may contain only letters, numbers, and @/./+/-/_ characters.",
        );
    }
}

pub fn check_email(errors: &mut FieldErrors, email: &str) {
    if email.is_empty() {
        errors.add("email", REQUIRED);
    } else if email.chars().count() > EMAIL_MAX {
        errors.add("email", too_long(EMAIL_MAX));
    } else if !is_valid_email(email) {
        errors.add("email", "Enter a valid email address.");
    }
}

pub fn check_max_len(errors: &mut FieldErrors, field: &str, value: &str, max: usize) {
    if value.chars().count() > max {
        errors.add(field, too_long(max));
    }
}

pub fn check_optional_max_len(errors: &mut FieldErrors, field: &str, value: Option<&str>, max: usize) {
    if let Some(v) = value {
        check_max_len(errors, field, v, max);
    }
}

pub fn check_website(errors: &mut FieldErrors, website: Option<&str>) {
    let Some(url) = website else { return };
    if url.chars().count() > WEBSITE_MAX {
        errors.add("website", too_long(WEBSITE_MAX));
    } else if !is_valid_url(url) {
        errors.add("website", "Enter a valid URL.");
    }
}

fn too_long(max: usize) -> String {
    format!("Ensure this field has no more than {max} characters.")
}

/// Turns blank optional text into `None` and trims the rest.
pub fn normalize_optional(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
