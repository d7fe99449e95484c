//! Sign-in email rendering. Pure: no I/O, the same URL always yields the
//! same pair of bodies for a given year.

use askama::Template;
use chrono::Datelike;

use super::MailError;

pub const PRODUCT_NAME: &str = "ResumeTailor";
pub const SIGN_IN_SUBJECT: &str = "Your Sign-In Link for ResumeTailor";
/// How long a magic link stays valid. Stated in both renderings.
pub const LINK_VALID_HOURS: i64 = 24;

const BRAND_COLOR: &str = "#7e22ce";

#[derive(Template)]
#[template(path = "email/sign_in.html")]
struct SignInEmailHtml<'a> {
    url: &'a str,
    product: &'a str,
    brand_color: &'a str,
    valid_hours: i64,
    year: i32,
}

#[derive(Template)]
#[template(path = "email/sign_in.txt")]
struct SignInEmailText<'a> {
    url: &'a str,
    product: &'a str,
    valid_hours: i64,
}

/// Input to the composer.
#[derive(Debug, Clone, Copy)]
pub struct SignInLink<'a> {
    pub url: &'a str,
}

/// Both renderings of the same message.
#[derive(Debug, Clone, PartialEq)]
pub struct ComposedMail {
    pub subject: String,
    pub html: String,
    pub text: String,
}

pub fn compose_sign_in(link: SignInLink<'_>) -> Result<ComposedMail, MailError> {
    let html = SignInEmailHtml {
        url: link.url,
        product: PRODUCT_NAME,
        brand_color: BRAND_COLOR,
        valid_hours: LINK_VALID_HOURS,
        year: chrono::Utc::now().year(),
    }
    .render()?;
    let text = SignInEmailText {
        url: link.url,
        product: PRODUCT_NAME,
        valid_hours: LINK_VALID_HOURS,
    }
    .render()?;

    Ok(ComposedMail {
        subject: SIGN_IN_SUBJECT.to_string(),
        html,
        text,
    })
}
