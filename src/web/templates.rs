//! Page rendering collaborator.
//!
//! Pages are embedded HTML shells with `{{name}}` placeholders. Values are
//! HTML-escaped on substitution; `{{&name}}` placeholders take pre-built
//! markup (footer, nav). No logic lives in the templates themselves.

use axum::response::Html;
use rust_embed::RustEmbed;

use crate::db::ExtraNote;
use crate::web::error::WebError;

#[derive(RustEmbed)]
#[folder = "pages/"]
struct Pages;

pub struct Page {
    name: &'static str,
    vars: Vec<(String, String)>,
    raw_vars: Vec<(String, String)>,
}

impl Page {
    #[must_use]
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            vars: Vec::new(),
            raw_vars: Vec::new(),
        }
    }

    /// HTML-escaped on render. Quotes are escaped too, since placeholders
    /// sit inside attribute values as well as element text.
    #[must_use]
    pub fn var(mut self, key: &str, value: impl Into<String>) -> Self {
        self.vars.push((key.to_string(), value.into()));
        self
    }

    /// Inserted verbatim; callers must only pass markup they built from
    /// escaped pieces.
    #[must_use]
    pub fn raw(mut self, key: &str, value: impl Into<String>) -> Self {
        self.raw_vars.push((key.to_string(), value.into()));
        self
    }

    pub fn render(self) -> Result<Html<String>, WebError> {
        let file = Pages::get(self.name)
            .ok_or_else(|| WebError::internal(format!("Missing page template: {}", self.name)))?;
        let mut html = String::from_utf8(file.data.into_owned())
            .map_err(|e| WebError::internal(format!("Page template not UTF-8: {e}")))?;

        for (key, value) in &self.vars {
            let escaped = html_escape::encode_quoted_attribute(value);
            html = html.replace(&format!("{{{{{key}}}}}"), &escaped);
        }
        for (key, value) in &self.raw_vars {
            html = html.replace(&format!("{{{{&{key}}}}}"), value);
        }

        Ok(Html(html))
    }
}

/// Footer link strip from the extra notes: names joined by a middle dot,
/// each linking to /note?id=.
#[must_use]
pub fn footer_html(notes: &[ExtraNote]) -> String {
    let mut out = String::new();
    for (i, note) in notes.iter().enumerate() {
        if i > 0 {
            out.push_str(" &middot; ");
        }
        out.push_str(&format!(
            "<a href=\"/note?id={}\">{}</a>",
            note.id,
            html_escape::encode_text(&note.name)
        ));
    }
    out
}

/// Top-right nav: the bound username, or a login link that returns to the
/// current page.
#[must_use]
pub fn usernav_html(user_name: Option<&str>, current_url: &str) -> String {
    match user_name {
        Some(name) => format!(
            "<a href=\"/changepass\">{}</a> &middot; <a href=\"/logout\">Logout</a>",
            html_escape::encode_text(name)
        ),
        None => format!(
            "<a href=\"/login?next={}\">Login</a>",
            urlencoding::encode(current_url)
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vars_are_escaped() {
        let html = Page::new("login.html")
            .var("forum_name", "<b>Evil</b>")
            .var("title", "Login")
            .var("header_msg", "")
            .var("msg", "")
            .var("csrf", "tok")
            .var("next", "/")
            .raw("usernav", "")
            .raw("footer", "")
            .render()
            .unwrap();

        assert!(html.0.contains("&lt;b&gt;Evil&lt;/b&gt;"));
        assert!(!html.0.contains("<b>Evil</b>"));
        assert!(html.0.contains("name=\"csrf\" value=\"tok\""));
    }

    #[test]
    fn vars_cannot_break_out_of_attributes() {
        // A quote in a substituted value must not terminate the enclosing
        // attribute and smuggle in new ones.
        let html = Page::new("login.html")
            .var("forum_name", "Forum")
            .var("title", "Login")
            .var("msg", "")
            .var("csrf", "tok")
            .var("next", r#"/" autofocus onfocus="alert(1)"#)
            .raw("usernav", "")
            .raw("footer", "")
            .render()
            .unwrap();

        assert!(!html.0.contains(r#"onfocus="alert(1)"#));
        assert!(html.0.contains("&quot;"));
    }

    #[test]
    fn footer_joins_notes() {
        let note = |id: i32, name: &str| ExtraNote {
            id,
            name: name.to_string(),
            url: String::new(),
            content: String::new(),
            created_at: String::new(),
            updated_at: String::new(),
        };

        let html = footer_html(&[note(1, "About"), note(2, "Terms & Co")]);
        assert!(html.contains("/note?id=1"));
        assert!(html.contains("&middot;"));
        assert!(html.contains("Terms &amp; Co"));
    }

    #[test]
    fn usernav_escapes_and_encodes() {
        let html = usernav_html(None, "/g/rust?x=1");
        assert!(html.contains("/login?next=%2Fg%2Frust%3Fx%3D1"));

        let html = usernav_html(Some("bob_99"), "/");
        assert!(html.contains("bob_99"));
        assert!(html.contains("/logout"));
    }
}
