//! The embedded web UI: a single static page and script, served by the
//! gateway's own HTTP handler. Treated as an external collaborator's
//! concern — kept intentionally minimal.

pub const INDEX_HTML: &str = include_str!("../assets/index.html");
pub const APP_JS: &str = include_str!("../assets/app.js");
