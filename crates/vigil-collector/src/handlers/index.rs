use axum::extract::State;
use axum::response::Html;
use std::fmt::Write;

use crate::app_state::AppState;

/// `GET /`: every stored metric as an HTML list.
pub async fn index(State(state): State<AppState>) -> Html<String> {
    let snap = state.store().snapshot();

    let mut out = String::from("<!DOCTYPE html>\n<html><head><title>Metrics</title></head><body>\n<h1>Metrics</h1>\n<ul>\n");
    for (name, v) in &snap.gauges {
        let _ = writeln!(out, "<li><strong>{}</strong>: {} (gauge)</li>", escape(name), v);
    }
    for (name, v) in &snap.counters {
        let _ = writeln!(out, "<li><strong>{}</strong>: {} (counter)</li>", escape(name), v);
    }
    out.push_str("</ul>\n</body></html>\n");
    Html(out)
}

fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}
