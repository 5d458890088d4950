//! Delivery of accepted listings to a Telegram chat.

use crate::config::NotifierConfig;
use crate::models::ListingRecord;
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

// ── Notifier trait ────────────────────────────────────────────────────────────

/// Push channel. Photo mode when `photo_url` is given, text otherwise.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, caption: &str, photo_url: Option<&str>) -> Result<()>;
}

// ── Caption ───────────────────────────────────────────────────────────────────

pub fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

/// HTML caption for one listing, capped at `limit` characters.
pub fn build_caption(record: &ListingRecord, limit: usize) -> String {
    let seller = if record.seller_name.is_empty() { "—" } else { record.seller_name.as_str() };
    let caption = format!(
        "🏠 <b>{}</b>\n💶 {}\n📍 {}\n👤 {}\n\n<a href=\"{}\">🔗 Pogledaj oglas</a>",
        escape_html(&record.title),
        escape_html(&record.price),
        escape_html(&record.location),
        escape_html(seller),
        escape_html(&record.url),
    );
    truncate_caption(&caption, limit)
}

static TAG: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"<(/?)([a-zA-Z][a-zA-Z0-9]*)[^>]*?(/?)>").expect("valid tag regex")
});

/// Tags opened in `html` and not yet closed, outermost first.
fn open_tags(html: &str) -> Vec<String> {
    let mut stack: Vec<String> = Vec::new();
    for cap in TAG.captures_iter(html) {
        let closing = !cap[1].is_empty();
        let self_closing = !cap[3].is_empty();
        let name = cap[2].to_ascii_lowercase();
        if self_closing {
            continue;
        }
        if closing {
            if let Some(pos) = stack.iter().rposition(|t| *t == name) {
                stack.truncate(pos);
            }
        } else {
            stack.push(name);
        }
    }
    stack
}

/// Cut an HTML caption to at most `limit` characters. Never splits a
/// character, a tag or an entity, and closes whatever tags remain open.
pub fn truncate_caption(caption: &str, limit: usize) -> String {
    if caption.chars().count() <= limit {
        return caption.to_string();
    }

    let mut cut: String = caption.chars().take(limit).collect();
    loop {
        if let Some(lt) = cut.rfind('<') {
            if !cut[lt..].contains('>') {
                cut.truncate(lt);
            }
        }
        if let Some(amp) = cut.rfind('&') {
            if !cut[amp..].contains(';') {
                cut.truncate(amp);
            }
        }

        let closers: String = open_tags(&cut)
            .iter()
            .rev()
            .map(|t| format!("</{}>", t))
            .collect();
        let len = cut.chars().count() + closers.chars().count();
        if len <= limit {
            cut.push_str(&closers);
            return cut;
        }

        let keep = cut.chars().count().saturating_sub(len - limit);
        cut = cut.chars().take(keep).collect();
    }
}

// ── Telegram ──────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct TelegramResponse {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
}

pub struct TelegramNotifier {
    client: reqwest::Client,
    api_base: String,
    token: String,
    chat_id: String,
}

impl TelegramNotifier {
    pub fn new(config: &NotifierConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .build()
            .context("Failed to build Telegram client")?;
        Ok(Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            token: config.telegram_token.clone(),
            chat_id: config.telegram_chat_id.clone(),
        })
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_base, self.token, method)
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn send(&self, caption: &str, photo_url: Option<&str>) -> Result<()> {
        let (method, payload) = match photo_url {
            Some(photo) => (
                "sendPhoto",
                json!({
                    "chat_id": self.chat_id,
                    "photo": photo,
                    "caption": caption,
                    "parse_mode": "HTML",
                }),
            ),
            None => (
                "sendMessage",
                json!({
                    "chat_id": self.chat_id,
                    "text": caption,
                    "parse_mode": "HTML",
                }),
            ),
        };

        debug!("Telegram {}", method);
        let resp = self
            .client
            .post(self.method_url(method))
            .json(&payload)
            .send()
            .await
            .with_context(|| format!("Telegram {} request failed", method))?;

        let status = resp.status();
        let body: Option<TelegramResponse> = resp.json().await.ok();
        match body {
            Some(b) if status.is_success() && b.ok => Ok(()),
            Some(b) => bail!(
                "Telegram {} rejected ({}): {}",
                method,
                status,
                b.description.unwrap_or_default()
            ),
            None => bail!("Telegram {} returned {} with unreadable body", method, status),
        }
    }
}
