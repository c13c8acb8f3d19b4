//! Tracing subscriber setup.
//!
//! Log verbosity is controlled with the standard `RUST_LOG` variable and defaults to `info`,
//! e.g. `RUST_LOG=authd=debug,tower_http=debug` to see request spans and SQL errors.
//!
//! With `telemetry.telegram.enabled`, every ERROR event is also posted to a Telegram chat
//! through the Bot API. Delivery is fire-and-forget: a failed send is logged as a warning and
//! never retried.

use std::fmt::Write as _;

use serde::Serialize;
use tracing::{Event, Level, Subscriber, field::Field, info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;
use url::Url;

use crate::config::{TelegramConfig, TelemetryConfig};

/// Only the end of a long message is forwarded, where the error usually is.
pub const TELEGRAM_TAIL_CHARS: usize = 500;

/// Targets whose errors come from the HTTP client doing the forwarding.
const SKIPPED_TARGETS: &[&str] = &["reqwest", "hyper", "h2", "rustls"];

/// Install the global subscriber: `RUST_LOG` filtering, a console fmt layer and, when
/// configured, Telegram forwarding of errors.
pub fn init_telemetry(config: &TelemetryConfig) -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let telegram = TelegramLayer::new(&config.telegram)?;
    let telegram_enabled = telegram.is_some();

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .with(telegram)
        .try_init()?;

    info!(telegram = telegram_enabled, "Telemetry initialized");
    Ok(())
}

#[derive(Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: String,
    parse_mode: &'static str,
}

/// Forwards ERROR events to a Telegram chat.
pub struct TelegramLayer {
    client: reqwest::Client,
    endpoint: Url,
    chat_id: String,
}

impl TelegramLayer {
    /// Build the layer, or `None` when forwarding is disabled.
    pub fn new(config: &TelegramConfig) -> anyhow::Result<Option<Self>> {
        if !config.enabled {
            return Ok(None);
        }

        let (Some(token), Some(chat_id)) = (config.bot_token.as_deref(), config.chat_id.as_deref()) else {
            anyhow::bail!("telemetry.telegram needs bot_token and chat_id when enabled");
        };

        let mut endpoint = config.api_url.clone();
        endpoint
            .path_segments_mut()
            .map_err(|_| anyhow::anyhow!("telemetry.telegram.api_url must be an http(s) URL"))?
            .pop_if_empty()
            .push(&format!("bot{token}"))
            .push("sendMessage");

        let client = reqwest::Client::builder().timeout(config.timeout).build()?;

        Ok(Some(Self {
            client,
            endpoint,
            chat_id: chat_id.to_string(),
        }))
    }
}

impl<S: Subscriber> Layer<S> for TelegramLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();
        if *metadata.level() != Level::ERROR || SKIPPED_TARGETS.iter().any(|t| metadata.target().starts_with(t)) {
            return;
        }

        // Events emitted outside a runtime (e.g. from a blocking thread at shutdown) are dropped
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return;
        };

        let mut visitor = EventVisitor::default();
        event.record(&mut visitor);

        let body = SendMessage {
            chat_id: &self.chat_id,
            text: format_alert(metadata.target(), &visitor.into_line()),
            parse_mode: "HTML",
        };
        let request = self.client.post(self.endpoint.clone()).json(&body);

        runtime.spawn(async move {
            if let Err(e) = request.send().await.and_then(|r| r.error_for_status()) {
                // The URL carries the bot token
                warn!("Failed to forward error to Telegram: {}", e.without_url());
            }
        });
    }
}

/// Collects the message and the remaining fields of an event into one line.
#[derive(Default)]
struct EventVisitor {
    message: String,
    fields: String,
}

impl EventVisitor {
    fn into_line(self) -> String {
        if self.fields.is_empty() {
            self.message
        } else {
            format!("{}{}", self.message, self.fields)
        }
    }
}

impl tracing::field::Visit for EventVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{value:?}");
        } else {
            let _ = write!(self.fields, " {}={:?}", field.name(), value);
        }
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_string();
        } else {
            let _ = write!(self.fields, " {}={}", field.name(), value);
        }
    }
}

/// The last `max_chars` characters of `text`.
fn tail(text: &str, max_chars: usize) -> &str {
    match text.char_indices().rev().nth(max_chars.saturating_sub(1)) {
        Some((start, _)) if max_chars > 0 => &text[start..],
        Some(_) => "",
        None => text,
    }
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

/// Telegram HTML message for one error line.
pub fn format_alert(target: &str, line: &str) -> String {
    let full = format!("{target}: {line}");
    format!(
        "<b>Something went wrong!</b>\n- - - - -\n<code>{}</code>",
        escape_html(tail(&full, TELEGRAM_TAIL_CHARS))
    )
}
