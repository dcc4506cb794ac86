//! Console input: decisions, settings and taps typed on stdin.
//!
//! ```text
//! accept <offer-id>
//! decline <offer-id>
//! set <jobs|chat|orders|sound|vibration> <on|off>
//! tap <notification-id>
//! status
//! ```

use std::io::BufRead;

use tasker_core::events::{DecisionInput, OfferId};
use tasker_core::notifications::Navigator;
use tasker_core::session::SessionHandle;
use tasker_sdk::config::NotificationSettings;
use tasker_sdk::objects::RoutingData;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};
use uuid::Uuid;

const USAGE: &str = "commands: accept <offer-id> | decline <offer-id> | \
                     set <jobs|chat|orders|sound|vibration> <on|off> | \
                     tap <notification-id> | status";

/// Notification setting addressed by `set`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingKey {
    Jobs,
    Chat,
    Orders,
    Sound,
    Vibration,
}

impl SettingKey {
    fn parse(word: &str) -> Option<Self> {
        match word {
            "jobs" => Some(SettingKey::Jobs),
            "chat" => Some(SettingKey::Chat),
            "orders" => Some(SettingKey::Orders),
            "sound" => Some(SettingKey::Sound),
            "vibration" => Some(SettingKey::Vibration),
            _ => None,
        }
    }

    fn apply(self, settings: &mut NotificationSettings, on: bool) {
        let field = match self {
            SettingKey::Jobs => &mut settings.job_alerts,
            SettingKey::Chat => &mut settings.chat_messages,
            SettingKey::Orders => &mut settings.order_updates,
            SettingKey::Sound => &mut settings.sound,
            SettingKey::Vibration => &mut settings.vibration,
        };
        *field = on;
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Decide(DecisionInput),
    Set { key: SettingKey, on: bool },
    Tap(Uuid),
    Status,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("unknown command `{0}`")]
    Unknown(String),

    #[error("usage: {0}")]
    Usage(&'static str),

    #[error("invalid notification id `{0}`")]
    InvalidNotificationId(String),
}

impl Command {
    /// Parse one console line. Blank lines yield `Ok(None)`.
    pub fn parse(line: &str) -> Result<Option<Self>, CommandError> {
        let words: Vec<&str> = line.split_whitespace().collect();
        let command = match words.as_slice() {
            [] => return Ok(None),
            ["accept", id] => Command::Decide(DecisionInput::Accept(OfferId::from(*id))),
            ["decline", id] => Command::Decide(DecisionInput::Decline(OfferId::from(*id))),
            ["accept" | "decline", ..] => return Err(CommandError::Usage("accept|decline <offer-id>")),
            ["set", key, value] => {
                let key = SettingKey::parse(key).ok_or(CommandError::Usage(
                    "set <jobs|chat|orders|sound|vibration> <on|off>",
                ))?;
                let on = match *value {
                    "on" => true,
                    "off" => false,
                    _ => return Err(CommandError::Usage("set <setting> <on|off>")),
                };
                Command::Set { key, on }
            }
            ["set", ..] => {
                return Err(CommandError::Usage(
                    "set <jobs|chat|orders|sound|vibration> <on|off>",
                ));
            }
            ["tap", id] => Command::Tap(
                Uuid::parse_str(id).map_err(|_| CommandError::InvalidNotificationId(id.to_string()))?,
            ),
            ["tap", ..] => return Err(CommandError::Usage("tap <notification-id>")),
            ["status"] => Command::Status,
            [other, ..] => return Err(CommandError::Unknown(other.to_string())),
        };
        Ok(Some(command))
    }
}

/// Navigator for a headless agent: logs where a tap would lead.
pub struct LogNavigator;

impl Navigator for LogNavigator {
    fn navigate(&self, data: &RoutingData) {
        info!(target_kind = %data.kind, fields = ?data.fields, "Navigate to notification target");
    }
}

/// Read stdin on a dedicated thread so a pending read never holds up
/// runtime shutdown.
fn spawn_stdin_reader() -> mpsc::Receiver<String> {
    let (line_tx, line_rx) = mpsc::channel(16);
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            if line_tx.blocking_send(line).is_err() {
                break;
            }
        }
    });
    line_rx
}

/// Run the console until shutdown or end of input.
pub async fn run(handle: SessionHandle, mut shutdown_rx: watch::Receiver<bool>) {
    let mut lines = spawn_stdin_reader();
    info!("{USAGE}");

    loop {
        tokio::select! {
            biased;

            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    break;
                }
            }

            line = lines.recv() => {
                let Some(line) = line else {
                    debug!("Console input closed");
                    break;
                };
                match Command::parse(&line) {
                    Ok(Some(command)) => execute(&handle, command).await,
                    Ok(None) => {}
                    Err(e) => warn!("{e}"),
                }
            }
        }
    }
}

async fn execute(handle: &SessionHandle, command: Command) {
    match command {
        Command::Decide(input) => {
            if !handle.decide(input).await {
                warn!("Session is not running, decision dropped");
            }
        }
        Command::Set { key, on } => match handle.update_settings(|settings| key.apply(settings, on)) {
            Ok(settings) => info!(?settings, "Notification settings saved"),
            Err(e) => warn!(error = %e, "Failed to save notification settings"),
        },
        Command::Tap(notification_id) => {
            if !handle.tap(notification_id) {
                warn!(%notification_id, "No tappable notification with this id");
            }
        }
        Command::Status => {
            let connection = handle.connection();
            let offer = handle.offer();
            info!(
                connection = ?connection.state,
                reconnect_attempt = connection.attempt,
                offer_state = %offer.state,
                active_offer = ?offer.active,
                settings = ?handle.settings(),
                "Status"
            );
        }
    }
}
