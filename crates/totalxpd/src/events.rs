//! Inbound host events and the operator command surface.

use crate::output::{emit, Outbound};
use serde::Deserialize;
use std::path::PathBuf;
use totalxp_core::{parse_amount, AdminError, PlayerXp, ProgressionEngine, TotalXpConfig};
use tracing::{debug, error, warn};
use uuid::Uuid;

/// One line of stdin
#[derive(Debug, Deserialize, PartialEq)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum HostEvent {
    /// Pre-login: start loading in the background
    Connecting { id: Uuid, name: String },
    Join { id: Uuid, name: String },
    Quit { id: Uuid },
    Xp { id: Uuid, amount: i64 },
    /// `/totalxp` invocation; permission checks stay with the host
    Command {
        #[serde(default)]
        sender: Option<Uuid>,
        #[serde(default)]
        args: Vec<String>,
    },
}

/// Parsed `/totalxp` arguments
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdminCommand {
    Get(String),
    Set(String, String),
    Reset(String),
    Reload,
    BarShow(Option<String>),
    BarHide(Option<String>),
    Usage,
}

impl AdminCommand {
    pub fn parse(args: &[String]) -> Self {
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        match args.as_slice() {
            [sub, player] if sub.eq_ignore_ascii_case("get") => Self::Get(player.to_string()),
            [sub, player, amount] if sub.eq_ignore_ascii_case("set") => {
                Self::Set(player.to_string(), amount.to_string())
            }
            [sub, player] if sub.eq_ignore_ascii_case("reset") => Self::Reset(player.to_string()),
            [sub] if sub.eq_ignore_ascii_case("reload") => Self::Reload,
            [sub, action, rest @ ..] if sub.eq_ignore_ascii_case("bar") && rest.len() <= 1 => {
                let target = rest.first().map(|s| s.to_string());
                if action.eq_ignore_ascii_case("show") {
                    Self::BarShow(target)
                } else if action.eq_ignore_ascii_case("hide") {
                    Self::BarHide(target)
                } else {
                    Self::Usage
                }
            }
            _ => Self::Usage,
        }
    }
}

const USAGE: &str =
    "&eUsage: /totalxp <get <player> | set <player> <amount> | reset <player> | reload | bar <show|hide> [player]>";

/// Routes events into the engine, one at a time
pub struct Dispatcher {
    engine: ProgressionEngine,
    config_path: PathBuf,
}

impl Dispatcher {
    pub fn new(engine: ProgressionEngine, config_path: PathBuf) -> Self {
        Self {
            engine,
            config_path,
        }
    }

    pub fn engine_mut(&mut self) -> &mut ProgressionEngine {
        &mut self.engine
    }

    /// Parse and apply one stdin line
    pub async fn handle_line(&mut self, line: &str) {
        let line = line.trim();
        if line.is_empty() {
            return;
        }
        match serde_json::from_str::<HostEvent>(line) {
            Ok(event) => self.handle(event).await,
            Err(e) => warn!("Ignoring malformed event {:?}: {}", line, e),
        }
    }

    pub async fn handle(&mut self, event: HostEvent) {
        match event {
            HostEvent::Connecting { id, name } => {
                // Completes on its own; a disconnect in the meantime discards it
                let _ = self.engine.player_connecting(id, &name);
            }
            HostEvent::Join { id, name } => self.engine.player_joined(id, &name).await,
            HostEvent::Quit { id } => {
                let _ = self.engine.player_disconnected(id);
            }
            HostEvent::Xp { id, amount } => {
                let fired = self.engine.report_xp_gain(id, amount).await;
                if !fired.is_empty() {
                    debug!("Fired rewards {:?} for {}", fired, id);
                }
            }
            HostEvent::Command { sender, args } => {
                let command = AdminCommand::parse(&args);
                let reply = self.run_command(sender, command).await;
                self.reply(sender, &reply);
            }
        }
    }

    async fn run_command(&mut self, sender: Option<Uuid>, command: AdminCommand) -> String {
        let result = match command {
            AdminCommand::Get(target) => self
                .engine
                .lookup_xp(&target)
                .await
                .map(|p| self.player_reply("xp-view", &p, p.xp)),
            AdminCommand::Set(target, amount) => match parse_amount(&amount) {
                Ok(amount) => self
                    .engine
                    .set_xp(&target, amount)
                    .await
                    .map(|p| self.player_reply("xp-set", &p, p.xp)),
                Err(e) => Err(e),
            },
            AdminCommand::Reset(target) => self
                .engine
                .reset_xp(&target)
                .await
                .map(|p| self.player_reply("xp-reset", &p, 0)),
            AdminCommand::Reload => Ok(self.reload().await),
            AdminCommand::BarShow(target) => match self.bar_target(sender, target).await {
                Ok(id) => self
                    .engine
                    .show_indicator(id)
                    .map(|_| self.engine.messages().reply("bar-shown")),
                Err(e) => Err(e),
            },
            AdminCommand::BarHide(target) => match self.bar_target(sender, target).await {
                Ok(id) => self
                    .engine
                    .hide_indicator(id)
                    .map(|_| self.engine.messages().reply("bar-hidden")),
                Err(e) => Err(e),
            },
            AdminCommand::Usage => Ok(USAGE.to_string()),
        };

        result.unwrap_or_else(|e| self.engine.messages().reply(e.message_key()))
    }

    /// `bar` acts on the sender unless a player is named
    async fn bar_target(
        &self,
        sender: Option<Uuid>,
        target: Option<String>,
    ) -> Result<Uuid, AdminError> {
        match (target, sender) {
            (Some(target), _) => self.engine.resolve_player(&target).await.map(|p| p.id),
            (None, Some(id)) => Ok(id),
            (None, None) => Err(AdminError::NotOnline("console".to_string())),
        }
    }

    async fn reload(&mut self) -> String {
        let config = match TotalXpConfig::load(&self.config_path) {
            Ok(config) => config,
            Err(e) => {
                error!("Failed to reload {}: {}", self.config_path.display(), e);
                return format!("&cReload failed: {}", e);
            }
        };
        self.engine.reload(&config).await;
        self.engine.messages().reply("reload-done")
    }

    fn player_reply(&self, key: &str, player: &PlayerXp, amount: u64) -> String {
        let name = if player.name.is_empty() {
            player.id.to_string()
        } else {
            player.name.clone()
        };
        self.engine
            .messages()
            .reply(key)
            .replace("%player%", &name)
            .replace("%xp%", &player.xp.to_string())
            .replace("%amount%", &amount.to_string())
    }

    fn reply(&self, to: Option<Uuid>, text: &str) {
        if text.is_empty() {
            return;
        }
        let message = format!("{}{}", self.engine.messages().prefix, text);
        emit(&Outbound::Reply {
            to,
            message: &message,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_commands() {
        assert_eq!(
            AdminCommand::parse(&args(&["get", "Steve"])),
            AdminCommand::Get("Steve".to_string())
        );
        assert_eq!(
            AdminCommand::parse(&args(&["SET", "Steve", "10"])),
            AdminCommand::Set("Steve".to_string(), "10".to_string())
        );
        assert_eq!(AdminCommand::parse(&args(&["reload"])), AdminCommand::Reload);
        assert_eq!(
            AdminCommand::parse(&args(&["bar", "hide"])),
            AdminCommand::BarHide(None)
        );
        assert_eq!(
            AdminCommand::parse(&args(&["bar", "show", "Alex"])),
            AdminCommand::BarShow(Some("Alex".to_string()))
        );
        assert_eq!(AdminCommand::parse(&args(&["bar", "flip"])), AdminCommand::Usage);
        assert_eq!(AdminCommand::parse(&args(&[])), AdminCommand::Usage);
    }

    #[test]
    fn test_parse_events() {
        let id = Uuid::new_v4();
        let line = format!(r#"{{"event":"xp","id":"{}","amount":-3}}"#, id);
        assert_eq!(
            serde_json::from_str::<HostEvent>(&line).unwrap(),
            HostEvent::Xp { id, amount: -3 }
        );

        let command: HostEvent =
            serde_json::from_str(r#"{"event":"command","args":["reload"]}"#).unwrap();
        assert_eq!(
            command,
            HostEvent::Command {
                sender: None,
                args: vec!["reload".to_string()],
            }
        );
    }
}
