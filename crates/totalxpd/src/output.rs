//! Outbound JSON lines on stdout.
//!
//! Logs go to stderr so stdout carries nothing but these records.

use serde::Serialize;
use std::io::Write;
use totalxp_core::{BarDisplay, BarFrame, RewardHost};
use tracing::error;
use uuid::Uuid;

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Outbound<'a> {
    Command {
        command: &'a str,
    },
    Broadcast {
        message: &'a str,
    },
    BarRender {
        player: Uuid,
        title: &'a str,
        progress: f64,
        color: String,
        style: String,
    },
    BarRemove {
        player: Uuid,
    },
    Reply {
        #[serde(skip_serializing_if = "Option::is_none")]
        to: Option<Uuid>,
        message: &'a str,
    },
}

/// Write one record as a single line
pub fn emit(record: &Outbound<'_>) {
    let mut out = std::io::stdout().lock();
    let written = serde_json::to_writer(&mut out, record)
        .map_err(std::io::Error::from)
        .and_then(|_| out.write_all(b"\n"))
        .and_then(|_| out.flush());
    if let Err(e) = written {
        error!("Failed to write to stdout: {}", e);
    }
}

/// Host collaborator that turns engine calls into stdout records
#[derive(Debug, Default, Clone, Copy)]
pub struct StdoutHost;

impl RewardHost for StdoutHost {
    fn dispatch_command(&self, command: &str) {
        emit(&Outbound::Command { command });
    }

    fn broadcast(&self, message: &str) {
        emit(&Outbound::Broadcast { message });
    }
}

impl BarDisplay for StdoutHost {
    fn render(&self, player: Uuid, frame: &BarFrame) {
        emit(&Outbound::BarRender {
            player,
            title: &frame.title,
            progress: frame.progress,
            color: frame.color.to_string(),
            style: frame.style.to_string(),
        });
    }

    fn remove(&self, player: Uuid) {
        emit(&Outbound::BarRemove { player });
    }
}
