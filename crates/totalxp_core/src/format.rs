//! Placeholder substitution for reward commands, broadcasts and bar titles.
//!
//! Supported placeholders: `%player%`, `%xp%`, `%threshold%`,
//! `%current_rank%`, `%next_rank%`, `%required_xp%`. Colour codes are left
//! untouched for the host to translate.

use crate::ladder::{NextRank, RewardLadder};

/// Values available to a template
#[derive(Debug, Clone, Copy)]
pub struct PlaceholderContext<'a> {
    pub player: &'a str,
    pub xp: u64,
    pub threshold: u64,
    pub ladder: &'a RewardLadder,
}

pub trait Formatter: Send + Sync {
    fn render(&self, template: &str, ctx: &PlaceholderContext<'_>) -> String;
}

/// Plain `%name%` substitution
#[derive(Debug, Clone, Copy, Default)]
pub struct PlaceholderFormatter;

impl Formatter for PlaceholderFormatter {
    fn render(&self, template: &str, ctx: &PlaceholderContext<'_>) -> String {
        if template.is_empty() {
            return String::new();
        }

        let mut text = template.to_string();

        // Rank lookups only when the template asks for them
        if text.contains("%current_rank%") {
            text = text.replace("%current_rank%", ctx.ladder.current_rank(ctx.xp).name());
        }

        if text.contains("%next_rank%") || text.contains("%required_xp%") {
            let next = ctx.ladder.next_rank(ctx.xp);
            text = text.replace("%next_rank%", next.name());
            let required = match next {
                NextRank::Next { threshold, .. } => threshold.to_string(),
                NextRank::MaxRank => "0".to_string(),
            };
            text = text.replace("%required_xp%", &required);
        }

        text.replace("%player%", ctx.player)
            .replace("%xp%", &ctx.xp.to_string())
            .replace("%threshold%", &ctx.threshold.to_string())
    }
}
