//! Outbound collaborators provided by the hosting game server.
//!
//! The core never talks to the host directly; the adapter hands it these
//! handles at construction time.

use uuid::Uuid;

/// Executes reward side effects.
pub trait RewardHost: Send + Sync {
    /// Run a fully formatted command string with administrator rights
    fn dispatch_command(&self, command: &str);

    /// Send a fully formatted message to every online player
    fn broadcast(&self, message: &str);
}

/// One rendered state of a player's progress bar
#[derive(Debug, Clone, PartialEq)]
pub struct BarFrame {
    pub title: String,
    /// Fraction in `0.0..=1.0`
    pub progress: f64,
    pub color: BarColor,
    pub style: BarStyle,
}

/// Draws and removes per-player progress bars.
pub trait BarDisplay: Send + Sync {
    /// Create the bar if absent, otherwise update it in place
    fn render(&self, player: Uuid, frame: &BarFrame);

    /// Remove the bar; must tolerate players without a bar
    fn remove(&self, player: Uuid);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BarColor {
    Pink,
    #[default]
    Blue,
    Red,
    Green,
    Yellow,
    Purple,
    White,
}

impl BarColor {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "PINK" => Some(Self::Pink),
            "BLUE" => Some(Self::Blue),
            "RED" => Some(Self::Red),
            "GREEN" => Some(Self::Green),
            "YELLOW" => Some(Self::Yellow),
            "PURPLE" => Some(Self::Purple),
            "WHITE" => Some(Self::White),
            _ => None,
        }
    }
}

impl std::fmt::Display for BarColor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Pink => "PINK",
            Self::Blue => "BLUE",
            Self::Red => "RED",
            Self::Green => "GREEN",
            Self::Yellow => "YELLOW",
            Self::Purple => "PURPLE",
            Self::White => "WHITE",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BarStyle {
    #[default]
    Solid,
    Segmented6,
    Segmented10,
    Segmented12,
    Segmented20,
}

impl BarStyle {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "SOLID" => Some(Self::Solid),
            "SEGMENTED_6" => Some(Self::Segmented6),
            "SEGMENTED_10" => Some(Self::Segmented10),
            "SEGMENTED_12" => Some(Self::Segmented12),
            "SEGMENTED_20" => Some(Self::Segmented20),
            _ => None,
        }
    }
}

impl std::fmt::Display for BarStyle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Solid => "SOLID",
            Self::Segmented6 => "SEGMENTED_6",
            Self::Segmented10 => "SEGMENTED_10",
            Self::Segmented12 => "SEGMENTED_12",
            Self::Segmented20 => "SEGMENTED_20",
        };
        write!(f, "{}", name)
    }
}
