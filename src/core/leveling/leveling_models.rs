// Leveling domain models.
//
// Plain data with serde derives so every store can persist them as-is.
// No Discord types in here, only ids (u64) and strings.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Label shown wherever a member has no tier role.
pub const NO_TIER_LABEL: &str = "No level roles";

/// Description used when an admin adds a tier without one.
pub const DEFAULT_TIER_DESCRIPTION: &str = "No description";

pub const DEFAULT_LEVEL_UP_MESSAGE: &str = "Congratulations {mention}, you're now level {level}.";
pub const DEFAULT_ROLE_CHANGE_MESSAGE: &str = " Your new role is {newrole}.";

// ============================================================================
// GUILD CONFIGURATION
// ============================================================================

/// A role that is automatically granted once a member reaches `level`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleTier {
    pub role_id: u64,
    pub role_name: String,
    pub level: u32,
    pub description: String,
}

/// Per-guild leveling settings.
///
/// Written only through `LevelingService::update_config` and the tier/ignore
/// helpers, which validate before saving. The engine treats it as read-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GuildConfig {
    /// Goal of a brand new member (XP needed to reach level 1).
    pub xp_goal_base: u64,
    pub xp_gain_factor: f64,
    pub xp_min: u64,
    pub xp_max: u64,
    pub cooldown_secs: u64,
    pub leaderboard_max: usize,
    pub make_announcements: bool,
    pub active: bool,
    pub level_up_message: String,
    pub role_change_message: String,
    /// Sorted ascending by level; role ids and levels are unique.
    pub role_tiers: Vec<RoleTier>,
    pub ignored_channels: Vec<u64>,
    pub ignored_roles: Vec<u64>,
    pub ignored_members: Vec<u64>,
}

impl Default for GuildConfig {
    fn default() -> Self {
        Self {
            xp_goal_base: 100,
            xp_gain_factor: 0.1,
            xp_min: 15,
            xp_max: 25,
            cooldown_secs: 60,
            leaderboard_max: 20,
            make_announcements: true,
            active: true,
            level_up_message: DEFAULT_LEVEL_UP_MESSAGE.to_string(),
            role_change_message: DEFAULT_ROLE_CHANGE_MESSAGE.to_string(),
            role_tiers: Vec::new(),
            ignored_channels: Vec::new(),
            ignored_roles: Vec::new(),
            ignored_members: Vec::new(),
        }
    }
}

impl GuildConfig {
    /// Tier a brand new member starts with.
    pub fn starting_tier(&self) -> Option<&RoleTier> {
        self.role_tiers.iter().find(|t| t.level == 0)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }

    /// Check the invariants admin commands must never break.
    pub fn validate(&self) -> Result<(), String> {
        if self.xp_min > self.xp_max {
            return Err(format!(
                "minimum XP ({}) can't be higher than maximum XP ({})",
                self.xp_min, self.xp_max
            ));
        }
        if self.cooldown_secs == 0 {
            return Err("cooldown must be at least 1 second".to_string());
        }
        if !self.xp_gain_factor.is_finite() || self.xp_gain_factor < 0.0 {
            return Err("gain factor must be a non-negative number".to_string());
        }
        if self.xp_goal_base == 0 {
            return Err("goal base must be at least 1".to_string());
        }
        if self.leaderboard_max == 0 {
            return Err("leaderboard max must be at least 1".to_string());
        }
        for pair in self.role_tiers.windows(2) {
            if pair[0].level >= pair[1].level {
                return Err("role tiers must have unique, ascending levels".to_string());
            }
        }
        Ok(())
    }

    /// Qualifying-message filter. Everything the engine assumes was already
    /// checked by its caller lives here.
    pub fn accepts_message(&self, meta: &MessageMeta<'_>, prefix: &str) -> bool {
        if meta.author_is_bot || !self.active {
            return false;
        }
        if self.ignored_channels.contains(&meta.channel_id)
            || self.ignored_members.contains(&meta.author_id)
            || meta.role_ids.iter().any(|r| self.ignored_roles.contains(r))
        {
            return false;
        }
        prefix.is_empty() || !meta.content.starts_with(prefix)
    }
}

/// The bits of an incoming message the filter needs.
#[derive(Debug, Clone)]
pub struct MessageMeta<'a> {
    pub author_id: u64,
    pub author_is_bot: bool,
    pub channel_id: u64,
    pub role_ids: &'a [u64],
    pub content: &'a str,
}

// ============================================================================
// CONFIG UPDATES
// ============================================================================

/// One admin edit of a guild setting.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigUpdate {
    GoalBase(u64),
    GainFactor(f64),
    MinXp(u64),
    MaxXp(u64),
    Cooldown(u64),
    LeaderboardMax(usize),
    Announce(bool),
    Active(bool),
    LevelMessage(String),
    RoleMessage(String),
}

impl ConfigUpdate {
    /// Setting names accepted by `parse`, in display order.
    pub const KEYS: [&'static str; 10] = [
        "goal",
        "gainfactor",
        "minxp",
        "maxxp",
        "cooldown",
        "leaderboard_max",
        "announce",
        "active",
        "lvlmessage",
        "rolemessage",
    ];

    /// Parse a `key value` pair typed by an admin.
    ///
    /// Message templates accept `none` to disable the message.
    pub fn parse(key: &str, value: &str) -> Result<Self, String> {
        let value = value.trim();
        let bad = |what: &str| format!("`{value}` is not a valid {what} for `{key}`");

        match key.to_ascii_lowercase().as_str() {
            "goal" => value.parse().map(Self::GoalBase).map_err(|_| bad("integer")),
            "gainfactor" | "gf" => value
                .parse()
                .map(Self::GainFactor)
                .map_err(|_| bad("number")),
            "minxp" => value.parse().map(Self::MinXp).map_err(|_| bad("integer")),
            "maxxp" => value.parse().map(Self::MaxXp).map_err(|_| bad("integer")),
            "cooldown" | "cd" => value.parse().map(Self::Cooldown).map_err(|_| bad("integer")),
            "leaderboard_max" | "lb_max" => value
                .parse()
                .map(Self::LeaderboardMax)
                .map_err(|_| bad("integer")),
            "announce" => parse_bool(value).map(Self::Announce).ok_or_else(|| bad("boolean")),
            "active" => parse_bool(value).map(Self::Active).ok_or_else(|| bad("boolean")),
            "lvlmessage" => Ok(Self::LevelMessage(template_value(value))),
            "rolemessage" => Ok(Self::RoleMessage(template_value(value))),
            _ => Err(format!(
                "unknown setting `{key}`; expected one of: {}",
                Self::KEYS.join(", ")
            )),
        }
    }

    pub fn apply(&self, config: &mut GuildConfig) {
        match self {
            Self::GoalBase(v) => config.xp_goal_base = *v,
            Self::GainFactor(v) => config.xp_gain_factor = *v,
            Self::MinXp(v) => config.xp_min = *v,
            Self::MaxXp(v) => config.xp_max = *v,
            Self::Cooldown(v) => config.cooldown_secs = *v,
            Self::LeaderboardMax(v) => config.leaderboard_max = *v,
            Self::Announce(v) => config.make_announcements = *v,
            Self::Active(v) => config.active = *v,
            Self::LevelMessage(v) => config.level_up_message = v.clone(),
            Self::RoleMessage(v) => config.role_change_message = v.clone(),
        }
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "1" | "enable" | "enabled" => Some(true),
        "false" | "no" | "off" | "0" | "disable" | "disabled" => Some(false),
        _ => None,
    }
}

fn template_value(value: &str) -> String {
    if value.eq_ignore_ascii_case("none") {
        String::new()
    } else {
        value.to_string()
    }
}

// ============================================================================
// MEMBER STATE
// ============================================================================

/// A member's progress in one guild.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberState {
    pub member_id: u64,
    pub username: String,
    /// XP inside the current level, always below `goal` once resolved.
    pub exp: u64,
    pub level: u32,
    pub goal: u64,
    pub last_trigger: Option<DateTime<Utc>>,
    /// Current tier role name, `None` when no tier applies.
    pub role_name: Option<String>,
    pub message_count: u64,
    pub xp_message_count: u64,
}

impl MemberState {
    /// A member with no progress yet, already holding the guild's level 0
    /// tier if it has one.
    pub fn new(member_id: u64, username: impl Into<String>, config: &GuildConfig) -> Self {
        Self {
            member_id,
            username: username.into(),
            exp: 0,
            level: 0,
            goal: config.xp_goal_base.max(1),
            last_trigger: None,
            role_name: config.starting_tier().map(|t| t.role_name.clone()),
            message_count: 0,
            xp_message_count: 0,
        }
    }

    pub fn role_label(&self) -> &str {
        self.role_name.as_deref().unwrap_or(NO_TIER_LABEL)
    }

    /// XP still missing before the next level.
    pub fn xp_needed(&self) -> u64 {
        self.goal.saturating_sub(self.exp)
    }
}

// ============================================================================
// ENGINE OUTPUTS
// ============================================================================

/// The member's tier changed; the Discord layer should swap roles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TierChange {
    pub previous: Option<String>,
    pub current: Option<RoleTier>,
}

impl TierChange {
    pub fn current_name(&self) -> Option<&str> {
        self.current.as_ref().map(|t| t.role_name.as_str())
    }
}

/// A stored member whose tier moved because the tier table changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberTierChange {
    pub member_id: u64,
    pub change: TierChange,
}

/// What one award or grant did to a member.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Progress {
    pub xp_gained: u64,
    pub levels_gained: u32,
    pub tier_change: Option<TierChange>,
}

impl Progress {
    pub fn leveled_up(&self) -> bool {
        self.levels_gained > 0
    }
}

/// Returned by the service when a message moved a member's level or tier,
/// so the Discord layer can swap roles and announce level-ups.
#[derive(Debug, Clone)]
pub struct LevelUpEvent {
    pub guild_id: u64,
    pub member_id: u64,
    pub username: String,
    pub old_level: u32,
    pub new_level: u32,
    pub exp: u64,
    pub goal: u64,
    pub old_role: Option<String>,
    pub new_role: Option<String>,
    pub tier_change: Option<TierChange>,
}

impl LevelUpEvent {
    /// `false` when only the tier changed.
    pub fn leveled_up(&self) -> bool {
        self.new_level > self.old_level
    }
}

/// Result of an admin XP grant or level override.
#[derive(Debug, Clone)]
pub struct AdminChange {
    pub state: MemberState,
    pub levels_gained: u32,
    pub tier_change: Option<TierChange>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta<'a>(content: &'a str, roles: &'a [u64]) -> MessageMeta<'a> {
        MessageMeta {
            author_id: 10,
            author_is_bot: false,
            channel_id: 20,
            role_ids: roles,
            content,
        }
    }

    #[test]
    fn default_config_is_valid() {
        assert!(GuildConfig::default().validate().is_ok());
    }

    #[test]
    fn validate_rejects_inverted_xp_bounds() {
        let config = GuildConfig {
            xp_min: 30,
            xp_max: 10,
            ..GuildConfig::default()
        };
        assert!(config.validate().unwrap_err().contains("minimum XP"));
    }

    #[test]
    fn validate_rejects_zero_cooldown_and_bad_factor() {
        let zero_cd = GuildConfig {
            cooldown_secs: 0,
            ..GuildConfig::default()
        };
        assert!(zero_cd.validate().is_err());

        let nan = GuildConfig {
            xp_gain_factor: f64::NAN,
            ..GuildConfig::default()
        };
        assert!(nan.validate().is_err());

        let negative = GuildConfig {
            xp_gain_factor: -0.5,
            ..GuildConfig::default()
        };
        assert!(negative.validate().is_err());
    }

    #[test]
    fn filter_skips_bots_prefixes_and_ignored_things() {
        let mut config = GuildConfig::default();
        assert!(config.accepts_message(&meta("hello", &[]), "!"));
        assert!(!config.accepts_message(&meta("!lvl", &[]), "!"));

        let mut bot = meta("hello", &[]);
        bot.author_is_bot = true;
        assert!(!config.accepts_message(&bot, "!"));

        config.ignored_roles.push(7);
        assert!(!config.accepts_message(&meta("hello", &[3, 7]), "!"));

        config.ignored_channels.push(20);
        assert!(!config.accepts_message(&meta("hello", &[]), "!"));
    }

    #[test]
    fn filter_respects_active_flag() {
        let config = GuildConfig {
            active: false,
            ..GuildConfig::default()
        };
        assert!(!config.accepts_message(&meta("hello", &[]), "!"));
    }

    #[test]
    fn parse_config_updates() {
        assert_eq!(
            ConfigUpdate::parse("goal", "150"),
            Ok(ConfigUpdate::GoalBase(150))
        );
        assert_eq!(
            ConfigUpdate::parse("gf", "0.25"),
            Ok(ConfigUpdate::GainFactor(0.25))
        );
        assert_eq!(
            ConfigUpdate::parse("announce", "off"),
            Ok(ConfigUpdate::Announce(false))
        );
        assert_eq!(
            ConfigUpdate::parse("lvlmessage", "none"),
            Ok(ConfigUpdate::LevelMessage(String::new()))
        );
        assert!(ConfigUpdate::parse("cooldown", "soon").is_err());
        assert!(ConfigUpdate::parse("colour", "red")
            .unwrap_err()
            .contains("unknown setting"));
    }

    #[test]
    fn new_member_uses_goal_base() {
        let config = GuildConfig {
            xp_goal_base: 80,
            ..GuildConfig::default()
        };
        let state = MemberState::new(1, "ana", &config);
        assert_eq!(state.goal, 80);
        assert_eq!(state.level, 0);
        assert_eq!(state.role_label(), NO_TIER_LABEL);
        assert_eq!(state.xp_needed(), 80);
    }
}
