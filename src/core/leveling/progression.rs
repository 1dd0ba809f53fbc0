// The progression engine: pure XP / level / tier arithmetic.
//
// Nothing here touches storage, Discord or the clock. Callers hand in the
// guild config, the member state, the current time and an RNG, and get back
// a `Progress` describing what changed.

use chrono::{DateTime, Utc};
use rand::Rng;

use super::leveling_models::{GuildConfig, MemberState, Progress, RoleTier, TierChange};

/// XP needed to go from `level` to `level + 1`.
///
/// Polynomial curve: 100, 155, 220, 295, ...
pub fn goal_for_level(level: u32) -> u64 {
    let level = u64::from(level);
    5 * level * level + 50 * level + 100
}

/// Highest tier whose threshold is at or below `level`.
///
/// Doesn't rely on the table being sorted, so a hand-edited store can't make
/// it pick a lower tier.
pub fn resolve_tier(tiers: &[RoleTier], level: u32) -> Option<&RoleTier> {
    tiers
        .iter()
        .filter(|tier| tier.level <= level)
        .max_by_key(|tier| tier.level)
}

/// Whether `now` still falls inside the member's cooldown window.
pub fn on_cooldown(config: &GuildConfig, state: &MemberState, now: DateTime<Utc>) -> bool {
    match state.last_trigger {
        Some(last) => {
            (now - last).num_milliseconds() <= (config.cooldown_secs as i64).saturating_mul(1000)
        }
        None => false,
    }
}

/// Time left before the member can earn message XP again.
pub fn cooldown_remaining(
    config: &GuildConfig,
    state: &MemberState,
    now: DateTime<Utc>,
) -> std::time::Duration {
    let Some(last) = state.last_trigger else {
        return std::time::Duration::ZERO;
    };
    let ready_at = i64::try_from(config.cooldown_secs)
        .ok()
        .and_then(chrono::Duration::try_seconds)
        .and_then(|window| last.checked_add_signed(window));
    match ready_at {
        Some(ready_at) => (ready_at - now).to_std().unwrap_or_default(),
        None => config.cooldown(),
    }
}

/// Roll the XP one message is worth at `level`.
///
/// `base` is uniform in `[xp_min, xp_max]`; the level bonus is
/// `floor(base * gain_factor * level)`.
pub fn roll_message_xp<R: Rng + ?Sized>(config: &GuildConfig, level: u32, rng: &mut R) -> u64 {
    let low = config.xp_min.min(config.xp_max);
    let high = config.xp_min.max(config.xp_max);
    let base = rng.gen_range(low..=high);
    base + level_bonus(base, config.xp_gain_factor, level)
}

fn level_bonus(base: u64, factor: f64, level: u32) -> u64 {
    let bonus = (base as f64 * factor * f64::from(level)).floor();
    if bonus.is_finite() && bonus > 0.0 {
        bonus as u64
    } else {
        0
    }
}

/// Award XP for one qualifying message.
///
/// Returns `None` (state untouched) while the member is on cooldown.
pub fn award_message_xp<R: Rng + ?Sized>(
    config: &GuildConfig,
    state: &mut MemberState,
    now: DateTime<Utc>,
    rng: &mut R,
) -> Option<Progress> {
    if on_cooldown(config, state, now) {
        return None;
    }

    let gained = roll_message_xp(config, state.level, rng);
    state.exp = state.exp.saturating_add(gained);
    state.last_trigger = Some(now);
    state.xp_message_count += 1;

    let levels_gained = resolve_levels(state);
    let tier_change = sync_tier(config, state);

    Some(Progress {
        xp_gained: gained,
        levels_gained,
        tier_change,
    })
}

/// Admin grant: add (or, when negative, remove) XP and resolve level-ups.
///
/// Never lowers the level; a negative grant bottoms out at 0 XP.
pub fn grant_xp(config: &GuildConfig, state: &mut MemberState, amount: i64) -> Progress {
    if amount >= 0 {
        state.exp = state.exp.saturating_add(amount.unsigned_abs());
    } else {
        state.exp = state.exp.saturating_sub(amount.unsigned_abs());
    }

    let levels_gained = resolve_levels(state);
    let tier_change = sync_tier(config, state);

    Progress {
        xp_gained: amount.max(0).unsigned_abs(),
        levels_gained,
        tier_change,
    }
}

/// Force a member to `level` with 0 XP.
pub fn set_level(config: &GuildConfig, state: &mut MemberState, level: u32) -> Option<TierChange> {
    state.level = level;
    state.exp = 0;
    state.goal = goal_for_level(level);
    sync_tier(config, state)
}

/// Spend XP on goals until the member is below the next one.
/// Returns how many levels were gained.
fn resolve_levels(state: &mut MemberState) -> u32 {
    let mut gained = 0;
    while state.exp >= state.goal {
        state.exp -= state.goal;
        state.level += 1;
        state.goal = goal_for_level(state.level);
        gained += 1;
    }
    gained
}

/// Point `role_name` at the tier for the current level.
/// The name is updated here no matter what happens on Discord afterwards.
///
/// Runs after every award and grant, so a member left on an outdated tier
/// by a tier table edit is corrected on their next XP change.
pub fn sync_tier(config: &GuildConfig, state: &mut MemberState) -> Option<TierChange> {
    let tier = resolve_tier(&config.role_tiers, state.level);
    let current_name = tier.map(|t| t.role_name.as_str());
    if current_name == state.role_name.as_deref() {
        return None;
    }

    let change = TierChange {
        previous: state.role_name.take(),
        current: tier.cloned(),
    };
    state.role_name = current_name.map(str::to_string);
    Some(change)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn tier(role_id: u64, name: &str, level: u32) -> RoleTier {
        RoleTier {
            role_id,
            role_name: name.to_string(),
            level,
            description: String::new(),
        }
    }

    fn tiered_config() -> GuildConfig {
        GuildConfig {
            role_tiers: vec![
                tier(1, "Novice", 0),
                tier(2, "Adept", 5),
                tier(3, "Master", 10),
            ],
            ..GuildConfig::default()
        }
    }

    fn fresh(config: &GuildConfig) -> MemberState {
        MemberState::new(42, "tester", config)
    }

    fn rng() -> StdRng {
        StdRng::seed_from_u64(7)
    }

    #[test]
    fn goal_follows_polynomial_and_increases() {
        assert_eq!(goal_for_level(0), 100);
        assert_eq!(goal_for_level(1), 155);
        assert_eq!(goal_for_level(2), 220);
        assert_eq!(goal_for_level(10), 1100);
        for level in 0..500 {
            assert!(goal_for_level(level + 1) > goal_for_level(level));
        }
    }

    #[test]
    fn grant_zero_is_a_no_op() {
        let config = tiered_config();
        let mut state = fresh(&config);
        state.exp = 40;
        let before = state.clone();

        let progress = grant_xp(&config, &mut state, 0);

        assert_eq!(progress.levels_gained, 0);
        assert!(progress.tier_change.is_none());
        assert_eq!(state, before);
    }

    #[test]
    fn grant_exact_remaining_levels_once() {
        let config = GuildConfig::default();
        let mut state = fresh(&config);
        state.exp = 30;

        let progress = grant_xp(&config, &mut state, 70);

        assert_eq!(progress.levels_gained, 1);
        assert_eq!(state.level, 1);
        assert_eq!(state.exp, 0);
        assert_eq!(state.goal, 155);
    }

    #[test]
    fn bulk_grant_cascades_through_goals() {
        let config = GuildConfig::default();
        let mut state = fresh(&config);

        // 100 for level 1, 155 for level 2: 250 lands short of level 2.
        let progress = grant_xp(&config, &mut state, 250);
        assert_eq!(progress.levels_gained, 1);
        assert_eq!(state.level, 1);
        assert_eq!(state.exp, 150);

        let progress = grant_xp(&config, &mut state, 5);
        assert_eq!(progress.levels_gained, 1);
        assert_eq!(state.level, 2);
        assert_eq!(state.exp, 0);
        assert_eq!(state.goal, 220);
    }

    #[test]
    fn large_grant_keeps_exp_below_goal() {
        let config = GuildConfig::default();
        let mut state = fresh(&config);

        let progress = grant_xp(&config, &mut state, 1_000_000);

        assert!(progress.levels_gained > 10);
        assert!(state.exp < state.goal);
        assert_eq!(state.goal, goal_for_level(state.level));
    }

    #[test]
    fn negative_grant_floors_at_zero_without_deleveling() {
        let config = GuildConfig::default();
        let mut state = fresh(&config);
        grant_xp(&config, &mut state, 120);
        assert_eq!((state.level, state.exp), (1, 20));

        let progress = grant_xp(&config, &mut state, -500);

        assert_eq!(progress.levels_gained, 0);
        assert_eq!(progress.xp_gained, 0);
        assert_eq!((state.level, state.exp), (1, 0));
    }

    #[test]
    fn award_rolls_within_bounds_without_bonus() {
        let config = GuildConfig {
            xp_min: 15,
            xp_max: 25,
            xp_gain_factor: 0.0,
            ..GuildConfig::default()
        };
        let mut rng = rng();

        for _ in 0..200 {
            let mut state = fresh(&config);
            let progress = award_message_xp(&config, &mut state, Utc::now(), &mut rng)
                .expect("first message is never on cooldown");
            assert!((15..=25).contains(&state.exp));
            assert_eq!(progress.xp_gained, state.exp);
            assert_eq!(state.xp_message_count, 1);
        }
    }

    #[test]
    fn award_applies_level_scaled_bonus() {
        let config = GuildConfig {
            xp_min: 20,
            xp_max: 20,
            xp_gain_factor: 0.1,
            ..GuildConfig::default()
        };
        let mut state = fresh(&config);
        set_level(&config, &mut state, 5);

        let progress = award_message_xp(&config, &mut state, Utc::now(), &mut rng()).unwrap();

        // 20 + floor(20 * 0.1 * 5)
        assert_eq!(progress.xp_gained, 30);
    }

    #[test]
    fn second_award_inside_cooldown_changes_nothing() {
        let config = GuildConfig {
            cooldown_secs: 60,
            ..GuildConfig::default()
        };
        let mut state = fresh(&config);
        let start = Utc::now();
        let mut rng = rng();

        assert!(award_message_xp(&config, &mut state, start, &mut rng).is_some());
        let after_first = state.clone();

        let again = award_message_xp(&config, &mut state, start + Duration::seconds(60), &mut rng);
        assert!(again.is_none());
        assert_eq!(state, after_first);

        let later = award_message_xp(&config, &mut state, start + Duration::seconds(61), &mut rng);
        assert!(later.is_some());
        assert_eq!(state.xp_message_count, 2);
    }

    #[test]
    fn cooldown_remaining_counts_down() {
        let config = GuildConfig {
            cooldown_secs: 60,
            ..GuildConfig::default()
        };
        let mut state = fresh(&config);
        let start = Utc::now();
        assert_eq!(cooldown_remaining(&config, &state, start), std::time::Duration::ZERO);

        state.last_trigger = Some(start);
        assert_eq!(
            cooldown_remaining(&config, &state, start + Duration::seconds(45)),
            std::time::Duration::from_secs(15)
        );
        assert_eq!(
            cooldown_remaining(&config, &state, start + Duration::seconds(90)),
            std::time::Duration::ZERO
        );
    }

    #[test]
    fn award_can_level_up_and_change_tier() {
        let config = GuildConfig {
            xp_min: 100,
            xp_max: 100,
            xp_gain_factor: 0.0,
            role_tiers: vec![tier(9, "Chatter", 1)],
            ..GuildConfig::default()
        };
        let mut state = fresh(&config);

        let progress = award_message_xp(&config, &mut state, Utc::now(), &mut rng()).unwrap();

        assert!(progress.leveled_up());
        assert_eq!(state.level, 1);
        assert_eq!(state.exp, 0);
        let change = progress.tier_change.expect("tier should change");
        assert_eq!(change.previous, None);
        assert_eq!(change.current_name(), Some("Chatter"));
        assert_eq!(state.role_name.as_deref(), Some("Chatter"));
    }

    #[test]
    fn new_member_starts_on_level_zero_tier() {
        let config = tiered_config();
        let state = fresh(&config);
        assert_eq!(state.level, 0);
        assert_eq!(state.role_name.as_deref(), Some("Novice"));
    }

    #[test]
    fn award_without_level_up_repairs_outdated_tier() {
        let config = tiered_config();
        // Created before the Novice tier existed
        let mut state = fresh(&GuildConfig::default());
        assert_eq!(state.role_name, None);

        let progress = award_message_xp(&config, &mut state, Utc::now(), &mut rng()).unwrap();

        assert!(!progress.leveled_up());
        assert_eq!(state.level, 0);
        let change = progress.tier_change.expect("tier should be picked up");
        assert_eq!(change.previous, None);
        assert_eq!(change.current_name(), Some("Novice"));
        assert_eq!(state.role_name.as_deref(), Some("Novice"));
    }

    #[test]
    fn grant_drops_tier_that_was_removed() {
        let mut config = tiered_config();
        let mut state = fresh(&config);
        set_level(&config, &mut state, 6);
        config.role_tiers.retain(|t| t.role_name != "Adept");

        let progress = grant_xp(&config, &mut state, 10);

        assert_eq!(progress.levels_gained, 0);
        let change = progress.tier_change.expect("Adept no longer exists");
        assert_eq!(change.previous.as_deref(), Some("Adept"));
        assert_eq!(state.role_name.as_deref(), Some("Novice"));
    }

    #[test]
    fn tier_resolution_picks_highest_qualifying() {
        let config = tiered_config();
        assert_eq!(
            resolve_tier(&config.role_tiers, 7).map(|t| t.role_name.as_str()),
            Some("Adept")
        );
        assert_eq!(
            resolve_tier(&config.role_tiers, 10).map(|t| t.role_name.as_str()),
            Some("Master")
        );
        assert!(resolve_tier(&[], 50).is_none());
        assert!(resolve_tier(&[tier(1, "Late", 3)], 2).is_none());
    }

    #[test]
    fn tier_resolution_is_monotonic() {
        let config = tiered_config();
        let threshold = |level| resolve_tier(&config.role_tiers, level).map(|t| t.level);
        for low in 0..20 {
            for high in low..20 {
                assert!(threshold(high) >= threshold(low));
            }
        }
    }

    #[test]
    fn demotion_via_set_level_falls_back_to_lowest_tier() {
        let config = tiered_config();
        let mut state = fresh(&config);

        let change = set_level(&config, &mut state, 7).unwrap();
        assert_eq!(change.current_name(), Some("Adept"));
        assert_eq!(state.goal, goal_for_level(7));

        let change = set_level(&config, &mut state, 2).unwrap();
        assert_eq!(change.previous.as_deref(), Some("Adept"));
        assert_eq!(change.current_name(), Some("Novice"));
        assert_eq!(state.role_name.as_deref(), Some("Novice"));
        assert_eq!(state.exp, 0);
    }

    #[test]
    fn set_level_below_every_tier_clears_role() {
        let config = GuildConfig {
            role_tiers: vec![tier(1, "Regular", 3)],
            ..GuildConfig::default()
        };
        let mut state = fresh(&config);
        set_level(&config, &mut state, 4);

        let change = set_level(&config, &mut state, 1).unwrap();

        assert_eq!(change.previous.as_deref(), Some("Regular"));
        assert!(change.current.is_none());
        assert!(state.role_name.is_none());
    }

    #[test]
    fn set_level_to_same_tier_reports_no_change() {
        let config = tiered_config();
        let mut state = fresh(&config);
        set_level(&config, &mut state, 6);
        assert!(set_level(&config, &mut state, 8).is_none());
    }
}
