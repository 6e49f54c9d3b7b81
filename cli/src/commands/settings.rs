use anyhow::{Result, bail};

use crate::config::Config;
use dietsync_core::models::{Settings, SyncValue, validate_onboarding, validate_settings};

use super::helpers::print_json;
use super::open_engine;

fn print_settings(settings: &Settings) {
    let nickname = if settings.nickname.is_empty() {
        "(not set)"
    } else {
        settings.nickname.as_str()
    };
    println!("Nickname:           {nickname}");
    println!("Daily calorie goal: {} kcal", settings.daily_calorie_goal);
    println!("Streak goal:        {} days", settings.streak_goal);
}

/// Apply the given overrides to `current`.
fn apply_changes(
    current: &Settings,
    nickname: Option<String>,
    calories: Option<u32>,
    streak_goal: Option<u32>,
) -> Settings {
    let mut next = current.clone();
    if let Some(nickname) = nickname {
        next.nickname = nickname.trim().to_string();
    }
    if let Some(calories) = calories {
        next.daily_calorie_goal = calories;
    }
    if let Some(streak_goal) = streak_goal {
        next.streak_goal = streak_goal;
    }
    next
}

pub(crate) async fn cmd_settings_show(config: &Config, json: bool) -> Result<()> {
    let (engine, _report) = open_engine(config).await?;
    let settings = engine.bundle().settings;
    engine.dispose();

    if json {
        return print_json(&settings);
    }
    print_settings(&settings);
    Ok(())
}

pub(crate) async fn cmd_settings_set(
    config: &Config,
    nickname: Option<String>,
    calories: Option<u32>,
    streak_goal: Option<u32>,
    json: bool,
) -> Result<()> {
    if nickname.is_none() && calories.is_none() && streak_goal.is_none() {
        bail!("Nothing to change. Pass --nickname, --calories or --streak-goal");
    }

    let (engine, _report) = open_engine(config).await?;
    let next = apply_changes(&engine.bundle().settings, nickname, calories, streak_goal);
    validate_settings(&next)?;

    let result = engine.update(SyncValue::Settings(next.clone())).await;
    engine.dispose();
    result?;

    if json {
        return print_json(&next);
    }
    println!("Settings saved.");
    print_settings(&next);
    Ok(())
}

/// First-run setup: nickname and goals, with tighter bounds than `settings set`.
pub(crate) async fn cmd_onboard(
    config: &Config,
    nickname: &str,
    calories: u32,
    streak_goal: u32,
    json: bool,
) -> Result<()> {
    let next = Settings {
        nickname: nickname.trim().to_string(),
        daily_calorie_goal: calories,
        streak_goal,
    };
    validate_onboarding(&next)?;

    let (engine, _report) = open_engine(config).await?;
    let result = engine.update(SyncValue::Settings(next.clone())).await;
    engine.dispose();
    result?;

    if json {
        return print_json(&next);
    }
    println!(
        "Welcome, {}! Aim for {} kcal a day, {} days in a row.",
        next.nickname, next.daily_calorie_goal, next.streak_goal
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_changes_only_touches_given_fields() {
        let current = Settings {
            nickname: "Al".to_string(),
            daily_calorie_goal: 2000,
            streak_goal: 7,
        };
        let next = apply_changes(&current, None, Some(1800), None);
        assert_eq!(next.nickname, "Al");
        assert_eq!(next.daily_calorie_goal, 1800);
        assert_eq!(next.streak_goal, 7);

        let next = apply_changes(&current, Some("  Bea ".to_string()), None, Some(3));
        assert_eq!(next.nickname, "Bea");
        assert_eq!(next.streak_goal, 3);
    }
}
