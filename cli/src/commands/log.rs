use anyhow::{Result, bail};
use chrono::Utc;
use serde::Serialize;

use crate::config::Config;
use dietsync_core::models::{Meal, validate_meal_type};

use super::helpers::{print_json, progress_bar};
use super::open_engine;

pub(crate) async fn cmd_log(
    config: &Config,
    name: &str,
    calories: u32,
    meal_type: &str,
    json: bool,
) -> Result<()> {
    if name.trim().is_empty() {
        bail!("Meal name must not be empty");
    }
    let meal_type = validate_meal_type(meal_type)?;

    let (engine, _report) = open_engine(config).await?;
    let meal = Meal::new(name, calories, &meal_type, Utc::now());
    let outcome = engine.log_meal(meal.clone()).await;
    engine.dispose();
    let outcome = outcome?;

    let settings = &outcome.bundle.settings;
    let streak = &outcome.bundle.streak;

    if json {
        #[derive(Serialize)]
        struct Logged<'a> {
            meal: &'a Meal,
            calories_today: u64,
            daily_calorie_goal: u32,
            daily_goal_met: bool,
            current_streak: u32,
            streak_goal: u32,
            goal_achieved: bool,
            goals_achieved: u32,
        }
        return print_json(&Logged {
            meal: &meal,
            calories_today: outcome.total_calories_today,
            daily_calorie_goal: settings.daily_calorie_goal,
            daily_goal_met: outcome.daily_goal_met,
            current_streak: streak.current_streak,
            streak_goal: settings.streak_goal,
            goal_achieved: outcome.goal_achieved,
            goals_achieved: outcome.bundle.goals_achieved,
        });
    }

    println!(
        "Logged {} ({} kcal, {}).",
        meal.name, meal.calories, meal.meal_type
    );
    println!(
        "Today: {} / {} kcal  {}",
        outcome.total_calories_today,
        settings.daily_calorie_goal,
        progress_bar(dietsync_core::rules::progress(
            outcome.total_calories_today,
            settings.daily_calorie_goal
        ))
    );
    if outcome.daily_goal_met {
        println!(
            "Daily goal met! Streak: {} / {} days",
            streak.current_streak, settings.streak_goal
        );
    }
    if outcome.goal_achieved {
        println!(
            "Congratulations! You hit your {}-day streak goal.",
            settings.streak_goal
        );
    }
    Ok(())
}
