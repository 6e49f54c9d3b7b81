use anyhow::Result;
use chrono::{DateTime, Local, NaiveDate, TimeZone};
use serde::Serialize;

use crate::config::Config;
use dietsync_core::models::{Bundle, Meal};
use dietsync_core::rules::{calories_on, effective_streak, progress};

use super::helpers::{print_json, print_meal_table, progress_bar};
use super::open_engine;

/// What the home screen shows for one day.
#[derive(Debug, Serialize)]
pub(super) struct DaySummary {
    pub nickname: String,
    pub date: NaiveDate,
    pub calories_today: u64,
    pub daily_calorie_goal: u32,
    pub progress: f64,
    pub current_streak: u32,
    pub longest_streak: u32,
    pub streak_goal: u32,
    pub goals_achieved: u32,
    pub meals_today: Vec<Meal>,
}

pub(super) fn summarize<Tz: TimeZone>(bundle: &Bundle, now: &DateTime<Tz>) -> DaySummary {
    let tz = now.timezone();
    let today = now.date_naive();
    let calories_today = calories_on(&bundle.meals, today, &tz);

    let mut meals_today: Vec<Meal> = bundle
        .meals
        .iter()
        .filter(|m| m.date_in(&tz) == today)
        .cloned()
        .collect();
    meals_today.sort_by_key(|m| m.timestamp);

    DaySummary {
        nickname: bundle.settings.nickname.clone(),
        date: today,
        calories_today,
        daily_calorie_goal: bundle.settings.daily_calorie_goal,
        progress: progress(calories_today, bundle.settings.daily_calorie_goal),
        current_streak: effective_streak(&bundle.streak, today),
        longest_streak: bundle.streak.longest_streak,
        streak_goal: bundle.settings.streak_goal,
        goals_achieved: bundle.goals_achieved,
        meals_today,
    }
}

pub(super) fn print_summary(summary: &DaySummary) {
    let name = if summary.nickname.is_empty() {
        "there"
    } else {
        summary.nickname.as_str()
    };
    println!("Hi {name}! === {} ===\n", summary.date);
    println!(
        "  Calories: {} / {} kcal  {}",
        summary.calories_today,
        summary.daily_calorie_goal,
        progress_bar(summary.progress)
    );
    println!(
        "  Streak:   {} / {} days (best {})",
        summary.current_streak, summary.streak_goal, summary.longest_streak
    );
    println!("  Goals achieved: {}", summary.goals_achieved);

    if summary.meals_today.is_empty() {
        println!("\n  No meals logged today");
    } else {
        println!();
        let refs: Vec<&Meal> = summary.meals_today.iter().collect();
        print_meal_table(&refs);
    }
}

pub(crate) async fn cmd_status(config: &Config, json: bool) -> Result<()> {
    let (engine, _report) = open_engine(config).await?;
    let summary = summarize(&engine.bundle(), &Local::now());
    engine.dispose();

    if json {
        return print_json(&summary);
    }
    print_summary(&summary);
    Ok(())
}
