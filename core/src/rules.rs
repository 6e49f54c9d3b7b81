//! Streak and goal bookkeeping derived from logged meals.
//!
//! Everything here is pure: callers pass the current instant (in the user's
//! time zone) and get back the new bundle plus what changed.

use chrono::{DateTime, NaiveDate, TimeZone};

use crate::models::{Bundle, Meal, Streak, SyncKey};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MealLogOutcome {
    pub bundle: Bundle,
    /// Calories logged on the current day, including the new meal.
    pub total_calories_today: u64,
    /// The daily calorie goal was crossed by this meal.
    pub daily_goal_met: bool,
    /// The streak goal was reached by this meal; the UI celebrates.
    pub goal_achieved: bool,
    /// Keys whose values differ from the input bundle, in persist order.
    pub changed: Vec<SyncKey>,
}

/// Sum of calories for meals falling on `date` in `tz`.
pub fn calories_on<Tz: TimeZone>(meals: &[Meal], date: NaiveDate, tz: &Tz) -> u64 {
    meals
        .iter()
        .filter(|m| m.date_in(tz) == date)
        .map(|m| u64::from(m.calories))
        .sum()
}

/// Append `meal` and advance the streak if today's total crosses the daily goal.
pub fn apply_meal_log<Tz: TimeZone>(
    mut bundle: Bundle,
    meal: Meal,
    now: &DateTime<Tz>,
) -> MealLogOutcome {
    let tz = now.timezone();
    let today = now.date_naive();

    bundle.meals.push(meal);
    let mut changed = vec![SyncKey::Meals];

    let total_calories_today = calories_on(&bundle.meals, today, &tz);
    let goal = u64::from(bundle.settings.daily_calorie_goal);

    let mut daily_goal_met = false;
    let mut goal_achieved = false;

    if total_calories_today >= goal && bundle.streak.last_log_date != Some(today) {
        advance_streak(&mut bundle.streak, today);
        daily_goal_met = true;
        changed.push(SyncKey::Streak);

        if bundle.streak.current_streak == bundle.settings.streak_goal {
            bundle.goals_achieved = bundle.goals_achieved.saturating_add(1);
            goal_achieved = true;
            changed.push(SyncKey::GoalsAchieved);
        }
    }

    MealLogOutcome {
        bundle,
        total_calories_today,
        daily_goal_met,
        goal_achieved,
        changed,
    }
}

fn advance_streak(streak: &mut Streak, today: NaiveDate) {
    let continues = today
        .pred_opt()
        .is_some_and(|yesterday| streak.last_log_date == Some(yesterday));

    streak.current_streak = if continues {
        streak.current_streak.saturating_add(1)
    } else {
        1
    };
    streak.longest_streak = streak.longest_streak.max(streak.current_streak);
    streak.last_log_date = Some(today);
}

/// Streak as it should be displayed on `today`: a streak whose last goal day
/// is older than yesterday has lapsed.
pub fn effective_streak(streak: &Streak, today: NaiveDate) -> u32 {
    match streak.last_log_date {
        Some(d) if d == today || today.pred_opt() == Some(d) => streak.current_streak,
        _ => 0,
    }
}

/// Fraction of `goal` reached, clamped to `[0, 1]`.
#[allow(clippy::cast_precision_loss)]
pub fn progress(current: u64, goal: u32) -> f64 {
    if goal == 0 {
        return 1.0;
    }
    (current as f64 / f64::from(goal)).min(1.0)
}
