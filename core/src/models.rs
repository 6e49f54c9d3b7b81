use std::fmt;
use std::str::FromStr;

use anyhow::{Result, bail};
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const DEFAULT_DAILY_CALORIE_GOAL: u32 = 2000;
pub const DEFAULT_STREAK_GOAL: u32 = 7;

pub const MEAL_TYPES: &[&str] = &["breakfast", "lunch", "dinner", "snack"];

// Ranges enforced by the onboarding flow.
pub const ONBOARDING_CALORIE_RANGE: std::ops::RangeInclusive<u32> = 1000..=5000;
pub const ONBOARDING_STREAK_RANGE: std::ops::RangeInclusive<u32> = 3..=30;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    #[serde(default)]
    pub nickname: String,
    pub daily_calorie_goal: u32,
    pub streak_goal: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            nickname: String::new(),
            daily_calorie_goal: DEFAULT_DAILY_CALORIE_GOAL,
            streak_goal: DEFAULT_STREAK_GOAL,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Meal {
    pub id: String,
    pub name: String,
    pub calories: u32,
    pub timestamp: DateTime<Utc>,
    #[serde(default = "default_meal_type")]
    pub meal_type: String,
}

fn default_meal_type() -> String {
    "snack".to_string()
}

impl Meal {
    pub fn new(name: &str, calories: u32, meal_type: &str, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.trim().to_string(),
            calories,
            timestamp,
            meal_type: meal_type.to_string(),
        }
    }

    /// Calendar date of the meal as seen from `tz`.
    pub fn date_in<Tz: TimeZone>(&self, tz: &Tz) -> NaiveDate {
        self.timestamp.with_timezone(tz).date_naive()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Streak {
    /// Most recent date the daily calorie goal was met.
    pub last_log_date: Option<NaiveDate>,
    pub current_streak: u32,
    pub longest_streak: u32,
}

/// The keys a user's state is stored under, both remotely and in the local cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SyncKey {
    Settings,
    Meals,
    Streak,
    GoalsAchieved,
}

impl SyncKey {
    pub const ALL: [SyncKey; 4] = [
        SyncKey::Settings,
        SyncKey::Meals,
        SyncKey::Streak,
        SyncKey::GoalsAchieved,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SyncKey::Settings => "settings",
            SyncKey::Meals => "meals",
            SyncKey::Streak => "streak",
            SyncKey::GoalsAchieved => "goalsAchieved",
        }
    }

    /// Local cache key: `<field>_<userId>`.
    pub fn cache_key(self, user_id: &str) -> String {
        format!("{}_{user_id}", self.as_str())
    }
}

impl fmt::Display for SyncKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncKey {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        SyncKey::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| {
                let known: Vec<&str> = SyncKey::ALL.iter().map(|k| k.as_str()).collect();
                anyhow::anyhow!("Unknown key '{s}'. Must be one of: {}", known.join(", "))
            })
    }
}

/// A typed value for one [`SyncKey`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncValue {
    Settings(Settings),
    Meals(Vec<Meal>),
    Streak(Streak),
    GoalsAchieved(u32),
}

impl SyncValue {
    pub fn key(&self) -> SyncKey {
        match self {
            SyncValue::Settings(_) => SyncKey::Settings,
            SyncValue::Meals(_) => SyncKey::Meals,
            SyncValue::Streak(_) => SyncKey::Streak,
            SyncValue::GoalsAchieved(_) => SyncKey::GoalsAchieved,
        }
    }

    pub fn default_for(key: SyncKey) -> Self {
        match key {
            SyncKey::Settings => SyncValue::Settings(Settings::default()),
            SyncKey::Meals => SyncValue::Meals(Vec::new()),
            SyncKey::Streak => SyncValue::Streak(Streak::default()),
            SyncKey::GoalsAchieved => SyncValue::GoalsAchieved(0),
        }
    }

    pub fn to_json(&self) -> serde_json::Result<serde_json::Value> {
        match self {
            SyncValue::Settings(v) => serde_json::to_value(v),
            SyncValue::Meals(v) => serde_json::to_value(v),
            SyncValue::Streak(v) => serde_json::to_value(v),
            SyncValue::GoalsAchieved(v) => serde_json::to_value(v),
        }
    }

    pub fn from_json(key: SyncKey, value: serde_json::Value) -> serde_json::Result<Self> {
        Ok(match key {
            SyncKey::Settings => SyncValue::Settings(serde_json::from_value(value)?),
            SyncKey::Meals => SyncValue::Meals(serde_json::from_value(value)?),
            SyncKey::Streak => SyncValue::Streak(serde_json::from_value(value)?),
            SyncKey::GoalsAchieved => SyncValue::GoalsAchieved(serde_json::from_value(value)?),
        })
    }
}

/// Everything the app knows about one user: the unit of in-memory state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bundle {
    pub settings: Settings,
    pub meals: Vec<Meal>,
    pub streak: Streak,
    pub goals_achieved: u32,
}

impl Bundle {
    pub fn get(&self, key: SyncKey) -> SyncValue {
        match key {
            SyncKey::Settings => SyncValue::Settings(self.settings.clone()),
            SyncKey::Meals => SyncValue::Meals(self.meals.clone()),
            SyncKey::Streak => SyncValue::Streak(self.streak.clone()),
            SyncKey::GoalsAchieved => SyncValue::GoalsAchieved(self.goals_achieved),
        }
    }

    pub fn set(&mut self, value: SyncValue) {
        match value {
            SyncValue::Settings(v) => self.settings = v,
            SyncValue::Meals(v) => self.meals = v,
            SyncValue::Streak(v) => self.streak = v,
            SyncValue::GoalsAchieved(v) => self.goals_achieved = v,
        }
    }
}

/// A bearer token issued to a user, as listed by the server. The token itself
/// is only shown once, when issued.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserToken {
    pub user_id: String,
    pub token_hint: String,
    pub created_at: String,
}

// --- Validation ---

pub fn validate_meal_type(meal: &str) -> Result<String> {
    let lower = meal.to_lowercase();
    if MEAL_TYPES.contains(&lower.as_str()) {
        Ok(lower)
    } else {
        bail!(
            "Invalid meal type '{meal}'. Must be one of: {}",
            MEAL_TYPES.join(", ")
        )
    }
}

pub fn validate_settings(settings: &Settings) -> Result<()> {
    if settings.daily_calorie_goal == 0 {
        bail!("dailyCalorieGoal must be greater than 0");
    }
    if settings.streak_goal == 0 {
        bail!("streakGoal must be greater than 0");
    }
    Ok(())
}

/// Stricter checks applied when a user first sets up their profile.
pub fn validate_onboarding(settings: &Settings) -> Result<()> {
    if settings.nickname.trim().is_empty() {
        bail!("Nickname must not be empty");
    }
    if !ONBOARDING_CALORIE_RANGE.contains(&settings.daily_calorie_goal) {
        bail!(
            "Daily calorie goal must be between {} and {} (got {})",
            ONBOARDING_CALORIE_RANGE.start(),
            ONBOARDING_CALORIE_RANGE.end(),
            settings.daily_calorie_goal
        );
    }
    if !ONBOARDING_STREAK_RANGE.contains(&settings.streak_goal) {
        bail!(
            "Streak goal must be between {} and {} days (got {})",
            ONBOARDING_STREAK_RANGE.start(),
            ONBOARDING_STREAK_RANGE.end(),
            settings.streak_goal
        );
    }
    Ok(())
}

pub fn validate_meal(meal: &Meal) -> Result<()> {
    if meal.name.trim().is_empty() {
        bail!("Meal name must not be empty");
    }
    validate_meal_type(&meal.meal_type)?;
    Ok(())
}

pub fn validate_streak(streak: &Streak) -> Result<()> {
    if streak.current_streak > streak.longest_streak {
        bail!(
            "currentStreak ({}) must not exceed longestStreak ({})",
            streak.current_streak,
            streak.longest_streak
        );
    }
    Ok(())
}

pub fn validate_value(value: &SyncValue) -> Result<()> {
    match value {
        SyncValue::Settings(s) => validate_settings(s),
        SyncValue::Meals(meals) => meals.iter().try_for_each(validate_meal),
        SyncValue::Streak(s) => validate_streak(s),
        SyncValue::GoalsAchieved(_) => Ok(()),
    }
}
