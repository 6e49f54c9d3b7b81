use chrono::Local;
use serde::Serialize;
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use dietsync_core::models::Meal;

const BAR_WIDTH: usize = 20;

pub(crate) fn print_meal_table(meals: &[&Meal]) {
    #[derive(Tabled)]
    struct MealRow {
        #[tabled(rename = "Time")]
        time: String,
        #[tabled(rename = "Meal")]
        meal_type: String,
        #[tabled(rename = "Name")]
        name: String,
        #[tabled(rename = "kcal")]
        calories: u32,
    }

    let rows: Vec<MealRow> = meals
        .iter()
        .map(|m| MealRow {
            time: m.timestamp.with_timezone(&Local).format("%H:%M").to_string(),
            meal_type: m.meal_type.clone(),
            name: truncate(&m.name, 35),
            calories: m.calories,
        })
        .collect();

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(3..)).with(Alignment::right()))
        .to_string();
    println!("{table}");
}

/// `[#######-------------]  35%` for a fraction in `[0, 1]`.
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
pub(crate) fn progress_bar(fraction: f64) -> String {
    let fraction = fraction.clamp(0.0, 1.0);
    let filled = (fraction * BAR_WIDTH as f64).round() as usize;
    let pct = (fraction * 100.0).round() as u32;
    format!(
        "[{}{}] {pct:>3}%",
        "#".repeat(filled),
        "-".repeat(BAR_WIDTH - filled)
    )
}

pub(crate) fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub(crate) fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let end = s.char_indices().nth(max - 3).map_or(s.len(), |(i, _)| i);
        format!("{}...", &s[..end])
    }
}
