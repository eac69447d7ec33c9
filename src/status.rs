//! Time-relative and ratio-based status derived from stored fields.
//!
//! Everything here is pure: the current date is always passed in, nothing reads
//! the wall clock. Callers recompute on every read instead of caching.
//!
//! Rounding to whole months or percentages is half-up towards positive
//! infinity (`floor(x + 0.5)`), so `-2.5` rounds to `-2` and `2.5` to `3`.

use std::fmt;

use chrono::{Datelike, NaiveDate};
use serde::Serialize;

use crate::model::{Project, ProjectStatus};

/// Warranty month arithmetic uses fixed thirty-day months.
pub const DAYS_PER_WARRANTY_MONTH: f64 = 30.0;
/// Warranties with less than this many months left are flagged.
pub const EXPIRING_SOON_MONTHS: f64 = 3.0;

const FILE_SIZE_UNITS: [&str; 4] = ["Bytes", "KB", "MB", "GB"];

fn round_half_up(value: f64) -> i64 {
    (value + 0.5).floor() as i64
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WarrantySeverity {
    None,
    Expired,
    ExpiringSoon,
    Ok,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WarrantyStatus {
    pub text: String,
    pub severity: WarrantySeverity,
    /// Whole months remaining, or elapsed since expiry for expired warranties.
    pub months: Option<i64>,
}

pub fn warranty_status(expiration: Option<NaiveDate>, today: NaiveDate) -> WarrantyStatus {
    let Some(expiration) = expiration else {
        return WarrantyStatus {
            text: "No warranty".to_string(),
            severity: WarrantySeverity::None,
            months: None,
        };
    };

    let months = (expiration - today).num_days() as f64 / DAYS_PER_WARRANTY_MONTH;
    if months < 0.0 {
        let elapsed = round_half_up(months).abs();
        WarrantyStatus {
            text: format!("Expired {elapsed} months ago"),
            severity: WarrantySeverity::Expired,
            months: Some(elapsed),
        }
    } else if months < EXPIRING_SOON_MONTHS {
        let remaining = round_half_up(months);
        WarrantyStatus {
            text: format!("Expires in {remaining} months"),
            severity: WarrantySeverity::ExpiringSoon,
            months: Some(remaining),
        }
    } else {
        let remaining = round_half_up(months);
        WarrantyStatus {
            text: format!("{remaining} months remaining"),
            severity: WarrantySeverity::Ok,
            months: Some(remaining),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ApplianceAge {
    Unknown,
    Known { years: i32, months: u32 },
}

impl fmt::Display for ApplianceAge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApplianceAge::Unknown => f.write_str("unknown"),
            ApplianceAge::Known { years: 0, months } => write!(f, "{months} months old"),
            ApplianceAge::Known { years, months } => {
                write!(f, "{years} years, {months} months old")
            }
        }
    }
}

/// Age by calendar months; the day of month is ignored. A purchase date in
/// the future reads as brand new.
pub fn appliance_age(purchase: Option<NaiveDate>, today: NaiveDate) -> ApplianceAge {
    let Some(purchase) = purchase else {
        return ApplianceAge::Unknown;
    };
    if purchase > today {
        return ApplianceAge::Known { years: 0, months: 0 };
    }

    let mut years = today.year() - purchase.year();
    let mut months = today.month() as i32 - purchase.month() as i32;
    if months < 0 {
        years -= 1;
        months += 12;
    }
    ApplianceAge::Known {
        years,
        months: months as u32,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BudgetConsumption {
    /// Whole percent, clamped to `0..=100` for progress bars.
    pub percentage: f64,
    /// Not clamped: `true` whenever spending exceeds the budget.
    pub over_budget: bool,
}

pub fn budget_consumption(budget_amount: f64, spent: f64) -> BudgetConsumption {
    let percentage = if budget_amount > 0.0 {
        (round_half_up(spent / budget_amount * 100.0) as f64).clamp(0.0, 100.0)
    } else {
        0.0
    };
    BudgetConsumption {
        percentage,
        over_budget: spent > budget_amount,
    }
}

pub fn project_progress(project: &Project) -> f64 {
    if project.status == ProjectStatus::Completed {
        return 100.0;
    }
    let budget = match project.budget {
        Some(budget) if budget != 0.0 && !budget.is_nan() => budget,
        _ => return 0.0,
    };
    let spent = project.spent.unwrap_or(0.0);
    (spent / budget * 100.0).min(100.0)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MaintenanceUrgency {
    /// Negative once the due date has passed; `None` without a due date.
    pub days_remaining: Option<i64>,
    pub overdue: bool,
}

/// An item due today is not yet overdue.
pub fn maintenance_urgency(due: Option<NaiveDate>, today: NaiveDate) -> MaintenanceUrgency {
    match due {
        None => MaintenanceUrgency {
            days_remaining: None,
            overdue: false,
        },
        Some(due) => {
            let days = (due - today).num_days();
            MaintenanceUrgency {
                days_remaining: Some(days),
                overdue: days < 0,
            }
        }
    }
}

/// Northern-hemisphere season by calendar month.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Season {
    Spring,
    Summer,
    Fall,
    Winter,
}

impl Season {
    pub fn as_str(&self) -> &'static str {
        match self {
            Season::Spring => "Spring",
            Season::Summer => "Summer",
            Season::Fall => "Fall",
            Season::Winter => "Winter",
        }
    }
}

impl fmt::Display for Season {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// March to May is spring, June to August summer, September to November
/// fall; December to February is winter.
pub fn current_season(today: NaiveDate) -> Season {
    match today.month() {
        3..=5 => Season::Spring,
        6..=8 => Season::Summer,
        9..=11 => Season::Fall,
        _ => Season::Winter,
    }
}

/// Month-level comparison of total spending against total budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BudgetStatus {
    pub under_budget: bool,
    /// Distance from the budget in whole percent of the budget.
    pub percentage: u32,
}

pub fn monthly_budget_status(total_budget: f64, total_spent: f64) -> BudgetStatus {
    if total_budget > 0.0 {
        let difference = total_budget - total_spent;
        let percentage = round_half_up(difference / total_budget * 100.0).unsigned_abs();
        BudgetStatus {
            under_budget: difference >= 0.0,
            percentage: u32::try_from(percentage).unwrap_or(u32::MAX),
        }
    } else {
        BudgetStatus {
            under_budget: false,
            percentage: 0,
        }
    }
}

/// `1536` becomes `1.5 KB`; 1024-based, capped at gigabytes.
pub fn format_file_size(bytes: u64) -> String {
    if bytes == 0 {
        return "0 Bytes".to_string();
    }
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < FILE_SIZE_UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    let rounded = (value * 100.0).round() / 100.0;
    format!("{} {}", rounded, FILE_SIZE_UNITS[unit])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{PropertyId, RecordId};
    use proptest::prelude::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn project(status: ProjectStatus, budget: Option<f64>, spent: Option<f64>) -> Project {
        Project {
            id: RecordId::new("p"),
            name: "Deck".into(),
            description: None,
            status,
            budget,
            spent,
            start_date: None,
            projected_end_date: None,
            property_id: PropertyId::new("1"),
        }
    }

    #[test]
    fn warranty_without_date_has_no_severity() {
        let status = warranty_status(None, date(2024, 1, 1));
        assert_eq!(status.severity, WarrantySeverity::None);
        assert_eq!(status.months, None);
        assert_eq!(status.text, "No warranty");
    }

    #[test]
    fn warranty_four_years_past_is_expired() {
        let status = warranty_status(Some(date(2020, 1, 1)), date(2024, 1, 1));
        assert_eq!(status.severity, WarrantySeverity::Expired);
        let months = status.months.unwrap();
        assert!((48..=49).contains(&months), "months = {months}");
        assert!(status.text.starts_with("Expired "));
    }

    #[test]
    fn warranty_thresholds() {
        let today = date(2024, 1, 1);
        let soon = warranty_status(Some(date(2024, 2, 15)), today);
        assert_eq!(soon.severity, WarrantySeverity::ExpiringSoon);
        assert_eq!(soon.months, Some(2));
        assert_eq!(soon.text, "Expires in 2 months");

        let ok = warranty_status(Some(date(2025, 1, 1)), today);
        assert_eq!(ok.severity, WarrantySeverity::Ok);
        assert_eq!(ok.months, Some(12));
        assert_eq!(ok.text, "12 months remaining");

        let today_expiry = warranty_status(Some(today), today);
        assert_eq!(today_expiry.severity, WarrantySeverity::ExpiringSoon);
        assert_eq!(today_expiry.months, Some(0));
    }

    #[test]
    fn appliance_age_borrows_a_year_for_negative_months() {
        let today = date(2024, 3, 10);
        assert_eq!(
            appliance_age(Some(date(2021, 11, 2)), today),
            ApplianceAge::Known {
                years: 2,
                months: 4
            }
        );
        assert_eq!(
            appliance_age(Some(date(2023, 6, 1)), today).to_string(),
            "9 months old"
        );
        assert_eq!(
            appliance_age(Some(date(2020, 3, 1)), today).to_string(),
            "4 years, 0 months old"
        );
        assert_eq!(appliance_age(None, today).to_string(), "unknown");
        assert_eq!(
            appliance_age(Some(date(2025, 1, 1)), today),
            ApplianceAge::Known {
                years: 0,
                months: 0
            }
        );
    }

    #[test]
    fn consumption_clamps_percentage_but_not_flag() {
        let over = budget_consumption(100.0, 150.0);
        assert_eq!(over.percentage, 100.0);
        assert!(over.over_budget);

        let exact = budget_consumption(100.0, 100.0);
        assert_eq!(exact.percentage, 100.0);
        assert!(!exact.over_budget);

        let partial = budget_consumption(200.0, 50.0);
        assert_eq!(partial.percentage, 25.0);
        assert!(!partial.over_budget);

        let no_budget = budget_consumption(0.0, 10.0);
        assert_eq!(no_budget.percentage, 0.0);
        assert!(no_budget.over_budget);
    }

    #[test]
    fn completed_projects_are_always_done() {
        assert_eq!(
            project_progress(&project(ProjectStatus::Completed, Some(0.0), None)),
            100.0
        );
        assert_eq!(
            project_progress(&project(ProjectStatus::Completed, None, Some(5.0))),
            100.0
        );
    }

    #[test]
    fn project_progress_follows_spend_ratio() {
        assert_eq!(
            project_progress(&project(ProjectStatus::InProgress, None, Some(10.0))),
            0.0
        );
        assert_eq!(
            project_progress(&project(ProjectStatus::Planning, Some(0.0), Some(10.0))),
            0.0
        );
        assert_eq!(
            project_progress(&project(ProjectStatus::InProgress, Some(200.0), Some(50.0))),
            25.0
        );
        assert_eq!(
            project_progress(&project(ProjectStatus::OnHold, Some(100.0), Some(400.0))),
            100.0
        );
    }

    #[test]
    fn maintenance_urgency_counts_days() {
        let today = date(2024, 5, 10);
        assert_eq!(
            maintenance_urgency(Some(date(2024, 5, 13)), today),
            MaintenanceUrgency {
                days_remaining: Some(3),
                overdue: false
            }
        );
        assert_eq!(
            maintenance_urgency(Some(today), today),
            MaintenanceUrgency {
                days_remaining: Some(0),
                overdue: false
            }
        );
        assert!(maintenance_urgency(Some(date(2024, 5, 1)), today).overdue);
        assert_eq!(
            maintenance_urgency(None, today),
            MaintenanceUrgency {
                days_remaining: None,
                overdue: false
            }
        );
    }

    #[test]
    fn seasons_follow_calendar_quarters_offset_by_a_month() {
        assert_eq!(current_season(date(2024, 2, 29)), Season::Winter);
        assert_eq!(current_season(date(2024, 3, 1)), Season::Spring);
        assert_eq!(current_season(date(2024, 5, 31)), Season::Spring);
        assert_eq!(current_season(date(2024, 6, 1)), Season::Summer);
        assert_eq!(current_season(date(2024, 8, 31)), Season::Summer);
        assert_eq!(current_season(date(2024, 9, 1)), Season::Fall);
        assert_eq!(current_season(date(2024, 11, 30)), Season::Fall);
        assert_eq!(current_season(date(2024, 12, 1)), Season::Winter);
        assert_eq!(current_season(date(2025, 1, 15)).to_string(), "Winter");
    }

    #[test]
    fn monthly_status_reports_distance_from_budget() {
        assert_eq!(
            monthly_budget_status(1000.0, 750.0),
            BudgetStatus {
                under_budget: true,
                percentage: 25
            }
        );
        assert_eq!(
            monthly_budget_status(1000.0, 1200.0),
            BudgetStatus {
                under_budget: false,
                percentage: 20
            }
        );
        assert_eq!(
            monthly_budget_status(0.0, 50.0),
            BudgetStatus {
                under_budget: false,
                percentage: 0
            }
        );
    }

    #[test]
    fn file_sizes_are_humanized() {
        assert_eq!(format_file_size(0), "0 Bytes");
        assert_eq!(format_file_size(500), "500 Bytes");
        assert_eq!(format_file_size(1024), "1 KB");
        assert_eq!(format_file_size(1536), "1.5 KB");
        assert_eq!(format_file_size(5 * 1024 * 1024), "5 MB");
        assert_eq!(format_file_size(3 * 1024 * 1024 * 1024 * 1024), "3072 GB");
    }

    proptest! {
        #[test]
        fn any_past_expiration_is_expired(days_ago in 1i64..20_000, offset in 0i64..40_000) {
            let today = date(1990, 1, 1) + chrono::Duration::days(offset);
            let expiration = today - chrono::Duration::days(days_ago);
            let status = warranty_status(Some(expiration), today);
            prop_assert_eq!(status.severity, WarrantySeverity::Expired);
            prop_assert!(status.text.starts_with("Expired "));
        }

        #[test]
        fn spending_past_the_budget_is_over_budget(
            amount in 0.0f64..1.0e7,
            excess in 0.01f64..1.0e7,
        ) {
            let consumption = budget_consumption(amount, amount + excess);
            prop_assert!(consumption.over_budget);
            prop_assert!((0.0..=100.0).contains(&consumption.percentage));
        }

        #[test]
        fn completed_project_is_done_whatever_the_money(
            budget in proptest::option::of(-1.0e7f64..1.0e7),
            spent in proptest::option::of(-1.0e7f64..1.0e7),
        ) {
            let done = project(ProjectStatus::Completed, budget, spent);
            prop_assert_eq!(project_progress(&done), 100.0);
        }
    }
}
