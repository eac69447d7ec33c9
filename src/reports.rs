use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::backend::ResourceFilter;
use crate::coordinator::ViewScope;
use crate::model::{Budget, Expense, ResourceKind};
use crate::time::quarter_start;

/// Expense window presets, each ending today.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DateRange {
    #[default]
    Month,
    Quarter,
    Year,
    All,
}

impl DateRange {
    pub fn as_str(&self) -> &'static str {
        match self {
            DateRange::Month => "month",
            DateRange::Quarter => "quarter",
            DateRange::Year => "year",
            DateRange::All => "all",
        }
    }

    /// First day of the window; `None` for [`DateRange::All`].
    pub fn start_date(&self, today: NaiveDate) -> Option<NaiveDate> {
        match self {
            DateRange::Month => today.with_day(1),
            DateRange::Quarter => Some(quarter_start(today)),
            DateRange::Year => NaiveDate::from_ymd_opt(today.year(), 1, 1),
            DateRange::All => None,
        }
    }

    pub fn expense_filter(&self, today: NaiveDate) -> ResourceFilter {
        match self.start_date(today) {
            Some(start) => ResourceFilter::date_range(Some(start), Some(today)),
            None => ResourceFilter::default(),
        }
    }

    /// Expenses narrowed to the window; every other resource unfiltered.
    pub fn scope(&self, today: NaiveDate) -> ViewScope {
        let mut filters = HashMap::new();
        filters.insert(ResourceKind::Expenses, self.expense_filter(today));
        ViewScope::Custom(filters)
    }

    fn contains_period(&self, today: NaiveDate, year: i32, month: u32) -> bool {
        let Some(start) = self.start_date(today) else {
            return true;
        };
        let period = (year, month);
        period >= (start.year(), start.month()) && period <= (today.year(), today.month())
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DateRange {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "month" => Ok(DateRange::Month),
            "quarter" => Ok(DateRange::Quarter),
            "year" => Ok(DateRange::Year),
            "all" => Ok(DateRange::All),
            other => Err(format!(
                "unknown range `{other}` (expected month, quarter, year or all)"
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthTotal {
    /// `YYYY-MM`
    pub month: String,
    pub total: f64,
}

/// Spending aggregates over a [`DateRange`], in major units.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FinancialReport {
    pub range: DateRange,
    pub start_date: Option<NaiveDate>,
    pub end_date: NaiveDate,
    pub monthly_totals: Vec<MonthTotal>,
    pub category_totals: BTreeMap<String, f64>,
    pub total_budget: f64,
    pub total_expenses: f64,
    /// Share of the budget left unspent, in percent.
    pub savings_rate: f64,
    /// Change from the first to the last month with spending, in percent.
    pub expense_growth_rate: f64,
}

impl FinancialReport {
    /// Expenses outside the window and budgets for months outside it are
    /// ignored even if the caller passes them in.
    pub fn build(range: DateRange, today: NaiveDate, expenses: &[Expense], budgets: &[Budget]) -> Self {
        let start_date = range.start_date(today);
        let in_window = |date: NaiveDate| start_date.map_or(true, |start| date >= start) && date <= today;

        let mut monthly: BTreeMap<String, f64> = BTreeMap::new();
        let mut category_totals: BTreeMap<String, f64> = BTreeMap::new();
        let mut total_expenses = 0.0;
        for expense in expenses.iter().filter(|e| in_window(e.date)) {
            let amount = expense.amount.display();
            total_expenses += amount;
            *monthly
                .entry(expense.date.format("%Y-%m").to_string())
                .or_default() += amount;
            *category_totals.entry(expense.category.clone()).or_default() += amount;
        }

        let total_budget: f64 = budgets
            .iter()
            .filter(|b| range.contains_period(today, b.year, b.month))
            .map(|b| b.amount.display())
            .sum();

        let savings_rate = if total_budget > 0.0 {
            (total_budget - total_expenses) * 100.0 / total_budget
        } else {
            0.0
        };

        let monthly_totals: Vec<MonthTotal> = monthly
            .into_iter()
            .map(|(month, total)| MonthTotal { month, total })
            .collect();
        let expense_growth_rate = match (monthly_totals.first(), monthly_totals.last()) {
            (Some(first), Some(last)) if monthly_totals.len() >= 2 && first.total != 0.0 => {
                (last.total - first.total) * 100.0 / first.total
            }
            _ => 0.0,
        };

        Self {
            range,
            start_date,
            end_date: today,
            monthly_totals,
            category_totals,
            total_budget,
            total_expenses,
            savings_rate,
            expense_growth_rate,
        }
    }
}
