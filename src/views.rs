//! Read models handed to views. Built from a snapshot on every read so that
//! time-relative fields always reflect the `today` passed in.

use chrono::NaiveDate;
use serde::Serialize;

use crate::coordinator::{DashboardSnapshot, Slot};
use crate::model::{Appliance, Budget, Document, Expense, MaintenanceItem, Project, PropertyId};
use crate::money::format_currency;
use crate::status::{
    appliance_age, budget_consumption, current_season, format_file_size, maintenance_urgency,
    monthly_budget_status, project_progress, warranty_status, ApplianceAge, BudgetConsumption,
    BudgetStatus, MaintenanceUrgency, Season, WarrantySeverity, WarrantyStatus,
};

#[derive(Debug, Clone, Serialize)]
pub struct ApplianceView {
    #[serde(flatten)]
    pub appliance: Appliance,
    pub warranty: WarrantyStatus,
    pub age: ApplianceAge,
    pub age_label: String,
}

impl ApplianceView {
    pub fn new(appliance: &Appliance, today: NaiveDate) -> Self {
        let age = appliance_age(appliance.purchase_date, today);
        Self {
            appliance: appliance.clone(),
            warranty: warranty_status(appliance.warranty_expiration, today),
            age,
            age_label: age.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MaintenanceView {
    #[serde(flatten)]
    pub item: MaintenanceItem,
    pub urgency: MaintenanceUrgency,
}

impl MaintenanceView {
    pub fn new(item: &MaintenanceItem, today: NaiveDate) -> Self {
        Self {
            item: item.clone(),
            urgency: maintenance_urgency(item.due_date, today),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ProjectView {
    #[serde(flatten)]
    pub project: Project,
    pub progress: f64,
}

impl ProjectView {
    pub fn new(project: &Project) -> Self {
        Self {
            project: project.clone(),
            progress: project_progress(project),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DocumentView {
    #[serde(flatten)]
    pub document: Document,
    pub size_label: Option<String>,
}

impl DocumentView {
    pub fn new(document: &Document) -> Self {
        Self {
            document: document.clone(),
            size_label: document.file_size.map(format_file_size),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ExpenseView {
    #[serde(flatten)]
    pub expense: Expense,
    /// Major units.
    pub display_amount: f64,
    pub amount_label: String,
}

impl ExpenseView {
    pub fn new(expense: &Expense) -> Self {
        let display_amount = expense.amount.display();
        Self {
            expense: expense.clone(),
            display_amount,
            amount_label: format_currency(display_amount),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BudgetLine {
    #[serde(flatten)]
    pub budget: Budget,
    pub display_amount: f64,
    /// Sum of same-category expenses, major units.
    pub spent: f64,
    pub remaining: f64,
    pub consumption: BudgetConsumption,
}

/// Pairs each budget with the expenses filed under its category.
pub fn budget_lines(budgets: &[Budget], expenses: &[Expense]) -> Vec<BudgetLine> {
    budgets
        .iter()
        .map(|budget| {
            let display_amount = budget.amount.display();
            let spent: f64 = expenses
                .iter()
                .filter(|expense| expense.category == budget.category)
                .map(|expense| expense.amount.display())
                .sum();
            BudgetLine {
                budget: budget.clone(),
                display_amount,
                spent,
                remaining: display_amount - spent,
                consumption: budget_consumption(display_amount, spent),
            }
        })
        .collect()
}

#[derive(Debug, Clone, Serialize)]
pub struct SlotView<T> {
    pub loading: bool,
    pub error: Option<String>,
    pub items: Vec<T>,
}

impl<T> SlotView<T> {
    fn from_slot<R>(slot: &Slot<R>, map: impl Fn(&R) -> T) -> Self {
        Self {
            loading: slot.loading,
            error: slot.error.clone(),
            items: slot.items().iter().map(map).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlySummary {
    pub total_expenses: f64,
    pub total_budget: f64,
    pub status: BudgetStatus,
}

impl MonthlySummary {
    pub fn new(budgets: &[Budget], expenses: &[Expense]) -> Self {
        let total_expenses: f64 = expenses.iter().map(|e| e.amount.display()).sum();
        let total_budget: f64 = budgets.iter().map(|b| b.amount.display()).sum();
        Self {
            total_expenses,
            total_budget,
            status: monthly_budget_status(total_budget, total_expenses),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DashboardView {
    pub property_id: Option<PropertyId>,
    pub today: NaiveDate,
    pub season: Season,
    pub maintenance: SlotView<MaintenanceView>,
    pub appliances: SlotView<ApplianceView>,
    pub documents: SlotView<DocumentView>,
    pub projects: SlotView<ProjectView>,
    pub expenses: SlotView<ExpenseView>,
    pub budgets: SlotView<BudgetLine>,
    pub summary: MonthlySummary,
    pub overdue_maintenance: usize,
    pub expiring_warranties: usize,
}

pub fn dashboard_view(snapshot: &DashboardSnapshot, today: NaiveDate) -> DashboardView {
    let maintenance =
        SlotView::from_slot(&snapshot.maintenance, |item| MaintenanceView::new(item, today));
    let appliances =
        SlotView::from_slot(&snapshot.appliances, |item| ApplianceView::new(item, today));
    let lines = budget_lines(snapshot.budgets.items(), snapshot.expenses.items());
    let budgets = SlotView {
        loading: snapshot.budgets.loading,
        error: snapshot.budgets.error.clone(),
        items: lines,
    };

    let overdue_maintenance = maintenance
        .items
        .iter()
        .filter(|view| view.urgency.overdue)
        .count();
    let expiring_warranties = appliances
        .items
        .iter()
        .filter(|view| view.warranty.severity == WarrantySeverity::ExpiringSoon)
        .count();

    DashboardView {
        property_id: snapshot.property_id.clone(),
        today,
        season: current_season(today),
        maintenance,
        appliances,
        documents: SlotView::from_slot(&snapshot.documents, DocumentView::new),
        projects: SlotView::from_slot(&snapshot.projects, ProjectView::new),
        expenses: SlotView::from_slot(&snapshot.expenses, ExpenseView::new),
        budgets,
        summary: MonthlySummary::new(snapshot.budgets.items(), snapshot.expenses.items()),
        overdue_maintenance,
        expiring_warranties,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn expense(category: &str, amount: f64) -> Expense {
        serde_json::from_value(json!({
            "id": 1, "title": "x", "amount": amount, "category": category,
            "date": "2024-05-02", "property_id": 1
        }))
        .unwrap()
    }

    fn budget(category: &str, amount: f64) -> Budget {
        serde_json::from_value(json!({
            "id": 1, "category": category, "amount": amount, "month": 5, "year": 2024,
            "property_id": 1
        }))
        .unwrap()
    }

    #[test]
    fn budget_lines_sum_expenses_by_category_in_display_units() {
        let lines = budget_lines(
            &[budget("utilities", 20000.0)],
            &[
                expense("utilities", 4500.0),
                expense("utilities", 55.0),
                expense("repairs", 900.0),
            ],
        );
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].display_amount, 200.0);
        assert_eq!(lines[0].spent, 100.0);
        assert_eq!(lines[0].remaining, 100.0);
        assert_eq!(lines[0].consumption.percentage, 50.0);
        assert!(!lines[0].consumption.over_budget);
    }

    #[test]
    fn monthly_summary_reports_over_budget() {
        let summary = MonthlySummary::new(
            &[budget("utilities", 100.0)],
            &[expense("utilities", 80.0), expense("repairs", 40.0)],
        );
        assert_eq!(summary.total_budget, 100.0);
        assert_eq!(summary.total_expenses, 120.0);
        assert_eq!(
            summary.status,
            BudgetStatus {
                under_budget: false,
                percentage: 20
            }
        );
    }

    #[test]
    fn document_view_labels_size() {
        let document: Document = serde_json::from_value(json!({
            "id": 1, "title": "Deed", "category": "legal", "file_size": 1536, "property_id": 1
        }))
        .unwrap();
        assert_eq!(
            DocumentView::new(&document).size_label.as_deref(),
            Some("1.5 KB")
        );
    }

    #[test]
    fn appliance_view_flattens_fields() {
        let appliance: Appliance = serde_json::from_value(json!({
            "id": 1, "name": "Fridge", "category": "kitchen",
            "purchase_date": "2022-01-10", "warranty_expiration": "2024-06-01",
            "property_id": 1
        }))
        .unwrap();
        let today = NaiveDate::from_ymd_opt(2024, 5, 15).unwrap();
        let view = ApplianceView::new(&appliance, today);
        assert_eq!(view.warranty.severity, WarrantySeverity::ExpiringSoon);
        assert_eq!(view.age_label, "2 years, 4 months old");

        let value = serde_json::to_value(&view).unwrap();
        assert_eq!(value["name"], json!("Fridge"));
        assert_eq!(value["warranty"]["severity"], json!("expiring_soon"));
    }

    #[test]
    fn empty_snapshot_renders_empty_dashboard() {
        let today = NaiveDate::from_ymd_opt(2024, 5, 15).unwrap();
        let view = dashboard_view(&DashboardSnapshot::default(), today);
        assert!(view.maintenance.items.is_empty());
        assert_eq!(view.season, Season::Spring);
        assert_eq!(view.summary.total_budget, 0.0);
        assert_eq!(
            view.summary.status,
            BudgetStatus {
                under_budget: false,
                percentage: 0
            }
        );
    }
}
