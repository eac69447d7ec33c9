//! Payload checks run before any mutation reaches a backend.

use serde_json::{Map, Value};

use crate::error::{AppError, AppResult};
use crate::model::{parse_iso_date, MaintenanceStatus, Priority, ProjectStatus, ResourceKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Every required field must be present.
    Create,
    /// Only the fields present are checked.
    Update,
}

/// Budget periods outside this window are rejected.
const BUDGET_YEARS: std::ops::RangeInclusive<i64> = 2000..=2100;

fn required_fields(kind: ResourceKind) -> &'static [&'static str] {
    match kind {
        ResourceKind::Maintenance => &["title"],
        ResourceKind::Appliances => &["name", "category"],
        ResourceKind::Documents => &["title", "category"],
        ResourceKind::Projects => &["name"],
        ResourceKind::Expenses => &["title", "amount", "category", "date"],
        ResourceKind::Budgets => &["category", "amount", "month", "year"],
    }
}

pub(crate) fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(text) => text.trim().is_empty(),
        _ => false,
    }
}

/// Numbers may arrive as JSON numbers or as numeric form text.
pub(crate) fn numeric(value: &Value) -> Option<f64> {
    match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|n| n.is_finite())
}

pub(crate) fn integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(number) => number
            .as_i64()
            .or_else(|| number.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
        Value::String(text) => text.trim().parse::<i64>().ok(),
        _ => None,
    }
}

fn check_one_of(payload: &Map<String, Value>, field: &str, allowed: &[&str]) -> AppResult<()> {
    match payload.get(field) {
        None | Some(Value::Null) => Ok(()),
        Some(Value::String(text)) if allowed.contains(&text.as_str()) => Ok(()),
        Some(_) => Err(AppError::invalid_field(
            field,
            format!("{field} must be one of: {}", allowed.join(", ")),
        )),
    }
}

fn check_date(payload: &Map<String, Value>, field: &str) -> AppResult<()> {
    match payload.get(field) {
        None => Ok(()),
        Some(value) if is_blank(value) => Ok(()),
        Some(Value::String(text)) if parse_iso_date(text).is_some() => Ok(()),
        Some(_) => Err(AppError::invalid_field(
            field,
            format!("{field} must be a date (YYYY-MM-DD)"),
        )),
    }
}

fn check_number(
    payload: &Map<String, Value>,
    field: &str,
    accept: impl Fn(f64) -> bool,
    reason: &str,
) -> AppResult<()> {
    match payload.get(field) {
        None => Ok(()),
        Some(value) if is_blank(value) => Ok(()),
        Some(value) => match numeric(value) {
            Some(n) if accept(n) => Ok(()),
            Some(_) => Err(AppError::invalid_field(field, format!("{field} {reason}"))),
            None => Err(AppError::invalid_field(
                field,
                format!("{field} must be a number"),
            )),
        },
    }
}

fn check_integer(
    payload: &Map<String, Value>,
    field: &str,
    accept: impl Fn(i64) -> bool,
    reason: &str,
) -> AppResult<()> {
    match payload.get(field) {
        None => Ok(()),
        Some(value) if is_blank(value) => Ok(()),
        Some(value) => match integer(value) {
            Some(n) if accept(n) => Ok(()),
            _ => Err(AppError::invalid_field(field, format!("{field} {reason}"))),
        },
    }
}

pub fn validate(kind: ResourceKind, payload: &Map<String, Value>, mode: Mode) -> AppResult<()> {
    for field in required_fields(kind) {
        match payload.get(*field) {
            None if mode == Mode::Update => {}
            Some(value) if !is_blank(value) => {}
            _ => {
                return Err(AppError::missing_field(field).with_context("resource", kind.as_str()))
            }
        }
    }

    let checked = match kind {
        ResourceKind::Maintenance => check_one_of(payload, "priority", &Priority::ALL)
            .and_then(|_| check_one_of(payload, "status", &MaintenanceStatus::ALL))
            .and_then(|_| check_date(payload, "due_date")),
        ResourceKind::Appliances => check_date(payload, "purchase_date")
            .and_then(|_| check_date(payload, "warranty_expiration")),
        ResourceKind::Documents => check_integer(
            payload,
            "file_size",
            |n| n >= 0,
            "must be a whole number of bytes",
        ),
        ResourceKind::Projects => check_one_of(payload, "status", &ProjectStatus::ALL)
            .and_then(|_| check_number(payload, "budget", |n| n >= 0.0, "cannot be negative"))
            .and_then(|_| check_number(payload, "spent", |n| n >= 0.0, "cannot be negative"))
            .and_then(|_| check_date(payload, "start_date"))
            .and_then(|_| check_date(payload, "projected_end_date")),
        ResourceKind::Expenses => {
            check_number(payload, "amount", |n| n > 0.0, "must be greater than zero")
                .and_then(|_| check_date(payload, "date"))
        }
        ResourceKind::Budgets => {
            check_number(payload, "amount", |n| n > 0.0, "must be greater than zero")
                .and_then(|_| {
                    check_integer(
                        payload,
                        "month",
                        |m| (1..=12).contains(&m),
                        "must be between 1 and 12",
                    )
                })
                .and_then(|_| {
                    check_integer(
                        payload,
                        "year",
                        |y| BUDGET_YEARS.contains(&y),
                        "must be between 2000 and 2100",
                    )
                })
        }
    };
    checked.map_err(|err| err.with_context("resource", kind.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{VALIDATION_INVALID_FIELD, VALIDATION_MISSING_FIELD};
    use serde_json::json;

    fn payload(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn create_requires_every_required_field() {
        let err = validate(
            ResourceKind::Expenses,
            &payload(json!({ "title": "Water", "amount": 42, "category": "utilities" })),
            Mode::Create,
        )
        .unwrap_err();
        assert_eq!(err.code(), VALIDATION_MISSING_FIELD);
        assert_eq!(err.context().get("field"), Some(&"date".to_string()));
    }

    #[test]
    fn blank_text_counts_as_missing() {
        let err = validate(
            ResourceKind::Appliances,
            &payload(json!({ "name": "  ", "category": "kitchen" })),
            Mode::Create,
        )
        .unwrap_err();
        assert_eq!(err.code(), VALIDATION_MISSING_FIELD);
    }

    #[test]
    fn update_checks_only_present_fields() {
        assert!(validate(
            ResourceKind::Expenses,
            &payload(json!({ "category": "repairs" })),
            Mode::Update
        )
        .is_ok());

        let err = validate(
            ResourceKind::Expenses,
            &payload(json!({ "title": "" })),
            Mode::Update,
        )
        .unwrap_err();
        assert_eq!(err.code(), VALIDATION_MISSING_FIELD);
    }

    #[test]
    fn amounts_must_be_positive_numbers() {
        for bad in [json!(0), json!(-5), json!("abc")] {
            let err = validate(
                ResourceKind::Budgets,
                &payload(json!({ "category": "x", "amount": bad, "month": 5, "year": 2024 })),
                Mode::Create,
            )
            .unwrap_err();
            assert_eq!(err.code(), VALIDATION_INVALID_FIELD);
        }
        assert!(validate(
            ResourceKind::Budgets,
            &payload(json!({ "category": "x", "amount": "150.50", "month": "5", "year": 2024 })),
            Mode::Create
        )
        .is_ok());
    }

    #[test]
    fn budget_month_is_bounded() {
        let err = validate(
            ResourceKind::Budgets,
            &payload(json!({ "category": "x", "amount": 10, "month": 13, "year": 2024 })),
            Mode::Create,
        )
        .unwrap_err();
        assert_eq!(err.context().get("field"), Some(&"month".to_string()));
    }

    #[test]
    fn budget_year_stays_within_supported_window() {
        for year in [json!(1), json!(1999), json!("2101")] {
            let err = validate(
                ResourceKind::Budgets,
                &payload(json!({ "category": "x", "amount": 10, "month": 6, "year": year })),
                Mode::Create,
            )
            .unwrap_err();
            assert_eq!(err.code(), VALIDATION_INVALID_FIELD);
            assert_eq!(err.context().get("field"), Some(&"year".to_string()));
        }
        for year in [json!(2000), json!("2100")] {
            assert!(validate(
                ResourceKind::Budgets,
                &payload(json!({ "category": "x", "amount": 10, "month": 6, "year": year })),
                Mode::Create,
            )
            .is_ok());
        }
    }

    #[test]
    fn maintenance_enums_use_wire_names() {
        assert!(validate(
            ResourceKind::Maintenance,
            &payload(json!({ "title": "Roof", "priority": "high", "status": "in-progress" })),
            Mode::Create
        )
        .is_ok());
        let err = validate(
            ResourceKind::Maintenance,
            &payload(json!({ "title": "Roof", "priority": "urgent" })),
            Mode::Create,
        )
        .unwrap_err();
        assert_eq!(err.code(), VALIDATION_INVALID_FIELD);
        assert_eq!(
            err.message(),
            "priority must be one of: low, medium, high"
        );
    }

    #[test]
    fn dates_must_be_iso() {
        let err = validate(
            ResourceKind::Appliances,
            &payload(json!({ "name": "Oven", "category": "kitchen", "purchase_date": "05/01/2024" })),
            Mode::Create,
        )
        .unwrap_err();
        assert_eq!(err.context().get("field"), Some(&"purchase_date".to_string()));
        assert!(validate(
            ResourceKind::Appliances,
            &payload(json!({ "name": "Oven", "category": "kitchen", "purchase_date": "" })),
            Mode::Create
        )
        .is_ok());
    }

    #[test]
    fn project_money_cannot_be_negative() {
        let err = validate(
            ResourceKind::Projects,
            &payload(json!({ "name": "Deck", "spent": -1 })),
            Mode::Create,
        )
        .unwrap_err();
        assert_eq!(err.message(), "spent cannot be negative");
    }
}
