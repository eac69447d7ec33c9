use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};

use crate::money::MonetaryValue;

/// Ids arrive as strings from some stores and as integers from others; both
/// collapse into the string form that is persisted for the selection.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawId {
    Text(String),
    Number(i64),
}

impl RawId {
    fn into_string(self) -> String {
        match self {
            RawId::Text(text) => text,
            RawId::Number(number) => number.to_string(),
        }
    }
}

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: Deserializer<'de>,
            {
                RawId::deserialize(deserializer).map(|raw| Self(raw.into_string()))
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> String {
                id.0
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

id_type!(
    /// Identifier of a property owned by the signed-in user.
    PropertyId
);
id_type!(
    /// Identifier of a record inside one of the property-scoped resources.
    RecordId
);

/// One backend-managed, property-scoped collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Maintenance,
    Appliances,
    Documents,
    Projects,
    Expenses,
    Budgets,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 6] = [
        ResourceKind::Maintenance,
        ResourceKind::Appliances,
        ResourceKind::Documents,
        ResourceKind::Projects,
        ResourceKind::Expenses,
        ResourceKind::Budgets,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Maintenance => "maintenance",
            ResourceKind::Appliances => "appliances",
            ResourceKind::Documents => "documents",
            ResourceKind::Projects => "projects",
            ResourceKind::Expenses => "expenses",
            ResourceKind::Budgets => "budgets",
        }
    }

    /// Singular name used in user-facing messages.
    pub fn label(&self) -> &'static str {
        match self {
            ResourceKind::Maintenance => "Maintenance item",
            ResourceKind::Appliances => "Appliance",
            ResourceKind::Documents => "Document",
            ResourceKind::Projects => "Project",
            ResourceKind::Expenses => "Expense",
            ResourceKind::Budgets => "Budget",
        }
    }

    /// Resources whose `amount` field carries an ambiguous monetary value.
    pub fn has_monetary_amount(&self) -> bool {
        matches!(self, ResourceKind::Expenses | ResourceKind::Budgets)
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ResourceKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s.trim())
            .ok_or_else(|| format!("unknown resource `{s}`"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

impl Priority {
    pub const ALL: [&'static str; 3] = ["low", "medium", "high"];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MaintenanceStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
    Cancelled,
}

impl MaintenanceStatus {
    pub const ALL: [&'static str; 4] = ["pending", "in-progress", "completed", "cancelled"];

    pub fn as_str(&self) -> &'static str {
        match self {
            MaintenanceStatus::Pending => "pending",
            MaintenanceStatus::InProgress => "in-progress",
            MaintenanceStatus::Completed => "completed",
            MaintenanceStatus::Cancelled => "cancelled",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProjectStatus {
    #[default]
    Planning,
    InProgress,
    OnHold,
    Completed,
}

impl ProjectStatus {
    pub const ALL: [&'static str; 4] = ["planning", "in-progress", "on-hold", "completed"];
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Property {
    pub id: PropertyId,
    pub address: String,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub zip: Option<String>,
    #[serde(default)]
    pub property_type: Option<String>,
    #[serde(default)]
    pub bedrooms: Option<u32>,
    #[serde(default)]
    pub bathrooms: Option<f64>,
    #[serde(default)]
    pub square_footage: Option<u32>,
    #[serde(default, deserialize_with = "flag")]
    pub is_primary_residence: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Budget {
    pub id: RecordId,
    pub category: String,
    pub amount: MonetaryValue,
    pub month: u32,
    pub year: i32,
    pub property_id: PropertyId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expense {
    pub id: RecordId,
    pub title: String,
    pub amount: MonetaryValue,
    pub category: String,
    #[serde(with = "iso_date")]
    pub date: NaiveDate,
    #[serde(default, deserialize_with = "flag")]
    pub recurring: bool,
    #[serde(default)]
    pub recurring_interval: Option<String>,
    pub property_id: PropertyId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Appliance {
    pub id: RecordId,
    pub name: String,
    #[serde(default)]
    pub brand: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub serial_number: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default, with = "opt_iso_date")]
    pub purchase_date: Option<NaiveDate>,
    #[serde(default, with = "opt_iso_date")]
    pub warranty_expiration: Option<NaiveDate>,
    pub category: String,
    pub property_id: PropertyId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaintenanceItem {
    pub id: RecordId,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub status: MaintenanceStatus,
    #[serde(default, with = "opt_iso_date")]
    pub due_date: Option<NaiveDate>,
    pub property_id: PropertyId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: RecordId,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub status: ProjectStatus,
    #[serde(default)]
    pub budget: Option<f64>,
    #[serde(default)]
    pub spent: Option<f64>,
    #[serde(default, with = "opt_iso_date")]
    pub start_date: Option<NaiveDate>,
    #[serde(default, with = "opt_iso_date")]
    pub projected_end_date: Option<NaiveDate>,
    pub property_id: PropertyId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: RecordId,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub category: String,
    #[serde(default)]
    pub file_type: Option<String>,
    #[serde(default)]
    pub file_size: Option<u64>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    pub property_id: PropertyId,
}

/// Parses an ISO calendar date, tolerating a trailing time component
/// (`2024-03-01T00:00:00`) as produced by datetime columns.
pub fn parse_iso_date(raw: &str) -> Option<NaiveDate> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    let head = trimmed.get(..10).unwrap_or(trimmed);
    NaiveDate::parse_from_str(head, "%Y-%m-%d").ok()
}

fn flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Int(i64),
        Text(String),
    }

    Ok(match Option::<Flag>::deserialize(deserializer)? {
        None => false,
        Some(Flag::Bool(value)) => value,
        Some(Flag::Int(value)) => value != 0,
        Some(Flag::Text(value)) => matches!(value.trim(), "true" | "1"),
    })
}

mod iso_date {
    use chrono::NaiveDate;
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &NaiveDate, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&value.format("%Y-%m-%d").to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<NaiveDate, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        super::parse_iso_date(&raw)
            .ok_or_else(|| de::Error::custom(format!("invalid ISO date `{raw}`")))
    }
}

mod opt_iso_date {
    use chrono::NaiveDate;
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &Option<NaiveDate>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(date) => serializer.serialize_str(&date.format("%Y-%m-%d").to_string()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<NaiveDate>, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Option::<String>::deserialize(deserializer)? {
            None => Ok(None),
            Some(raw) if raw.trim().is_empty() => Ok(None),
            Some(raw) => super::parse_iso_date(&raw)
                .map(Some)
                .ok_or_else(|| de::Error::custom(format!("invalid ISO date `{raw}`"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn property_ids_accept_numbers_and_strings() {
        let numeric: Property = serde_json::from_value(json!({
            "id": 7,
            "address": "1 Main St",
            "is_primary_residence": 1
        }))
        .unwrap();
        assert_eq!(numeric.id.as_str(), "7");
        assert!(numeric.is_primary_residence);

        let textual: Property =
            serde_json::from_value(json!({ "id": "abc", "address": "2 Main St" })).unwrap();
        assert_eq!(textual.id, PropertyId::new("abc"));
        assert!(!textual.is_primary_residence);
    }

    #[test]
    fn ids_serialize_as_plain_strings() {
        let value = serde_json::to_value(PropertyId::new("42")).unwrap();
        assert_eq!(value, json!("42"));
    }

    #[test]
    fn appliance_dates_tolerate_blank_and_datetime_values() {
        let appliance: Appliance = serde_json::from_value(json!({
            "id": 1,
            "name": "Fridge",
            "category": "kitchen",
            "purchase_date": "",
            "warranty_expiration": "2026-05-01T00:00:00",
            "property_id": 3
        }))
        .unwrap();
        assert_eq!(appliance.purchase_date, None);
        assert_eq!(
            appliance.warranty_expiration,
            NaiveDate::from_ymd_opt(2026, 5, 1)
        );
    }

    #[test]
    fn maintenance_status_uses_hyphenated_wire_names() {
        let item: MaintenanceItem = serde_json::from_value(json!({
            "id": "m1",
            "title": "Gutters",
            "priority": "high",
            "status": "in-progress",
            "due_date": null,
            "property_id": "p1"
        }))
        .unwrap();
        assert_eq!(item.status, MaintenanceStatus::InProgress);
        assert_eq!(item.priority, Priority::High);
        assert_eq!(item.status.as_str(), "in-progress");
    }

    #[test]
    fn expense_requires_a_valid_date() {
        let err = serde_json::from_value::<Expense>(json!({
            "id": 1,
            "title": "Water",
            "amount": 4200,
            "category": "utilities",
            "date": "not-a-date",
            "property_id": 1
        }))
        .unwrap_err();
        assert!(err.to_string().contains("invalid ISO date"));
    }

    #[test]
    fn resource_kind_round_trips_through_its_name() {
        for kind in ResourceKind::ALL {
            assert_eq!(kind.as_str().parse::<ResourceKind>(), Ok(kind));
        }
        assert!("gardens".parse::<ResourceKind>().is_err());
    }
}
