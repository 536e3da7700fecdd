use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use thiserror::Error;
use validator::{Validate, ValidationError};

#[derive(Debug, Deserialize, Serialize, sqlx::FromRow)]
pub struct Record {
    pub id: i32,
}

#[derive(Debug, Error)]
#[error("unknown {kind} '{value}'")]
pub struct ParseEnumError {
    kind: &'static str,
    value: String,
}

/// Declares a text-backed enum: serde names, `as_str` for binding and
/// `TryFrom<String>` for decoding rows.
macro_rules! text_enum {
    ($name:ident, $label:literal { $($variant:ident => $text:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl TryFrom<String> for $name {
            type Error = ParseEnumError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                match value.as_str() {
                    $($text => Ok($name::$variant),)+
                    _ => Err(ParseEnumError { kind: $label, value }),
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

text_enum!(MeasurementKind, "measurement kind" {
    Odometer => "odometer",
    EngineHours => "engine_hours",
    Months => "months",
});

impl MeasurementKind {
    pub fn unit(&self) -> &'static str {
        match self {
            MeasurementKind::Odometer => "km",
            MeasurementKind::EngineHours => "h",
            MeasurementKind::Months => "months",
        }
    }
}

text_enum!(VehicleStatus, "vehicle status" {
    Active => "active",
    Maintenance => "maintenance",
    Inactive => "inactive",
});

text_enum!(UserRole, "user role" {
    Admin => "admin",
    Manager => "manager",
    Operator => "operator",
});

text_enum!(Page, "page" {
    Dashboard => "dashboard",
    Collaborators => "collaborators",
    Vehicles => "vehicles",
    Products => "products",
    Stock => "stock",
    Maintenance => "maintenance",
    Users => "users",
});

fn check_positive(value: f64, code: &'static str) -> Result<(), ValidationError> {
    if value > 0.0 && value.is_finite() {
        Ok(())
    } else {
        Err(ValidationError::new(code))
    }
}

// Collaborators

#[derive(Debug, Deserialize, Serialize, sqlx::FromRow)]
pub struct Collaborator {
    pub id: i32,
    pub name: String,
    pub registration: String,
    pub position: String,
    pub department: String,
    pub phone: Option<String>,
    pub active: bool,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Deserialize, Validate)]
pub struct PostCollaborator {
    #[validate(length(min = 2, max = 120))]
    pub name: String,
    #[validate(length(min = 1, max = 30))]
    pub registration: String,
    #[validate(length(min = 2, max = 80))]
    pub position: String,
    #[validate(length(min = 2, max = 80))]
    pub department: String,
    #[validate(length(max = 30))]
    pub phone: Option<String>,
    #[serde(default = "default_true")]
    pub active: bool,
}

fn default_true() -> bool {
    true
}

// Vehicles

#[derive(Debug, Deserialize, Serialize, sqlx::FromRow)]
pub struct Vehicle {
    pub id: i32,
    pub plate: String,
    pub model: String,
    pub brand: String,
    #[sqlx(try_from = "String")]
    pub measurement_kind: MeasurementKind,
    pub current_measurement: f64,
    #[sqlx(try_from = "String")]
    pub status: VehicleStatus,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Deserialize, Validate)]
pub struct PostVehicle {
    #[validate(length(min = 5, max = 10))]
    pub plate: String,
    #[validate(length(min = 1, max = 100))]
    pub model: String,
    #[validate(length(min = 1, max = 100))]
    pub brand: String,
    pub measurement_kind: MeasurementKind,
    #[validate(range(min = 0.0))]
    #[serde(default)]
    pub initial_measurement: f64,
    #[serde(default = "default_vehicle_status")]
    pub status: VehicleStatus,
    #[validate(length(min = 1, max = 120))]
    pub author: String,
}

fn default_vehicle_status() -> VehicleStatus {
    VehicleStatus::Active
}

#[derive(Debug, Deserialize, Validate)]
pub struct PutVehicle {
    #[validate(length(min = 5, max = 10))]
    pub plate: String,
    #[validate(length(min = 1, max = 100))]
    pub model: String,
    #[validate(length(min = 1, max = 100))]
    pub brand: String,
    pub measurement_kind: MeasurementKind,
    pub status: VehicleStatus,
}

// Products and stock

#[derive(Debug, Deserialize, Serialize, sqlx::FromRow)]
pub struct Product {
    pub id: i32,
    pub name: String,
    pub category: String,
    pub unit: String,
    pub quantity: f64,
    pub minimum_stock: f64,
    pub created_at: NaiveDateTime,
}

impl Product {
    pub fn is_low_stock(&self) -> bool {
        self.quantity <= self.minimum_stock
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct PostProduct {
    #[validate(length(min = 2, max = 120))]
    pub name: String,
    #[validate(length(min = 2, max = 60))]
    pub category: String,
    #[validate(length(min = 1, max = 20))]
    pub unit: String,
    #[validate(range(min = 0.0))]
    #[serde(default)]
    pub quantity: f64,
    #[validate(range(min = 0.0))]
    #[serde(default)]
    pub minimum_stock: f64,
}

/// Stock quantity is owned by entries and exits, so updates leave it alone.
#[derive(Debug, Deserialize, Validate)]
pub struct PutProduct {
    #[validate(length(min = 2, max = 120))]
    pub name: String,
    #[validate(length(min = 2, max = 60))]
    pub category: String,
    #[validate(length(min = 1, max = 20))]
    pub unit: String,
    #[validate(range(min = 0.0))]
    pub minimum_stock: f64,
}

#[derive(Debug, Deserialize, Serialize, sqlx::FromRow)]
pub struct StockEntry {
    pub id: i32,
    pub product_id: i32,
    pub quantity: f64,
    pub supplier: Option<String>,
    pub note: Option<String>,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Deserialize, Validate)]
#[validate(schema(function = "validate_entry_quantity"))]
pub struct PostStockEntry {
    pub product_id: i32,
    pub quantity: f64,
    #[validate(length(max = 120))]
    pub supplier: Option<String>,
    #[validate(length(max = 500))]
    pub note: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, sqlx::FromRow)]
pub struct StockExit {
    pub id: i32,
    pub product_id: i32,
    pub quantity: f64,
    pub collaborator_id: Option<i32>,
    pub vehicle_id: Option<i32>,
    pub note: Option<String>,
    /// Set when the exit was booked by an oil change.
    pub oil_change_id: Option<i32>,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Deserialize, Validate)]
#[validate(schema(function = "validate_exit_quantity"))]
pub struct PostStockExit {
    pub product_id: i32,
    pub quantity: f64,
    pub collaborator_id: Option<i32>,
    pub vehicle_id: Option<i32>,
    #[validate(length(max = 500))]
    pub note: Option<String>,
}

fn validate_entry_quantity(request: &PostStockEntry) -> Result<(), ValidationError> {
    check_positive(request.quantity, "quantity_must_be_positive")
}

fn validate_exit_quantity(request: &PostStockExit) -> Result<(), ValidationError> {
    check_positive(request.quantity, "quantity_must_be_positive")
}

// Measurement log

#[derive(Debug, Clone, Deserialize, Serialize, sqlx::FromRow)]
pub struct MeasurementUpdate {
    pub id: i32,
    pub vehicle_id: i32,
    pub previous_value: f64,
    pub new_value: f64,
    pub timestamp: Option<NaiveDateTime>,
    pub author: String,
    pub note: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct PostMeasurement {
    #[validate(range(min = 0.0))]
    pub value: f64,
    #[validate(length(min = 1, max = 120))]
    pub author: String,
    #[validate(length(max = 500))]
    pub note: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AdminPassword {
    pub admin_password: String,
}

// Oil changes

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
#[validate(schema(function = "validate_consumable_quantity"))]
pub struct Consumable {
    pub product_id: i32,
    pub quantity: f64,
}

fn validate_consumable_quantity(consumable: &Consumable) -> Result<(), ValidationError> {
    check_positive(consumable.quantity, "quantity_must_be_positive")
}

#[derive(Debug, Clone, Deserialize, Serialize, sqlx::FromRow)]
pub struct OilChange {
    pub id: i32,
    pub vehicle_id: i32,
    pub changed_at: Option<NaiveDateTime>,
    pub measurement_at_change: f64,
    pub next_due_threshold: f64,
    pub consumables: Json<Vec<Consumable>>,
    pub author: String,
    pub note: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
#[validate(schema(function = "validate_oil_change_interval"))]
pub struct PostOilChange {
    pub vehicle_id: i32,
    /// Defaults to the vehicle's current measurement.
    #[validate(range(min = 0.0))]
    pub measurement_at_change: Option<f64>,
    pub next_due_threshold: f64,
    #[validate]
    #[serde(default)]
    pub consumables: Vec<Consumable>,
    pub collaborator_id: Option<i32>,
    #[validate(length(min = 1, max = 120))]
    pub author: String,
    #[validate(length(max = 500))]
    pub note: Option<String>,
}

fn validate_oil_change_interval(request: &PostOilChange) -> Result<(), ValidationError> {
    check_positive(request.next_due_threshold, "threshold_must_be_positive")?;
    match request.measurement_at_change {
        Some(at_change) if request.next_due_threshold <= at_change => {
            Err(ValidationError::new("threshold_must_exceed_measurement"))
        }
        _ => Ok(()),
    }
}

// Users and permissions

#[derive(Debug, Deserialize, Serialize, sqlx::FromRow)]
pub struct User {
    pub id: i32,
    pub name: String,
    pub username: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    #[sqlx(try_from = "String")]
    pub role: UserRole,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Deserialize, Validate)]
pub struct PostUser {
    #[validate(length(min = 2, max = 120))]
    pub name: String,
    #[validate(length(min = 3, max = 60))]
    pub username: String,
    #[validate(length(min = 6, max = 128))]
    pub password: String,
    pub role: UserRole,
    /// Required once any admin exists.
    pub admin_password: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(length(min = 1))]
    pub username: String,
    #[validate(length(min = 1))]
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub user: User,
    pub pages: Vec<Page>,
}

#[derive(Debug, Deserialize, Serialize, sqlx::FromRow)]
pub struct PermissionRow {
    pub role: String,
    pub page: String,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct RolePages {
    pub role: UserRole,
    pub pages: Vec<Page>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_enums_round_trip_through_strings() {
        for kind in MeasurementKind::ALL {
            let parsed = MeasurementKind::try_from(kind.as_str().to_string()).unwrap();
            assert_eq!(&parsed, kind);
        }
        let err = VehicleStatus::try_from("scrapped".to_string()).unwrap_err();
        assert_eq!(err.to_string(), "unknown vehicle status 'scrapped'");
    }

    #[test]
    fn serde_uses_the_same_names_as_the_database() {
        let json = serde_json::to_string(&MeasurementKind::EngineHours).unwrap();
        assert_eq!(json, "\"engine_hours\"");
        let role: UserRole = serde_json::from_str("\"manager\"").unwrap();
        assert_eq!(role, UserRole::Manager);
    }

    #[test]
    fn oil_change_threshold_must_exceed_measurement() {
        let request: PostOilChange = serde_json::from_value(serde_json::json!({
            "vehicle_id": 1,
            "measurement_at_change": 12000.0,
            "next_due_threshold": 12000.0,
            "author": "Ana"
        }))
        .unwrap();
        assert!(request.validate().is_err());

        let request: PostOilChange = serde_json::from_value(serde_json::json!({
            "vehicle_id": 1,
            "measurement_at_change": 12000.0,
            "next_due_threshold": 22000.0,
            "consumables": [{ "product_id": 3, "quantity": 4.5 }],
            "author": "Ana"
        }))
        .unwrap();
        assert!(request.validate().is_ok());
    }

    #[test]
    fn consumables_need_positive_quantities() {
        let request: PostOilChange = serde_json::from_value(serde_json::json!({
            "vehicle_id": 1,
            "next_due_threshold": 5000.0,
            "consumables": [{ "product_id": 3, "quantity": 0.0 }],
            "author": "Ana"
        }))
        .unwrap();
        assert!(request.validate().is_err());
    }

    #[test]
    fn low_stock_includes_the_minimum() {
        let product = Product {
            id: 1,
            name: "Engine oil 15W40".to_string(),
            category: "Lubricants".to_string(),
            unit: "L".to_string(),
            quantity: 10.0,
            minimum_stock: 10.0,
            created_at: NaiveDateTime::default(),
        };
        assert!(product.is_low_stock());
    }
}
