use actix_web::{get, web, HttpResponse};
use chrono::{Datelike, NaiveDate, NaiveDateTime, Utc};
use serde::Serialize;

use super::oil_changes::fetch_all_oil_changes;
use super::products::fetch_all_products;
use super::vehicles::fetch_all_vehicles;
use crate::error::AppResult;
use crate::maintenance::{
    chart_series, classify_fleet, sort_by_urgency, ChartPoint, MaintenanceSummary,
    VehicleMaintenance,
};
use crate::model::*;
use crate::AppState;

#[derive(Debug, Default, PartialEq, Serialize)]
pub struct VehicleCounts {
    pub total: usize,
    pub active: usize,
    pub maintenance: usize,
    pub inactive: usize,
}

impl VehicleCounts {
    pub fn from_vehicles(vehicles: &[Vehicle]) -> Self {
        let mut counts = Self {
            total: vehicles.len(),
            ..Self::default()
        };
        for vehicle in vehicles {
            match vehicle.status {
                VehicleStatus::Active => counts.active += 1,
                VehicleStatus::Maintenance => counts.maintenance += 1,
                VehicleStatus::Inactive => counts.inactive += 1,
            }
        }
        counts
    }
}

#[derive(Debug, Serialize)]
pub struct Dashboard {
    pub collaborators: i64,
    pub active_collaborators: i64,
    pub vehicles: VehicleCounts,
    pub products: usize,
    pub low_stock_products: Vec<Product>,
    pub entries_this_month: i64,
    pub exits_this_month: i64,
    pub maintenance: MaintenanceSummary,
    pub chart: Vec<ChartPoint>,
}

#[derive(Debug, Serialize)]
pub struct MaintenanceReport {
    pub summary: MaintenanceSummary,
    pub chart: Vec<ChartPoint>,
    pub vehicles: Vec<VehicleMaintenance>,
}

/// First instant of the month containing `now`.
pub fn month_start(now: NaiveDateTime) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(now.year(), now.month(), 1)
        .and_then(|day| day.and_hms_opt(0, 0, 0))
        .unwrap_or(now)
}

async fn maintenance_rows(
    data: &AppState,
    vehicles: &[Vehicle],
) -> AppResult<Vec<VehicleMaintenance>> {
    let updates = sqlx::query_as::<_, MeasurementUpdate>(
        r#"
        SELECT id, vehicle_id, previous_value, new_value, "timestamp", author, note
        FROM public.atualizacoes_km
        ORDER BY id
        "#,
    )
    .fetch_all(&data.db)
    .await?;
    let changes = fetch_all_oil_changes(&data.db).await?;

    let mut rows = classify_fleet(vehicles, &updates, &changes);
    sort_by_urgency(&mut rows);
    Ok(rows)
}

#[get("/dashboard")]
async fn get_dashboard(data: web::Data<AppState>) -> AppResult<HttpResponse> {
    let since = month_start(Utc::now().naive_utc());

    let (collaborators, active_collaborators): (i64, i64) = sqlx::query_as(
        "SELECT COUNT(*), COUNT(*) FILTER (WHERE active) FROM public.colaboradores",
    )
    .fetch_one(&data.db)
    .await?;
    let (entries_this_month,): (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM public.entradas WHERE created_at >= $1")
            .bind(since)
            .fetch_one(&data.db)
            .await?;
    let (exits_this_month,): (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM public.saidas WHERE created_at >= $1")
            .bind(since)
            .fetch_one(&data.db)
            .await?;

    let fleet = fetch_all_vehicles(&data.db).await?;
    let vehicles = VehicleCounts::from_vehicles(&fleet);
    let products = fetch_all_products(&data.db).await?;
    let product_count = products.len();
    let low_stock_products: Vec<Product> =
        products.into_iter().filter(Product::is_low_stock).collect();

    let maintenance = MaintenanceSummary::from_rows(&maintenance_rows(&data, &fleet).await?);

    Ok(HttpResponse::Ok().json(Dashboard {
        collaborators,
        active_collaborators,
        vehicles,
        products: product_count,
        low_stock_products,
        entries_this_month,
        exits_this_month,
        chart: chart_series(&maintenance),
        maintenance,
    }))
}

#[get("/dashboard/maintenance")]
async fn get_maintenance_report(data: web::Data<AppState>) -> AppResult<HttpResponse> {
    let fleet = fetch_all_vehicles(&data.db).await?;
    let rows = maintenance_rows(&data, &fleet).await?;
    let summary = MaintenanceSummary::from_rows(&rows);

    Ok(HttpResponse::Ok().json(MaintenanceReport {
        chart: chart_series(&summary),
        summary,
        vehicles: rows,
    }))
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(get_dashboard).service(get_maintenance_report);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vehicle(id: i32, status: VehicleStatus) -> Vehicle {
        Vehicle {
            id,
            plate: format!("PLT{:04}", id),
            model: "Hilux".to_string(),
            brand: "Toyota".to_string(),
            measurement_kind: MeasurementKind::Odometer,
            current_measurement: 0.0,
            status,
            created_at: NaiveDateTime::default(),
        }
    }

    #[test]
    fn vehicle_counts_split_by_status() {
        let counts = VehicleCounts::from_vehicles(&[
            vehicle(1, VehicleStatus::Active),
            vehicle(2, VehicleStatus::Active),
            vehicle(3, VehicleStatus::Maintenance),
            vehicle(4, VehicleStatus::Inactive),
        ]);

        assert_eq!(
            counts,
            VehicleCounts {
                total: 4,
                active: 2,
                maintenance: 1,
                inactive: 1,
            }
        );
    }

    #[test]
    fn month_start_truncates_to_the_first() {
        let now = NaiveDate::from_ymd_opt(2024, 2, 29)
            .unwrap()
            .and_hms_opt(17, 45, 12)
            .unwrap();
        let expected = NaiveDate::from_ymd_opt(2024, 2, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        assert_eq!(month_start(now), expected);
    }
}
