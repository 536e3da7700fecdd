//! Maintenance-due classification.
//!
//! Everything here is a pure function over already-fetched rows. Handlers
//! load vehicles, the measurement log and the oil-change log, then call
//! [`classify_fleet`] on every request.

use std::collections::HashMap;

use chrono::NaiveDateTime;
use serde::Serialize;
use thiserror::Error;

use crate::model::{MeasurementKind, MeasurementUpdate, OilChange, Vehicle};

/// Share of the service interval after which a vehicle is flagged as due soon.
pub const DUE_SOON_FRACTION: f64 = 0.75;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MaintenanceBucket {
    Never,
    Overdue,
    DueSoon,
    UpToDate,
}

impl MaintenanceBucket {
    pub const ALL: [MaintenanceBucket; 4] = [
        MaintenanceBucket::Never,
        MaintenanceBucket::Overdue,
        MaintenanceBucket::DueSoon,
        MaintenanceBucket::UpToDate,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            MaintenanceBucket::Never => "Never serviced",
            MaintenanceBucket::Overdue => "Overdue",
            MaintenanceBucket::DueSoon => "Due soon",
            MaintenanceBucket::UpToDate => "Up to date",
        }
    }
}

/// Bucket plus the amount that goes with it.
///
/// `remaining` is `threshold - current` for due-soon and up-to-date
/// vehicles. For overdue vehicles it is `current - threshold`, i.e. how far
/// past the threshold the vehicle has run. It is `None` for `Never`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MaintenanceStatus {
    pub bucket: MaintenanceBucket,
    pub remaining: Option<f64>,
    pub consumed_fraction: Option<f64>,
}

impl MaintenanceStatus {
    pub const NEVER: MaintenanceStatus = MaintenanceStatus {
        bucket: MaintenanceBucket::Never,
        remaining: None,
        consumed_fraction: None,
    };
}

/// Classifies one vehicle given its current measurement and last service.
pub fn classify(current: f64, last_change: Option<&OilChange>) -> MaintenanceStatus {
    let change = match last_change {
        Some(change) => change,
        None => return MaintenanceStatus::NEVER,
    };

    let threshold = change.next_due_threshold;
    let interval = threshold - change.measurement_at_change;
    let consumed_fraction = if interval > 0.0 {
        (current - change.measurement_at_change) / interval
    } else {
        // Threshold at or below the service measurement: the interval is already used up.
        1.0
    };

    let remaining = threshold - current;
    if remaining <= 0.0 {
        return MaintenanceStatus {
            bucket: MaintenanceBucket::Overdue,
            remaining: Some(current - threshold),
            consumed_fraction: Some(consumed_fraction),
        };
    }

    let bucket = if consumed_fraction >= DUE_SOON_FRACTION {
        MaintenanceBucket::DueSoon
    } else {
        MaintenanceBucket::UpToDate
    };

    MaintenanceStatus {
        bucket,
        remaining: Some(remaining),
        consumed_fraction: Some(consumed_fraction),
    }
}

/// Picks the item with the greatest timestamp. Items without a timestamp
/// are skipped; on equal timestamps the later item in iteration order wins.
fn latest_by<'a, T, I, F>(items: I, timestamp: F) -> Option<&'a T>
where
    I: IntoIterator<Item = &'a T>,
    F: Fn(&T) -> Option<NaiveDateTime>,
{
    let mut latest: Option<(&'a T, NaiveDateTime)> = None;
    for item in items {
        let Some(at) = timestamp(item) else {
            continue;
        };
        match latest {
            Some((_, best)) if at < best => {}
            _ => latest = Some((item, at)),
        }
    }
    latest.map(|(item, _)| item)
}

/// Most recent measurement update in `updates`, if any has a usable timestamp.
pub fn latest_measurement<'a, I>(updates: I) -> Option<&'a MeasurementUpdate>
where
    I: IntoIterator<Item = &'a MeasurementUpdate>,
{
    latest_by(updates, |update| {
        update.new_value.is_finite().then_some(update.timestamp).flatten()
    })
}

/// Most recent oil change in `changes`, if any has a usable timestamp.
pub fn latest_oil_change<'a, I>(changes: I) -> Option<&'a OilChange>
where
    I: IntoIterator<Item = &'a OilChange>,
{
    latest_by(changes, |change| {
        let numbers_ok =
            change.measurement_at_change.is_finite() && change.next_due_threshold.is_finite();
        numbers_ok.then_some(change.changed_at).flatten()
    })
}

/// Current measurement for a vehicle: the newest update's value, or 0.
pub fn current_measurement<'a, I>(updates: I) -> f64
where
    I: IntoIterator<Item = &'a MeasurementUpdate>,
{
    latest_measurement(updates)
        .map(|update| update.new_value)
        .unwrap_or(0.0)
}

#[derive(Debug, Clone, Copy, PartialEq, Error)]
#[error("New measurement {new} is lower than the current {current}")]
pub struct MeasurementRegression {
    pub current: f64,
    pub new: f64,
}

/// Measurements only move forward; repeating the current value is allowed.
pub fn check_measurement_advance(current: f64, new: f64) -> Result<(), MeasurementRegression> {
    if new < current {
        Err(MeasurementRegression { current, new })
    } else {
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct VehicleMaintenance {
    pub vehicle_id: i32,
    pub plate: String,
    pub model: String,
    pub brand: String,
    pub measurement_kind: MeasurementKind,
    pub unit: &'static str,
    pub current_measurement: f64,
    pub last_change_at: Option<NaiveDateTime>,
    pub measurement_at_change: Option<f64>,
    pub next_due_threshold: Option<f64>,
    /// `consumed_fraction` as a percentage, for the detail table.
    pub consumed_percent: Option<f64>,
    #[serde(flatten)]
    pub status: MaintenanceStatus,
}

/// Classifies every vehicle in `vehicles` against the full logs.
pub fn classify_fleet(
    vehicles: &[Vehicle],
    updates: &[MeasurementUpdate],
    changes: &[OilChange],
) -> Vec<VehicleMaintenance> {
    let mut updates_by_vehicle: HashMap<i32, Vec<&MeasurementUpdate>> = HashMap::new();
    for update in updates {
        updates_by_vehicle.entry(update.vehicle_id).or_default().push(update);
    }
    let mut changes_by_vehicle: HashMap<i32, Vec<&OilChange>> = HashMap::new();
    for change in changes {
        changes_by_vehicle.entry(change.vehicle_id).or_default().push(change);
    }

    vehicles
        .iter()
        .map(|vehicle| {
            let current = updates_by_vehicle
                .get(&vehicle.id)
                .map(|list| current_measurement(list.iter().copied()))
                .unwrap_or(0.0);
            let last_change = changes_by_vehicle
                .get(&vehicle.id)
                .and_then(|list| latest_oil_change(list.iter().copied()));

            let status = classify(current, last_change);

            VehicleMaintenance {
                vehicle_id: vehicle.id,
                plate: vehicle.plate.clone(),
                model: vehicle.model.clone(),
                brand: vehicle.brand.clone(),
                measurement_kind: vehicle.measurement_kind,
                unit: vehicle.measurement_kind.unit(),
                current_measurement: current,
                last_change_at: last_change.and_then(|c| c.changed_at),
                measurement_at_change: last_change.map(|c| c.measurement_at_change),
                next_due_threshold: last_change.map(|c| c.next_due_threshold),
                consumed_percent: status.consumed_fraction.map(|fraction| fraction * 100.0),
                status,
            }
        })
        .collect()
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MaintenanceSummary {
    pub never: usize,
    pub overdue: usize,
    pub due_soon: usize,
    pub up_to_date: usize,
}

impl MaintenanceSummary {
    pub fn from_rows(rows: &[VehicleMaintenance]) -> Self {
        let mut summary = Self::default();
        for row in rows {
            *summary.slot(row.status.bucket) += 1;
        }
        summary
    }

    fn slot(&mut self, bucket: MaintenanceBucket) -> &mut usize {
        match bucket {
            MaintenanceBucket::Never => &mut self.never,
            MaintenanceBucket::Overdue => &mut self.overdue,
            MaintenanceBucket::DueSoon => &mut self.due_soon,
            MaintenanceBucket::UpToDate => &mut self.up_to_date,
        }
    }

    pub fn count(&self, bucket: MaintenanceBucket) -> usize {
        match bucket {
            MaintenanceBucket::Never => self.never,
            MaintenanceBucket::Overdue => self.overdue,
            MaintenanceBucket::DueSoon => self.due_soon,
            MaintenanceBucket::UpToDate => self.up_to_date,
        }
    }

    pub fn needs_attention(&self) -> usize {
        self.overdue + self.due_soon
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartPoint {
    pub bucket: MaintenanceBucket,
    pub label: &'static str,
    pub count: usize,
}

pub fn chart_series(summary: &MaintenanceSummary) -> Vec<ChartPoint> {
    MaintenanceBucket::ALL
        .iter()
        .map(|bucket| ChartPoint {
            bucket: *bucket,
            label: bucket.label(),
            count: summary.count(*bucket),
        })
        .collect()
}

/// Detail table order: most urgent first, then by plate.
pub fn sort_by_urgency(rows: &mut [VehicleMaintenance]) {
    fn rank(bucket: MaintenanceBucket) -> u8 {
        match bucket {
            MaintenanceBucket::Overdue => 0,
            MaintenanceBucket::DueSoon => 1,
            MaintenanceBucket::Never => 2,
            MaintenanceBucket::UpToDate => 3,
        }
    }
    rows.sort_by(|a, b| {
        rank(a.status.bucket)
            .cmp(&rank(b.status.bucket))
            .then_with(|| a.plate.cmp(&b.plate))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::VehicleStatus;
    use chrono::NaiveDate;
    use sqlx::types::Json;

    fn at(day: u32, hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, day)
            .unwrap()
            .and_hms_opt(hour, 0, 0)
            .unwrap()
    }

    fn vehicle(id: i32, plate: &str) -> Vehicle {
        Vehicle {
            id,
            plate: plate.to_string(),
            model: "Strada".to_string(),
            brand: "Fiat".to_string(),
            measurement_kind: MeasurementKind::Odometer,
            current_measurement: 0.0,
            status: VehicleStatus::Active,
            created_at: at(1, 8),
        }
    }

    fn update(id: i32, vehicle_id: i32, value: f64, ts: Option<NaiveDateTime>) -> MeasurementUpdate {
        MeasurementUpdate {
            id,
            vehicle_id,
            previous_value: 0.0,
            new_value: value,
            timestamp: ts,
            author: "Ana".to_string(),
            note: None,
        }
    }

    fn change(
        id: i32,
        vehicle_id: i32,
        at_change: f64,
        threshold: f64,
        ts: Option<NaiveDateTime>,
    ) -> OilChange {
        OilChange {
            id,
            vehicle_id,
            changed_at: ts,
            measurement_at_change: at_change,
            next_due_threshold: threshold,
            consumables: Json(Vec::new()),
            author: "Ana".to_string(),
            note: None,
        }
    }

    #[test]
    fn no_oil_change_is_never() {
        assert_eq!(classify(50_000.0, None), MaintenanceStatus::NEVER);
    }

    #[test]
    fn reaching_the_threshold_is_overdue() {
        let last = change(1, 1, 0.0, 10_000.0, Some(at(1, 8)));

        let status = classify(10_000.0, Some(&last));
        assert_eq!(status.bucket, MaintenanceBucket::Overdue);
        assert_eq!(status.remaining, Some(0.0));

        let status = classify(10_750.0, Some(&last));
        assert_eq!(status.bucket, MaintenanceBucket::Overdue);
        assert_eq!(status.remaining, Some(750.0));
    }

    #[test]
    fn eighty_percent_consumed_is_due_soon() {
        let last = change(1, 1, 0.0, 10_000.0, Some(at(1, 8)));
        let status = classify(8_000.0, Some(&last));

        assert_eq!(status.bucket, MaintenanceBucket::DueSoon);
        assert_eq!(status.remaining, Some(2_000.0));
        assert_eq!(status.consumed_fraction, Some(0.8));
    }

    #[test]
    fn due_soon_starts_at_exactly_three_quarters() {
        let last = change(1, 1, 20_000.0, 30_000.0, Some(at(1, 8)));

        assert_eq!(classify(27_500.0, Some(&last)).bucket, MaintenanceBucket::DueSoon);
        assert_eq!(classify(27_499.0, Some(&last)).bucket, MaintenanceBucket::UpToDate);
    }

    #[test]
    fn below_three_quarters_is_up_to_date() {
        let last = change(1, 1, 1_200.0, 1_450.0, Some(at(1, 8)));
        let status = classify(1_300.0, Some(&last));

        assert_eq!(status.bucket, MaintenanceBucket::UpToDate);
        assert_eq!(status.remaining, Some(150.0));
    }

    #[test]
    fn degenerate_interval_is_not_up_to_date() {
        let last = change(1, 1, 500.0, 400.0, Some(at(1, 8)));
        assert_eq!(classify(300.0, Some(&last)).bucket, MaintenanceBucket::DueSoon);
    }

    #[test]
    fn latest_oil_change_wins() {
        let older = change(1, 1, 0.0, 5_000.0, Some(at(2, 9)));
        let newer = change(2, 1, 4_900.0, 14_900.0, Some(at(20, 9)));
        let changes = vec![newer.clone(), older];

        assert_eq!(latest_oil_change(&changes).map(|c| c.id), Some(2));

        let rows = classify_fleet(
            &[vehicle(1, "ABC1D23")],
            &[update(1, 1, 6_000.0, Some(at(21, 9)))],
            &changes,
        );
        assert_eq!(rows[0].status.bucket, MaintenanceBucket::UpToDate);
        assert_eq!(rows[0].next_due_threshold, Some(14_900.0));
    }

    #[test]
    fn missing_dates_are_skipped() {
        let dated = change(1, 1, 0.0, 10_000.0, Some(at(2, 9)));
        let undated = change(2, 1, 9_000.0, 19_000.0, None);
        let changes = vec![dated, undated];

        assert_eq!(latest_oil_change(&changes).map(|c| c.id), Some(1));

        let updates = vec![update(1, 1, 100.0, Some(at(3, 9))), update(2, 1, 999.0, None)];
        assert_eq!(current_measurement(&updates), 100.0);
    }

    #[test]
    fn equal_timestamps_prefer_the_later_row() {
        let updates = vec![
            update(1, 1, 100.0, Some(at(3, 9))),
            update(2, 1, 180.0, Some(at(3, 9))),
        ];
        assert_eq!(latest_measurement(&updates).map(|u| u.id), Some(2));
    }

    #[test]
    fn lower_measurement_is_rejected() {
        let err = check_measurement_advance(15_200.0, 15_100.0).unwrap_err();
        assert_eq!(
            err,
            MeasurementRegression {
                current: 15_200.0,
                new: 15_100.0,
            }
        );
        assert_eq!(
            err.to_string(),
            "New measurement 15100 is lower than the current 15200"
        );
    }

    #[test]
    fn equal_or_higher_measurement_is_accepted() {
        assert!(check_measurement_advance(15_200.0, 15_200.0).is_ok());
        assert!(check_measurement_advance(15_200.0, 15_201.5).is_ok());
        assert!(check_measurement_advance(0.0, 0.0).is_ok());
    }

    #[test]
    fn removing_the_latest_update_falls_back_to_the_previous_one() {
        let mut updates = vec![
            update(1, 1, 1_000.0, Some(at(3, 9))),
            update(2, 1, 1_400.0, Some(at(4, 9))),
        ];
        assert_eq!(current_measurement(&updates), 1_400.0);

        updates.retain(|u| u.id != 2);
        assert_eq!(current_measurement(&updates), 1_000.0);

        updates.clear();
        assert_eq!(current_measurement(&updates), 0.0);
    }

    #[test]
    fn current_measurement_defaults_to_zero() {
        let updates: Vec<MeasurementUpdate> = Vec::new();
        assert_eq!(current_measurement(&updates), 0.0);
    }

    #[test]
    fn fleet_summary_counts_each_bucket() {
        let vehicles = vec![
            vehicle(1, "AAA0001"),
            vehicle(2, "BBB0002"),
            vehicle(3, "CCC0003"),
            vehicle(4, "DDD0004"),
        ];
        let updates = vec![
            update(1, 2, 12_000.0, Some(at(5, 9))),
            update(2, 3, 8_000.0, Some(at(5, 9))),
            update(3, 4, 1_000.0, Some(at(5, 9))),
        ];
        let changes = vec![
            change(1, 2, 0.0, 10_000.0, Some(at(1, 9))),
            change(2, 3, 0.0, 10_000.0, Some(at(1, 9))),
            change(3, 4, 0.0, 10_000.0, Some(at(1, 9))),
        ];

        let mut rows = classify_fleet(&vehicles, &updates, &changes);
        let summary = MaintenanceSummary::from_rows(&rows);
        assert_eq!(
            summary,
            MaintenanceSummary {
                never: 1,
                overdue: 1,
                due_soon: 1,
                up_to_date: 1,
            }
        );
        assert_eq!(summary.needs_attention(), 2);

        sort_by_urgency(&mut rows);
        let plates: Vec<&str> = rows.iter().map(|r| r.plate.as_str()).collect();
        assert_eq!(plates, ["BBB0002", "CCC0003", "AAA0001", "DDD0004"]);

        let chart = chart_series(&summary);
        assert_eq!(chart.len(), 4);
        assert!(chart.iter().all(|point| point.count == 1));
    }

    #[test]
    fn detail_rows_serialize_flat() {
        let rows = classify_fleet(&[vehicle(1, "ABC1D23")], &[], &[]);
        let json = serde_json::to_value(&rows[0]).unwrap();

        assert_eq!(json["bucket"], "never");
        assert_eq!(json["unit"], "km");
        assert!(json["remaining"].is_null());
        assert!(json["consumed_percent"].is_null());
    }

    #[test]
    fn detail_rows_carry_the_consumed_percentage() {
        let rows = classify_fleet(
            &[vehicle(1, "ABC1D23")],
            &[update(1, 1, 2_500.0, Some(at(5, 9)))],
            &[change(1, 1, 0.0, 10_000.0, Some(at(1, 9)))],
        );

        assert_eq!(rows[0].consumed_percent, Some(25.0));
        let json = serde_json::to_value(&rows[0]).unwrap();
        assert_eq!(json["consumed_percent"], 25.0);
        assert_eq!(json["bucket"], "up_to_date");
    }
}
