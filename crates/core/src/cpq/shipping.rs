//! Vehicle-based delivery cost estimate and the company/customer split.

use serde::{Deserialize, Serialize};

use crate::errors::DomainError;

pub const FUEL_PRICE_PER_LITRE: f64 = 32.0;
pub const DRIVER_HOURLY_RATE: f64 = 72.0;
pub const STAFF_HOURLY_RATE: f64 = 55.0;
pub const COMPANY_SUBSIDY_SHARE: f64 = 0.05;

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct VehicleProfile {
    pub code: &'static str,
    pub fuel_km_per_litre: f64,
    pub average_speed_kmh: f64,
    pub fixed_cost_per_hour: f64,
}

const VEHICLES: [VehicleProfile; 6] = [
    VehicleProfile { code: "PICKUP", fuel_km_per_litre: 10.0, average_speed_kmh: 50.0, fixed_cost_per_hour: 36.0 },
    VehicleProfile { code: "4_WHEEL_LARGE", fuel_km_per_litre: 9.5, average_speed_kmh: 45.0, fixed_cost_per_hour: 46.0 },
    VehicleProfile { code: "6_WHEEL_MINI", fuel_km_per_litre: 9.0, average_speed_kmh: 45.0, fixed_cost_per_hour: 58.0 },
    VehicleProfile { code: "6_WHEEL_SMALL", fuel_km_per_litre: 7.0, average_speed_kmh: 45.0, fixed_cost_per_hour: 74.0 },
    VehicleProfile { code: "6_WHEEL_LARGE", fuel_km_per_litre: 5.0, average_speed_kmh: 45.0, fixed_cost_per_hour: 90.0 },
    VehicleProfile { code: "10_WHEEL", fuel_km_per_litre: 4.5, average_speed_kmh: 40.0, fixed_cost_per_hour: 148.0 },
];

/// Thai fleet names used by the sales team.
const VEHICLE_ALIASES: [(&str, &str); 5] = [
    ("4 ล้อใหญ่", "4_WHEEL_LARGE"),
    ("6 ล้อจิ๋ว", "6_WHEEL_MINI"),
    ("6 ล้อเล็ก", "6_WHEEL_SMALL"),
    ("6 ล้อใหญ่", "6_WHEEL_LARGE"),
    ("10 ล้อ", "10_WHEEL"),
];

impl VehicleProfile {
    pub fn lookup(vehicle_type: &str) -> Option<&'static VehicleProfile> {
        let key = vehicle_type.trim().to_uppercase();
        let code = VEHICLE_ALIASES
            .iter()
            .find(|(alias, _)| *alias == key)
            .map(|(_, code)| *code)
            .unwrap_or(key.as_str());
        VEHICLES.iter().find(|vehicle| vehicle.code == code)
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct ShippingRequest {
    pub vehicle_type: String,
    pub distance_km: f64,
    pub unload_hours: f64,
    pub staff_count: u32,
    pub profit: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ShippingEstimate {
    pub vehicle_type: String,
    pub travel_hours: f64,
    pub fuel_cost: f64,
    pub fix_cost: f64,
    pub labor_cost: f64,
    pub shipping_cost: f64,
    pub shipping_cap: f64,
    pub company_pay: f64,
    pub customer_pay: f64,
}

pub fn estimate(request: &ShippingRequest) -> Result<ShippingEstimate, DomainError> {
    let vehicle = VehicleProfile::lookup(&request.vehicle_type).ok_or_else(|| {
        DomainError::Validation(format!("unknown vehicle type: {}", request.vehicle_type))
    })?;
    if !(request.distance_km.is_finite() && request.distance_km >= 0.0) {
        return Err(DomainError::Validation("distance_km must be zero or positive".to_string()));
    }
    if !(request.unload_hours.is_finite() && request.unload_hours >= 0.0) {
        return Err(DomainError::Validation("unload_hours must be zero or positive".to_string()));
    }

    let travel_hours = request.distance_km / vehicle.average_speed_kmh;
    let hours_on_job = travel_hours + request.unload_hours;
    let fuel_cost = request.distance_km / vehicle.fuel_km_per_litre * FUEL_PRICE_PER_LITRE;
    let fix_cost = hours_on_job * vehicle.fixed_cost_per_hour;
    let labor_cost =
        (DRIVER_HOURLY_RATE + STAFF_HOURLY_RATE * f64::from(request.staff_count)) * hours_on_job;
    let shipping_cost = fuel_cost + fix_cost + labor_cost;

    let shipping_cap = if request.profit.is_finite() { request.profit * COMPANY_SUBSIDY_SHARE } else { 0.0 };
    let company_pay = shipping_cost.min(shipping_cap);
    let customer_pay = (shipping_cost - company_pay).max(0.0);

    Ok(ShippingEstimate {
        vehicle_type: vehicle.code.to_string(),
        travel_hours: round2(travel_hours),
        fuel_cost: round2(fuel_cost),
        fix_cost: round2(fix_cost),
        labor_cost: round2(labor_cost),
        shipping_cost: round2(shipping_cost),
        shipping_cap: round2(shipping_cap),
        company_pay: round2(company_pay),
        customer_pay: round2(customer_pay),
    })
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::{estimate, ShippingRequest};
    use crate::errors::DomainError;

    fn request(vehicle: &str, profit: f64) -> ShippingRequest {
        ShippingRequest {
            vehicle_type: vehicle.to_string(),
            distance_km: 50.0,
            unload_hours: 1.0,
            staff_count: 2,
            profit,
        }
    }

    #[test]
    fn pickup_cost_is_split_against_profit_cap() {
        let estimate = estimate(&request("pickup", 4000.0)).expect("known vehicle");

        assert_eq!(estimate.vehicle_type, "PICKUP");
        assert_eq!(estimate.travel_hours, 1.0);
        assert_eq!(estimate.fuel_cost, 160.0);
        assert_eq!(estimate.fix_cost, 72.0);
        assert_eq!(estimate.labor_cost, 364.0);
        assert_eq!(estimate.shipping_cost, 596.0);
        assert_eq!(estimate.shipping_cap, 200.0);
        assert_eq!(estimate.company_pay, 200.0);
        assert_eq!(estimate.customer_pay, 396.0);
    }

    #[test]
    fn large_profit_absorbs_whole_cost() {
        let estimate = estimate(&request("10 ล้อ", 1_000_000.0)).expect("thai alias");
        assert_eq!(estimate.vehicle_type, "10_WHEEL");
        assert_eq!(estimate.customer_pay, 0.0);
        assert_eq!(estimate.company_pay, estimate.shipping_cost);
    }

    #[test]
    fn unknown_vehicle_is_a_validation_error() {
        let error = estimate(&request("hovercraft", 10.0)).expect_err("unknown vehicle");
        assert!(matches!(error, DomainError::Validation(message) if message.contains("hovercraft")));
    }
}
