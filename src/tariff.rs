// ===============================
// src/tariff.rs
// ===============================
use rust_decimal::Decimal;
use thiserror::Error;

use crate::config::TariffConfig;
use crate::domain::{
    format_units, Bill, BillingPeriod, LineItem, LineKind, SharedCostInputs, TenantReading,
};

#[derive(Debug, Error, PartialEq)]
pub enum BillError {
    #[error("current reading {current} is below previous reading {previous}")]
    InvalidReading { previous: Decimal, current: Decimal },
    #[error("occupant count must be at least 1")]
    ZeroOccupants,
    #[error("tenant name is required")]
    MissingTenantName,
    #[error("{field} must not be negative")]
    NegativeAmount { field: &'static str },
    #[error("{0} is too large to compute")]
    Overflow(&'static str),
}

/// Menghitung tagihan satu penyewa. Murni, tanpa I/O.
#[derive(Debug, Clone)]
pub struct TariffCalculator {
    cfg: TariffConfig,
}

impl TariffCalculator {
    pub fn new(cfg: TariffConfig) -> Self {
        Self { cfg }
    }

    /// Shared inputs for one period, with rate and society charge taken from config.
    pub fn shared_inputs(&self, total_pump_cost: Decimal, occupant_count: u32) -> SharedCostInputs {
        SharedCostInputs {
            total_pump_cost,
            occupant_count,
            society_charge: self.cfg.society_charge,
            rate_per_unit: self.cfg.rate_per_unit,
        }
    }

    pub fn calculate(
        &self,
        period: &BillingPeriod,
        shared: &SharedCostInputs,
        reading: &TenantReading,
    ) -> Result<Bill, BillError> {
        validate(shared, reading)?;

        // 1) Units & electricity
        let units = reading.current_reading - reading.previous_reading;
        let electricity = units
            .checked_mul(shared.rate_per_unit)
            .ok_or(BillError::Overflow("electricity charge"))?;

        // 2) Pump share (occupants sudah divalidasi >= 1)
        let pump_share = shared
            .total_pump_cost
            .checked_div(Decimal::from(shared.occupant_count))
            .ok_or(BillError::ZeroOccupants)?;

        // 3) Line items, urutan tetap
        let mut items = vec![
            LineItem { kind: LineKind::Rent, label: "Rent".to_string(), amount: reading.rent },
            LineItem {
                kind: LineKind::Electricity,
                label: format!("Electricity ({} units)", format_units(units)),
                amount: electricity,
            },
            LineItem {
                kind: LineKind::PumpShare,
                label: "Submersible Share".to_string(),
                amount: pump_share,
            },
            LineItem {
                kind: LineKind::SocietyCharge,
                label: "Society Charge".to_string(),
                amount: shared.society_charge,
            },
        ];
        if reading.dues_carried_forward > Decimal::ZERO {
            items.push(LineItem {
                kind: LineKind::Arrears,
                label: "Arrears/Dues".to_string(),
                amount: reading.dues_carried_forward,
            });
        }

        let total = [shared.society_charge, pump_share, reading.rent, reading.dues_carried_forward]
            .into_iter()
            .try_fold(electricity, |acc, v| acc.checked_add(v))
            .ok_or(BillError::Overflow("total"))?;

        Ok(Bill { period: period.clone(), consumed_units: units, items, total })
    }
}

/// Input checks, dijalankan sebelum aritmatika apa pun.
pub fn validate(shared: &SharedCostInputs, reading: &TenantReading) -> Result<(), BillError> {
    if reading.tenant.name.trim().is_empty() {
        return Err(BillError::MissingTenantName);
    }
    let amounts = [
        ("previous reading", reading.previous_reading),
        ("current reading", reading.current_reading),
        ("rent", reading.rent),
        ("dues", reading.dues_carried_forward),
        ("pump bill", shared.total_pump_cost),
        ("society charge", shared.society_charge),
        ("rate per unit", shared.rate_per_unit),
    ];
    if let Some((field, _)) = amounts.iter().find(|(_, v)| *v < Decimal::ZERO) {
        return Err(BillError::NegativeAmount { field: *field });
    }
    if reading.current_reading < reading.previous_reading {
        return Err(BillError::InvalidReading {
            previous: reading.previous_reading,
            current: reading.current_reading,
        });
    }
    if shared.occupant_count == 0 {
        return Err(BillError::ZeroOccupants);
    }
    Ok(())
}
