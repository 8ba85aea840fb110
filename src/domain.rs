// ===============================
// src/domain.rs
// ===============================
use chrono::{DateTime, Local};
use rust_decimal::{Decimal, RoundingStrategy};

/// Satu siklus tagihan, mis. "March 2025".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BillingPeriod { label: String }

impl BillingPeriod {
    pub fn new(label: impl Into<String>) -> Self {
        Self { label: label.into().trim().to_string() }
    }

    /// Default period when the operator does not type one: current month, e.g. "October 2026".
    pub fn current(now: DateTime<Local>) -> Self {
        Self::new(now.format("%B %Y").to_string())
    }

    pub fn label(&self) -> &str { &self.label }

    /// Label used for the remote month folder and the file name prefix.
    pub fn folder_label(&self) -> String { underscored(&self.label) }
}

#[derive(Debug, Clone)]
pub struct SharedCostInputs {
    pub total_pump_cost: Decimal,
    pub occupant_count: u32,
    pub society_charge: Decimal,
    pub rate_per_unit: Decimal,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TenantIdentity { pub id: String, pub name: String }

#[derive(Debug, Clone)]
pub struct TenantReading {
    pub tenant: TenantIdentity,
    pub previous_reading: Decimal,
    pub current_reading: Decimal,
    pub rent: Decimal,
    pub dues_carried_forward: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineKind { Rent, Electricity, PumpShare, SocietyCharge, Arrears }

#[derive(Debug, Clone, PartialEq)]
pub struct LineItem { pub kind: LineKind, pub label: String, pub amount: Decimal }

impl LineItem {
    pub fn display_amount(&self) -> String { format_money(self.amount) }
}

/// Derived bill. Never persisted; the rendered PDF is the only artifact.
#[derive(Debug, Clone)]
pub struct Bill {
    pub period: BillingPeriod,
    pub consumed_units: Decimal,
    pub items: Vec<LineItem>,
    pub total: Decimal,
}

impl Bill {
    pub fn item(&self, kind: LineKind) -> Option<&LineItem> {
        self.items.iter().find(|i| i.kind == kind)
    }

    pub fn has_arrears(&self) -> bool { self.item(LineKind::Arrears).is_some() }

    pub fn display_total(&self) -> String { format_money(self.total) }
}

/// Two decimals, half away from zero: 333.335 -> "333.34", 200 -> "200.00".
pub fn format_money(amount: Decimal) -> String {
    let rounded = amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    format!("{:.2}", rounded)
}

/// Meter units without trailing zeros: 50.0 -> "50", 12.50 -> "12.5".
pub fn format_units(units: Decimal) -> String { units.normalize().to_string() }

/// Satu komponen nama file: spasi, separator path dan karakter terlarang jadi `_`, `..` juga.
pub fn underscored(s: &str) -> String {
    s.trim()
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_whitespace() || c.is_control() => '_',
            c => c,
        })
        .collect::<String>()
        .replace("..", "_")
}
