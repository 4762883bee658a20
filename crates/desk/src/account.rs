//! Account value summaries.

use serde::{Deserialize, Serialize};

/// Totals over a customer's purchase history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountValue {
    pub customer_id: String,
    pub total_value: f64,
    pub average_purchase: f64,
    pub purchase_count: usize,
}

impl AccountValue {
    /// Sum and average `purchases`, both rounded to cents.
    ///
    /// An empty history yields zeros.
    pub fn calculate(customer_id: impl Into<String>, purchases: &[f64]) -> Self {
        let customer_id = customer_id.into();
        if purchases.is_empty() {
            return Self {
                customer_id,
                total_value: 0.0,
                average_purchase: 0.0,
                purchase_count: 0,
            };
        }

        let total: f64 = purchases.iter().sum();
        let average = total / purchases.len() as f64;

        Self {
            customer_id,
            total_value: round_cents(total),
            average_purchase: round_cents(average),
            purchase_count: purchases.len(),
        }
    }
}

/// Halves go to the even cent.
fn round_cents(value: f64) -> f64 {
    (value * 100.0).round_ties_even() / 100.0
}
