//! Cart arithmetic. Pure values only; nothing here touches the database.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::errors::ServiceError;

/// Rounds a money amount to cents, half away from zero.
pub fn round_money(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct CartLine {
    pub product_id: Uuid,
    pub name: String,
    pub quantity: i32,
    pub unit_price: Decimal,
    /// Absolute discount on the whole line
    #[serde(default)]
    pub discount: Decimal,
}

impl CartLine {
    /// `unit_price × quantity − discount`, floored at zero.
    pub fn line_total(&self) -> Decimal {
        let gross = self.unit_price * Decimal::from(self.quantity);
        round_money((gross - self.discount).max(Decimal::ZERO))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Cart {
    pub lines: Vec<CartLine>,
    /// Order-level discount applied after line discounts
    #[serde(default)]
    pub discount: Decimal,
    #[serde(default)]
    pub tax_rate: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct PricedLine {
    pub product_id: Uuid,
    pub name: String,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub discount: Decimal,
    pub line_total: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct CartTotals {
    pub lines: Vec<PricedLine>,
    pub item_count: i32,
    pub subtotal: Decimal,
    pub discount: Decimal,
    pub tax_rate: Decimal,
    pub tax: Decimal,
    pub total: Decimal,
}

impl Cart {
    pub fn new(tax_rate: Decimal) -> Self {
        Self {
            lines: Vec::new(),
            discount: Decimal::ZERO,
            tax_rate,
        }
    }

    /// Adds a line, merging it into an existing line for the same product.
    pub fn add_line(&mut self, line: CartLine) {
        match self
            .lines
            .iter_mut()
            .find(|existing| existing.product_id == line.product_id)
        {
            Some(existing) => {
                existing.quantity += line.quantity;
                existing.discount += line.discount;
            }
            None => self.lines.push(line),
        }
    }

    pub fn with_discount(mut self, discount: Decimal) -> Self {
        self.discount = discount;
        self
    }

    pub fn item_count(&self) -> i32 {
        self.lines.iter().map(|l| l.quantity).sum()
    }

    fn validate(&self) -> Result<(), ServiceError> {
        if self.lines.is_empty() {
            return Err(ServiceError::ValidationError(
                "cart must contain at least one item".to_string(),
            ));
        }
        if self.tax_rate < Decimal::ZERO || self.tax_rate > Decimal::ONE {
            return Err(ServiceError::ValidationError(
                "tax rate must be between 0 and 1".to_string(),
            ));
        }
        if self.discount < Decimal::ZERO {
            return Err(ServiceError::ValidationError(
                "discount cannot be negative".to_string(),
            ));
        }
        for line in &self.lines {
            if line.quantity < 1 {
                return Err(ServiceError::ValidationError(format!(
                    "quantity for {} must be at least 1",
                    line.name
                )));
            }
            if line.unit_price < Decimal::ZERO || line.discount < Decimal::ZERO {
                return Err(ServiceError::ValidationError(format!(
                    "price and discount for {} cannot be negative",
                    line.name
                )));
            }
        }
        Ok(())
    }

    /// Prices the cart. Fails on empty carts, bad quantities and a
    /// discount larger than the subtotal.
    pub fn totals(&self) -> Result<CartTotals, ServiceError> {
        self.validate()?;

        let lines: Vec<PricedLine> = self
            .lines
            .iter()
            .map(|line| PricedLine {
                product_id: line.product_id,
                name: line.name.clone(),
                quantity: line.quantity,
                unit_price: line.unit_price,
                discount: line.discount,
                line_total: line.line_total(),
            })
            .collect();

        let subtotal: Decimal = lines.iter().map(|l| l.line_total).sum();
        let discount = round_money(self.discount);
        if discount > subtotal {
            return Err(ServiceError::ValidationError(format!(
                "discount {} exceeds subtotal {}",
                discount, subtotal
            )));
        }

        let tax = round_money((subtotal - discount) * self.tax_rate);
        let total = subtotal - discount + tax;

        Ok(CartTotals {
            lines,
            item_count: self.item_count(),
            subtotal,
            discount,
            tax_rate: self.tax_rate,
            tax,
            total,
        })
    }
}
