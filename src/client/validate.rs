//! Input checks run before anything is sent

use rust_decimal::Decimal;
use std::str::FromStr;

use super::{ClientError, ClientResult};

fn positive_amount(input: &str) -> Option<Decimal> {
    Decimal::from_str(input.trim())
        .ok()
        .filter(|v| *v > Decimal::ZERO)
}

/// Parse a provider's bid price
pub fn bid_price(input: &str) -> ClientResult<Decimal> {
    positive_amount(input)
        .ok_or_else(|| ClientError::Validation("Please enter a valid bid price".to_string()))
}

/// A parsed counter-offer against a bid
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CounterOfferDraft {
    pub amount: Decimal,
    pub bid_price: Decimal,
    /// Countering above the provider's own price is allowed but flagged
    pub exceeds_bid_price: bool,
}

impl CounterOfferDraft {
    /// Whether the submit affordance should be enabled
    pub fn can_submit(&self) -> bool {
        !self.exceeds_bid_price
    }

    pub fn warning(&self) -> Option<String> {
        self.exceeds_bid_price.then(|| {
            format!(
                "Your counter offer of Rs {} is higher than the bid of Rs {}",
                self.amount, self.bid_price
            )
        })
    }
}

/// Parse a customer's counter-offer amount
pub fn counter_offer(input: &str, bid_price: Decimal) -> ClientResult<CounterOfferDraft> {
    let amount = positive_amount(input).ok_or_else(|| {
        ClientError::Validation("Please enter a valid counter offer amount".to_string())
    })?;

    Ok(CounterOfferDraft {
        amount,
        bid_price,
        exceeds_bid_price: amount > bid_price,
    })
}
