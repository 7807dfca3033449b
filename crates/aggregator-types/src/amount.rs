//! Conversion between human-readable amounts and smallest-unit integers.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use thiserror::Error;

/// Largest precision a `Decimal` can scale by.
const MAX_DECIMALS: u8 = 28;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AmountError {
	#[error("Amount must not be negative: {0}")]
	Negative(Decimal),
	#[error("Amount {amount} does not fit {decimals} decimals")]
	Overflow { amount: String, decimals: u8 },
}

/// Converts a human-readable amount into smallest-unit precision.
///
/// Digits below the smallest unit are truncated.
pub fn to_raw_amount(amount: Decimal, decimals: u8) -> Result<u128, AmountError> {
	if amount.is_sign_negative() && !amount.is_zero() {
		return Err(AmountError::Negative(amount));
	}

	let overflow = || AmountError::Overflow {
		amount: amount.to_string(),
		decimals,
	};

	if decimals > MAX_DECIMALS {
		return Err(overflow());
	}

	let factor = Decimal::try_from_i128_with_scale(10i128.pow(decimals as u32), 0)
		.map_err(|_| overflow())?;

	amount
		.checked_mul(factor)
		.and_then(|scaled| scaled.trunc().to_u128())
		.ok_or_else(overflow)
}

/// Converts a smallest-unit amount back into its human-readable form.
pub fn format_raw_amount(raw: u128, decimals: u8) -> Result<Decimal, AmountError> {
	let overflow = || AmountError::Overflow {
		amount: raw.to_string(),
		decimals,
	};

	if decimals > MAX_DECIMALS {
		return Err(overflow());
	}

	let raw = i128::try_from(raw).map_err(|_| overflow())?;
	Decimal::try_from_i128_with_scale(raw, decimals as u32)
		.map(|value| value.normalize())
		.map_err(|_| overflow())
}
