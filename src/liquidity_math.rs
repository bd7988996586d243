use crate::common::Liquidity;

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum LiquidityDeltaError {
	/// Adding the delta would exceed `u128::MAX`.
	#[error("liquidity overflow")]
	Overflow,
	/// Subtracting the delta would go below zero.
	#[error("liquidity underflow")]
	Underflow,
}

/// Applies a signed liquidity delta to an unsigned liquidity amount.
pub fn add_delta(liquidity: Liquidity, delta: i128) -> Result<Liquidity, LiquidityDeltaError> {
	if delta < 0 {
		liquidity.checked_sub(delta.unsigned_abs()).ok_or(LiquidityDeltaError::Underflow)
	} else {
		liquidity.checked_add(delta as u128).ok_or(LiquidityDeltaError::Overflow)
	}
}
