use codec::{Decode, Encode};
use primitive_types::U256;
use scale_info::TypeInfo;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::{
	common::{mul_div_floor, Amount, FeeGrowthQ128F128, Liquidity, SideMap, Tick},
	liquidity_math::{self, LiquidityDeltaError},
};

#[derive(Clone, Debug, Default, PartialEq, Eq, TypeInfo, Encode, Decode, Serialize, Deserialize)]
pub struct Position {
	pub liquidity: Liquidity,
	/// The fee growth inside the position's range as of the last change to the position, i.e.
	/// the growth the position has already been credited for
	pub fee_growth_inside_last: SideMap<FeeGrowthQ128F128>,
	/// Fees and burnt principal credited to the position but not yet collected
	pub tokens_owed: SideMap<Amount>,
}

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum PositionUpdateError {
	/// A zero-delta update (a "poke") of a position that holds no liquidity.
	#[error("position has no liquidity")]
	UninitializedPosition,
	#[error(transparent)]
	Liquidity(#[from] LiquidityDeltaError),
}

/// All positions, keyed by owner and tick range. A position is never removed once created, so
/// its fee growth snapshot survives its liquidity being burnt to zero.
#[derive(Clone, Debug, PartialEq, Eq, TypeInfo, Encode, Decode, Serialize, Deserialize)]
pub struct PositionStore<LP: Ord>(BTreeMap<(LP, Tick, Tick), Position>);

impl<LP: Clone + Ord> Default for PositionStore<LP> {
	fn default() -> Self {
		Self(Default::default())
	}
}

impl<LP: Clone + Ord> PositionStore<LP> {
	pub fn get(&self, lp: &LP, lower_tick: Tick, upper_tick: Tick) -> Option<&Position> {
		self.0.get(&(lp.clone(), lower_tick, upper_tick))
	}

	pub fn get_mut(
		&mut self,
		lp: &LP,
		lower_tick: Tick,
		upper_tick: Tick,
	) -> Option<&mut Position> {
		self.0.get_mut(&(lp.clone(), lower_tick, upper_tick))
	}

	/// Applies a liquidity delta to a position and credits it with the fees its liquidity
	/// earned since its last update, given the current fee growth inside its range.
	///
	/// The position is only mutated on success.
	pub fn update(
		&mut self,
		lp: &LP,
		lower_tick: Tick,
		upper_tick: Tick,
		liquidity_delta: i128,
		fee_growth_inside: SideMap<FeeGrowthQ128F128>,
	) -> Result<&mut Position, PositionUpdateError> {
		let key = (lp.clone(), lower_tick, upper_tick);
		let mut position = self.0.get(&key).cloned().unwrap_or_default();

		if liquidity_delta == 0 && position.liquidity == 0 {
			return Err(PositionUpdateError::UninitializedPosition)
		}
		let liquidity_next = liquidity_math::add_delta(position.liquidity, liquidity_delta)?;

		// Growth accumulators wrap mod 2^256, so the difference since the snapshot is exact
		// even across a wrap. As `tokens_owed` is a U256 the accrual itself cannot
		// meaningfully overflow, unlike the collect-before-it-wraps situation of a u128.
		position.tokens_owed = position.tokens_owed.map(|side, tokens_owed| {
			tokens_owed.saturating_add(mul_div_floor(
				fee_growth_inside[side]
					.overflowing_sub(position.fee_growth_inside_last[side])
					.0,
				position.liquidity.into(),
				U256::one() << 128,
			))
		});
		position.fee_growth_inside_last = fee_growth_inside;
		position.liquidity = liquidity_next;

		Ok(self.0.entry(key).and_modify(|p| *p = position.clone()).or_insert(position))
	}
}
