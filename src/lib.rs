// Copyright 2025 Chainflip Labs GmbH
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

//! A concentrated liquidity pool engine for a pair of assets. Liquidity providers hold
//! positions over tick ranges, swaps move the pool's sqrt price through those ranges, and a
//! circular observation buffer records the pool's price history for time-weighted queries.
//!
//! The engine owns no assets itself: asset movements are delegated to a [`PaymentHandler`],
//! and the engine verifies the pool's balances grew by what it is owed before committing any
//! state. All fallible operations are atomic over the engine's state.


use codec::{Decode, Encode};
use primitive_types::U256;
use scale_info::TypeInfo;
use serde::{Deserialize, Serialize};

pub mod common;
pub mod liquidity_math;
pub mod oracle;
pub mod positions;
pub mod swap_math;
pub mod ticks;

use common::{
	is_sqrt_price_valid, max_liquidity_per_tick, mul_div_floor, sqrt_price_at_tick,
	tick_at_sqrt_price, Amount, FeeGrowthQ128F128, Liquidity, Side, SideMap, SqrtPriceQ64F96,
	Tick, MAX_LP_FEE, MAX_SQRT_PRICE, MAX_TICK, MIN_SQRT_PRICE, MIN_TICK,
};
use oracle::OracleBuffer;
use positions::{Position, PositionStore, PositionUpdateError};
use swap_math::{
	compute_swap_step, one_amount_delta_ceil, one_amount_delta_floor, zero_amount_delta_ceil,
	zero_amount_delta_floor, AmountSpecified, OneToZero, SwapDirection, ZeroToOne,
};
use ticks::{TickInfo, TickTable};

/// Settlement callback for all asset movements between the pool and the outside world. The
/// engine is optimistic: it pays out first, requests payment second, and then verifies the
/// pool's balances. If verification fails the engine's state is rolled back, but any transfers
/// the handler already made are the handler's to unwind.
pub trait PaymentHandler<LP> {
	/// The pool's current balance of one side of the pair
	fn balance(&self, side: Side) -> Amount;
	/// Called with the amounts the caller owes the pool
	fn pay(&mut self, amounts: SideMap<Amount>);
	/// Transfers an amount from the pool to the recipient
	fn payout(&mut self, recipient: &LP, side: Side, amount: Amount);
}

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum NewError {
	/// Fee must be between 0 - 50%
	#[error("invalid fee amount")]
	InvalidFeeAmount,
	#[error("tick spacing must be positive")]
	InvalidTickSpacing,
}

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum InitializeError {
	#[error("pool is already initialized")]
	AlreadyInitialized,
	#[error("initial sqrt price is out of range")]
	PriceOutOfRange,
}

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum MintError {
	#[error("pool is not initialized")]
	NotInitialized,
	#[error("pool is locked")]
	Locked,
	#[error("invalid tick range")]
	InvalidTickRange,
	#[error("liquidity delta must be nonzero")]
	ZeroLiquidityDelta,
	/// The mint would overflow the pool's total liquidity, or one of the range's ticks would
	/// exceed the maximum gross liquidity per tick
	#[error("liquidity overflow")]
	LiquidityOverflow,
	/// The payment handler did not pay the owed amounts into the pool
	#[error("insufficient payment")]
	InsufficientPayment,
}

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum BurnError {
	#[error("pool is not initialized")]
	NotInitialized,
	#[error("pool is locked")]
	Locked,
	#[error("invalid tick range")]
	InvalidTickRange,
	/// The position does not exist or holds no liquidity
	#[error("position has no liquidity")]
	UninitializedPosition,
	#[error("liquidity underflow")]
	LiquidityUnderflow,
}

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum CollectError {
	#[error("pool is not initialized")]
	NotInitialized,
	#[error("pool is locked")]
	Locked,
}

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum SwapError {
	#[error("pool is not initialized")]
	NotInitialized,
	#[error("pool is locked")]
	Locked,
	#[error("swap amount must be nonzero")]
	ZeroAmount,
	/// The price limit must be strictly between the current price and the directional price
	/// bound
	#[error("invalid price limit")]
	InvalidPriceLimit,
	/// The payment handler did not pay the swap input into the pool
	#[error("insufficient payment")]
	InsufficientPayment,
}

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum ObserveError {
	#[error("pool is not initialized")]
	NotInitialized,
	#[error(transparent)]
	Oracle(#[from] oracle::ObserveError),
}

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum GrowObservationsError {
	#[error("pool is not initialized")]
	NotInitialized,
	#[error("pool is locked")]
	Locked,
}

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum SetFeeProtocolError {
	#[error("pool is not initialized")]
	NotInitialized,
	#[error("pool is locked")]
	Locked,
	/// Each side's denominator must be zero or between 4 and 10 inclusive
	#[error("invalid protocol fee")]
	InvalidFeeProtocol,
}

/// A single two-asset concentrated liquidity pool.
///
/// The pool has no internal clock: every time-dependent operation takes the current time as a
/// `u32` seconds value, which the caller must supply monotonically (modulo u32 wrap).
#[derive(Clone, Debug, PartialEq, Eq, TypeInfo, Encode, Decode, Serialize, Deserialize)]
pub struct PoolEngine<LiquidityProvider: Clone + Ord> {
	fee_hundredth_pips: u32,
	/// Packed per-side protocol fee denominators: side zero in the low nibble, side one in the
	/// high nibble. Zero disables the protocol's cut of that side's swap fees.
	fee_protocol: u8,
	tick_spacing: Tick,
	/// Zero while the pool is uninitialized
	current_sqrt_price: SqrtPriceQ64F96,
	current_tick: Tick,
	current_liquidity: Liquidity,
	fee_growth_global: SideMap<FeeGrowthQ128F128>,
	protocol_fees: SideMap<Amount>,
	ticks: TickTable,
	positions: PositionStore<LiquidityProvider>,
	observations: OracleBuffer,
	unlocked: bool,
}

/// The tick search direction and post-crossing tick of a swap direction.
trait SwapLoopDirection: SwapDirection {
	/// Whether the price decreases as the swap progresses, which is also whether the next
	/// initialized tick is searched for at-or-below the current tick.
	const ZERO_FOR_ONE: bool;

	/// The current tick is always the closest tick at or below the current sqrt price, so the
	/// two directions land on different ticks when crossing the same boundary.
	fn current_tick_after_crossing_tick(tick: Tick) -> Tick;
}
impl SwapLoopDirection for ZeroToOne {
	const ZERO_FOR_ONE: bool = true;

	fn current_tick_after_crossing_tick(tick: Tick) -> Tick {
		tick - 1
	}
}
impl SwapLoopDirection for OneToZero {
	const ZERO_FOR_ONE: bool = false;

	fn current_tick_after_crossing_tick(tick: Tick) -> Tick {
		tick
	}
}

impl<LiquidityProvider: Clone + Ord> PoolEngine<LiquidityProvider> {
	/// Creates a new pool with the specified fee and tick spacing. The pool cannot be used
	/// until its initial price is set with [`Self::initialize`].
	///
	/// This function never panics
	pub fn new(fee_hundredth_pips: u32, tick_spacing: Tick) -> Result<Self, NewError> {
		(fee_hundredth_pips <= MAX_LP_FEE)
			.then_some(())
			.ok_or(NewError::InvalidFeeAmount)?;
		(tick_spacing > 0).then_some(()).ok_or(NewError::InvalidTickSpacing)?;

		Ok(Self {
			fee_hundredth_pips,
			fee_protocol: 0,
			tick_spacing,
			current_sqrt_price: SqrtPriceQ64F96::zero(),
			current_tick: 0,
			current_liquidity: 0,
			fee_growth_global: Default::default(),
			protocol_fees: Default::default(),
			ticks: TickTable::new(tick_spacing, max_liquidity_per_tick(tick_spacing)),
			positions: Default::default(),
			// Replaced on initialization, when the pool's creation time is known.
			observations: OracleBuffer::new(0),
			unlocked: false,
		})
	}

	/// Sets the pool's initial price and records the first observation.
	pub fn initialize(
		&mut self,
		sqrt_price: SqrtPriceQ64F96,
		time: u32,
	) -> Result<(), InitializeError> {
		if self.is_initialized() {
			return Err(InitializeError::AlreadyInitialized)
		}
		is_sqrt_price_valid(sqrt_price)
			.then_some(())
			.ok_or(InitializeError::PriceOutOfRange)?;

		self.current_sqrt_price = sqrt_price;
		self.current_tick = tick_at_sqrt_price(sqrt_price);
		self.observations = OracleBuffer::new(time);
		self.unlocked = true;

		tracing::debug!(
			sqrt_price = %self.current_sqrt_price,
			tick = self.current_tick,
			"pool initialized",
		);
		Ok(())
	}

	pub fn is_initialized(&self) -> bool {
		!self.current_sqrt_price.is_zero()
	}

	/// Adds liquidity to a position, charging the owner the amounts (rounded up) that
	/// liquidity is worth at the current price via the payment handler.
	///
	/// If this function returns an `Err(_)` no engine state changes have occurred
	pub fn mint(
		&mut self,
		handler: &mut impl PaymentHandler<LiquidityProvider>,
		lp: &LiquidityProvider,
		lower_tick: Tick,
		upper_tick: Tick,
		liquidity: Liquidity,
		time: u32,
	) -> Result<SideMap<Amount>, MintError> {
		if !self.is_initialized() {
			return Err(MintError::NotInitialized)
		}
		if !self.unlocked {
			return Err(MintError::Locked)
		}
		self.unlocked = false;
		let result = self.inner_mint(handler, lp, lower_tick, upper_tick, liquidity, time);
		self.unlocked = true;
		result
	}

	fn inner_mint(
		&mut self,
		handler: &mut impl PaymentHandler<LiquidityProvider>,
		lp: &LiquidityProvider,
		lower_tick: Tick,
		upper_tick: Tick,
		liquidity: Liquidity,
		time: u32,
	) -> Result<SideMap<Amount>, MintError> {
		self.validate_position_range(lower_tick, upper_tick)
			.map_err(|()| MintError::InvalidTickRange)?;
		if liquidity == 0 {
			return Err(MintError::ZeroLiquidityDelta)
		}
		let liquidity_delta =
			i128::try_from(liquidity).map_err(|_| MintError::LiquidityOverflow)?;

		let mut scratch = self.clone();
		let amounts = scratch
			.modify_position(lp, lower_tick, upper_tick, liquidity_delta, time)
			// A positive delta can only fail by exceeding a liquidity bound.
			.map_err(|_| MintError::LiquidityOverflow)?;

		let balances_before =
			SideMap::from_array([handler.balance(Side::Zero), handler.balance(Side::One)]);
		handler.pay(amounts);
		for side in [Side::Zero, Side::One] {
			if handler.balance(side) < balances_before[side].saturating_add(amounts[side]) {
				return Err(MintError::InsufficientPayment)
			}
		}

		*self = scratch;
		tracing::debug!(
			lower_tick,
			upper_tick,
			liquidity,
			amount_zero = %amounts[Side::Zero],
			amount_one = %amounts[Side::One],
			"minted range position",
		);
		Ok(amounts)
	}

	/// Removes liquidity from a position, crediting the amounts it was worth (rounded down)
	/// and any accrued fees to the position's `tokens_owed`, to be paid out by
	/// [`Self::collect`]. A zero-amount burn is a "poke" that only updates the fee accrual,
	/// and fails for positions with no liquidity.
	///
	/// If this function returns an `Err(_)` no state changes have occurred
	pub fn burn(
		&mut self,
		lp: &LiquidityProvider,
		lower_tick: Tick,
		upper_tick: Tick,
		liquidity: Liquidity,
		time: u32,
	) -> Result<SideMap<Amount>, BurnError> {
		if !self.is_initialized() {
			return Err(BurnError::NotInitialized)
		}
		if !self.unlocked {
			return Err(BurnError::Locked)
		}
		self.unlocked = false;
		let result = self.inner_burn(lp, lower_tick, upper_tick, liquidity, time);
		self.unlocked = true;
		result
	}

	fn inner_burn(
		&mut self,
		lp: &LiquidityProvider,
		lower_tick: Tick,
		upper_tick: Tick,
		liquidity: Liquidity,
		time: u32,
	) -> Result<SideMap<Amount>, BurnError> {
		self.validate_position_range(lower_tick, upper_tick)
			.map_err(|()| BurnError::InvalidTickRange)?;
		let liquidity_delta =
			i128::try_from(liquidity).map_err(|_| BurnError::LiquidityUnderflow)?;

		let mut scratch = self.clone();
		let amounts = scratch
			.modify_position(lp, lower_tick, upper_tick, -liquidity_delta, time)
			.map_err(|err| match err {
				PositionUpdateError::UninitializedPosition => BurnError::UninitializedPosition,
				PositionUpdateError::Liquidity(_) => BurnError::LiquidityUnderflow,
			})?;

		// Unlike a swap's output, burnt principal is not paid out but queued for `collect`.
		if let Some(position) = scratch.positions.get_mut(lp, lower_tick, upper_tick) {
			position.tokens_owed = position
				.tokens_owed
				.map(|side, tokens_owed| tokens_owed.saturating_add(amounts[side]));
		}

		*self = scratch;
		tracing::debug!(
			lower_tick,
			upper_tick,
			liquidity,
			amount_zero = %amounts[Side::Zero],
			amount_one = %amounts[Side::One],
			"burnt range position",
		);
		Ok(amounts)
	}

	/// Pays out up to `requested` of the position's `tokens_owed` to its owner. Requests in
	/// excess of what is owed are capped, so collecting from an empty or nonexistent position
	/// succeeds and pays nothing.
	pub fn collect(
		&mut self,
		handler: &mut impl PaymentHandler<LiquidityProvider>,
		lp: &LiquidityProvider,
		lower_tick: Tick,
		upper_tick: Tick,
		requested: SideMap<Amount>,
	) -> Result<SideMap<Amount>, CollectError> {
		if !self.is_initialized() {
			return Err(CollectError::NotInitialized)
		}
		if !self.unlocked {
			return Err(CollectError::Locked)
		}
		self.unlocked = false;

		let collected = match self.positions.get_mut(lp, lower_tick, upper_tick) {
			Some(position) => {
				let collected = position
					.tokens_owed
					.map(|side, tokens_owed| core::cmp::min(tokens_owed, requested[side]));
				position.tokens_owed = position
					.tokens_owed
					.map(|side, tokens_owed| tokens_owed - collected[side]);
				collected
			},
			None => Default::default(),
		};
		for side in [Side::Zero, Side::One] {
			if !collected[side].is_zero() {
				handler.payout(lp, side, collected[side]);
			}
		}

		self.unlocked = true;
		if collected != Default::default() {
			tracing::debug!(
				lower_tick,
				upper_tick,
				amount_zero = %collected[Side::Zero],
				amount_one = %collected[Side::One],
				"collected from range position",
			);
		}
		Ok(collected)
	}

	/// Swaps one side of the pair for the other: either a fixed input amount for as much
	/// output as it buys, or as little input as needed for a fixed output amount. The price
	/// moves until the amount is exhausted, liquidity runs out, or `sqrt_price_limit` is
	/// reached. Returns the total input taken (fees included) and output paid.
	///
	/// The output is paid out through the handler before the input is requested; the engine's
	/// state is only committed once the input payment is verified.
	pub fn swap(
		&mut self,
		handler: &mut impl PaymentHandler<LiquidityProvider>,
		recipient: &LiquidityProvider,
		zero_for_one: bool,
		amount: AmountSpecified,
		sqrt_price_limit: SqrtPriceQ64F96,
		time: u32,
	) -> Result<(Amount, Amount), SwapError> {
		match amount {
			AmountSpecified::Input(amount) | AmountSpecified::Output(amount)
				if amount.is_zero() =>
				return Err(SwapError::ZeroAmount),
			_ => {},
		}
		if !self.is_initialized() {
			return Err(SwapError::NotInitialized)
		}
		if !self.unlocked {
			return Err(SwapError::Locked)
		}
		if if zero_for_one {
			sqrt_price_limit >= self.current_sqrt_price || sqrt_price_limit <= MIN_SQRT_PRICE
		} else {
			sqrt_price_limit <= self.current_sqrt_price || sqrt_price_limit >= MAX_SQRT_PRICE
		} {
			return Err(SwapError::InvalidPriceLimit)
		}

		self.unlocked = false;
		let result = if zero_for_one {
			self.inner_swap::<ZeroToOne>(handler, recipient, amount, sqrt_price_limit, time)
		} else {
			self.inner_swap::<OneToZero>(handler, recipient, amount, sqrt_price_limit, time)
		};
		self.unlocked = true;
		result
	}

	fn inner_swap<SD: SwapLoopDirection>(
		&mut self,
		handler: &mut impl PaymentHandler<LiquidityProvider>,
		recipient: &LiquidityProvider,
		amount: AmountSpecified,
		sqrt_price_limit: SqrtPriceQ64F96,
		time: u32,
	) -> Result<(Amount, Amount), SwapError> {
		let mut scratch = self.clone();
		let (amount_in, amount_out) =
			scratch.execute_swap::<SD>(amount, sqrt_price_limit, time);

		if !amount_out.is_zero() {
			handler.payout(recipient, !SD::INPUT_SIDE, amount_out);
		}
		let balance_before = handler.balance(SD::INPUT_SIDE);
		handler.pay({
			let mut amounts = SideMap::<Amount>::default();
			amounts[SD::INPUT_SIDE] = amount_in;
			amounts
		});
		if handler.balance(SD::INPUT_SIDE) < balance_before.saturating_add(amount_in) {
			return Err(SwapError::InsufficientPayment)
		}

		*self = scratch;
		tracing::debug!(
			input_side = ?SD::INPUT_SIDE,
			%amount_in,
			%amount_out,
			sqrt_price = %self.current_sqrt_price,
			tick = self.current_tick,
			liquidity = self.current_liquidity,
			"swap",
		);
		Ok((amount_in, amount_out))
	}

	/// The swap loop itself: repeatedly computes constant-liquidity steps towards the next
	/// initialized tick (or the price limit), crossing ticks as they are reached. Returns the
	/// total input (fees included) and output amounts.
	fn execute_swap<SD: SwapLoopDirection>(
		&mut self,
		amount: AmountSpecified,
		sqrt_price_limit: SqrtPriceQ64F96,
		time: u32,
	) -> (Amount, Amount) {
		let exact_input = matches!(amount, AmountSpecified::Input(_));
		let mut amount_remaining = match amount {
			AmountSpecified::Input(amount) | AmountSpecified::Output(amount) => amount,
		};
		let mut total_amount_in = Amount::zero();
		let mut total_amount_out = Amount::zero();

		let protocol_fee_denominator =
			if SD::ZERO_FOR_ONE { self.fee_protocol % 16 } else { self.fee_protocol >> 4 };

		let tick_start = self.current_tick;
		let liquidity_start = self.current_liquidity;
		// The cumulatives as of the start of the swap, computed at most once, and only if a
		// tick is actually crossed.
		let mut start_cumulatives: Option<(i64, U256)> = None;

		while !amount_remaining.is_zero() && self.current_sqrt_price != sqrt_price_limit {
			let sqrt_price_step_start = self.current_sqrt_price;

			let (tick_next, tick_next_initialized) = self
				.ticks
				.next_initialized_tick_within_one_word(self.current_tick, SD::ZERO_FOR_ONE);
			let tick_next = tick_next.clamp(MIN_TICK, MAX_TICK);
			let sqrt_price_next_tick = sqrt_price_at_tick(tick_next);

			let sqrt_price_target =
				if SD::sqrt_price_op_more_than(sqrt_price_next_tick, sqrt_price_limit) {
					sqrt_price_limit
				} else {
					sqrt_price_next_tick
				};

			let step = compute_swap_step::<SD>(
				self.current_sqrt_price,
				sqrt_price_target,
				self.current_liquidity,
				if exact_input {
					AmountSpecified::Input(amount_remaining)
				} else {
					AmountSpecified::Output(amount_remaining)
				},
				self.fee_hundredth_pips,
			);

			// Will not underflow: a step consumes at most the remaining amount.
			amount_remaining -= if exact_input {
				step.amount_in + step.fee_amount
			} else {
				step.amount_out
			};
			total_amount_in += step.amount_in + step.fee_amount;
			total_amount_out += step.amount_out;

			let lp_fee = if protocol_fee_denominator > 0 {
				let protocol_fee = step.fee_amount / protocol_fee_denominator;
				self.protocol_fees[SD::INPUT_SIDE] += protocol_fee;
				step.fee_amount - protocol_fee
			} else {
				step.fee_amount
			};
			if self.current_liquidity > 0 {
				self.fee_growth_global[SD::INPUT_SIDE] = self.fee_growth_global
					[SD::INPUT_SIDE]
					.overflowing_add(mul_div_floor(
						lp_fee,
						U256::one() << 128,
						self.current_liquidity,
					))
					.0;
			}

			if step.sqrt_price_next == sqrt_price_next_tick {
				if tick_next_initialized {
					let (tick_cumulative, seconds_per_liquidity_cumulative) =
						*start_cumulatives.get_or_insert_with(|| {
							self.observations.current_cumulatives(
								time,
								tick_start,
								liquidity_start,
							)
						});

					let liquidity_net = self.ticks.cross(
						tick_next,
						self.fee_growth_global,
						seconds_per_liquidity_cumulative,
						tick_cumulative,
						time,
					);
					// When moving down, crossing a tick removes what it adds when crossed
					// upwards.
					let liquidity_net =
						if SD::ZERO_FOR_ONE { -liquidity_net } else { liquidity_net };

					// Cannot overflow as each tick's net liquidity is bounded by
					// `max_liquidity_per_tick`
					self.current_liquidity =
						self.current_liquidity.checked_add_signed(liquidity_net).unwrap();
				}

				self.current_sqrt_price = step.sqrt_price_next;
				self.current_tick = SD::current_tick_after_crossing_tick(tick_next);
			} else if step.sqrt_price_next != sqrt_price_step_start {
				self.current_sqrt_price = step.sqrt_price_next;
				self.current_tick = tick_at_sqrt_price(step.sqrt_price_next);
			}
		}

		// One observation per timestamp the pool's tick moved in, recorded with the pre-swap
		// values since those held since the previous observation.
		if self.current_tick != tick_start {
			self.observations.write(time, tick_start, liquidity_start);
		}

		(total_amount_in, total_amount_out)
	}

	/// The cumulative tick and seconds-per-liquidity values as of each of `seconds_agos`
	/// before `time`.
	pub fn observe(
		&self,
		time: u32,
		seconds_agos: &[u32],
	) -> Result<Vec<(i64, U256)>, ObserveError> {
		if !self.is_initialized() {
			return Err(ObserveError::NotInitialized)
		}
		Ok(self.observations.observe(
			time,
			seconds_agos,
			self.current_tick,
			self.current_liquidity,
		)?)
	}

	/// Pre-allocates observation slots so the oracle can answer queries further into the
	/// past. A silent no-op if the buffer is already at least that large.
	pub fn increase_observation_cardinality_next(
		&mut self,
		cardinality_next: u16,
	) -> Result<(), GrowObservationsError> {
		if !self.is_initialized() {
			return Err(GrowObservationsError::NotInitialized)
		}
		if !self.unlocked {
			return Err(GrowObservationsError::Locked)
		}

		let cardinality_next_old = self.observations.cardinality_next;
		self.observations.grow(cardinality_next);
		if self.observations.cardinality_next != cardinality_next_old {
			tracing::debug!(
				old = cardinality_next_old,
				new = self.observations.cardinality_next,
				"observation cardinality increased",
			);
		}
		Ok(())
	}

	/// Sets the pool's protocol fee: the denominator of the fraction of each side's swap fees
	/// taken for the protocol. Each side must be 0 (off) or between 4 and 10 inclusive.
	pub fn set_fee_protocol(
		&mut self,
		fee_protocol_zero: u8,
		fee_protocol_one: u8,
	) -> Result<(), SetFeeProtocolError> {
		if !self.is_initialized() {
			return Err(SetFeeProtocolError::NotInitialized)
		}
		if !self.unlocked {
			return Err(SetFeeProtocolError::Locked)
		}
		for fee_protocol in [fee_protocol_zero, fee_protocol_one] {
			if fee_protocol != 0 && !(4..=10).contains(&fee_protocol) {
				return Err(SetFeeProtocolError::InvalidFeeProtocol)
			}
		}

		let fee_protocol_old = self.fee_protocol;
		self.fee_protocol = fee_protocol_zero + (fee_protocol_one << 4);
		tracing::debug!(old = fee_protocol_old, new = self.fee_protocol, "protocol fee set");
		Ok(())
	}

	fn validate_position_range(&self, lower_tick: Tick, upper_tick: Tick) -> Result<(), ()> {
		(lower_tick < upper_tick &&
			MIN_TICK <= lower_tick &&
			upper_tick <= MAX_TICK &&
			lower_tick % self.tick_spacing == 0 &&
			upper_tick % self.tick_spacing == 0)
			.then_some(())
			.ok_or(())
	}

	/// Applies a liquidity delta to a position and its boundary ticks, returning the amounts
	/// the delta is worth at the current price. Writes an observation if the range contains
	/// the current price, as the pool's active liquidity is about to change.
	fn modify_position(
		&mut self,
		lp: &LiquidityProvider,
		lower_tick: Tick,
		upper_tick: Tick,
		liquidity_delta: i128,
		time: u32,
	) -> Result<SideMap<Amount>, PositionUpdateError> {
		if liquidity_delta != 0 {
			let (tick_cumulative, seconds_per_liquidity_cumulative) = self
				.observations
				.current_cumulatives(time, self.current_tick, self.current_liquidity);

			self.ticks.update(
				lower_tick,
				self.current_tick,
				liquidity_delta,
				self.fee_growth_global,
				seconds_per_liquidity_cumulative,
				tick_cumulative,
				time,
				false,
			)?;
			self.ticks.update(
				upper_tick,
				self.current_tick,
				liquidity_delta,
				self.fee_growth_global,
				seconds_per_liquidity_cumulative,
				tick_cumulative,
				time,
				true,
			)?;
		}

		let fee_growth_inside = self.ticks.fee_growth_inside(
			lower_tick,
			upper_tick,
			self.current_tick,
			self.fee_growth_global,
		);
		self.positions.update(lp, lower_tick, upper_tick, liquidity_delta, fee_growth_inside)?;

		Ok(if liquidity_delta == 0 {
			Default::default()
		} else {
			// The pool rounds in its own favor: charge minters up, pay burners down.
			let amounts = self.liquidity_to_amounts(
				liquidity_delta.unsigned_abs(),
				lower_tick,
				upper_tick,
				liquidity_delta > 0,
			);

			if lower_tick <= self.current_tick && self.current_tick < upper_tick {
				// The active liquidity is changing, so the history up to now is recorded
				// with the liquidity that applied to it.
				self.observations.write(time, self.current_tick, self.current_liquidity);
				self.current_liquidity =
					liquidity_math::add_delta(self.current_liquidity, liquidity_delta)?;
			}

			amounts
		})
	}

	/// The value of `liquidity` over the given range at the current price: how much of each
	/// side the pool holds (or requires) for it.
	fn liquidity_to_amounts(
		&self,
		liquidity: Liquidity,
		lower_tick: Tick,
		upper_tick: Tick,
		round_up: bool,
	) -> SideMap<Amount> {
		if self.current_tick < lower_tick {
			SideMap::from_array([
				(if round_up { zero_amount_delta_ceil } else { zero_amount_delta_floor })(
					sqrt_price_at_tick(lower_tick),
					sqrt_price_at_tick(upper_tick),
					liquidity,
				),
				0.into(),
			])
		} else if self.current_tick < upper_tick {
			SideMap::from_array([
				(if round_up { zero_amount_delta_ceil } else { zero_amount_delta_floor })(
					self.current_sqrt_price,
					sqrt_price_at_tick(upper_tick),
					liquidity,
				),
				(if round_up { one_amount_delta_ceil } else { one_amount_delta_floor })(
					sqrt_price_at_tick(lower_tick),
					self.current_sqrt_price,
					liquidity,
				),
			])
		} else {
			SideMap::from_array([
				0.into(),
				(if round_up { one_amount_delta_ceil } else { one_amount_delta_floor })(
					sqrt_price_at_tick(lower_tick),
					sqrt_price_at_tick(upper_tick),
					liquidity,
				),
			])
		}
	}

	pub fn fee_hundredth_pips(&self) -> u32 {
		self.fee_hundredth_pips
	}

	pub fn fee_protocol(&self) -> u8 {
		self.fee_protocol
	}

	pub fn tick_spacing(&self) -> Tick {
		self.tick_spacing
	}

	/// The current sqrt price, or `None` if the pool is uninitialized
	pub fn current_sqrt_price(&self) -> Option<SqrtPriceQ64F96> {
		self.is_initialized().then_some(self.current_sqrt_price)
	}

	pub fn current_tick(&self) -> Tick {
		self.current_tick
	}

	pub fn current_liquidity(&self) -> Liquidity {
		self.current_liquidity
	}

	pub fn fee_growth_global(&self) -> SideMap<FeeGrowthQ128F128> {
		self.fee_growth_global
	}

	/// Protocol fees accrued and not yet withdrawn
	pub fn protocol_fees(&self) -> SideMap<Amount> {
		self.protocol_fees
	}

	pub fn tick_info(&self, tick: Tick) -> Option<&TickInfo> {
		self.ticks.get(tick)
	}

	pub fn position(
		&self,
		lp: &LiquidityProvider,
		lower_tick: Tick,
		upper_tick: Tick,
	) -> Option<&Position> {
		self.positions.get(lp, lower_tick, upper_tick)
	}

	pub fn observation(&self, index: u16) -> Option<&oracle::Observation> {
		self.observations.observation(index)
	}

	/// The oracle's (index, cardinality, cardinality_next)
	pub fn observation_cardinality(&self) -> (u16, u16, u16) {
		(
			self.observations.index,
			self.observations.cardinality,
			self.observations.cardinality_next,
		)
	}
}
