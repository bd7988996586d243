use primitive_types::{U256, U512};

use crate::common::{
	mul_div_ceil, mul_div_floor, Amount, Liquidity, Side, SqrtPriceQ64F96,
	ONE_IN_HUNDREDTH_PIPS, SQRT_PRICE_FRACTIONAL_BITS,
};

pub fn zero_amount_delta_floor(
	from: SqrtPriceQ64F96,
	to: SqrtPriceQ64F96,
	liquidity: Liquidity,
) -> Amount {
	assert!(SqrtPriceQ64F96::zero() < from);
	assert!(from <= to);

	/*
		Proof that `mul_div_floor` does not overflow:
		If A ∈ ℕ, B ∈ ℕ, A > 0, B >= A
		Then A * B >= B and B - A < B
		Then A * B > B - A
	*/
	mul_div_floor(
		U256::from(liquidity) << SQRT_PRICE_FRACTIONAL_BITS,
		to - from,
		U256::full_mul(to, from),
	)
}

pub fn zero_amount_delta_ceil(
	from: SqrtPriceQ64F96,
	to: SqrtPriceQ64F96,
	liquidity: Liquidity,
) -> Amount {
	assert!(SqrtPriceQ64F96::zero() < from);
	assert!(from <= to);

	/*
		Proof that `mul_div_ceil` does not overflow:
		If A ∈ ℕ, B ∈ ℕ, A > 0, B >= A
		Then A * B >= B and B - A < B
		Then A * B > B - A
	*/
	mul_div_ceil(
		U256::from(liquidity) << SQRT_PRICE_FRACTIONAL_BITS,
		to - from,
		U256::full_mul(to, from),
	)
}

pub fn one_amount_delta_floor(
	from: SqrtPriceQ64F96,
	to: SqrtPriceQ64F96,
	liquidity: Liquidity,
) -> Amount {
	assert!(from <= to);

	/*
		Proof that `mul_div_floor` does not overflow:
		If A ∈ u160, B ∈ u160, A <= B, L ∈ u128
		Then B - A ∈ u160
		Then (B - A) / (1<<96) <= u64::MAX (160 - 96 = 64)
		Then L * ((B - A) / (1<<96)) <= u192::MAX < u256::MAX
	*/
	mul_div_floor(liquidity.into(), to - from, U512::from(1) << SQRT_PRICE_FRACTIONAL_BITS)
}

pub fn one_amount_delta_ceil(
	from: SqrtPriceQ64F96,
	to: SqrtPriceQ64F96,
	liquidity: Liquidity,
) -> Amount {
	assert!(from <= to);

	/*
		Proof that `mul_div_ceil` does not overflow:
		If A ∈ u160, B ∈ u160, A <= B, L ∈ u128
		Then B - A ∈ u160
		Then (B - A) / (1<<96) <= u64::MAX (160 - 96 = 64)
		Then L * ((B - A) / (1<<96)) <= u192::MAX < u256::MAX
	*/
	mul_div_ceil(liquidity.into(), to - from, U512::from(1u32) << SQRT_PRICE_FRACTIONAL_BITS)
}

/// Swapping side zero in for side one out, moving the price down.
pub struct ZeroToOne {}
/// Swapping side one in for side zero out, moving the price up.
pub struct OneToZero {}

pub trait SwapDirection {
	/// The side of the input asset of swaps in this direction
	const INPUT_SIDE: Side;

	/// `true` if and only if `sqrt_price` is "further" along the swap direction than
	/// `sqrt_price_other`, i.e. in the direction the price moves as the swap progresses.
	fn sqrt_price_op_more_than(
		sqrt_price: SqrtPriceQ64F96,
		sqrt_price_other: SqrtPriceQ64F96,
	) -> bool;

	/// Calculates the swap input amount needed to move the current price given the specified
	/// amount of liquidity
	fn input_amount_delta_ceil(
		current: SqrtPriceQ64F96,
		target: SqrtPriceQ64F96,
		liquidity: Liquidity,
	) -> Amount;
	/// Calculates the swap output amount produced by moving the current price given the
	/// specified amount of liquidity
	fn output_amount_delta_floor(
		current: SqrtPriceQ64F96,
		target: SqrtPriceQ64F96,
		liquidity: Liquidity,
	) -> Amount;

	/// Calculates where the current price will be after swapping in `amount` given the current
	/// price and a specific amount of liquidity
	fn next_sqrt_price_from_input_amount(
		sqrt_price_current: SqrtPriceQ64F96,
		liquidity: Liquidity,
		amount: Amount,
	) -> SqrtPriceQ64F96;

	/// Calculates where the current price will be after swapping out `amount` given the current
	/// price and a specific amount of liquidity
	fn next_sqrt_price_from_output_amount(
		sqrt_price_current: SqrtPriceQ64F96,
		liquidity: Liquidity,
		amount: Amount,
	) -> SqrtPriceQ64F96;
}

impl SwapDirection for ZeroToOne {
	const INPUT_SIDE: Side = Side::Zero;

	fn sqrt_price_op_more_than(
		sqrt_price: SqrtPriceQ64F96,
		sqrt_price_other: SqrtPriceQ64F96,
	) -> bool {
		sqrt_price < sqrt_price_other
	}

	fn input_amount_delta_ceil(
		current: SqrtPriceQ64F96,
		target: SqrtPriceQ64F96,
		liquidity: Liquidity,
	) -> Amount {
		zero_amount_delta_ceil(target, current, liquidity)
	}

	fn output_amount_delta_floor(
		current: SqrtPriceQ64F96,
		target: SqrtPriceQ64F96,
		liquidity: Liquidity,
	) -> Amount {
		one_amount_delta_floor(target, current, liquidity)
	}

	fn next_sqrt_price_from_input_amount(
		sqrt_price_current: SqrtPriceQ64F96,
		liquidity: Liquidity,
		amount: Amount,
	) -> SqrtPriceQ64F96 {
		assert!(0 < liquidity);
		assert!(SqrtPriceQ64F96::zero() < sqrt_price_current);

		let liquidity = U256::from(liquidity) << SQRT_PRICE_FRACTIONAL_BITS;

		/*
			Proof that `mul_div_ceil` does not overflow:
			If L ∈ u256, R ∈ u256, A ∈ u256
			Then L <= L + R * A
			Then L / (L + R * A) <= 1
			Then R * L / (L + R * A) <= u256::MAX
		*/
		mul_div_ceil(
			liquidity,
			sqrt_price_current,
			U512::from(liquidity) + U256::full_mul(amount, sqrt_price_current),
		)
	}

	fn next_sqrt_price_from_output_amount(
		sqrt_price_current: SqrtPriceQ64F96,
		liquidity: Liquidity,
		amount: Amount,
	) -> SqrtPriceQ64F96 {
		assert!(0 < liquidity);

		// The output is side one, so the price moves down by amount/liquidity, rounding the
		// quotient up so the pool's price movement is never under-estimated.
		let quotient = mul_div_ceil(
			amount,
			U256::one() << SQRT_PRICE_FRACTIONAL_BITS,
			U256::from(liquidity),
		);

		// The output amount must be less than the virtual reserves of side one
		assert!(sqrt_price_current > quotient);
		sqrt_price_current - quotient
	}
}

impl SwapDirection for OneToZero {
	const INPUT_SIDE: Side = Side::One;

	fn sqrt_price_op_more_than(
		sqrt_price: SqrtPriceQ64F96,
		sqrt_price_other: SqrtPriceQ64F96,
	) -> bool {
		sqrt_price > sqrt_price_other
	}

	fn input_amount_delta_ceil(
		current: SqrtPriceQ64F96,
		target: SqrtPriceQ64F96,
		liquidity: Liquidity,
	) -> Amount {
		one_amount_delta_ceil(current, target, liquidity)
	}

	fn output_amount_delta_floor(
		current: SqrtPriceQ64F96,
		target: SqrtPriceQ64F96,
		liquidity: Liquidity,
	) -> Amount {
		zero_amount_delta_floor(current, target, liquidity)
	}

	fn next_sqrt_price_from_input_amount(
		sqrt_price_current: SqrtPriceQ64F96,
		liquidity: Liquidity,
		amount: Amount,
	) -> SqrtPriceQ64F96 {
		assert!(0 < liquidity);

		// Will not overflow meaningfully as callers bound `amount` by the amount required to
		// reach their target price, which is itself below MAX_SQRT_PRICE
		sqrt_price_current +
			mul_div_floor(amount, U256::one() << SQRT_PRICE_FRACTIONAL_BITS, liquidity)
	}

	fn next_sqrt_price_from_output_amount(
		sqrt_price_current: SqrtPriceQ64F96,
		liquidity: Liquidity,
		amount: Amount,
	) -> SqrtPriceQ64F96 {
		assert!(0 < liquidity);

		let liquidity = U256::from(liquidity) << SQRT_PRICE_FRACTIONAL_BITS;
		let product = U256::full_mul(amount, sqrt_price_current);

		// The output amount must be less than the virtual reserves of side zero
		assert!(U512::from(liquidity) > product);
		mul_div_ceil(liquidity, sqrt_price_current, U512::from(liquidity) - product)
	}
}

/// The quantity a swapper fixes: either the amount paid in (fees come out of it) or the amount
/// they want out (fees are charged on top).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AmountSpecified {
	Input(Amount),
	Output(Amount),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapStep {
	pub sqrt_price_next: SqrtPriceQ64F96,
	pub amount_in: Amount,
	pub amount_out: Amount,
	pub fee_amount: Amount,
}

/// Computes a single constant-liquidity segment of a swap: how far the price moves towards
/// `sqrt_price_target` given the remaining swap amount, and the input/output/fee amounts of that
/// movement. The price stops at the target if the remaining amount overshoots it.
pub fn compute_swap_step<SD: SwapDirection>(
	sqrt_price_current: SqrtPriceQ64F96,
	sqrt_price_target: SqrtPriceQ64F96,
	liquidity: Liquidity,
	amount_remaining: AmountSpecified,
	fee_hundredth_pips: u32,
) -> SwapStep {
	let fee = U256::from(fee_hundredth_pips);
	let one_minus_fee = U256::from(ONE_IN_HUNDREDTH_PIPS - fee_hundredth_pips);

	match amount_remaining {
		AmountSpecified::Input(amount) => {
			let amount_remaining_less_fee =
				mul_div_floor(amount, one_minus_fee, U256::from(ONE_IN_HUNDREDTH_PIPS));
			let amount_in_to_target =
				SD::input_amount_delta_ceil(sqrt_price_current, sqrt_price_target, liquidity);

			if amount_remaining_less_fee >= amount_in_to_target {
				SwapStep {
					sqrt_price_next: sqrt_price_target,
					amount_in: amount_in_to_target,
					amount_out: SD::output_amount_delta_floor(
						sqrt_price_current,
						sqrt_price_target,
						liquidity,
					),
					fee_amount: mul_div_ceil(amount_in_to_target, fee, one_minus_fee),
				}
			} else {
				let sqrt_price_next = SD::next_sqrt_price_from_input_amount(
					sqrt_price_current,
					liquidity,
					amount_remaining_less_fee,
				);
				// Recompute from the price actually reached, then take the rest of the
				// specified input as fee. The remainder covers at least the pro-rata fee.
				let amount_in = SD::input_amount_delta_ceil(
					sqrt_price_current,
					sqrt_price_next,
					liquidity,
				);
				SwapStep {
					sqrt_price_next,
					amount_in,
					amount_out: SD::output_amount_delta_floor(
						sqrt_price_current,
						sqrt_price_next,
						liquidity,
					),
					fee_amount: amount - amount_in,
				}
			}
		},
		AmountSpecified::Output(amount) => {
			let amount_out_to_target =
				SD::output_amount_delta_floor(sqrt_price_current, sqrt_price_target, liquidity);

			let (sqrt_price_next, amount_out) = if amount >= amount_out_to_target {
				(sqrt_price_target, amount_out_to_target)
			} else {
				let sqrt_price_next = SD::next_sqrt_price_from_output_amount(
					sqrt_price_current,
					liquidity,
					amount,
				);
				(
					sqrt_price_next,
					// Rounding on the recomputation may exceed the specified amount, which
					// is capped so the swapper never receives more than they asked for.
					core::cmp::min(
						SD::output_amount_delta_floor(
							sqrt_price_current,
							sqrt_price_next,
							liquidity,
						),
						amount,
					),
				)
			};

			let amount_in =
				SD::input_amount_delta_ceil(sqrt_price_current, sqrt_price_next, liquidity);

			SwapStep {
				sqrt_price_next,
				amount_in,
				amount_out,
				fee_amount: mul_div_ceil(amount_in, fee, one_minus_fee),
			}
		},
	}
}
