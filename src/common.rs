use codec::{Decode, Encode};
use primitive_types::{U256, U512};
use scale_info::TypeInfo;
use serde::{Deserialize, Serialize};

pub const ONE_IN_HUNDREDTH_PIPS: u32 = 1000000;

/// The maximum LP fee, 50%, in units of 0.0001%.
pub const MAX_LP_FEE: u32 = ONE_IN_HUNDREDTH_PIPS / 2;

pub type Amount = U256;
pub type Tick = i32;
pub type SqrtPriceQ64F96 = U256;
pub type FeeGrowthQ128F128 = U256;

/// This is the invariant wrt xy = k. It represents / is proportional to the depth of the
/// pool/position.
pub type Liquidity = u128;

pub const SQRT_PRICE_FRACTIONAL_BITS: u32 = 96;

#[derive(
	Debug, Clone, Copy, PartialEq, Eq, Encode, Decode, TypeInfo, Deserialize, Serialize,
)]
pub enum Side {
	Zero,
	One,
}

impl core::ops::Not for Side {
	type Output = Self;

	fn not(self) -> Self::Output {
		match self {
			Side::Zero => Side::One,
			Side::One => Side::Zero,
		}
	}
}

/// A pair of values, one per token side of the pool.
#[derive(
	Copy, Clone, Default, Debug, TypeInfo, PartialEq, Eq, Encode, Decode, Serialize, Deserialize,
)]
pub struct SideMap<T> {
	zero: T,
	one: T,
}
impl<T> SideMap<T> {
	pub fn from_array(array: [T; 2]) -> Self {
		let [zero, one] = array;
		Self { zero, one }
	}

	pub fn map<R>(self, mut f: impl FnMut(Side, T) -> R) -> SideMap<R> {
		SideMap { zero: f(Side::Zero, self.zero), one: f(Side::One, self.one) }
	}
}
impl<T> core::ops::Index<Side> for SideMap<T> {
	type Output = T;
	fn index(&self, side: Side) -> &T {
		match side {
			Side::Zero => &self.zero,
			Side::One => &self.one,
		}
	}
}
impl<T> core::ops::IndexMut<Side> for SideMap<T> {
	fn index_mut(&mut self, side: Side) -> &mut T {
		match side {
			Side::Zero => &mut self.zero,
			Side::One => &mut self.one,
		}
	}
}

pub fn mul_div_floor<C: Into<U512>>(a: U256, b: U256, c: C) -> U256 {
	let c: U512 = c.into();
	(U256::full_mul(a, b) / c).try_into().unwrap()
}

pub fn mul_div_ceil<C: Into<U512>>(a: U256, b: U256, c: C) -> U256 {
	mul_div(a, b, c).1
}

pub fn mul_div<C: Into<U512>>(a: U256, b: U256, c: C) -> (U256, U256) {
	let c: U512 = c.into();

	let (d, m) = U512::div_mod(U256::full_mul(a, b), c);

	(
		d.try_into().unwrap(),
		if m > U512::from(0) {
			// cannot overflow as for m > 0, c must be > 1, and as (a*b) < U512::MAX, therefore
			// a*b/c < U512::MAX
			d + 1
		} else {
			d
		}
		.try_into()
		.unwrap(),
	)
}

/// The minimum tick that may be passed to `sqrt_price_at_tick` computed from log base 1.0001 of
/// 2**-128
pub const MIN_TICK: Tick = -887272;
/// The maximum tick that may be passed to `sqrt_price_at_tick` computed from log base 1.0001 of
/// 2**128
pub const MAX_TICK: Tick = -MIN_TICK;
/// The minimum value that can be returned from `sqrt_price_at_tick`. Equivalent to
/// `sqrt_price_at_tick(MIN_TICK)`
pub const MIN_SQRT_PRICE: SqrtPriceQ64F96 = U256([0x1000276a3u64, 0x0, 0x0, 0x0]);
/// The maximum value that can be returned from `sqrt_price_at_tick`. Equivalent to
/// `sqrt_price_at_tick(MAX_TICK)`.
pub const MAX_SQRT_PRICE: SqrtPriceQ64F96 =
	U256([0x5d951d5263988d26u64, 0xefd1fc6a50648849u64, 0xfffd8963u64, 0x0u64]);

pub fn is_sqrt_price_valid(sqrt_price: SqrtPriceQ64F96) -> bool {
	(MIN_SQRT_PRICE..MAX_SQRT_PRICE).contains(&sqrt_price)
}

pub fn is_tick_valid(tick: Tick) -> bool {
	(MIN_TICK..=MAX_TICK).contains(&tick)
}

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum PriceMathError {
	/// The tick is outside `MIN_TICK..=MAX_TICK`.
	#[error("tick is out of range")]
	TickOutOfRange,
	/// The sqrt price is outside `MIN_SQRT_PRICE..MAX_SQRT_PRICE`.
	#[error("sqrt price is out of range")]
	PriceOutOfRange,
}

/// Checked version of `sqrt_price_at_tick` for callers that cannot guarantee the tick is valid.
pub fn try_sqrt_price_at_tick(tick: Tick) -> Result<SqrtPriceQ64F96, PriceMathError> {
	if is_tick_valid(tick) {
		Ok(sqrt_price_at_tick(tick))
	} else {
		Err(PriceMathError::TickOutOfRange)
	}
}

/// Checked version of `tick_at_sqrt_price` for callers that cannot guarantee the price is valid.
pub fn try_tick_at_sqrt_price(sqrt_price: SqrtPriceQ64F96) -> Result<Tick, PriceMathError> {
	if is_sqrt_price_valid(sqrt_price) {
		Ok(tick_at_sqrt_price(sqrt_price))
	} else {
		Err(PriceMathError::PriceOutOfRange)
	}
}

/// The maximum `liquidity_gross` any single tick may carry, given the pool's tick spacing. It
/// bounds the total liquidity referencing a tick such that swap outputs can never overflow a
/// U256 even if a swap traversed every tick in the pool.
pub fn max_liquidity_per_tick(tick_spacing: Tick) -> Liquidity {
	assert!(tick_spacing > 0);

	// Usable ticks are the spacing-aligned ones (truncating division, as the original).
	let min_tick = (MIN_TICK / tick_spacing) * tick_spacing;
	let max_tick = (MAX_TICK / tick_spacing) * tick_spacing;
	let num_ticks = ((max_tick - min_tick) / tick_spacing) as u128 + 1;

	Liquidity::MAX / num_ticks
}

pub fn sqrt_price_at_tick(tick: Tick) -> SqrtPriceQ64F96 {
	assert!(is_tick_valid(tick));

	let abs_tick = tick.unsigned_abs();

	let mut r = if abs_tick & 0x1u32 != 0 {
		U256::from(0xfffcb933bd6fad37aa2d162d1a594001u128)
	} else {
		U256::one() << 128u128
	};

	macro_rules! handle_tick_bit {
		($bit:literal, $constant:literal) => {
			/* Proof that `checked_mul` does not overflow:
				Note that the value ratio is initialized with above is such that `ratio <= (U256::one() << 128u128)`, alternatively `ratio <= (u128::MAX + 1)`
				First consider the case of applying the macro once assuming `ratio <= (U256::one() << 128u128)`:
					If ∀r ∈ U256, `r <= (U256::one() << 128u128)`, ∀C ∈ "Set of constants the macro is used with (Listed below)"
					Then `C * r <= U256::MAX` (See `debug_assertions` below)
					Therefore the `checked_mul` will not overflow
				Also note that above `(C * r >> 128u128) <= UINT128_MAX`
				Therefore if the if branch is taken ratio will be assigned a value `<= u128::MAX`
				else ratio is unchanged and remains `ratio <= u128::MAX + 1`
				Therefore as the assumption `ratio <= u128::MAX + 1` is always maintained after applying the macro,
				none of the checked_mul calls in any of the applications of the macro will overflow
			*/
			#[cfg(debug_assertions)]
			U256::checked_mul(U256::one() << 128u128, $constant.into()).unwrap();
			if abs_tick & (0x1u32 << $bit) != 0 {
				r = U256::checked_mul(r, U256::from($constant)).unwrap() >> 128u128
			}
		}
	}

	handle_tick_bit!(1, 0xfff97272373d413259a46990580e213au128);
	handle_tick_bit!(2, 0xfff2e50f5f656932ef12357cf3c7fdccu128);
	handle_tick_bit!(3, 0xffe5caca7e10e4e61c3624eaa0941cd0u128);
	handle_tick_bit!(4, 0xffcb9843d60f6159c9db58835c926644u128);
	handle_tick_bit!(5, 0xff973b41fa98c081472e6896dfb254c0u128);
	handle_tick_bit!(6, 0xff2ea16466c96a3843ec78b326b52861u128);
	handle_tick_bit!(7, 0xfe5dee046a99a2a811c461f1969c3053u128);
	handle_tick_bit!(8, 0xfcbe86c7900a88aedcffc83b479aa3a4u128);
	handle_tick_bit!(9, 0xf987a7253ac413176f2b074cf7815e54u128);
	handle_tick_bit!(10, 0xf3392b0822b70005940c7a398e4b70f3u128);
	handle_tick_bit!(11, 0xe7159475a2c29b7443b29c7fa6e889d9u128);
	handle_tick_bit!(12, 0xd097f3bdfd2022b8845ad8f792aa5825u128);
	handle_tick_bit!(13, 0xa9f746462d870fdf8a65dc1f90e061e5u128);
	handle_tick_bit!(14, 0x70d869a156d2a1b890bb3df62baf32f7u128);
	handle_tick_bit!(15, 0x31be135f97d08fd981231505542fcfa6u128);
	handle_tick_bit!(16, 0x9aa508b5b7a84e1c677de54f3e99bc9u128);
	handle_tick_bit!(17, 0x5d6af8dedb81196699c329225ee604u128);
	handle_tick_bit!(18, 0x2216e584f5fa1ea926041bedfe98u128);
	handle_tick_bit!(19, 0x48a170391f7dc42444e8fa2u128);
	// Note due to MIN_TICK and MAX_TICK bounds, past the 20th bit abs_tick is all zeros

	/* Proof that r is never zero (therefore avoiding the divide by zero case here):
		We can think of an application of the `handle_tick_bit` macro as increasing the index I of r's MSB/`r.ilog2()` (mul by constant), and then decreasing it by 128 (the right shift).

		Note the increase in I caused by the constant mul will be atleast constant.ilog2().

		Also note each application of `handle_tick_bit` decreases (if the if branch is entered) or else maintains r's value as all the constants are less than 2^128.

		Therefore the largest decrease would be caused if all the macros application's if branches where entered.

		So we assuming all if branches are entered, after all the applications `I` would be atleast I_initial + bigsum(constant.ilog2()) - 19*128.

		The test `r_non_zero` checks with value is >= 0, therefore imply the smallest value r could have is more than 0.
	*/
	let sqrt_price_q32f128 = if tick > 0 { U256::MAX / r } else { r };

	// we round up in the division so tick_at_sqrt_price of the output price is always
	// consistent
	(sqrt_price_q32f128 >> 32u128) +
		if sqrt_price_q32f128.low_u32() == 0 { U256::zero() } else { U256::one() }
}

/// Calculates the greatest tick value such that `sqrt_price_at_tick(tick) <= sqrt_price`
pub fn tick_at_sqrt_price(sqrt_price: SqrtPriceQ64F96) -> Tick {
	assert!(is_sqrt_price_valid(sqrt_price));

	let sqrt_price_q64f128 = sqrt_price << 32u128;

	let (integer_log_2, mantissa) = {
		let mut _bits_remaining = sqrt_price_q64f128;
		let mut most_signifcant_bit = 0u8;

		// rustfmt chokes when formatting this macro.
		// See: https://github.com/rust-lang/rustfmt/issues/5404
		#[rustfmt::skip]
		macro_rules! add_integer_bit {
			($bit:literal, $lower_bits_mask:literal) => {
				if _bits_remaining > U256::from($lower_bits_mask) {
					most_signifcant_bit |= $bit;
					_bits_remaining >>= $bit;
				}
			};
		}

		add_integer_bit!(128u8, 0xFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFu128);
		add_integer_bit!(64u8, 0xFFFFFFFFFFFFFFFFu128);
		add_integer_bit!(32u8, 0xFFFFFFFFu128);
		add_integer_bit!(16u8, 0xFFFFu128);
		add_integer_bit!(8u8, 0xFFu128);
		add_integer_bit!(4u8, 0xFu128);
		add_integer_bit!(2u8, 0x3u128);
		add_integer_bit!(1u8, 0x1u128);

		(
			// most_signifcant_bit is the log2 of sqrt_price_q64f128 as an integer. This
			// converts most_signifcant_bit to the integer log2 of sqrt_price_q64f128 as an
			// q64f128
			((most_signifcant_bit as i16) + (-128i16)) as i8,
			// Calculate mantissa of sqrt_price_q64f128.
			if most_signifcant_bit >= 128u8 {
				// The bits we possibly drop when right shifting don't contribute to the log2
				// above the 14th fractional bit.
				sqrt_price_q64f128 >> (most_signifcant_bit - 127u8)
			} else {
				sqrt_price_q64f128 << (127u8 - most_signifcant_bit)
			}
			.as_u128(), // Conversion to u128 is safe as top 128 bits are always zero
		)
	};

	let log_2_q63f64 = {
		let mut log_2_q63f64 = (integer_log_2 as i128) << 64u8;
		let mut _mantissa = mantissa;

		// rustfmt chokes when formatting this macro.
		// See: https://github.com/rust-lang/rustfmt/issues/5404
		#[rustfmt::skip]
		macro_rules! add_fractional_bit {
			($bit:literal) => {
				// Note squaring a number doubles its log
				let mantissa_sq =
					(U256::checked_mul(_mantissa.into(), _mantissa.into()).unwrap() >> 127u8);
				_mantissa = if mantissa_sq.bit(128) {
					// is the 129th bit set, all higher bits must be zero due to 127 right bit
					// shift
					log_2_q63f64 |= 1i128 << $bit;
					(mantissa_sq >> 1u8).as_u128()
				} else {
					mantissa_sq.as_u128()
				}
			};
		}

		add_fractional_bit!(63u8);
		add_fractional_bit!(62u8);
		add_fractional_bit!(61u8);
		add_fractional_bit!(60u8);
		add_fractional_bit!(59u8);
		add_fractional_bit!(58u8);
		add_fractional_bit!(57u8);
		add_fractional_bit!(56u8);
		add_fractional_bit!(55u8);
		add_fractional_bit!(54u8);
		add_fractional_bit!(53u8);
		add_fractional_bit!(52u8);
		add_fractional_bit!(51u8);
		add_fractional_bit!(50u8);

		// We don't need more precision than (63..50) = 14 bits

		log_2_q63f64
	};

	// Note we don't have a I256 type so I have to handle the negative mul case manually
	let log_sqrt10001_q127f128 = U256::overflowing_mul(
		if log_2_q63f64 < 0 {
			(U256::from(u128::MAX) << 128u8) | U256::from(log_2_q63f64 as u128)
		} else {
			U256::from(log_2_q63f64 as u128)
		},
		U256::from(255738958999603826347141u128),
	)
	.0;

	let tick_low = (U256::overflowing_sub(
		log_sqrt10001_q127f128,
		U256::from(3402992956809132418596140100660247210u128),
	)
	.0 >> 128u8)
		.as_u128() as Tick;
	let tick_high = (U256::overflowing_add(
		log_sqrt10001_q127f128,
		U256::from(291339464771989622907027621153398088495u128),
	)
	.0 >> 128u8)
		.as_u128() as Tick;

	if tick_low == tick_high {
		tick_low
	} else if sqrt_price_at_tick(tick_high) <= sqrt_price {
		tick_high
	} else {
		tick_low
	}
}
