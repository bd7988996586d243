use codec::{Decode, Encode};
use primitive_types::U256;
use scale_info::TypeInfo;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::{
	common::{FeeGrowthQ128F128, Liquidity, SideMap, Tick},
	liquidity_math::{self, LiquidityDeltaError},
};

/// Per-tick state. A tick exists in the table exactly while some position references it, i.e.
/// while `liquidity_gross` is non-zero.
#[derive(Clone, Debug, Default, PartialEq, Eq, TypeInfo, Encode, Decode, Serialize, Deserialize)]
pub struct TickInfo {
	/// Total liquidity of all the positions that use this tick as a boundary
	pub liquidity_gross: Liquidity,
	/// The change in the pool's active liquidity when the price moves up across this tick
	pub liquidity_net: i128,
	/// Fee growth on the other side of this tick relative to the current price. Only meaningful
	/// relative to the value it held when the tick was initialized/last crossed.
	pub fee_growth_outside: SideMap<FeeGrowthQ128F128>,
	pub tick_cumulative_outside: i64,
	pub seconds_per_liquidity_outside: U256,
	pub seconds_outside: u32,
}

/// The set of initialized ticks, with a word-packed bitmap over spacing-compressed tick indices
/// so a swap can find the next initialized tick without walking every spacing-aligned tick.
#[derive(Clone, Debug, PartialEq, Eq, TypeInfo, Encode, Decode, Serialize, Deserialize)]
pub struct TickTable {
	tick_spacing: Tick,
	max_liquidity_per_tick: Liquidity,
	ticks: BTreeMap<Tick, TickInfo>,
	bitmap: BTreeMap<i16, U256>,
}

fn bitmap_position(compressed: Tick) -> (i16, u8) {
	((compressed >> 8) as i16, (compressed & 0xff) as u8)
}

impl TickTable {
	pub fn new(tick_spacing: Tick, max_liquidity_per_tick: Liquidity) -> Self {
		assert!(tick_spacing > 0);
		Self {
			tick_spacing,
			max_liquidity_per_tick,
			ticks: Default::default(),
			bitmap: Default::default(),
		}
	}

	pub fn get(&self, tick: Tick) -> Option<&TickInfo> {
		self.ticks.get(&tick)
	}

	/// Applies a liquidity delta to the tick, initializing it (seeded from the given global
	/// accumulators if the tick is at or below the current price) or clearing it as its gross
	/// liquidity moves from/to zero. Returns whether the tick's initialized state flipped.
	///
	/// The tick is only mutated on success.
	#[allow(clippy::too_many_arguments)]
	pub fn update(
		&mut self,
		tick: Tick,
		current_tick: Tick,
		liquidity_delta: i128,
		fee_growth_global: SideMap<FeeGrowthQ128F128>,
		seconds_per_liquidity_cumulative: U256,
		tick_cumulative: i64,
		time: u32,
		upper: bool,
	) -> Result<bool, LiquidityDeltaError> {
		let mut tick_info = self.ticks.get(&tick).cloned().unwrap_or_else(|| {
			let mut tick_info = TickInfo::default();
			// By convention all growth before a tick existed happened below it, so the
			// outside accumulators of ticks at or below the current price start at the
			// current global values.
			if tick <= current_tick {
				tick_info.fee_growth_outside = fee_growth_global;
				tick_info.seconds_per_liquidity_outside = seconds_per_liquidity_cumulative;
				tick_info.tick_cumulative_outside = tick_cumulative;
				tick_info.seconds_outside = time;
			}
			tick_info
		});

		let liquidity_gross_before = tick_info.liquidity_gross;
		let liquidity_gross_after =
			liquidity_math::add_delta(liquidity_gross_before, liquidity_delta)?;
		if liquidity_gross_after > self.max_liquidity_per_tick {
			return Err(LiquidityDeltaError::Overflow)
		}
		tick_info.liquidity_gross = liquidity_gross_after;

		// An upper tick subtracts its liquidity from the pool when crossed upwards. Cannot
		// overflow as the gross bound also bounds the absolute net.
		tick_info.liquidity_net = if upper {
			tick_info.liquidity_net - liquidity_delta
		} else {
			tick_info.liquidity_net + liquidity_delta
		};

		let flipped = (liquidity_gross_after == 0) != (liquidity_gross_before == 0);

		if liquidity_gross_after == 0 {
			self.ticks.remove(&tick);
		} else {
			self.ticks.insert(tick, tick_info);
		}
		if flipped {
			self.flip_tick(tick);
		}

		Ok(flipped)
	}

	/// The fee growth accumulated, per unit of liquidity, inside the given tick range. Like all
	/// growth accumulators this wraps mod 2^256 and is only meaningful as a difference of two
	/// readings of the same range.
	pub fn fee_growth_inside(
		&self,
		lower_tick: Tick,
		upper_tick: Tick,
		current_tick: Tick,
		fee_growth_global: SideMap<FeeGrowthQ128F128>,
	) -> SideMap<FeeGrowthQ128F128> {
		let lower = self.ticks.get(&lower_tick).cloned().unwrap_or_default();
		let upper = self.ticks.get(&upper_tick).cloned().unwrap_or_default();

		fee_growth_global.map(|side, global| {
			let below = if current_tick >= lower_tick {
				lower.fee_growth_outside[side]
			} else {
				global.overflowing_sub(lower.fee_growth_outside[side]).0
			};
			let above = if current_tick < upper_tick {
				upper.fee_growth_outside[side]
			} else {
				global.overflowing_sub(upper.fee_growth_outside[side]).0
			};

			global.overflowing_sub(below).0.overflowing_sub(above).0
		})
	}

	/// Transitions the tick as the price crosses it: all its outside accumulators flip to the
	/// other side of the current price. Returns the tick's net liquidity (as applied when
	/// crossing upwards).
	pub fn cross(
		&mut self,
		tick: Tick,
		fee_growth_global: SideMap<FeeGrowthQ128F128>,
		seconds_per_liquidity_cumulative: U256,
		tick_cumulative: i64,
		time: u32,
	) -> i128 {
		let tick_info = self.ticks.get_mut(&tick).unwrap();

		tick_info.fee_growth_outside = fee_growth_global
			.map(|side, global| global.overflowing_sub(tick_info.fee_growth_outside[side]).0);
		tick_info.seconds_per_liquidity_outside = seconds_per_liquidity_cumulative
			.overflowing_sub(tick_info.seconds_per_liquidity_outside)
			.0;
		tick_info.tick_cumulative_outside =
			tick_cumulative.wrapping_sub(tick_info.tick_cumulative_outside);
		tick_info.seconds_outside = time.wrapping_sub(tick_info.seconds_outside);

		tick_info.liquidity_net
	}

	fn flip_tick(&mut self, tick: Tick) {
		debug_assert!(tick % self.tick_spacing == 0);
		let (word_pos, bit_pos) = bitmap_position(tick / self.tick_spacing);
		let word = self.bitmap.entry(word_pos).or_default();
		*word ^= U256::one() << bit_pos;
		if word.is_zero() {
			self.bitmap.remove(&word_pos);
		}
	}

	fn bitmap_word(&self, word_pos: i16) -> U256 {
		self.bitmap.get(&word_pos).copied().unwrap_or_default()
	}

	/// Finds the next initialized tick at or before (`lte`) / strictly after (`!lte`) the given
	/// tick, searching no further than the 256-tick-spacings word the search starts in. If the
	/// word contains no initialized tick the word's boundary tick is returned with `false`, and
	/// the caller continues from there.
	pub fn next_initialized_tick_within_one_word(&self, tick: Tick, lte: bool) -> (Tick, bool) {
		let compressed = tick.div_euclid(self.tick_spacing);

		if lte {
			let (word_pos, bit_pos) = bitmap_position(compressed);
			// All the bits at or below bit_pos.
			let mask = (U256::one() << bit_pos) | ((U256::one() << bit_pos) - 1);
			let masked = self.bitmap_word(word_pos) & mask;

			if masked.is_zero() {
				((compressed - bit_pos as Tick) * self.tick_spacing, false)
			} else {
				let msb = (masked.bits() - 1) as u8;
				((compressed - (bit_pos - msb) as Tick) * self.tick_spacing, true)
			}
		} else {
			let compressed = compressed + 1;
			let (word_pos, bit_pos) = bitmap_position(compressed);
			// All the bits at or above bit_pos.
			let mask = !((U256::one() << bit_pos) - 1);
			let masked = self.bitmap_word(word_pos) & mask;

			if masked.is_zero() {
				((compressed + (u8::MAX - bit_pos) as Tick) * self.tick_spacing, false)
			} else {
				let lsb = masked.trailing_zeros() as u8;
				((compressed + (lsb - bit_pos) as Tick) * self.tick_spacing, true)
			}
		}
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::common::max_liquidity_per_tick;

	fn table_with_ticks(ticks: &[Tick]) -> TickTable {
		let mut table = TickTable::new(1, max_liquidity_per_tick(1));
		for &tick in ticks {
			assert_eq!(
				table.update(tick, 0, 1, Default::default(), U256::zero(), 0, 0, false),
				Ok(true)
			);
		}
		table
	}

	#[test]
	fn update_initializes_and_clears() {
		let mut table = TickTable::new(1, max_liquidity_per_tick(1));

		assert_eq!(table.update(5, 0, 10, Default::default(), U256::zero(), 0, 0, false), Ok(true));
		assert_eq!(table.update(5, 0, 10, Default::default(), U256::zero(), 0, 0, false), Ok(false));
		assert_eq!(table.get(5).unwrap().liquidity_gross, 20);
		assert_eq!(table.get(5).unwrap().liquidity_net, 20);

		assert_eq!(
			table.update(5, 0, -20, Default::default(), U256::zero(), 0, 0, false),
			Ok(true)
		);
		assert_eq!(table.get(5), None);
		assert_eq!(table.next_initialized_tick_within_one_word(5, true).1, false);
	}

	#[test]
	fn update_net_liquidity_sign_depends_on_boundary() {
		let mut table = TickTable::new(1, max_liquidity_per_tick(1));

		table.update(2, 0, 7, Default::default(), U256::zero(), 0, 0, false).unwrap();
		table.update(2, 0, 3, Default::default(), U256::zero(), 0, 0, true).unwrap();
		let tick_info = table.get(2).unwrap();
		assert_eq!(tick_info.liquidity_gross, 10);
		assert_eq!(tick_info.liquidity_net, 4);
	}

	#[test]
	fn update_enforces_max_gross_liquidity() {
		let mut table = TickTable::new(1, 100);

		table.update(0, 0, 100, Default::default(), U256::zero(), 0, 0, false).unwrap();
		assert_eq!(
			table.update(0, 0, 1, Default::default(), U256::zero(), 0, 0, false),
			Err(LiquidityDeltaError::Overflow)
		);
		// Failed update leaves the tick untouched.
		assert_eq!(table.get(0).unwrap().liquidity_gross, 100);
		assert_eq!(
			table.update(0, 0, -101, Default::default(), U256::zero(), 0, 0, false),
			Err(LiquidityDeltaError::Underflow)
		);
	}

	#[test]
	fn update_seeds_outside_accumulators_below_current_tick() {
		let mut table = TickTable::new(1, max_liquidity_per_tick(1));
		let fee_growth_global =
			SideMap::from_array([U256::from(100), U256::from(200)]);

		table.update(-10, 0, 1, fee_growth_global, U256::from(7), 42, 1000, false).unwrap();
		let below = table.get(-10).unwrap();
		assert_eq!(below.fee_growth_outside, fee_growth_global);
		assert_eq!(below.seconds_per_liquidity_outside, U256::from(7));
		assert_eq!(below.tick_cumulative_outside, 42);
		assert_eq!(below.seconds_outside, 1000);

		table.update(10, 0, 1, fee_growth_global, U256::from(7), 42, 1000, true).unwrap();
		assert_eq!(table.get(10).unwrap(), &TickInfo {
			liquidity_gross: 1,
			liquidity_net: -1,
			..Default::default()
		});
	}

	#[test]
	fn fee_growth_inside_tracks_current_tick() {
		let mut table = TickTable::new(1, max_liquidity_per_tick(1));
		let global = SideMap::from_array([U256::from(15), U256::from(15)]);

		// Uninitialized boundaries, price inside the range: all growth counts as inside.
		assert_eq!(table.fee_growth_inside(-2, 2, 0, global), global);

		// Price below/above the range: nothing is inside.
		assert_eq!(
			table.fee_growth_inside(-2, 2, -4, global),
			SideMap::from_array([U256::zero(), U256::zero()])
		);
		assert_eq!(
			table.fee_growth_inside(-2, 2, 4, global),
			SideMap::from_array([U256::zero(), U256::zero()])
		);

		// Initialized boundaries subtract their outside growth.
		table.update(-2, 0, 1, SideMap::from_array([2.into(), 3.into()]), U256::zero(), 0, 0, false)
			.unwrap();
		table.update(2, 0, 1, Default::default(), U256::zero(), 0, 0, true).unwrap();
		assert_eq!(
			table.fee_growth_inside(-2, 2, 0, global),
			SideMap::from_array([13.into(), 12.into()])
		);
	}

	#[test]
	fn fee_growth_inside_handles_wrapped_globals() {
		let mut table = TickTable::new(1, max_liquidity_per_tick(1));
		// Outside snapshots taken just before the global wrapped past zero.
		table.update(
			-2,
			0,
			1,
			SideMap::from_array([U256::MAX - 2, U256::MAX - 1]),
			U256::zero(),
			0,
			0,
			false,
		)
		.unwrap();
		table.update(2, 0, 1, Default::default(), U256::zero(), 0, 0, true).unwrap();

		assert_eq!(
			table.fee_growth_inside(-2, 2, 0, SideMap::from_array([5.into(), 10.into()])),
			SideMap::from_array([8.into(), 12.into()])
		);
	}

	#[test]
	fn cross_flips_outside_accumulators() {
		let mut table = table_with_ticks(&[2]);
		let global = SideMap::from_array([U256::from(100), U256::from(50)]);

		let liquidity_net = table.cross(2, global, U256::from(9), 77, 1000);
		assert_eq!(liquidity_net, 1);
		let tick_info = table.get(2).unwrap();
		assert_eq!(tick_info.fee_growth_outside, global);
		assert_eq!(tick_info.seconds_per_liquidity_outside, U256::from(9));
		assert_eq!(tick_info.tick_cumulative_outside, 77);
		assert_eq!(tick_info.seconds_outside, 1000);

		// Crossing back restores the original outside values relative to the same globals.
		table.cross(2, global, U256::from(9), 77, 1000);
		let tick_info = table.get(2).unwrap();
		assert_eq!(tick_info.fee_growth_outside, Default::default());
		assert_eq!(tick_info.seconds_outside, 0);
	}

	#[test]
	fn next_initialized_tick_upwards() {
		let table = table_with_ticks(&[-200, -55, -4, 70, 78, 84, 139, 240, 535]);

		assert_eq!(table.next_initialized_tick_within_one_word(78, false), (84, true));
		assert_eq!(table.next_initialized_tick_within_one_word(-55, false), (-4, true));
		assert_eq!(table.next_initialized_tick_within_one_word(77, false), (78, true));
		assert_eq!(table.next_initialized_tick_within_one_word(-56, false), (-55, true));
		// No initialized tick in the rest of the word: the word boundary is returned, even
		// when the next word holds one. The caller continues the search from the boundary.
		assert_eq!(table.next_initialized_tick_within_one_word(255, false), (511, false));
		assert_eq!(table.next_initialized_tick_within_one_word(340, false), (511, false));
		assert_eq!(table.next_initialized_tick_within_one_word(511, false), (535, true));
		assert_eq!(table.next_initialized_tick_within_one_word(-257, false), (-200, true));
	}

	#[test]
	fn next_initialized_tick_downwards() {
		let table = table_with_ticks(&[-200, -55, -4, 70, 78, 84, 139, 240, 535]);

		assert_eq!(table.next_initialized_tick_within_one_word(78, true), (78, true));
		assert_eq!(table.next_initialized_tick_within_one_word(79, true), (78, true));
		assert_eq!(table.next_initialized_tick_within_one_word(258, true), (256, false));
		assert_eq!(table.next_initialized_tick_within_one_word(256, true), (256, false));
		assert_eq!(table.next_initialized_tick_within_one_word(72, true), (70, true));
		assert_eq!(table.next_initialized_tick_within_one_word(-257, true), (-512, false));
		assert_eq!(table.next_initialized_tick_within_one_word(1023, true), (768, false));
		assert_eq!(table.next_initialized_tick_within_one_word(900, true), (768, false));
	}

	#[test]
	fn next_initialized_tick_respects_spacing() {
		let mut table = TickTable::new(60, max_liquidity_per_tick(60));
		table.update(-120, 0, 1, Default::default(), U256::zero(), 0, 0, false).unwrap();
		table.update(180, 0, 1, Default::default(), U256::zero(), 0, 0, true).unwrap();

		assert_eq!(table.next_initialized_tick_within_one_word(0, false), (180, true));
		// Compressed ticks 0 and -2 live in different words, so the search downwards from 0
		// stops at its word boundary.
		assert_eq!(table.next_initialized_tick_within_one_word(0, true), (0, false));
		// Unaligned ticks compress towards negative infinity.
		assert_eq!(table.next_initialized_tick_within_one_word(-61, true), (-120, true));
		assert_eq!(table.next_initialized_tick_within_one_word(179, false), (180, true));
	}
}
