use codec::{Decode, Encode};
use primitive_types::U256;
use scale_info::TypeInfo;
use serde::{Deserialize, Serialize};

use crate::common::{Liquidity, Tick};

#[derive(
	Clone, Copy, Debug, Default, PartialEq, Eq, TypeInfo, Encode, Decode, Serialize, Deserialize,
)]
pub struct Observation {
	pub block_timestamp: u32,
	/// Sum of the pool tick over every second the pool existed, as of this observation
	pub tick_cumulative: i64,
	/// Sum of 1/liquidity (as a Q32.128) over every second the pool existed, as of this
	/// observation
	pub seconds_per_liquidity_cumulative: U256,
	/// Whether this slot has ever held a written observation. Slots are allocated in advance of
	/// being written.
	pub initialized: bool,
}

impl Observation {
	/// The observation that would be recorded at `block_timestamp` if the pool held `tick` and
	/// `liquidity` constant since `self`.
	fn transform(&self, block_timestamp: u32, tick: Tick, liquidity: Liquidity) -> Self {
		let delta = block_timestamp.wrapping_sub(self.block_timestamp);
		Self {
			block_timestamp,
			tick_cumulative: self.tick_cumulative + tick as i64 * delta as i64,
			seconds_per_liquidity_cumulative: self
				.seconds_per_liquidity_cumulative
				.overflowing_add(
					(U256::from(delta) << 128) / U256::from(core::cmp::max(liquidity, 1)),
				)
				.0,
			initialized: true,
		}
	}
}

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum ObserveError {
	/// The requested time predates the oldest stored observation.
	#[error("no observation stored at or before the requested time")]
	ObservationNotAvailable,
}

/// Ring buffer of price/liquidity observations, one per block timestamp the pool was touched
/// in. The buffer's length grows on demand (paid for by whoever calls `grow`) up to u16::MAX,
/// trading storage for a longer queryable history.
#[derive(Clone, Debug, PartialEq, Eq, TypeInfo, Encode, Decode, Serialize, Deserialize)]
pub struct OracleBuffer {
	observations: Vec<Observation>,
	/// The slot most recently written to
	pub index: u16,
	/// The number of populated slots the ring currently cycles over
	pub cardinality: u16,
	/// The number of allocated slots the ring will cycle over once the write index wraps
	pub cardinality_next: u16,
}

impl OracleBuffer {
	pub fn new(time: u32) -> Self {
		Self {
			observations: vec![Observation {
				block_timestamp: time,
				tick_cumulative: 0,
				seconds_per_liquidity_cumulative: U256::zero(),
				initialized: true,
			}],
			index: 0,
			cardinality: 1,
			cardinality_next: 1,
		}
	}

	pub fn observation(&self, index: u16) -> Option<&Observation> {
		self.observations.get(index as usize)
	}

	/// Allocates slots so the ring can later hold `cardinality_next` observations. A no-op if
	/// the buffer is already at least that large.
	pub fn grow(&mut self, cardinality_next: u16) {
		if cardinality_next > self.cardinality_next {
			// Touch every new slot with a non-zero timestamp so future writes into it are
			// cheap and so `initialized: false` is the only marker of an unwritten slot.
			self.observations.resize(
				cardinality_next as usize,
				Observation { block_timestamp: 1, ..Default::default() },
			);
			self.cardinality_next = cardinality_next;
		}
	}

	/// Records an observation. At most one observation is stored per timestamp, so a repeated
	/// write in the same second is a no-op. The ring only lengthens to `cardinality_next` when
	/// the write index wraps.
	pub fn write(&mut self, time: u32, tick: Tick, liquidity: Liquidity) {
		let last = self.observations[self.index as usize];
		if last.block_timestamp == time {
			return
		}

		if self.cardinality_next > self.cardinality && self.index == self.cardinality - 1 {
			self.cardinality = self.cardinality_next;
		}

		self.index = (self.index + 1) % self.cardinality;
		self.observations[self.index as usize] = last.transform(time, tick, liquidity);
	}

	/// Comparator for timestamps that may have wrapped around u32, relative to `time`: all
	/// stored timestamps are at most 2^32 seconds old, so any timestamp greater than `time`
	/// must be from before the wrap.
	fn lte(time: u32, a: u32, b: u32) -> bool {
		if a <= time && b <= time {
			a <= b
		} else {
			let a = if a > time { a as u64 } else { a as u64 + (1 << 32) };
			let b = if b > time { b as u64 } else { b as u64 + (1 << 32) };
			a <= b
		}
	}

	/// Finds the pair of written observations straddling `target` by binary search over the
	/// logical ring order. Requires the target to be within the stored history.
	fn binary_search(&self, time: u32, target: u32) -> (Observation, Observation) {
		let cardinality = self.cardinality as usize;
		let mut l = (self.index as usize + 1) % cardinality;
		let mut r = l + cardinality - 1;

		loop {
			let i = (l + r) / 2;

			let before_or_at = self.observations[i % cardinality];
			// Hit an unwritten slot: the written part of the ring is after it.
			if !before_or_at.initialized {
				l = i + 1;
				continue
			}

			let at_or_after = self.observations[(i + 1) % cardinality];

			if Self::lte(time, before_or_at.block_timestamp, target) {
				if Self::lte(time, target, at_or_after.block_timestamp) {
					return (before_or_at, at_or_after)
				}
				l = i + 1;
			} else {
				r = i - 1;
			}
		}
	}

	fn get_surrounding_observations(
		&self,
		time: u32,
		target: u32,
		tick: Tick,
		liquidity: Liquidity,
	) -> Result<(Observation, Observation), ObserveError> {
		let mut before_or_at = self.observations[self.index as usize];

		// Most queries are for times at or after the newest observation, which the search
		// below (ordered around the ring) cannot find.
		if Self::lte(time, before_or_at.block_timestamp, target) {
			return Ok(if before_or_at.block_timestamp == target {
				// No interpolation needed, the counterpart is unused.
				(before_or_at, before_or_at)
			} else {
				(before_or_at, before_or_at.transform(target, tick, liquidity))
			})
		}

		// The oldest observation is right after the newest, unless the ring hasn't wrapped
		// yet.
		before_or_at = self.observations[(self.index as usize + 1) % self.cardinality as usize];
		if !before_or_at.initialized {
			before_or_at = self.observations[0];
		}

		if Self::lte(time, before_or_at.block_timestamp, target) {
			Ok(self.binary_search(time, target))
		} else {
			Err(ObserveError::ObservationNotAvailable)
		}
	}

	fn observe_single(
		&self,
		time: u32,
		seconds_ago: u32,
		tick: Tick,
		liquidity: Liquidity,
	) -> Result<(i64, U256), ObserveError> {
		if seconds_ago == 0 {
			let mut last = self.observations[self.index as usize];
			if last.block_timestamp != time {
				last = last.transform(time, tick, liquidity);
			}
			return Ok((last.tick_cumulative, last.seconds_per_liquidity_cumulative))
		}

		let target = time.wrapping_sub(seconds_ago);

		let (before_or_at, at_or_after) =
			self.get_surrounding_observations(time, target, tick, liquidity)?;

		Ok(if target == before_or_at.block_timestamp {
			(before_or_at.tick_cumulative, before_or_at.seconds_per_liquidity_cumulative)
		} else if target == at_or_after.block_timestamp {
			(at_or_after.tick_cumulative, at_or_after.seconds_per_liquidity_cumulative)
		} else {
			// Linearly interpolate between the two straddling observations.
			let observation_delta =
				at_or_after.block_timestamp.wrapping_sub(before_or_at.block_timestamp);
			let target_delta = target.wrapping_sub(before_or_at.block_timestamp);
			(
				before_or_at.tick_cumulative +
					(at_or_after.tick_cumulative - before_or_at.tick_cumulative) /
						observation_delta as i64 * target_delta as i64,
				before_or_at
					.seconds_per_liquidity_cumulative
					.overflowing_add(
						at_or_after
							.seconds_per_liquidity_cumulative
							.overflowing_sub(before_or_at.seconds_per_liquidity_cumulative)
							.0 * U256::from(target_delta) /
							U256::from(observation_delta),
					)
					.0,
			)
		})
	}

	/// The cumulative tick and seconds-per-liquidity values as of each of `seconds_agos` before
	/// `time`, given the pool's current tick and liquidity.
	pub fn observe(
		&self,
		time: u32,
		seconds_agos: &[u32],
		tick: Tick,
		liquidity: Liquidity,
	) -> Result<Vec<(i64, U256)>, ObserveError> {
		seconds_agos
			.iter()
			.map(|seconds_ago| self.observe_single(time, *seconds_ago, tick, liquidity))
			.collect()
	}

	/// The cumulative values as of now. Used to seed tick-level accumulators, and cannot fail
	/// as `seconds_ago == 0` never needs older history.
	pub fn current_cumulatives(&self, time: u32, tick: Tick, liquidity: Liquidity) -> (i64, U256) {
		let mut last = self.observations[self.index as usize];
		if last.block_timestamp != time {
			last = last.transform(time, tick, liquidity);
		}
		(last.tick_cumulative, last.seconds_per_liquidity_cumulative)
	}
}
