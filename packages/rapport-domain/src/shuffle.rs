//! Deterministic shuffling.
//!
//! Every place that needs reproducible randomness goes through [`SeededRandom`]. The same seed and
//! the same input length always produce the same permutation, which lets a client ask for a later
//! page of a shuffle it has already seen by resending the seed.

use time::OffsetDateTime;

pub type Seed = u32;

pub trait SeededRandom {
	fn next_u32(&mut self) -> u32;

	/// Uniform float in `[0, 1)`.
	fn next_f64(&mut self) -> f64 {
		f64::from(self.next_u32()) / 4_294_967_296.0
	}
}

/// Mulberry32, a 32-bit state generator. Not suitable for anything security related.
#[derive(Clone, Debug)]
pub struct Mulberry32 {
	state: u32,
}
impl Mulberry32 {
	pub fn new(seed: Seed) -> Self {
		Self { state: seed }
	}
}
impl SeededRandom for Mulberry32 {
	fn next_u32(&mut self) -> u32 {
		self.state = self.state.wrapping_add(0x6D2B_79F5);

		let mut t = self.state;

		t = (t ^ (t >> 15)).wrapping_mul(t | 1);
		t ^= t.wrapping_add((t ^ (t >> 7)).wrapping_mul(t | 61));

		t ^ (t >> 14)
	}
}

/// Seed for callers that did not supply one. Successive calls differ.
pub fn fresh_seed() -> Seed {
	let nanos = OffsetDateTime::now_utc().unix_timestamp_nanos();

	(nanos ^ (nanos >> 32)) as u32
}

/// Fisher-Yates in place, walking from the back.
pub fn shuffle_in_place<T, R>(items: &mut [T], rng: &mut R)
where
	R: SeededRandom + ?Sized,
{
	for i in (1..items.len()).rev() {
		let j = (rng.next_f64() * (i + 1) as f64) as usize;

		items.swap(i, j.min(i));
	}
}

pub fn shuffle<T>(mut items: Vec<T>, seed: Seed) -> Vec<T> {
	let mut rng = Mulberry32::new(seed);

	shuffle_in_place(&mut items, &mut rng);

	items
}
