use crate::prng::Prng;

/// Seeded Fisher-Yates over a copy of `items`.
pub fn seeded_shuffle<T: Clone>(items: &[T], seed: &str) -> Vec<T> {
    let mut rng = Prng::new(seed);

    shuffle_with(items, &mut rng)
}

pub fn shuffle_with<T: Clone>(items: &[T], rng: &mut Prng) -> Vec<T> {
    let mut shuffled = items.to_vec();

    for i in (1..shuffled.len()).rev() {
        let j = ((rng.next_f64() * (i + 1) as f64).floor() as usize).min(i);
        shuffled.swap(i, j);
    }

    shuffled
}
