use rand::Rng;

/// In-place Fisher-Yates shuffle.
///
/// Walks `i` from the back down to 1, swapping with a uniform pick from
/// `[0, i]`. Callers that need the original ordering must pass a copy.
/// Empty and singleton slices come back unchanged.
pub fn shuffle<T>(items: &mut [T]) {
    let mut rng = rand::thread_rng();

    for i in (1..items.len()).rev() {
        let j = rng.gen_range(0..=i);
        items.swap(i, j);
    }
}
