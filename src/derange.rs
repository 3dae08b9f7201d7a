// SPDX-License-Identifier: MIT OR Apache-2.0

//! Drawing fixed-point-free permutations ("derangements").

use rand::Rng;

/// Number of shuffle rounds before giving up on random drawing and falling
/// back to the deterministic rotation.
const MAX_SHUFFLE_ATTEMPTS: usize = 5;

/// Draw a permutation of `items` in which no element remains at its original
/// position.
///
/// Inputs with fewer than two elements have no non-trivial derangement and
/// yield an empty vector, callers are expected to guard against this case
/// (see `MIN_GROUP_SIZE` in the matching module).
///
/// The draw shuffles and re-checks up to a fixed number of attempts and then
/// falls back to rotating the input by one position, which can never produce
/// a fixed point for two or more elements. The function never fails, but the
/// resulting distribution over derangements is not uniform: unlucky draws
/// are biased towards the fallback rotation. The fixed-point-free guarantee
/// only holds when all elements are distinct, duplicated elements can always
/// end up in a position previously held by an equal element.
pub fn derange<T>(items: &[T]) -> Vec<T>
where
    T: Clone + PartialEq,
{
    derange_with_rng(items, &mut rand::rng())
}

/// Same as [`derange`] but drawing from an explicit random source, which
/// makes the outcome reproducible in tests.
pub fn derange_with_rng<T, R>(items: &[T], rng: &mut R) -> Vec<T>
where
    T: Clone + PartialEq,
    R: Rng + ?Sized,
{
    if items.len() < 2 {
        return Vec::new();
    }

    let mut drawn = items.to_vec();
    shuffle(&mut drawn, rng);

    for _ in 0..MAX_SHUFFLE_ATTEMPTS {
        if !has_fixed_point(&drawn, items) {
            return drawn;
        }
        shuffle(&mut drawn, rng);
    }

    rotate_by_one(items)
}

/// Sattolo-style in-place shuffle: the swap partner is drawn from `[0, i)`,
/// excluding `i` itself, so every pass produces a full cycle over the
/// positions.
fn shuffle<T, R>(items: &mut [T], rng: &mut R)
where
    R: Rng + ?Sized,
{
    for i in (1..items.len()).rev() {
        let j = rng.random_range(0..i);
        items.swap(i, j);
    }
}

/// A fixed point is a position where the drawn sequence still equals the
/// original one.
fn has_fixed_point<T>(drawn: &[T], original: &[T]) -> bool
where
    T: PartialEq,
{
    drawn.iter().zip(original).any(|(drawn, original)| drawn == original)
}

/// Deterministic backstop: rotating by one position maps every element to
/// its successor and therefore never onto itself for `n >= 2`.
fn rotate_by_one<T>(items: &[T]) -> Vec<T>
where
    T: Clone,
{
    (0..items.len())
        .map(|i| items[(i + 1) % items.len()].clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::{derange, derange_with_rng, rotate_by_one};
    use crate::test_utils::seeded_rng;

    #[test]
    fn output_is_a_fixed_point_free_permutation() {
        for len in 2..=32 {
            for seed in 0..20 {
                let items: Vec<u32> = (0..len).collect();
                let mut rng = seeded_rng(seed);
                let drawn = derange_with_rng(&items, &mut rng);

                assert_eq!(drawn.len(), items.len());

                // Same multiset of elements.
                let mut sorted = drawn.clone();
                sorted.sort_unstable();
                assert_eq!(sorted, items);

                // No element kept its position.
                for (position, item) in items.iter().enumerate() {
                    assert_ne!(drawn[position], *item, "fixed point at {position}");
                }
            }
        }
    }

    #[test]
    fn thread_rng_entry_point() {
        let items: Vec<u8> = (0..10).collect();
        for _ in 0..50 {
            let drawn = derange(&items);
            assert_eq!(drawn.len(), items.len());
            for (position, item) in items.iter().enumerate() {
                assert_ne!(drawn[position], *item);
            }
        }
    }

    #[test]
    fn degenerate_inputs_yield_empty_result() {
        assert_eq!(derange::<u8>(&[]), Vec::<u8>::new());
        assert_eq!(derange(&[7]), Vec::<i32>::new());
    }

    #[test]
    fn two_elements_always_swap() {
        for seed in 0..10 {
            let mut rng = seeded_rng(seed);
            assert_eq!(derange_with_rng(&["a", "b"], &mut rng), vec!["b", "a"]);
        }
    }

    #[test]
    fn same_seed_draws_the_same_result() {
        let items: Vec<u32> = (0..16).collect();
        let mut rng_1 = seeded_rng(42);
        let mut rng_2 = seeded_rng(42);
        assert_eq!(
            derange_with_rng(&items, &mut rng_1),
            derange_with_rng(&items, &mut rng_2)
        );
    }

    #[test]
    fn falls_back_to_rotation_when_shuffles_keep_fixed_points() {
        // Three equal elements out of four: every permutation places at
        // least one "x" into a position previously held by an "x", so all
        // shuffle attempts are exhausted and the deterministic rotation is
        // returned.
        let items = ["x", "x", "y", "x"];
        let mut rng = seeded_rng(1);
        let drawn = derange_with_rng(&items, &mut rng);
        assert_eq!(drawn, rotate_by_one(&items));
        assert_eq!(drawn, vec!["x", "y", "x", "x"]);
    }

    #[test]
    fn rotation_has_no_fixed_points() {
        for len in 2..=16 {
            let items: Vec<u32> = (0..len).collect();
            let rotated = rotate_by_one(&items);
            for (position, item) in items.iter().enumerate() {
                assert_ne!(rotated[position], *item);
            }
        }
    }
}
