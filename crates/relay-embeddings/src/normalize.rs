//! Vector normalization and pooling.

/// Compute the L2 (Euclidean) norm of a vector.
pub fn l2_norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// L2-normalize a vector in-place. Zero vectors remain zero.
pub fn l2_normalize(v: &mut [f32]) {
    let norm = l2_norm(v);
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}

/// Attention-masked mean over token embeddings.
///
/// `hidden` is one sequence laid out as `seq_len * hidden_dim` floats and
/// `mask` holds one entry per token (non-zero = real token). A sequence with
/// no real tokens pools to zeros.
pub fn mean_pool(hidden: &[f32], mask: &[i64], hidden_dim: usize) -> Vec<f32> {
    let mut pooled = vec![0.0f32; hidden_dim];
    let mut count = 0usize;
    for (token, &m) in mask.iter().enumerate() {
        if m == 0 {
            continue;
        }
        let start = token * hidden_dim;
        let Some(row) = hidden.get(start..start + hidden_dim) else {
            break;
        };
        for (acc, x) in pooled.iter_mut().zip(row) {
            *acc += x;
        }
        count += 1;
    }
    if count > 0 {
        #[allow(clippy::cast_precision_loss)]
        let denom = count as f32;
        for x in &mut pooled {
            *x /= denom;
        }
    }
    pooled
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPSILON: f32 = 1e-6;

    fn approx_eq(a: f32, b: f32) -> bool {
        (a - b).abs() < EPSILON
    }

    #[test]
    fn l2_norm_unit_vector() {
        assert!(approx_eq(l2_norm(&[1.0, 0.0, 0.0]), 1.0));
    }

    #[test]
    fn l2_norm_three_four_five() {
        assert!(approx_eq(l2_norm(&[3.0, 4.0]), 5.0));
    }

    #[test]
    fn l2_normalize_zero_stays_zero() {
        let mut v = vec![0.0, 0.0];
        l2_normalize(&mut v);
        assert_eq!(v, vec![0.0, 0.0]);
    }

    #[test]
    fn mean_pool_ignores_padding() {
        // Two real tokens, one padding token, hidden_dim = 2.
        let hidden = [1.0, 2.0, 3.0, 4.0, 100.0, 100.0];
        let mask = [1, 1, 0];
        let pooled = mean_pool(&hidden, &mask, 2);
        assert!(approx_eq(pooled[0], 2.0));
        assert!(approx_eq(pooled[1], 3.0));
    }

    #[test]
    fn mean_pool_all_padding_is_zero() {
        let hidden = [1.0, 2.0];
        let pooled = mean_pool(&hidden, &[0], 2);
        assert_eq!(pooled, vec![0.0, 0.0]);
    }

    #[test]
    fn mean_pool_short_hidden_stops() {
        let hidden = [1.0, 1.0];
        let pooled = mean_pool(&hidden, &[1, 1], 2);
        assert_eq!(pooled, vec![1.0, 1.0]);
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn normalize_produces_unit(v in proptest::collection::vec(-100.0f32..100.0, 1..64)) {
                let has_nonzero = v.iter().any(|x| *x != 0.0);
                let mut v = v;
                l2_normalize(&mut v);
                if has_nonzero {
                    prop_assert!((l2_norm(&v) - 1.0).abs() < 1e-4);
                }
            }

            #[test]
            fn mean_pool_output_has_hidden_dim(
                dim in 1usize..16,
                tokens in 1usize..8,
            ) {
                let hidden = vec![1.0f32; dim * tokens];
                let mask = vec![1i64; tokens];
                let pooled = mean_pool(&hidden, &mask, dim);
                prop_assert_eq!(pooled.len(), dim);
                prop_assert!(pooled.iter().all(|x| (x - 1.0).abs() < 1e-5));
            }
        }
    }
}
