use ndarray::{s, Array1, Array2, Axis};
use statrs::distribution::{ContinuousCDF, Normal};

/// Returns a `kernlen x kernlen` Gaussian blending kernel spanning `nsig` standard deviations
/// on each side of its center, normalized so it sums to one.
///
/// The 1-D kernel is the difference of the standard normal CDF over `kernlen` equal intervals;
/// the 2-D one is the square root of its outer product.
pub fn gkern(kernlen: usize, nsig: f64) -> Array2<f32> {
    let interval = (2. * nsig + 1.) / kernlen as f64;
    let start = -nsig - interval / 2.;
    let stop = nsig + interval / 2.;
    let normal = Normal::standard();
    let bounds = Array1::linspace(start, stop, kernlen + 1).mapv(|x| normal.cdf(x));

    let kern1d = &bounds.slice(s![1..]) - &bounds.slice(s![..-1]);
    let col = kern1d.view().insert_axis(Axis(1));
    let row = kern1d.view().insert_axis(Axis(0));

    let raw = (&col * &row).mapv(f64::sqrt);
    let total = raw.sum();

    raw.mapv(|v| (v / total) as f32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sums_to_one() {
        for (kernlen, nsig) in [(1, 3.), (5, 1.), (21, 3.), (64, 4.), (100, 4.)] {
            let k = gkern(kernlen, nsig);
            assert_eq!(k.dim(), (kernlen, kernlen));
            assert!((k.sum() - 1.).abs() < 1e-4, "{kernlen}: {}", k.sum());
        }
    }

    #[test]
    fn symmetric_under_reversal() {
        for kernlen in [7, 20] {
            let k = gkern(kernlen, 2.);
            for ((i, j), &v) in k.indexed_iter() {
                assert!((v - k[[kernlen - 1 - i, j]]).abs() < 1e-6);
                assert!((v - k[[i, kernlen - 1 - j]]).abs() < 1e-6);
                assert!((v - k[[j, i]]).abs() < 1e-6);
            }
        }
    }

    #[test]
    fn three_by_three_over_one_sigma() {
        // 1-D weights are the normal mass of [-1.5, -0.5], [-0.5, 0.5] and [0.5, 1.5].
        let k = gkern(3, 1.);
        assert!((k[[1, 1]] - 0.149_182).abs() < 1e-5);
        assert!((k[[0, 0]] - 0.094_175).abs() < 1e-5);
        assert!((k[[0, 1]] - 0.118_529).abs() < 1e-5);
    }

    #[test]
    fn peaks_at_the_center() {
        let k = gkern(21, 3.);
        let (argmax, _) = k
            .indexed_iter()
            .fold(((0, 0), f32::MIN), |best, (idx, &v)| {
                if v > best.1 { (idx, v) } else { best }
            });

        assert_eq!(argmax, (10, 10));
        assert!(k[[10, 10]] > k[[0, 0]]);
    }
}
