pub fn decibels(x: f64) -> f64 {
    10. * x.log10()
}

pub fn decibels_or_else(x: f64, or: f64) -> f64 {
    if x <= 0. {
        or
    } else {
        10. * x.log10()
    }
}

// Position and value of the largest element. NaNs sort above everything under total_cmp, so
// callers are expected to pass finite values.
pub fn argmax(values: impl Iterator<Item = f64>) -> Option<(usize, f64)> {
    values
        .enumerate()
        .max_by(|a, b| a.1.total_cmp(&b.1))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn decibel_floor() {
        assert_eq!(decibels(100.), 20.);
        assert_eq!(decibels_or_else(0., -120.), -120.);
        assert_eq!(decibels_or_else(-3., -120.), -120.);
        assert_eq!(decibels_or_else(10., -120.), 10.);
    }

    #[test]
    fn argmax_picks_largest() {
        assert_eq!(argmax(vec![1., 5., -7., 5.].into_iter()), Some((3, 5.)));
        assert_eq!(argmax(std::iter::empty()), None);
    }
}
