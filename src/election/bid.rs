use rand::Rng;

/// Draws a fresh auction bid, uniform in [0.10, 0.90] rounded to two
/// decimals. 0.0 is reserved for "no bid drawn yet".
pub fn draw_bid() -> f64 {
    let mut rng = rand::thread_rng();
    let price: f64 = 0.1 + 0.8 * rng.gen::<f64>();
    (price * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bid_stays_in_range_with_two_decimals() {
        for _ in 0..1000 {
            let bid = draw_bid();
            assert!((0.10..=0.90).contains(&bid), "bid out of range: {bid}");
            assert!((bid * 100.0 - (bid * 100.0).round()).abs() < 1e-9);
            assert!(bid != 0.0);
        }
    }
}
