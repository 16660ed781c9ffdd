//! Tests for core types

#[cfg(test)]
mod tests {
    use super::super::types::*;

    #[test]
    fn test_color_from_prices() {
        assert_eq!(CandleColor::from_prices(100.0, 101.0), CandleColor::Up);
        assert_eq!(CandleColor::from_prices(100.0, 99.0), CandleColor::Down);
    }

    #[test]
    fn test_color_tie_resolves_down() {
        assert_eq!(CandleColor::from_prices(100.0, 100.0), CandleColor::Down);
        let candle = Candle::new("BTCUSDT", 0, 50.0, 51.0, 49.0, 50.0, 1.0);
        assert_eq!(candle.color, CandleColor::Down);
    }

    #[test]
    fn test_color_serialization() {
        assert_eq!(serde_json::to_string(&CandleColor::Up).unwrap(), "\"UP\"");
        assert_eq!(serde_json::to_string(&CandleColor::Down).unwrap(), "\"DOWN\"");
        let up: CandleColor = serde_json::from_str("\"UP\"").unwrap();
        assert_eq!(up, CandleColor::Up);
    }

    #[test]
    fn test_opposite() {
        assert_eq!(CandleColor::Up.opposite(), CandleColor::Down);
        assert_eq!(CandleColor::Down.opposite(), CandleColor::Up);
    }

    #[test]
    fn test_body_and_wicks() {
        // Green candle: open 100, close 102, high 105, low 99
        let candle = Candle::new("ETHUSDT", 0, 100.0, 105.0, 99.0, 102.0, 10.0);
        assert!((candle.body() - 2.0).abs() < 1e-9);
        assert!((candle.body_ratio() - 0.02).abs() < 1e-9);
        assert!((candle.upper_wick() - 3.0).abs() < 1e-9);
        assert!((candle.lower_wick() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_body_ratio_zero_open() {
        let candle = Candle::new("X", 0, 0.0, 1.0, 0.0, 1.0, 0.0);
        assert_eq!(candle.body_ratio(), 0.0);
    }

    #[test]
    fn test_open_time_utc() {
        let candle = Candle::new("BTCUSDT", 1_700_000_000_000, 1.0, 1.0, 1.0, 1.0, 1.0);
        let ts = candle.open_time_utc().unwrap();
        assert_eq!(ts.timestamp(), 1_700_000_000);
    }

    #[test]
    fn test_group_by_instrument() {
        let candles = vec![
            Candle::new("BTCUSDT", 1, 1.0, 1.0, 1.0, 1.0, 1.0),
            Candle::new("ETHUSDT", 1, 1.0, 1.0, 1.0, 1.0, 1.0),
            Candle::new("BTCUSDT", 2, 1.0, 1.0, 1.0, 1.0, 1.0),
        ];
        let grouped = group_by_instrument(candles);
        assert_eq!(grouped.len(), 2);
        assert_eq!(grouped["BTCUSDT"].len(), 2);
        assert_eq!(grouped["ETHUSDT"].len(), 1);
    }

    #[test]
    fn test_candle_json_camel_case() {
        let candle = Candle::new("BTCUSDT", 5, 1.0, 2.0, 0.5, 1.5, 3.0);
        let json = serde_json::to_value(&candle).unwrap();
        assert_eq!(json["openTime"], 5);
        assert_eq!(json["color"], "UP");
    }
}
