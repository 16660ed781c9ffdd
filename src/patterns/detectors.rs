//! The detector library

use super::{PatternId, PatternSignal};
use crate::types::{Candle, CandleColor};

/// Relative body above which a candle counts as "strong" (0.1%)
const STRONG_BODY_RATIO: f64 = 0.001;
/// Relative body below which a candle is a doji (0.05%)
const DOJI_BODY_RATIO: f64 = 0.0005;
/// Relative wick that marks a rejected extremum (0.2%)
const EXTREMUM_WICK_RATIO: f64 = 0.002;
const BREAKOUT_BODY_MULTIPLE: f64 = 1.5;
const ENGULFING_BODY_MULTIPLE: f64 = 1.1;
/// Ratios are capped so degenerate zero bodies stay finite
const MAX_RATIO: f64 = 100.0;

fn tail(window: &[Candle], n: usize) -> Option<&[Candle]> {
    if window.len() < n {
        None
    } else {
        Some(&window[window.len() - n..])
    }
}

fn color_counts(candles: &[Candle]) -> (usize, usize) {
    let up = candles.iter().filter(|c| c.color == CandleColor::Up).count();
    (up, candles.len() - up)
}

fn ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator > 0.0 {
        (numerator / denominator).min(MAX_RATIO)
    } else if numerator > 0.0 {
        MAX_RATIO
    } else {
        0.0
    }
}

fn signal(pattern: PatternId, predicted: CandleColor, confidence: f64, rationale: String) -> PatternSignal {
    PatternSignal {
        pattern,
        predicted,
        confidence: confidence.clamp(0.0, 1.0),
        rationale,
    }
}

/// Majority color of the last 3 candles, bet on continuation
pub fn detect_majority(window: &[Candle]) -> Option<PatternSignal> {
    let last3 = tail(window, 3)?;
    let (up, down) = color_counts(last3);

    let (color, count, margin) = match up.cmp(&down) {
        std::cmp::Ordering::Greater => (CandleColor::Up, up, up - down),
        std::cmp::Ordering::Less => (CandleColor::Down, down, down - up),
        std::cmp::Ordering::Equal => return None,
    };

    Some(signal(
        PatternId::MajorityOfThree,
        color,
        (0.5 + margin as f64 * 0.1).min(0.8),
        format!("Majority {} ({}/3), betting on continuation", color, count),
    ))
}

/// Opposite of the last-3 majority, bet on reversal
pub fn detect_minority(window: &[Candle]) -> Option<PatternSignal> {
    let last3 = tail(window, 3)?;
    let (up, down) = color_counts(last3);

    let (majority, margin) = match up.cmp(&down) {
        std::cmp::Ordering::Greater => (CandleColor::Up, up - down),
        std::cmp::Ordering::Less => (CandleColor::Down, down - up),
        std::cmp::Ordering::Equal => return None,
    };
    let minority = majority.opposite();

    Some(signal(
        PatternId::MinorityOfThree,
        minority,
        (0.4 + margin as f64 * 0.1).min(0.7),
        format!("Minority {} under {} majority, betting on reversal", minority, majority),
    ))
}

/// Three candles of one color, bet on continuation
pub fn detect_triple_continuation(window: &[Candle]) -> Option<PatternSignal> {
    let last3 = tail(window, 3)?;
    let color = last3[0].color;
    if !last3.iter().all(|c| c.color == color) {
        return None;
    }

    let strong = last3
        .iter()
        .filter(|c| c.body_ratio() > STRONG_BODY_RATIO)
        .count();
    let strong_fraction = strong as f64 / last3.len() as f64;

    Some(signal(
        PatternId::TripleContinuation,
        color,
        (0.6 + 0.3 * strong_fraction).min(0.9),
        format!("Three {} candles, {}/3 with strong bodies", color, strong),
    ))
}

/// Period-two alternation: `A,A,B,B` or strict `A,B,A,B`, both continue with `A`
pub fn detect_dual_alternation(window: &[Candle]) -> Option<PatternSignal> {
    let last4 = tail(window, 4)?;
    let c: Vec<CandleColor> = last4.iter().map(|candle| candle.color).collect();

    if c[0] == c[1] && c[2] == c[3] && c[0] != c[2] {
        return Some(signal(
            PatternId::DualAlternation,
            c[0],
            0.7,
            format!("2x2 alternation {0}-{0}-{1}-{1}, next block {0}", c[0], c[2]),
        ));
    }

    if c[0] != c[1] && c[1] != c[2] && c[2] != c[3] {
        return Some(signal(
            PatternId::DualAlternation,
            c[0],
            0.65,
            format!("1x1 alternation {0}-{1}-{0}-{1}, next {0}", c[0], c[1]),
        ));
    }

    None
}

/// Run of 3 broken by an opposite candle with a much larger body
pub fn detect_breakout_after_run(window: &[Candle]) -> Option<PatternSignal> {
    let last4 = tail(window, 4)?;
    let (run, breakout) = last4.split_at(3);
    let breakout = &breakout[0];

    let run_color = run[0].color;
    if !run.iter().all(|c| c.color == run_color) || breakout.color == run_color {
        return None;
    }

    let avg_body = run.iter().map(|c| c.body_ratio()).sum::<f64>() / run.len() as f64;
    let body = breakout.body_ratio();
    let body_multiple = ratio(body, avg_body);
    if body_multiple <= BREAKOUT_BODY_MULTIPLE {
        return None;
    }

    Some(signal(
        PatternId::BreakoutAfterRun,
        breakout.color,
        (0.5 + (body_multiple - 1.0) * 0.2).min(0.8),
        format!(
            "Force candle {} with {:.3}% body ({:.1}x run average) after {} run",
            breakout.color,
            body * 100.0,
            body_multiple,
            run_color
        ),
    ))
}

/// Opposite-colored pair where the second body dominates the first
pub fn detect_engulfing(window: &[Candle]) -> Option<PatternSignal> {
    let last2 = tail(window, 2)?;
    let (prev, current) = (&last2[0], &last2[1]);

    if prev.color == current.color {
        return None;
    }
    if current.body() <= prev.body() * ENGULFING_BODY_MULTIPLE {
        return None;
    }

    let body_multiple = ratio(current.body(), prev.body());
    Some(signal(
        PatternId::Engulfing,
        current.color,
        (0.6 + (body_multiple - 1.0) * 0.2).min(0.9),
        format!(
            "{} engulfs {} ({:.2}x body)",
            current.color, prev.color, body_multiple
        ),
    ))
}

/// Doji followed by a directional confirmation candle
pub fn detect_indecision_reversal(window: &[Candle]) -> Option<PatternSignal> {
    let last2 = tail(window, 2)?;
    let (doji, confirmation) = (&last2[0], &last2[1]);

    if doji.body_ratio() >= DOJI_BODY_RATIO || confirmation.body_ratio() < DOJI_BODY_RATIO {
        return None;
    }

    Some(signal(
        PatternId::IndecisionReversal,
        confirmation.color,
        0.7,
        format!("Doji indecision confirmed by {}", confirmation.color),
    ))
}

/// Same-color run of odd length (3, 5, ...), bet on reversal
pub fn detect_odd_run_reversal(window: &[Candle]) -> Option<PatternSignal> {
    tail(window, 3)?;
    let last = window.last()?;

    let run = window
        .iter()
        .rev()
        .take_while(|c| c.color == last.color)
        .count();
    if run < 3 || run % 2 == 0 {
        return None;
    }

    let predicted = last.color.opposite();
    Some(signal(
        PatternId::OddRunReversal,
        predicted,
        (0.3 + run as f64 * 0.05).min(0.6),
        format!("Odd run of {} {} candles, betting on {}", run, last.color, predicted),
    ))
}

/// Valley (`DOWN,DOWN,UP`) or peak (`UP,UP,DOWN`) whose middle candle
/// rejected the extreme with a long wick
pub fn detect_extremum_reversal(window: &[Candle]) -> Option<PatternSignal> {
    let last3 = tail(window, 3)?;
    let (first, middle, last) = (&last3[0], &last3[1], &last3[2]);

    if first.color != middle.color || last.color == middle.color {
        return None;
    }

    let (wick, reference, kind) = match middle.color {
        CandleColor::Down => (middle.lower_wick(), middle.open, "Valley"),
        CandleColor::Up => (middle.upper_wick(), middle.close, "Peak"),
    };
    if reference <= 0.0 || wick / reference <= EXTREMUM_WICK_RATIO {
        return None;
    }

    let wick_to_body = ratio(wick, middle.body());
    Some(signal(
        PatternId::ExtremumReversal,
        last.color,
        (0.6 + 0.1 * wick_to_body).min(0.85),
        format!(
            "{} rejected with {:.2}% wick ({:.1}x body), reversal {}",
            kind,
            wick / reference * 100.0,
            wick_to_body,
            last.color
        ),
    ))
}
