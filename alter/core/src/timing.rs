//! Timing policy
//!
//! Every artificial delay in the client lives here as a pure function or a
//! named constant, separated from the code that schedules it. The
//! controller decides *when* to sleep; this module decides *how long*, so
//! the pacing rules are unit-testable without a runtime.

use std::time::Duration;

use rand::Rng;

/// Per-character cost of the simulated typing delay
pub const TYPING_MS_PER_CHAR: u64 = 12;
/// Floor of the simulated typing delay
pub const TYPING_DELAY_MIN: Duration = Duration::from_millis(600);
/// Ceiling of the simulated typing delay
pub const TYPING_DELAY_MAX: Duration = Duration::from_millis(2000);

/// Loader status lines, in display order
pub const LOADER_STEPS: [&str; 5] = [
    "scanning timelines...",
    "locating the fork...",
    "reading your patterns...",
    "bridging realities...",
    "connection established",
];

/// Gap between disconnect terminal lines
pub const DISCONNECT_LINE_STAGGER: Duration = Duration::from_millis(350);
/// Pause after the last terminal line before tearing down
pub const DISCONNECT_SETTLE: Duration = Duration::from_millis(800);

/// Alphabet the scramble effect draws unresolved characters from
pub const SCRAMBLE_CHARS: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789!@#$%^&*()_+-=[]{}|;:,.<>?";

/// Simulated delay before an assistant reply is shown
///
/// Proportional to reply length so longer messages "take longer to type",
/// clamped so short replies still feel considered and long ones don't stall
/// the conversation.
#[must_use]
pub fn response_delay(reply_chars: usize) -> Duration {
    typing_delay(reply_chars, TYPING_MS_PER_CHAR, TYPING_DELAY_MIN, TYPING_DELAY_MAX)
}

/// [`response_delay`] with caller-supplied pacing, for configurable
/// controllers and for tests that collapse the bounds
#[must_use]
pub fn typing_delay(reply_chars: usize, ms_per_char: u64, min: Duration, max: Duration) -> Duration {
    Duration::from_millis(reply_chars as u64 * ms_per_char).clamp(min, max)
}

/// Interval between loader status lines for a given total loader duration
#[must_use]
pub fn loader_step_interval(total: Duration) -> Duration {
    total / LOADER_STEPS.len() as u32
}

/// One frame of the scramble-then-resolve text effect
///
/// Characters left of the reveal point (`progress` in 0.0..=1.0) show their
/// final value; the rest are random noise from [`SCRAMBLE_CHARS`].
/// Whitespace is never scrambled so line shape stays readable mid-effect.
#[must_use]
pub fn scramble_frame(final_text: &str, progress: f32, rng: &mut impl Rng) -> String {
    let progress = progress.clamp(0.0, 1.0);
    let total = final_text.chars().count();
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let resolved = (progress * total as f32).floor() as usize;
    final_text
        .chars()
        .enumerate()
        .map(|(i, c)| {
            if i < resolved || c.is_whitespace() {
                c
            } else {
                SCRAMBLE_CHARS[rng.gen_range(0..SCRAMBLE_CHARS.len())] as char
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rand::SeedableRng;

    #[test]
    fn test_response_delay_scales_with_length() {
        assert_eq!(response_delay(100), Duration::from_millis(1200));
        assert_eq!(response_delay(150), Duration::from_millis(1800));
    }

    #[test]
    fn test_response_delay_floor() {
        assert_eq!(response_delay(0), TYPING_DELAY_MIN);
        assert_eq!(response_delay(10), TYPING_DELAY_MIN);
        // 50 chars x 12ms = 600ms, exactly at the floor
        assert_eq!(response_delay(50), TYPING_DELAY_MIN);
    }

    #[test]
    fn test_response_delay_ceiling() {
        assert_eq!(response_delay(167), TYPING_DELAY_MAX);
        assert_eq!(response_delay(10_000), TYPING_DELAY_MAX);
    }

    #[test]
    fn test_typing_delay_honors_custom_bounds() {
        let min = Duration::from_millis(50);
        let max = Duration::from_millis(200);
        assert_eq!(typing_delay(0, 10, min, max), min);
        assert_eq!(typing_delay(10, 10, min, max), Duration::from_millis(100));
        assert_eq!(typing_delay(1000, 10, min, max), max);
        // the default policy is the same function with the fixed pacing
        assert_eq!(
            typing_delay(100, TYPING_MS_PER_CHAR, TYPING_DELAY_MIN, TYPING_DELAY_MAX),
            response_delay(100)
        );
    }

    #[test]
    fn test_loader_interval_divides_total() {
        let interval = loader_step_interval(Duration::from_secs(12));
        assert_eq!(interval, Duration::from_millis(2400));
    }

    #[test]
    fn test_scramble_fully_resolved_at_one() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(7);
        let text = "[SYS] Severing connection...";
        assert_eq!(scramble_frame(text, 1.0, &mut rng), text);
    }

    #[test]
    fn test_scramble_preserves_length_and_whitespace() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(7);
        let text = "[OK] Blocks compressed.";
        let frame = scramble_frame(text, 0.3, &mut rng);
        assert_eq!(frame.chars().count(), text.chars().count());
        for (a, b) in text.chars().zip(frame.chars()) {
            assert_eq!(a.is_whitespace(), b.is_whitespace());
        }
    }

    #[test]
    fn test_scramble_partial_reveal_keeps_prefix() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(7);
        let text = "abcdefghij";
        let frame = scramble_frame(text, 0.5, &mut rng);
        assert_eq!(&frame[..5], "abcde");
    }

    #[test]
    fn test_scramble_out_of_range_progress_is_clamped() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(7);
        assert_eq!(scramble_frame("abc", 2.0, &mut rng), "abc");
        let frame = scramble_frame("abc", -1.0, &mut rng);
        assert_eq!(frame.len(), 3);
    }
}
