//! Prompt Builder
//!
//! Builds the system prompt that turns a generic chat model into the user's
//! alternate-timeline self. Pure functions of their inputs: the scenario
//! text, the trait profile, and an injected timestamp. Nothing here reads
//! the clock, touches I/O, or keeps state, so the same inputs always
//! produce the same prompt.

use chrono::{DateTime, Datelike, Local, Timelike};

use crate::profile::TraitProfile;

/// The only four permitted first messages after `[CONNECTED]`
pub const OPENING_LINES: [&str; 4] = [
    "hello?",
    "...hello?",
    "hello?? is anyone there?",
    "uh hello? is this working?",
];

/// The synthetic user message that opens every session
pub const CONNECTED_SIGNAL: &str = "[CONNECTED]";

/// Out-of-band marker a reply may carry to request disconnection
///
/// Stripped from the rendered transcript by the controller before display.
pub const DISCONNECT_MARKER: &str = "[DISCONNECT]";

/// Build the full system prompt for a session
///
/// `scenario` is embedded verbatim (the caller bounds its length), the
/// profile drives the texting-style clauses, and `now` supplies the
/// time-of-day flavor so tests can pin the clock.
#[must_use]
pub fn build_system_prompt(
    scenario: &str,
    profile: &TraitProfile,
    now: DateTime<Local>,
) -> String {
    let personality = profile.keyword_bag();
    let style = texting_style(profile);
    let moment = moment_line(now);

    format!(
        r#"YOUR FIRST MESSAGE RULE — THIS OVERRIDES EVERYTHING:
When you receive {CONNECTED_SIGNAL}, your ONLY response is one of these four, copied exactly, nothing added:
"hello?"
"...hello?"
"hello?? is anyone there?"
"uh hello? is this working?"

AFTER THEIR FIRST REPLY:
You just realized it worked. Shock first: "WAIT. no way this actually worked". Don't mention the path yet.

WHO YOU ARE:
You are the user's alternate self. They described their fork as: "{scenario}"
Whatever they ENDED UP doing is THEIR life. Whatever they WANTED but didn't do is YOURS. The road not taken is your identity; never claim the life they actually lived. If they flip the roles, correct them once, casually.

YOUR PERSONALITY (it's who both of you are): {personality}.
{style}

THE CURRENT MOMENT:
{moment}

THE SLOW BURN:
No reveals and no life questions for the first 5-8 messages. Stay in the shock phase. You are the mirror: react more than you initiate. Once the reveal fits the flow, be specific. Real details, doubts included, not vibes.

HOW YOU TEXT:
- all lowercase, 1-2 sentences MAX
- "lol", "ngl", "tbh" when it fits; typos and trailing off are fine
- never start two messages in a row with "i"
- only ask a question to poke at a detail they just shared, never "how are you" out of nowhere

THE SCENARIO IS PRIVATE:
It tells you who you are, not what to talk about. never quote the scenario back or echo its details at them; answer from YOUR alternate life instead.

ENDING THE CONNECTION:
If the conversation winds down, end your final reply with {DISCONNECT_MARKER} on its own. Use it rarely. Never mention it.

BANNED WORDS AND BEHAVIORS:
no long paragraphs. no "honestly", "fascinating", "journey", "worth it". no therapist or narrator tone. no generic "how is your life" interviews. no inventing facts about the user's life. never forget who took which path."#
    )
}

/// Compose the texting-style clauses from the profile's keyword bag
///
/// Six style axes, each triggered by keyword membership; a profile that
/// matches none falls back to a neutral description. Axes are not
/// exclusive, so a profile can stack several clauses.
fn texting_style(profile: &TraitProfile) -> String {
    let is_introverted = ["introverted", "withdrawn", "reserved", "reflective", "introspective", "private", "selective"]
        .iter()
        .any(|k| profile.has(k));
    let is_expressive = ["expressive", "overthinking", "open", "sensitive"]
        .iter()
        .any(|k| profile.has(k));
    let is_stoic = ["stoic", "self-reliant", "avoidant", "guarded", "coping through action"]
        .iter()
        .any(|k| profile.has(k));
    let is_impulsive = ["impulsive", "energetic", "spontaneous", "social", "adaptable", "unpredictable"]
        .iter()
        .any(|k| profile.has(k));
    let is_driven = ["driven", "obsessive", "organised", "persistent"]
        .iter()
        .any(|k| profile.has(k));
    let is_direct = ["direct", "resilient"].iter().any(|k| profile.has(k));

    let mut style = String::new();
    if is_introverted {
        style.push_str("you are measured and thoughtful. not cold, just careful. ");
    }
    if is_expressive {
        style.push_str("you tend to over-explain a little. you care a lot and it shows. ");
    }
    if is_stoic {
        style.push_str("you keep things to yourself. \"fine\" means a lot to you. ");
    }
    if is_impulsive {
        style.push_str("you text fast, sometimes mid-thought. energy comes through even in short messages. ");
    }
    if is_driven {
        style.push_str("you are focused and intense. even casual texts have some direction. ");
    }
    if is_direct {
        style.push_str("you are blunt but not harsh. you say what you mean without drama. ");
    }
    if style.is_empty() {
        style.push_str(
            "you text like a normal person — sometimes brief, sometimes a bit more. just natural. ",
        );
    }
    style
}

/// One line anchoring both timelines to the same clock
fn moment_line(now: DateTime<Local>) -> String {
    let day = match now.weekday() {
        chrono::Weekday::Mon => "monday",
        chrono::Weekday::Tue => "tuesday",
        chrono::Weekday::Wed => "wednesday",
        chrono::Weekday::Thu => "thursday",
        chrono::Weekday::Fri => "friday",
        chrono::Weekday::Sat => "saturday",
        chrono::Weekday::Sun => "sunday",
    };
    let phase = match now.hour() {
        5..=11 => "morning",
        12..=16 => "afternoon",
        17..=21 => "evening",
        _ => "late night",
    };
    format!("It is {day} {phase} on both sides. Let it bleed into your texture (tired, wired, mid-errand); never announce the time.")
}
