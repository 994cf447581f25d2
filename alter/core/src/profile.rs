//! Trait Profiler
//!
//! The fixed "neural scan" questionnaire shown before a session and the
//! trait profile derived from its answers. The catalog never changes at
//! runtime: four questions, four options each, every option mapping to a
//! descriptor string. The profile is consumed downstream as an unordered
//! bag of keywords by the prompt builder.

/// One option in a scan question
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ScanOption {
    /// The label shown to the user
    pub text: &'static str,
    /// The descriptor recorded when this option is chosen
    pub trait_desc: &'static str,
}

/// One scan question with its four options
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ScanQuestion {
    /// The question text
    pub prompt: &'static str,
    /// The selectable options, in display order
    pub options: [ScanOption; 4],
}

/// The full scan catalog, in display order
pub const SCAN_QUESTIONS: [ScanQuestion; 4] = [
    ScanQuestion {
        prompt: "It's 11pm on a Friday. Where are you?",
        options: [
            ScanOption {
                text: "at home, probably should've slept hours ago",
                trait_desc: "introverted, reflective",
            },
            ScanOption {
                text: "out somewhere, lost track of time",
                trait_desc: "social, spontaneous",
            },
            ScanOption {
                text: "still working on something i can't put down",
                trait_desc: "driven, obsessive",
            },
            ScanOption {
                text: "depends on the week, honestly",
                trait_desc: "unpredictable, adaptable",
            },
        ],
    },
    ScanQuestion {
        prompt: "Someone cancels plans last minute. Your first feeling?",
        options: [
            ScanOption {
                text: "lowkey relieved ngl",
                trait_desc: "introverted, private",
            },
            ScanOption {
                text: "annoyed but i'll get over it fast",
                trait_desc: "direct, resilient",
            },
            ScanOption {
                text: "immediately start rescheduling",
                trait_desc: "organised, persistent",
            },
            ScanOption {
                text: "kinda sad but i won't say anything",
                trait_desc: "sensitive, avoidant",
            },
        ],
    },
    ScanQuestion {
        prompt: "How do you deal with a bad day?",
        options: [
            ScanOption {
                text: "go quiet. need to process alone",
                trait_desc: "introspective, withdrawn",
            },
            ScanOption {
                text: "talk it out with someone close",
                trait_desc: "open, emotionally expressive",
            },
            ScanOption {
                text: "distract myself until it passes",
                trait_desc: "avoidant, coping through action",
            },
            ScanOption {
                text: "pretend i'm fine until i actually am",
                trait_desc: "stoic, self-reliant",
            },
        ],
    },
    ScanQuestion {
        prompt: "How do you text people?",
        options: [
            ScanOption {
                text: "short replies, slow to respond",
                trait_desc: "reserved, selective",
            },
            ScanOption {
                text: "paragraphs, i over-explain everything",
                trait_desc: "expressive, overthinking",
            },
            ScanOption {
                text: "chaotic. voice notes, memes, walls of text",
                trait_desc: "impulsive, energetic",
            },
            ScanOption {
                text: "depends who it is",
                trait_desc: "context-aware, guarded",
            },
        ],
    },
];

/// The descriptors selected by a completed scan, one per question
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct TraitProfile {
    descriptors: Vec<&'static str>,
}

impl TraitProfile {
    /// Build a profile from the chosen option index of each question
    ///
    /// Answers beyond the catalog length are ignored; an out-of-range
    /// option index is a programmer error (the surface renders exactly four
    /// options) and is clamped to the last option in release builds.
    #[must_use]
    pub fn from_answers(answers: &[usize]) -> Self {
        let descriptors = SCAN_QUESTIONS
            .iter()
            .zip(answers)
            .map(|(question, &choice)| {
                debug_assert!(
                    choice < question.options.len(),
                    "scan answer {choice} out of range for question {:?}",
                    question.prompt
                );
                let choice = choice.min(question.options.len() - 1);
                question.options[choice].trait_desc
            })
            .collect();
        Self { descriptors }
    }

    /// The selected descriptors, in question order
    #[must_use]
    pub fn descriptors(&self) -> &[&'static str] {
        &self.descriptors
    }

    /// The descriptors joined into the comma-separated keyword bag the
    /// prompt builder matches against
    #[must_use]
    pub fn keyword_bag(&self) -> String {
        self.descriptors.join(", ")
    }

    /// True when a keyword appears anywhere in the profile
    #[must_use]
    pub fn has(&self, keyword: &str) -> bool {
        self.descriptors.iter().any(|d| d.contains(keyword))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_catalog_shape() {
        assert_eq!(SCAN_QUESTIONS.len(), 4);
        for question in &SCAN_QUESTIONS {
            assert_eq!(question.options.len(), 4);
            for option in &question.options {
                assert!(!option.text.is_empty());
                assert!(!option.trait_desc.is_empty());
            }
        }
    }

    #[test]
    fn test_profile_from_answers() {
        let profile = TraitProfile::from_answers(&[0, 1, 2, 3]);
        assert_eq!(
            profile.descriptors(),
            &[
                "introverted, reflective",
                "direct, resilient",
                "avoidant, coping through action",
                "context-aware, guarded",
            ]
        );
    }

    #[test]
    fn test_keyword_bag_joins_in_order() {
        let profile = TraitProfile::from_answers(&[1, 1, 1, 1]);
        assert_eq!(
            profile.keyword_bag(),
            "social, spontaneous, direct, resilient, open, emotionally expressive, \
             expressive, overthinking"
        );
    }

    #[test]
    fn test_has_matches_partial_descriptor() {
        let profile = TraitProfile::from_answers(&[0, 0, 0, 0]);
        assert!(profile.has("introverted"));
        assert!(profile.has("withdrawn"));
        assert!(!profile.has("spontaneous"));
    }

    #[test]
    fn test_short_answer_list_yields_partial_profile() {
        let profile = TraitProfile::from_answers(&[2]);
        assert_eq!(profile.descriptors(), &["driven, obsessive"]);
    }
}
