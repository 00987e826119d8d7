//! Command dispatch
//!
//! Recognized text is matched against an ordered list of [`CommandRule`]s by
//! substring containment; the first match decides the spoken reply and
//! whether the loop keeps running. Dispatch never performs side effects: an
//! [`OsAction`] is handed back in the [`Decision`] for the caller to run.

mod actions;
mod rules;

use chrono::{DateTime, Local, TimeZone};

pub use actions::{DEFAULT_BROWSER_URL, DryRun, OsAction, OsActions, SystemLauncher};
pub use rules::builtin_rules;

/// Reply used when nothing matches
pub const UNKNOWN_COMMAND_REPLY: &str = "I'm sorry, I don't know that command";

/// Recognized text, trimmed and lower-cased
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Utterance(String);

impl Utterance {
    #[must_use]
    pub fn new(raw: &str) -> Self {
        Self(raw.trim().to_lowercase())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Display for Utterance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Predicate over normalized text
#[derive(Debug, Clone)]
pub enum Matcher {
    /// Text contains at least one of the keywords
    Any(Vec<&'static str>),
    /// Text contains one keyword from each group
    All(Vec<Vec<&'static str>>),
}

impl Matcher {
    #[must_use]
    pub fn any(keywords: &[&'static str]) -> Self {
        Self::Any(keywords.to_vec())
    }

    #[must_use]
    pub fn all(first: &[&'static str], second: &[&'static str]) -> Self {
        Self::All(vec![first.to_vec(), second.to_vec()])
    }

    #[must_use]
    pub fn matches(&self, text: &str) -> bool {
        match self {
            Self::Any(keywords) => keywords.iter().any(|k| text.contains(k)),
            Self::All(groups) => groups
                .iter()
                .all(|group| group.iter().any(|k| text.contains(k))),
        }
    }
}

/// What a rule says when it fires
#[derive(Debug, Clone)]
pub enum Reply {
    /// Fixed sentence
    Text(&'static str),
    /// `"<prefix> <now formatted>"`
    Clock {
        prefix: &'static str,
        format: &'static str,
    },
}

/// One entry of the command table
#[derive(Debug, Clone)]
pub struct CommandRule {
    pub name: &'static str,
    pub matcher: Matcher,
    pub reply: Reply,
    pub os_action: Option<OsAction>,
    pub continue_loop: bool,
}

impl CommandRule {
    #[must_use]
    pub fn new(name: &'static str, matcher: Matcher, reply: Reply) -> Self {
        Self {
            name,
            matcher,
            reply,
            os_action: None,
            continue_loop: true,
        }
    }

    /// Rule that answers with a fixed sentence
    #[must_use]
    pub fn say(name: &'static str, matcher: Matcher, text: &'static str) -> Self {
        Self::new(name, matcher, Reply::Text(text))
    }

    /// Rule that answers and then ends the loop
    #[must_use]
    pub fn stop(name: &'static str, matcher: Matcher, text: &'static str) -> Self {
        let mut rule = Self::say(name, matcher, text);
        rule.continue_loop = false;
        rule
    }

    #[must_use]
    pub fn with_action(mut self, action: OsAction) -> Self {
        self.os_action = Some(action);
        self
    }

    fn decide<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> Decision
    where
        Tz::Offset: std::fmt::Display,
    {
        let response = match &self.reply {
            Reply::Text(text) => (*text).to_string(),
            Reply::Clock { prefix, format } => format!("{prefix} {}", now.format(format)),
        };

        Decision {
            response,
            continue_loop: self.continue_loop,
            os_action: self.os_action,
            rule: Some(self.name),
        }
    }
}

/// Outcome of dispatching one utterance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    /// Sentence to speak
    pub response: String,
    /// False only for the farewell rule
    pub continue_loop: bool,
    /// Side effect for the caller to run
    pub os_action: Option<OsAction>,
    /// Name of the rule that fired, `None` for the unknown-command reply
    pub rule: Option<&'static str>,
}

impl Decision {
    fn unknown() -> Self {
        Self {
            response: UNKNOWN_COMMAND_REPLY.to_string(),
            continue_loop: true,
            os_action: None,
            rule: None,
        }
    }
}

/// Maps utterances to decisions, first match wins
#[derive(Debug, Clone)]
pub struct CommandDispatcher {
    rules: Vec<CommandRule>,
}

impl Default for CommandDispatcher {
    fn default() -> Self {
        Self::new(builtin_rules())
    }
}

impl CommandDispatcher {
    #[must_use]
    pub fn new(rules: Vec<CommandRule>) -> Self {
        Self { rules }
    }

    #[must_use]
    pub fn rules(&self) -> &[CommandRule] {
        &self.rules
    }

    /// Decide using the local wall clock
    #[must_use]
    pub fn dispatch(&self, utterance: &Utterance) -> Decision {
        self.dispatch_at(utterance, &Local::now())
    }

    /// Decide as if the current time were `now`
    #[must_use]
    pub fn dispatch_at<Tz: TimeZone>(&self, utterance: &Utterance, now: &DateTime<Tz>) -> Decision
    where
        Tz::Offset: std::fmt::Display,
    {
        let decision = self
            .matching_rule(utterance)
            .map_or_else(Decision::unknown, |rule| rule.decide(now));

        tracing::debug!(
            utterance = %utterance,
            rule = decision.rule.unwrap_or("unknown"),
            continue_loop = decision.continue_loop,
            "command dispatched"
        );

        decision
    }

    /// First rule accepting `utterance`
    #[must_use]
    pub fn matching_rule(&self, utterance: &Utterance) -> Option<&CommandRule> {
        if utterance.is_empty() {
            return None;
        }
        self.rules
            .iter()
            .find(|rule| rule.matcher.matches(utterance.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn at_noon() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 9, 12, 5, 0).unwrap()
    }

    fn dispatch(text: &str) -> Decision {
        CommandDispatcher::default().dispatch_at(&Utterance::new(text), &at_noon())
    }

    #[test]
    fn test_utterance_normalized() {
        assert_eq!(Utterance::new("  ПРИВЕТ Мир ").as_str(), "привет мир");
        assert!(Utterance::new("   ").is_empty());
    }

    #[test]
    fn test_greeting() {
        let decision = dispatch("привет");
        assert_eq!(decision.response, "Hi! Good to hear from you.");
        assert!(decision.continue_loop);
        assert_eq!(decision.rule, Some("greeting"));
    }

    #[test]
    fn test_time_and_date_use_clock() {
        assert_eq!(dispatch("сколько время").response, "Current time 12:05");
        assert_eq!(dispatch("какая сегодня дата").response, "Today 09.03.2024");
    }

    #[test]
    fn test_farewell_stops() {
        let decision = dispatch("до свидания");
        assert_eq!(decision.response, "Goodbye! It's been a pleasure.");
        assert!(!decision.continue_loop);
    }

    #[test]
    fn test_farewell_wins_over_other_rules() {
        for text in ["пока, сколько время", "привет и пока", "открой браузер, bye"] {
            let decision = dispatch(text);
            assert_eq!(decision.rule, Some("farewell"), "for {text:?}");
            assert!(!decision.continue_loop);
        }
    }

    #[test]
    fn test_open_commands_request_actions() {
        let browser = dispatch("открыть браузер");
        assert_eq!(browser.os_action, Some(OsAction::OpenBrowser));
        assert_eq!(browser.response, "I open the browser");

        let editor = dispatch("открой блокнот");
        assert_eq!(editor.os_action, Some(OsAction::OpenEditor));

        let unknown = dispatch("открыть окно и время");
        assert_eq!(unknown.rule, Some("open-unknown"));
        assert_eq!(unknown.os_action, None);
    }

    #[test]
    fn test_unknown_command_continues() {
        let decision = dispatch("включи музыку");
        assert_eq!(decision.response, UNKNOWN_COMMAND_REPLY);
        assert!(decision.continue_loop);
        assert_eq!(decision.rule, None);
    }

    #[test]
    fn test_only_farewell_stops() {
        let stopping: Vec<_> = builtin_rules()
            .into_iter()
            .filter(|r| !r.continue_loop)
            .map(|r| r.name)
            .collect();
        assert_eq!(stopping, vec!["farewell"]);
    }

    #[test]
    fn test_empty_utterance_matches_nothing() {
        let dispatcher = CommandDispatcher::default();
        assert!(dispatcher.matching_rule(&Utterance::default()).is_none());
    }
}
