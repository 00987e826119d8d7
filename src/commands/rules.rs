//! Built-in command vocabulary
//!
//! Order matters: the dispatcher takes the first rule that matches.

use super::actions::OsAction;
use super::{CommandRule, Matcher, Reply};

const OPEN: &[&str] = &["открыть", "открой"];

/// The default rule table, highest priority first
#[must_use]
pub fn builtin_rules() -> Vec<CommandRule> {
    vec![
        // Checked first so any farewell token ends the loop
        CommandRule::stop(
            "farewell",
            Matcher::any(&["пока", "до свидания", "goodbye", "bye"]),
            "Goodbye! It's been a pleasure.",
        ),
        CommandRule::say(
            "open-browser",
            Matcher::all(OPEN, &["браузер"]),
            "I open the browser",
        )
        .with_action(OsAction::OpenBrowser),
        CommandRule::say(
            "open-editor",
            Matcher::all(OPEN, &["блокнот", "редактор"]),
            "I'm opening a notebook",
        )
        .with_action(OsAction::OpenEditor),
        CommandRule::say("open-unknown", Matcher::any(OPEN), "I don't know what to open"),
        CommandRule::new(
            "time",
            Matcher::any(&["время"]),
            Reply::Clock {
                prefix: "Current time",
                format: "%H:%M",
            },
        ),
        CommandRule::new(
            "date",
            Matcher::any(&["дата"]),
            Reply::Clock {
                prefix: "Today",
                format: "%d.%m.%Y",
            },
        ),
        CommandRule::say(
            "greeting",
            Matcher::any(&["привет", "здорово"]),
            "Hi! Good to hear from you.",
        ),
        CommandRule::say(
            "how-are-you",
            Matcher::any(&["как дела"]),
            "I'm doing great, thanks for asking! How are you?",
        ),
        CommandRule::say(
            "thanks",
            Matcher::any(&["спасибо", "благодарю"]),
            "You're welcome! Glad to be of service.",
        ),
        CommandRule::say(
            "joke",
            Matcher::any(&["расскажи анекдот", "пошути"]),
            "Why do programmers confuse Halloween and Christmas? Because 31 Oct equals 25 Dec.!",
        ),
        CommandRule::say(
            "mood",
            Matcher::any(&["как настроение"]),
            "As an assistant, I'm always in a good mood and willing to help out!",
        ),
        CommandRule::say(
            "capabilities",
            Matcher::any(&["что ты умеешь"]),
            "I can open my browser and notepad, tell the time and date, tell jokes and just chat to you.",
        ),
    ]
}
