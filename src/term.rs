//! Line-oriented terminal front end.
//!
//! `render` draws the visible section as plain text and `parse_command`
//! turns a typed line into a session event. Both are pure; `run` wires them
//! to stdin/stdout around a [`Runtime`].

use anyhow::Result;
use std::fmt::Write as _;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use crate::bank::AnswerOption;
use crate::flow::complete::CompleteEvent;
use crate::flow::consent::ConsentEvent;
use crate::flow::instructions::{DemoAction, Focus, PagerEvent, TOTAL_PAGES};
use crate::flow::pledge::PledgeEvent;
use crate::flow::survey::{SurveyEvent, RATING_MAX, RATING_MIN, TOPICS};
use crate::flow::trial::{Phase, TrialEvent, MAX_CONFIDENCE};
use crate::flow::Section;
use crate::metadata::StudyMetadata;
use crate::runtime::Runtime;
use crate::session::{Session, SessionEvent};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    Event(SessionEvent),
    Help,
    Quit,
}

const PAGE_TEXT: [&str; TOTAL_PAGES] = [
    "Welcome. In this study you will answer multiple-choice questions with help from an AI assistant.",
    "Each trial looks like the example below.",
    "The header names the topic the question comes from.",
    "This is the question. Read it carefully.",
    "These are the four answer options, A to D, along with the assistant's explanation.",
    "Try it: select option B on the example.",
    "Before answering, rate how likely it is that the assistant's answer is correct.",
    "Try it: pick 100% on the example scale.",
    "Try it: press the example submit button to confirm your answer.",
    "That is everything. Proceed to the integrity pledge when you are ready.",
];

fn focus_label(focus: Focus) -> &'static str {
    match focus {
        Focus::TopicHeader => "topic",
        Focus::Question => "question",
        Focus::Options => "options",
        Focus::LikertScale => "scale",
        Focus::SubmitButton => "submit",
    }
}

fn demo_hint(action: DemoAction) -> &'static str {
    match action {
        DemoAction::PickOptionB => "pick b",
        DemoAction::PickLikert100 => "rate 100",
        DemoAction::PressSubmit => "press",
    }
}

fn title<'a>(section: Section, meta: &'a StudyMetadata) -> &'a str {
    match section {
        Section::Consent => &meta.title_consent,
        Section::Instructions => &meta.title_instructions,
        Section::Pledge => &meta.title_pledge,
        Section::Task => "Task",
        Section::Survey => "Survey",
        Section::Complete => &meta.title_completion,
        Section::Blocked => "Error",
    }
}

fn checkbox(on: bool) -> &'static str {
    if on {
        "[x]"
    } else {
        "[ ]"
    }
}

pub fn render(session: &Session, meta: &StudyMetadata) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "\n== {} :: {} ==", meta.experiment_name, title(session.section(), meta));
    match session.section() {
        Section::Consent => render_consent(&mut out, session, meta),
        Section::Instructions => render_instructions(&mut out, session),
        Section::Pledge => {
            let _ = writeln!(
                out,
                "I will answer honestly and without outside help.\n{} I pledge  (pledge / unpledge, then submit)",
                checkbox(session.pledge().pledged() == Some(true))
            );
        }
        Section::Task => render_task(&mut out, session),
        Section::Survey => render_survey(&mut out, session),
        Section::Complete => {
            let page = session.completion();
            let _ = writeln!(out, "Thank you, you have completed the study.");
            if page.submitted() {
                let _ = writeln!(out, "Feedback received.");
            } else {
                let _ = writeln!(out, "Feedback: {:?}  (feedback <text>, send)", page.feedback());
            }
            let _ = writeln!(out, "restart yes | restart no");
        }
        Section::Blocked => {
            let _ = writeln!(
                out,
                "The study cannot continue: {}",
                session.blocked_reason().unwrap_or("unknown error")
            );
        }
    }
    out
}

fn render_consent(out: &mut String, session: &Session, meta: &StudyMetadata) {
    let c = &meta.consent;
    let _ = writeln!(out, "{}", c.summary);
    let _ = writeln!(out, "Time commitment: {}", c.time_commitment);
    let _ = writeln!(out, "Benefits and risks: {}", c.benefits_and_risks);
    let _ = writeln!(out, "Eligibility:");
    for item in &c.eligibility {
        let _ = writeln!(out, "  - {}", item);
    }
    let _ = writeln!(out, "Compensation: {} via {}", c.compensation, c.recruitment_service);
    let _ = writeln!(out, "Questions: {} <{}>", c.lead_researcher, c.contact_link());
    let _ = writeln!(
        out,
        "{} I consent  (agree / disagree, then submit)",
        checkbox(session.consent().consented() == Some(true))
    );
}

fn render_instructions(out: &mut String, session: &Session) {
    let view = session.pager().view();
    let _ = writeln!(out, "Page {}/{}", view.page, TOTAL_PAGES);
    let _ = writeln!(out, "{}", PAGE_TEXT.get(view.page - 1).copied().unwrap_or_default());
    if view.effect.example_visible {
        let parts = [Focus::TopicHeader, Focus::Question, Focus::Options, Focus::LikertScale, Focus::SubmitButton];
        let line: Vec<String> = parts
            .iter()
            .map(|p| match view.effect.focus {
                Some(f) if f == *p => format!("[{}]", focus_label(*p)),
                Some(_) => format!(".{}.", focus_label(*p)),
                None => focus_label(*p).to_string(),
            })
            .collect();
        let _ = writeln!(out, "example: {}", line.join(" "));
    }
    if let Some(gate) = view.effect.gate {
        if !view.next_enabled {
            let _ = writeln!(out, "({} to continue)", demo_hint(gate));
        }
    }
    let mut nav = Vec::new();
    if view.back_enabled {
        nav.push("back");
    }
    if view.next_enabled {
        nav.push(if view.next_label == "Proceed" { "proceed" } else { "next" });
    }
    if view.skip_available {
        nav.push("skip");
    }
    let _ = writeln!(out, "{}", nav.join(" | "));
}

fn render_task(out: &mut String, session: &Session) {
    let Some(run) = session.trials() else {
        let _ = writeln!(out, "Loading trials...");
        return;
    };
    let Some(slot) = run.current() else {
        let _ = writeln!(out, "All trials complete.");
        return;
    };
    let (n, total) = run.counter();
    let q = &slot.question;
    let _ = writeln!(out, "Question {} of {} | {}", n, total, q.topic);
    let _ = writeln!(out, "{}", q.question);
    for option in AnswerOption::ALL {
        let mark = if run.selection() == Some(option) { ">" } else { " " };
        let _ = writeln!(out, "{} {}) {}", mark, option.as_str(), q.option_text(option));
    }
    let _ = writeln!(out, "AI explanation: {}", slot.explanation_text());
    match run.confidence() {
        Some(v) => {
            let _ = writeln!(out, "Your confidence the AI is correct: {}%", v);
        }
        None => {
            let _ = writeln!(out, "How likely is the AI correct?  (rate 0-{})", MAX_CONFIDENCE);
        }
    }
    if run.phase() == Phase::AwaitingOwnSelection {
        let hint = if run.confirm_enabled() { "pick A-D | confirm" } else { "pick A-D" };
        let _ = writeln!(out, "{}", hint);
    }
}

fn render_survey(out: &mut String, session: &Session) {
    let survey = session.survey();
    let _ = writeln!(
        out,
        "Rate your knowledge of each topic from {} to {}  (rate <topic> <value>)",
        RATING_MIN, RATING_MAX
    );
    for (i, topic) in TOPICS.iter().enumerate() {
        let value = survey.rating(i).map(|v| v.to_string()).unwrap_or_else(|| "-".to_string());
        let _ = writeln!(out, "{:>2}. {:<28} {}", i + 1, topic, value);
    }
    let _ = writeln!(out, "{}/{} rated", survey.ranked(), TOPICS.len());
    if survey.submit_enabled() {
        let _ = writeln!(out, "submit");
    }
}

fn number<T: std::str::FromStr>(raw: Option<&str>, what: &str) -> Result<T, String> {
    raw.and_then(|s| s.parse().ok())
        .ok_or_else(|| format!("expected {}", what))
}

/// Parse one typed line for the section on screen.
pub fn parse_command(line: &str, section: Section) -> Result<Input, String> {
    let line = line.trim();
    let mut words = line.split_whitespace();
    let Some(verb) = words.next().map(|w| w.to_ascii_lowercase()) else {
        return Err("empty command".to_string());
    };
    match verb.as_str() {
        "quit" | "exit" => return Ok(Input::Quit),
        "help" | "?" => return Ok(Input::Help),
        _ => {}
    }

    let event = match (section, verb.as_str()) {
        (Section::Consent, "agree") => SessionEvent::Consent(ConsentEvent::Toggle(true)),
        (Section::Consent, "disagree") => SessionEvent::Consent(ConsentEvent::Toggle(false)),
        (Section::Consent, "submit") => SessionEvent::Consent(ConsentEvent::Submit),

        (Section::Instructions, "next" | "proceed") => SessionEvent::Instructions(PagerEvent::Next),
        (Section::Instructions, "back") => SessionEvent::Instructions(PagerEvent::Back),
        (Section::Instructions, "skip") => SessionEvent::Instructions(PagerEvent::Skip),
        (Section::Instructions, "press") => SessionEvent::Instructions(PagerEvent::Demo(DemoAction::PressSubmit)),
        (Section::Instructions, "pick") => match words.next().and_then(AnswerOption::parse) {
            Some(AnswerOption::B) => SessionEvent::Instructions(PagerEvent::Demo(DemoAction::PickOptionB)),
            _ => return Err("the example asks for option B".to_string()),
        },
        (Section::Instructions, "rate") => match number::<u8>(words.next(), "a percentage")? {
            100 => SessionEvent::Instructions(PagerEvent::Demo(DemoAction::PickLikert100)),
            _ => return Err("the example asks for 100".to_string()),
        },

        (Section::Pledge, "pledge") => SessionEvent::Pledge(PledgeEvent::Toggle(true)),
        (Section::Pledge, "unpledge") => SessionEvent::Pledge(PledgeEvent::Toggle(false)),
        (Section::Pledge, "submit") => SessionEvent::Pledge(PledgeEvent::Submit),

        (Section::Task, "rate") => {
            SessionEvent::Trial(TrialEvent::RateConfidence(number(words.next(), "a value 0-100")?))
        }
        (Section::Task, "pick") => {
            let option = words
                .next()
                .and_then(AnswerOption::parse)
                .ok_or_else(|| "expected one of A, B, C, D".to_string())?;
            SessionEvent::Trial(TrialEvent::SelectOption(option))
        }
        (Section::Task, "confirm" | "submit") => SessionEvent::Trial(TrialEvent::Confirm),

        (Section::Survey, "rate") => {
            let topic: usize = number(words.next(), "a topic number 1-10")?;
            let value: u8 = number(words.next(), "a rating")?;
            if topic == 0 {
                return Err("topics are numbered from 1".to_string());
            }
            SessionEvent::Survey(SurveyEvent::Rate { topic: topic - 1, value })
        }
        (Section::Survey, "submit") => SessionEvent::Survey(SurveyEvent::Submit),

        (Section::Complete, "feedback") => {
            let text = line[verb.len()..].trim().to_string();
            SessionEvent::Complete(CompleteEvent::EditFeedback(text))
        }
        (Section::Complete, "send") => SessionEvent::Complete(CompleteEvent::SubmitFeedback),
        (Section::Complete, "restart") => match words.next() {
            Some("yes" | "y") => SessionEvent::Complete(CompleteEvent::Restart { confirmed: true }),
            Some("no" | "n") => SessionEvent::Complete(CompleteEvent::Restart { confirmed: false }),
            _ => return Err("confirm with `restart yes` or stay with `restart no`".to_string()),
        },

        (Section::Blocked, _) => return Err("the session is blocked; type quit".to_string()),
        (section, other) => return Err(format!("unknown command `{}` on the {} page", other, section.as_str())),
    };
    Ok(Input::Event(event))
}

const HELP: &str = "commands: agree/disagree/submit, next/back/skip, pledge/submit, \
rate <n>, pick <A-D>, confirm, rate <topic> <value>, feedback <text>, send, restart yes|no, quit\n";

/// Drive one session from stdin until it ends, redirects or the input closes.
pub async fn run(rt: &mut Runtime, meta: &StudyMetadata) -> Result<()> {
    let mut out = tokio::io::stdout();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    rt.open().await;

    loop {
        out.write_all(render(rt.session(), meta).as_bytes()).await?;
        if rt.session().section() == Section::Blocked {
            break;
        }
        out.write_all(b"> ").await?;
        out.flush().await?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        if line.trim().is_empty() {
            continue;
        }
        match parse_command(&line, rt.session().section()) {
            Ok(Input::Quit) => break,
            Ok(Input::Help) => out.write_all(HELP.as_bytes()).await?,
            Ok(Input::Event(event)) => {
                if let Err(err) = rt.dispatch(event).await {
                    out.write_all(format!("! {}\n", err).as_bytes()).await?;
                }
            }
            Err(msg) => out.write_all(format!("? {}\n", msg).as_bytes()).await?,
        }
        if let Some(url) = rt.redirect() {
            out.write_all(format!("Redirecting to {}\n", url).as_bytes()).await?;
            break;
        }
    }
    out.flush().await?;
    Ok(())
}
