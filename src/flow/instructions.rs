//! Ten-page instruction wizard.
//!
//! Pages 2–9 walk through an example trial: one element of the example
//! stays at full opacity and is highlighted while the rest are dimmed.
//! Pages 6, 8 and 9 hold "next" until the participant performs the
//! demonstrated action on the example.

use serde_json::json;

use super::{ms_between, stamp, Command, Section, Timestamp, TransitionError};
use crate::participant::DbPaths;

pub const TOTAL_PAGES: usize = 10;

/// Part of the example trial a page draws attention to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Focus {
    TopicHeader,
    Question,
    Options,
    LikertScale,
    SubmitButton,
}

/// Interaction a page asks the participant to try on the example.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DemoAction {
    PickOptionB,
    PickLikert100,
    PressSubmit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageEffect {
    pub example_visible: bool,
    /// Element kept at full opacity; `None` leaves everything opaque.
    pub focus: Option<Focus>,
    pub gate: Option<DemoAction>,
}

pub fn page_effect(page: usize) -> PageEffect {
    let (example_visible, focus, gate) = match page {
        2 => (true, None, None),
        3 => (true, Some(Focus::TopicHeader), None),
        4 => (true, Some(Focus::Question), None),
        5 => (true, Some(Focus::Options), None),
        6 => (true, Some(Focus::Options), Some(DemoAction::PickOptionB)),
        7 => (true, Some(Focus::LikertScale), None),
        8 => (true, Some(Focus::LikertScale), Some(DemoAction::PickLikert100)),
        9 => (true, Some(Focus::SubmitButton), Some(DemoAction::PressSubmit)),
        _ => (false, None, None),
    };
    PageEffect { example_visible, focus, gate }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PagerEvent {
    Next,
    Back,
    Demo(DemoAction),
    /// Debug builds only: jump straight past the last page.
    Skip,
}

/// What the navigation bar shows for the current page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PagerView {
    pub page: usize,
    pub effect: PageEffect,
    pub back_enabled: bool,
    pub next_enabled: bool,
    pub next_label: &'static str,
    pub skip_available: bool,
}

#[derive(Debug, Clone)]
pub struct Pager {
    paths: DbPaths,
    debug: bool,
    page: usize,
    read_ms: [Option<i64>; TOTAL_PAGES],
    started_at: Option<Timestamp>,
    page_shown_at: Option<Timestamp>,
    gate_cleared: bool,
    finished: bool,
}

impl Pager {
    pub fn new(paths: DbPaths, debug: bool) -> Self {
        Self {
            paths,
            debug,
            page: 1,
            read_ms: [None; TOTAL_PAGES],
            started_at: None,
            page_shown_at: None,
            gate_cleared: false,
            finished: false,
        }
    }

    pub fn page(&self) -> usize {
        self.page
    }

    pub fn finished(&self) -> bool {
        self.finished
    }

    /// Read time recorded for `page`, if it has been read.
    pub fn read_time(&self, page: usize) -> Option<i64> {
        self.read_ms.get(page.checked_sub(1)?).copied().flatten()
    }

    /// Show page 1 and stamp the section start.
    pub fn start(&mut self, at: Timestamp) -> Vec<Command> {
        self.started_at = Some(at);
        self.page_shown_at = Some(at);
        vec![Command::write(
            format!("{}/metadata", self.paths.instructions()),
            json!({
                "instructionStartTime": stamp(at),
                "instructionCompleted": false,
            }),
        )]
    }

    fn gate_pending(&self) -> bool {
        page_effect(self.page).gate.is_some() && !self.gate_cleared
    }

    pub fn view(&self) -> PagerView {
        PagerView {
            page: self.page,
            effect: page_effect(self.page),
            back_enabled: self.page > 1 && !self.finished,
            next_enabled: !self.gate_pending() && !self.finished,
            next_label: if self.page == TOTAL_PAGES { "Proceed" } else { "Next" },
            skip_available: self.debug && !self.finished,
        }
    }

    pub fn apply(&mut self, event: PagerEvent, at: Timestamp) -> Result<Vec<Command>, TransitionError> {
        if self.finished {
            return Err(TransitionError::new("instructions already finished"));
        }
        match event {
            PagerEvent::Next => {
                if self.gate_pending() {
                    return Err(TransitionError::new("try the highlighted example first"));
                }
                let mut cmds = self.mark_read(at);
                if self.page == TOTAL_PAGES {
                    cmds.extend(self.finish(at));
                } else {
                    self.show(self.page + 1, at);
                }
                Ok(cmds)
            }
            PagerEvent::Back => {
                if self.page == 1 {
                    return Err(TransitionError::new("already on the first page"));
                }
                self.show(self.page - 1, at);
                Ok(Vec::new())
            }
            PagerEvent::Demo(action) => {
                if page_effect(self.page).gate != Some(action) {
                    return Err(TransitionError::new("that example is not active on this page"));
                }
                self.gate_cleared = true;
                Ok(Vec::new())
            }
            PagerEvent::Skip => {
                if !self.debug {
                    return Err(TransitionError::new("skipping is only available in debug mode"));
                }
                Ok(self.finish(at))
            }
        }
    }

    fn show(&mut self, page: usize, at: Timestamp) {
        self.page = page;
        self.page_shown_at = Some(at);
        self.gate_cleared = false;
    }

    /// First departure from a page records how long it was read.
    fn mark_read(&mut self, at: Timestamp) -> Vec<Command> {
        let slot = &mut self.read_ms[self.page - 1];
        if slot.is_some() {
            return Vec::new();
        }
        let shown = self.page_shown_at.unwrap_or(at);
        let read_ms = ms_between(shown, at);
        *slot = Some(read_ms);
        vec![Command::write(
            self.paths.instruction_page(self.page),
            json!({ "pageRead": true, "readTime": read_ms }),
        )]
    }

    fn finish(&mut self, at: Timestamp) -> Vec<Command> {
        self.finished = true;
        let meta = format!("{}/metadata", self.paths.instructions());
        let started = self.started_at.unwrap_or(at);
        let mut cmds = Vec::new();
        if self.debug {
            cmds.push(Command::write(format!("{meta}/instructionDebugMode"), json!(true)));
        }
        cmds.push(Command::write(format!("{meta}/instructionCompleted"), json!(true)));
        cmds.push(Command::write(format!("{meta}/instructionEndTime"), stamp(at)));
        cmds.push(Command::write(
            format!("{meta}/instructionTotalTime"),
            json!(ms_between(started, at)),
        ));
        cmds.push(Command::Reveal(Section::Pledge));
        cmds
    }
}
