//! Executes the commands the session emits.
//!
//! Writes are handed to the [`Recorder`] and never awaited. Finalization
//! calls are awaited one table at a time, each bounded by the request
//! timeout. Revealing the task section runs the sampler as its own task and
//! waits for it; a failed or timed-out sampling run leaves the session
//! blocked.

use anyhow::anyhow;
use chrono::Utc;
use serde_json::json;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::time::timeout;

use crate::bank::QuestionBank;
use crate::config::StudyConfig;
use crate::flow::{Command, Section, TransitionError};
use crate::logging::{log, log_rejected, obj, v_str, Domain, Level};
use crate::randomize::Randomizer;
use crate::sampler::{spawn_sampling, SamplingParams};
use crate::session::{Session, SessionEvent};
use crate::store::Recorder;

pub struct Runtime {
    cfg: StudyConfig,
    session: Session,
    recorder: Recorder,
    randomizer: Arc<dyn Randomizer>,
    bank: Arc<QuestionBank>,
    redirect: Option<String>,
}

impl Runtime {
    pub fn new(
        cfg: StudyConfig,
        session: Session,
        recorder: Recorder,
        randomizer: Arc<dyn Randomizer>,
        bank: Arc<QuestionBank>,
    ) -> Self {
        Self {
            cfg,
            session,
            recorder,
            randomizer,
            bank,
            redirect: None,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn recorder(&self) -> &Recorder {
        &self.recorder
    }

    /// Set once the participant confirms a restart.
    pub fn redirect(&self) -> Option<&str> {
        self.redirect.as_deref()
    }

    /// Load the consent page.
    pub async fn open(&mut self) {
        log(
            Level::Info,
            Domain::System,
            "session.open",
            obj(&[
                ("participant_id", v_str(self.session.participant().as_str())),
                ("debug", json!(self.cfg.debug)),
                ("trials", json!(self.cfg.trial_count())),
                ("config", v_str(&self.cfg.fingerprint())),
            ]),
        );
        let cmds = self.session.open(self.cfg.entry_url.as_deref());
        self.execute(cmds).await;
    }

    /// Apply one participant event. A rejected event is logged and
    /// returned; the session is left as it was.
    pub async fn dispatch(&mut self, event: SessionEvent) -> Result<(), TransitionError> {
        let domain = event.domain();
        let label = format!("{:?}", event);
        match self.session.apply(event, Utc::now()) {
            Ok(cmds) => {
                self.execute(cmds).await;
                Ok(())
            }
            Err(err) => {
                log_rejected(domain, &label, &err.msg);
                Err(err)
            }
        }
    }

    async fn execute(&mut self, cmds: Vec<Command>) {
        let mut queue: VecDeque<Command> = cmds.into();
        while let Some(cmd) = queue.pop_front() {
            match cmd {
                Command::Write { path, value } => self.recorder.write(path, value),
                Command::Finalize { table } => self.finalize(&table).await,
                Command::Redirect(url) => {
                    log(Level::Info, Domain::Feedback, "redirect", obj(&[("url", v_str(&url))]));
                    self.redirect = Some(url);
                }
                Command::Reveal(Section::Task) => queue.extend(self.start_task().await),
                Command::Reveal(_) => {}
            }
        }
    }

    async fn finalize(&self, table: &str) {
        let limit = self.cfg.request_timeout();
        let outcome = timeout(limit, self.randomizer.finalize(&self.cfg.db_name, table))
            .await
            .unwrap_or_else(|_| Err(anyhow!("no reply within {:?}", limit)));
        match outcome {
            Ok(()) => log(Level::Debug, Domain::Sampler, "finalize", obj(&[("table", v_str(table))])),
            Err(err) => log(
                Level::Error,
                Domain::Sampler,
                "finalize.failed",
                obj(&[("table", v_str(table)), ("msg", v_str(&format!("{:#}", err)))]),
            ),
        }
    }

    async fn start_task(&mut self) -> Vec<Command> {
        let handle = spawn_sampling(self.randomizer.clone(), SamplingParams::from_config(&self.cfg));
        let sampled = match handle.await {
            Ok(result) => result,
            Err(join) => Err(anyhow!("sampling task stopped: {}", join)),
        };
        let installed = sampled.and_then(|assignment| {
            self.session
                .install_assignment(assignment, &self.bank, Utc::now())
                .map_err(anyhow::Error::from)
        });
        match installed {
            Ok(cmds) => cmds,
            Err(err) => {
                let reason = format!("{:#}", err);
                log(
                    Level::Error,
                    Domain::Sampler,
                    "sampling.failed",
                    obj(&[
                        ("participant_id", v_str(self.session.participant().as_str())),
                        ("msg", v_str(&reason)),
                    ]),
                );
                self.session.block(reason);
                Vec::new()
            }
        }
    }
}
