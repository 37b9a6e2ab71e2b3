use crate::metadata::WorkspaceSession;
use crate::patch::extract_patch;
use crate::pipeline::build_and_install;
use crate::runner::CommandRunner;
use crate::toolchain::Toolchain;
use crate::ui;
use log::debug;
use std::io::{self, Write};
use std::path::PathBuf;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, Lines};

pub const PROMPT: &str = "Build now? ('yes' or 'no'): ";

/// What a line typed at the prompt asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Answer {
    Build,
    Finalize,
    Quit,
    Unrecognized,
}

impl Answer {
    pub fn parse(input: &str) -> Self {
        let input = input.trim().to_lowercase();
        if input.starts_with('y') {
            Answer::Build
        } else if input.starts_with('n') {
            Answer::Finalize
        } else if input.starts_with('q') {
            Answer::Quit
        } else {
            Answer::Unrecognized
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopState {
    Prompt,
    Building,
    Finalizing,
    Terminated(LoopOutcome),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopOutcome {
    /// Edits were distilled into the patch at this path.
    Finalized(PathBuf),
    Quit,
}

/// Interactive rebuild loop over one workspace.
pub struct LoopController<'t, 'a, R, I> {
    tools: &'t Toolchain<'a, R>,
    session: &'t WorkspaceSession,
    input: Lines<I>,
    state: LoopState,
}

impl<'t, 'a, R, I> LoopController<'t, 'a, R, I>
where
    R: CommandRunner,
    I: AsyncBufRead + Unpin,
{
    pub fn new(tools: &'t Toolchain<'a, R>, session: &'t WorkspaceSession, input: I) -> Self {
        Self {
            tools,
            session,
            input: input.lines(),
            state: LoopState::Prompt,
        }
    }

    #[cfg(test)]
    pub fn state(&self) -> &LoopState {
        &self.state
    }

    /// Drive the state machine until it terminates.
    pub async fn run(mut self, prompt: &mut impl Write) -> io::Result<LoopOutcome> {
        loop {
            if let LoopState::Terminated(outcome) = &self.state {
                return Ok(outcome.clone());
            }
            self.advance(prompt).await?;
        }
    }

    /// Perform one transition.
    pub async fn advance(&mut self, prompt: &mut impl Write) -> io::Result<()> {
        let next = match &self.state {
            LoopState::Prompt => {
                write!(prompt, "{PROMPT}")?;
                prompt.flush()?;
                match self.input.next_line().await? {
                    None => {
                        debug!("stdin closed, leaving the build loop");
                        LoopState::Terminated(LoopOutcome::Quit)
                    }
                    Some(line) => match Answer::parse(&line) {
                        Answer::Build => LoopState::Building,
                        Answer::Finalize => LoopState::Finalizing,
                        Answer::Quit => LoopState::Terminated(LoopOutcome::Quit),
                        Answer::Unrecognized => LoopState::Prompt,
                    },
                }
            }
            LoopState::Building => {
                match build_and_install(self.tools, self.session).await {
                    Ok(_) => ui::success("APK installed"),
                    Err(e) => ui::error(e),
                }
                LoopState::Prompt
            }
            LoopState::Finalizing => match extract_patch(self.tools, self.session).await {
                Ok(path) => {
                    ui::info(format!("patch file: {}", path.display()));
                    ui::success("finished, exiting...");
                    LoopState::Terminated(LoopOutcome::Finalized(path))
                }
                Err(e) => {
                    ui::error(e);
                    LoopState::Prompt
                }
            },
            LoopState::Terminated(_) => return Ok(()),
        };
        self.state = next;
        Ok(())
    }
}
