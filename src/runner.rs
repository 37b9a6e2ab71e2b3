use futures_util::stream::{self, BoxStream, StreamExt};
use log::debug;
use std::ffi::{OsStr, OsString};
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;

/// Progress lines produced by a long-running tool. Single pass; ends with an
/// `Err` item if the tool exits unsuccessfully.
pub type LineFeed = BoxStream<'static, io::Result<String>>;

/// A fully described external command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: OsString,
    pub args: Vec<OsString>,
    pub cwd: Option<PathBuf>,
}

impl Invocation {
    pub fn new(program: impl AsRef<OsStr>) -> Self {
        Self {
            program: program.as_ref().to_os_string(),
            args: Vec::new(),
            cwd: None,
        }
    }

    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_os_string());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args
            .extend(args.into_iter().map(|arg| arg.as_ref().to_os_string()));
        self
    }

    pub fn current_dir(mut self, dir: &Path) -> Self {
        self.cwd = Some(dir.to_path_buf());
        self
    }

    #[cfg(test)]
    pub fn arg_str(&self, index: usize) -> Option<String> {
        self.args
            .get(index)
            .map(|arg| arg.to_string_lossy().into_owned())
    }

    fn command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command.args(&self.args);
        if let Some(cwd) = &self.cwd {
            command.current_dir(cwd);
        }
        command
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.to_string_lossy())?;
        for arg in &self.args {
            write!(f, " {}", arg.to_string_lossy())?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub success: bool,
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    /// Undecoded stdout, for output that must be written back verbatim.
    pub raw_stdout: Vec<u8>,
}

impl CommandOutput {
    /// Best human-readable explanation of a failure.
    pub fn failure_message(&self) -> String {
        let stderr = self.stderr.trim();
        if !stderr.is_empty() {
            return stderr.to_string();
        }
        let stdout = self.stdout.trim();
        if !stdout.is_empty() {
            return stdout.to_string();
        }
        match self.code {
            Some(code) => format!("exited with status {code}"),
            None => "terminated by signal".to_string(),
        }
    }
}

/// The single seam through which external tools are executed.
#[allow(async_fn_in_trait)]
pub trait CommandRunner {
    /// Run to completion and capture both streams.
    async fn output(&self, invocation: &Invocation) -> io::Result<CommandOutput>;

    /// Start the command and expose its stdout as a line feed.
    fn lines(&self, invocation: &Invocation) -> io::Result<LineFeed>;

    /// Run with the terminal attached, waiting for exit.
    async fn interactive(&self, invocation: &Invocation) -> io::Result<bool>;

    /// Start the command and return immediately.
    fn spawn_detached(&self, invocation: &Invocation) -> io::Result<()>;
}

/// Collect a piped stream in the background so the child never blocks on a
/// full pipe while stdout is being read.
fn drain<S>(stream: Option<S>) -> JoinHandle<io::Result<Vec<u8>>>
where
    S: tokio::io::AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = Vec::new();
        if let Some(mut stream) = stream {
            stream.read_to_end(&mut buf).await?;
        }
        Ok(buf)
    })
}

async fn finish(mut child: Child, stderr: JoinHandle<io::Result<Vec<u8>>>) -> io::Result<()> {
    let status = child.wait().await?;
    let stderr = stderr.await.map_err(io::Error::other)??;
    if status.success() {
        return Ok(());
    }
    let stderr = String::from_utf8_lossy(&stderr);
    let message = if stderr.trim().is_empty() {
        format!("exited with {status}")
    } else {
        stderr.trim().to_string()
    };
    Err(io::Error::other(message))
}

/// Runs commands as real child processes.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    async fn output(&self, invocation: &Invocation) -> io::Result<CommandOutput> {
        debug!("$ {invocation}");
        let output = invocation.command().stdin(Stdio::null()).output().await?;
        Ok(CommandOutput {
            success: output.status.success(),
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            raw_stdout: output.stdout,
        })
    }

    fn lines(&self, invocation: &Invocation) -> io::Result<LineFeed> {
        debug!("$ {invocation} (streaming)");
        let mut child = invocation
            .command()
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| io::Error::other("child stdout was not captured"))?;
        let stderr = drain(child.stderr.take());
        let reader = BufReader::new(stdout).lines();

        let feed = stream::unfold(Some((reader, child, stderr)), |state| async move {
            let (mut reader, child, stderr) = state?;
            match reader.next_line().await {
                Ok(Some(line)) => Some((Ok(line), Some((reader, child, stderr)))),
                Ok(None) => finish(child, stderr).await.err().map(|e| (Err(e), None)),
                Err(e) => Some((Err(e), None)),
            }
        });
        Ok(feed.boxed())
    }

    async fn interactive(&self, invocation: &Invocation) -> io::Result<bool> {
        debug!("$ {invocation} (interactive)");
        let status = invocation.command().status().await?;
        Ok(status.success())
    }

    fn spawn_detached(&self, invocation: &Invocation) -> io::Result<()> {
        debug!("$ {invocation} (detached)");
        invocation
            .command()
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()?;
        Ok(())
    }
}

#[cfg(test)]
pub mod testing {
    //! Scripted runner used by the pipeline tests.

    use super::*;
    use std::cell::RefCell;

    type Responder = Box<dyn Fn(&Invocation) -> CommandOutput>;

    impl CommandOutput {
        pub fn ok(stdout: impl Into<String>) -> Self {
            let stdout = stdout.into();
            Self {
                success: true,
                code: Some(0),
                raw_stdout: stdout.clone().into_bytes(),
                stdout,
                stderr: String::new(),
            }
        }

        pub fn failed(code: i32, stderr: impl Into<String>) -> Self {
            Self {
                success: false,
                code: Some(code),
                stdout: String::new(),
                stderr: stderr.into(),
                raw_stdout: Vec::new(),
            }
        }
    }

    pub struct ScriptedRunner {
        responder: Responder,
        feed: Vec<io::Result<String>>,
        pub calls: RefCell<Vec<Invocation>>,
    }

    impl ScriptedRunner {
        pub fn new(responder: impl Fn(&Invocation) -> CommandOutput + 'static) -> Self {
            Self {
                responder: Box::new(responder),
                feed: Vec::new(),
                calls: RefCell::new(Vec::new()),
            }
        }

        pub fn with_feed(mut self, lines: &[&str]) -> Self {
            self.feed = lines.iter().map(|line| Ok(line.to_string())).collect();
            self
        }

        pub fn with_failing_feed(mut self, message: &str) -> Self {
            self.feed.push(Err(io::Error::other(message.to_string())));
            self
        }

        pub fn command_lines(&self) -> Vec<String> {
            self.calls.borrow().iter().map(|c| c.to_string()).collect()
        }

        fn record(&self, invocation: &Invocation) {
            self.calls.borrow_mut().push(invocation.clone());
        }
    }

    impl CommandRunner for ScriptedRunner {
        async fn output(&self, invocation: &Invocation) -> io::Result<CommandOutput> {
            self.record(invocation);
            Ok((self.responder)(invocation))
        }

        fn lines(&self, invocation: &Invocation) -> io::Result<LineFeed> {
            self.record(invocation);
            let items: Vec<io::Result<String>> = self
                .feed
                .iter()
                .map(|item| match item {
                    Ok(line) => Ok(line.clone()),
                    Err(e) => Err(io::Error::other(e.to_string())),
                })
                .collect();
            Ok(stream::iter(items).boxed())
        }

        async fn interactive(&self, invocation: &Invocation) -> io::Result<bool> {
            self.record(invocation);
            Ok((self.responder)(invocation).success)
        }

        fn spawn_detached(&self, invocation: &Invocation) -> io::Result<()> {
            self.record(invocation);
            Ok(())
        }
    }
}
