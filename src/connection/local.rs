//! 本地进程后端
//!
//! 该模块把 `std::process::Child` 适配为 [`CommandChannel`] 与 [`Transport`]，
//! 使本地进程也由 [`AsyncProcess`] 管理。
//!
//! 子进程在自己的进程组中启动，断开时向整个进程组发送 `SIGKILL`，
//! 因此 shell 派生出的子进程不会比命令活得更久。标准输出和标准错误由转发线程
//! 持续读入 [`ChunkReader`]，输出再多也不会因管道写满而阻塞子进程。

use std::io::{self, Read, Write};
use std::os::unix::process::{CommandExt, ExitStatusExt};
use std::path::Path;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, Sender};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::Duration;

use log::{debug, trace, warn};

use crate::connection::{AsyncProcess, ChunkReader, CommandChannel, ProcessStreams, Transport};
use crate::error::{CommandError, EnvironmentError};

/// 轮询子进程状态的间隔
const POLL_INTERVAL: Duration = Duration::from_millis(100);

type SharedChild = Arc<Mutex<Child>>;

/// 本地子进程的执行通道
pub struct LocalChannel {
    child: SharedChild,
    status: Option<ExitStatus>,
}

/// 本地子进程的"连接"，断开即杀死其进程组
pub struct LocalTransport {
    child: SharedChild,
}

/// 将被信号终止的进程映射为 `128 + signal`
fn exit_code(status: ExitStatus) -> i32 {
    match (status.code(), status.signal()) {
        (Some(code), _) => code,
        (None, Some(signal)) => 128 + signal,
        (None, None) => -1,
    }
}

impl CommandChannel for LocalChannel {
    fn join(&mut self) -> Result<(), CommandError> {
        loop {
            let polled = self
                .child
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .try_wait();
            match polled {
                Ok(Some(status)) => {
                    self.status = Some(status);
                    return Ok(());
                }
                Ok(None) => thread::sleep(POLL_INTERVAL),
                Err(e) => return Err(CommandError::session("waiting for local process", e)),
            }
        }
    }

    fn exit_status(&mut self) -> Result<i32, CommandError> {
        self.status
            .map(exit_code)
            .ok_or_else(|| CommandError::session("reading exit status", "process has not exited"))
    }

    fn close(&mut self) -> Result<(), CommandError> {
        Ok(())
    }
}

impl Transport for LocalTransport {
    fn close_session(&self) -> Result<(), CommandError> {
        Ok(())
    }

    /// 组长退出后组内可能仍有进程，所以无论组长状态如何都向整个组发信号
    fn disconnect(&self) -> Result<(), CommandError> {
        let child = self.child.lock().unwrap_or_else(PoisonError::into_inner);
        let group = libc::pid_t::try_from(child.id())
            .map_err(|e| CommandError::session("killing local process group", e))?;

        // SAFETY: kill 只读取两个整数参数，组号来自以 process_group(0) 启动的子进程
        if unsafe { libc::kill(-group, libc::SIGKILL) } == 0 {
            return Ok(());
        }
        match io::Error::last_os_error() {
            e if e.raw_os_error() == Some(libc::ESRCH) => Ok(()),
            e => Err(CommandError::session("killing local process group", e)),
        }
    }
}

/// 把 `source` 读到 EOF，每块数据转发给 `sink`
///
/// 读端被丢弃后继续读取并丢弃数据，子进程不会因管道写满而阻塞。
fn spawn_forwarder(
    name: &str,
    mut source: impl Read + Send + 'static,
    sink: Sender<Vec<u8>>,
) -> io::Result<()> {
    thread::Builder::new()
        .name(name.to_string())
        .spawn(move || {
            let mut buffer = [0u8; 8192];
            loop {
                match source.read(&mut buffer) {
                    Ok(0) => break,
                    Ok(n) => {
                        sink.send(buffer[..n].to_vec()).ok();
                    }
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                    Err(e) => {
                        trace!("转发本地进程输出结束: {e}");
                        break;
                    }
                }
            }
        })
        .map(|_| ())
}

/// 为一个输出管道启动转发线程，返回读取端
fn forward_output(
    name: &str,
    pipe: Option<impl Read + Send + 'static>,
) -> io::Result<Option<Box<dyn Read + Send>>> {
    let Some(pipe) = pipe else {
        return Ok(None);
    };
    let (tx, rx) = mpsc::channel();
    spawn_forwarder(name, pipe, tx)?;
    Ok(Some(Box::new(ChunkReader::new(rx))))
}

fn process_streams(child: &mut Child) -> io::Result<ProcessStreams> {
    Ok(ProcessStreams {
        stdin: child
            .stdin
            .take()
            .map(|s| Box::new(s) as Box<dyn Write + Send>),
        stdout: forward_output("local-stdout", child.stdout.take())?,
        stderr: forward_output("local-stderr", child.stderr.take())?,
    })
}

/// 在 `dir` 中启动 `command`，立即返回进程句柄
pub fn spawn_local(
    command: &[&str],
    dir: &Path,
) -> Result<AsyncProcess<LocalTransport>, EnvironmentError> {
    let (program, args) = command.split_first().ok_or(EnvironmentError::EmptyCommand)?;
    debug!("启动本地命令: {command:?} (目录: {})", dir.display());

    let mut child = Command::new(program)
        .args(args)
        .current_dir(dir)
        .process_group(0)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()?;

    let streams = match process_streams(&mut child) {
        Ok(streams) => streams,
        Err(e) => {
            warn!("无法转发本地进程输出，终止进程: {e}");
            child.kill().ok();
            child.wait().ok();
            return Err(e.into());
        }
    };
    let child = Arc::new(Mutex::new(child));
    let channel = LocalChannel {
        child: Arc::clone(&child),
        status: None,
    };

    Ok(AsyncProcess::spawn(
        command.join(" "),
        channel,
        LocalTransport { child },
        streams,
    )?)
}
