//! 异步命令完成引擎
//!
//! 每条命令对应一个 [`AsyncProcess`]。后台工作线程依次：等待命令结束、记录退出码（或失败）、
//! 关闭通道、关闭会话、断开传输。关闭步骤各自独立，失败只记录日志。
//! 会话关闭和传输断开由工作线程或 `destroy()` 中先到者执行，且只执行一次。
//!
//! 竞争规则：若 `join` 正常结束，则记录其退出码；若 `destroy()` 之后 `join` 失败，
//! 所有等待者收到 [`CommandError::Destroyed`]。完成标志在工作线程的关闭步骤之后才设置。

use std::io::{Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread;

use log::{debug, error, trace, warn};

use crate::connection::{CommandChannel, ProcessStreams, RemoteProcess, Transport};
use crate::error::CommandError;

type Outcome = Result<i32, CommandError>;

/// 一个可能失败的关闭步骤
type TeardownStep<'a> = (
    &'static str,
    Box<dyn FnOnce() -> Result<(), CommandError> + 'a>,
);

/// 单次设置的完成标志，带锁和广播唤醒
struct Completion {
    outcome: Mutex<Option<Outcome>>,
    completed: Condvar,
}

impl Completion {
    fn new() -> Self {
        Self {
            outcome: Mutex::new(None),
            completed: Condvar::new(),
        }
    }

    /// 设置结果并唤醒所有等待者；已设置过则忽略
    fn complete(&self, outcome: Outcome) -> bool {
        let mut slot = self.outcome.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.is_some() {
            return false;
        }
        *slot = Some(outcome);
        self.completed.notify_all();
        true
    }

    fn wait(&self) -> Outcome {
        let mut slot = self.outcome.lock().unwrap_or_else(PoisonError::into_inner);
        loop {
            if let Some(outcome) = slot.as_ref() {
                return outcome.clone();
            }
            slot = self
                .completed
                .wait(slot)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }
}

/// 工作线程与进程句柄共享的状态
struct Shared<T> {
    transport: T,
    released: AtomicBool,
    destroyed: AtomicBool,
    completion: Completion,
}

impl<T: Transport> Shared<T> {
    /// 抢占释放权，只有第一个调用者得到 `true`
    fn claim_release(&self) -> bool {
        !self.released.swap(true, Ordering::AcqRel)
    }

    fn release_steps(&self) -> Vec<TeardownStep<'_>> {
        let close_session: TeardownStep<'_> =
            ("close session", Box::new(|| self.transport.close_session()));
        let disconnect: TeardownStep<'_> =
            ("disconnect", Box::new(|| self.transport.disconnect()));
        vec![close_session, disconnect]
    }
}

fn run_teardown(command: &str, steps: Vec<TeardownStep<'_>>) {
    for (step, action) in steps {
        if let Err(e) = action() {
            let e = CommandError::Teardown {
                step,
                reason: e.to_string(),
            };
            warn!("[{command}] {e}");
        }
    }
}

/// 工作线程主体
fn complete<C: CommandChannel, T: Transport>(command: &str, mut channel: C, shared: &Shared<T>) {
    trace!("[{command}] waiting for command to finish");
    let outcome = match channel.join().and_then(|()| channel.exit_status()) {
        Err(_) if shared.destroyed.load(Ordering::Acquire) => Err(CommandError::Destroyed),
        outcome => outcome,
    };
    match &outcome {
        Ok(code) => debug!("[{command}] finished with exit code {code}"),
        Err(CommandError::Destroyed) => debug!("[{command}] destroyed before completion"),
        Err(e) => error!("[{command}] could not wait for command to finish: {e}"),
    }

    let close_channel: TeardownStep<'_> = ("close channel", Box::new(move || channel.close()));
    let mut steps = vec![close_channel];
    if shared.claim_release() {
        steps.extend(shared.release_steps());
    }
    run_teardown(command, steps);

    shared.completion.complete(outcome);
}

/// 由 [`CommandChannel`] 和 [`Transport`] 驱动的进程句柄
pub struct AsyncProcess<T: Transport> {
    command: String,
    shared: Arc<Shared<T>>,
    streams: Mutex<ProcessStreams>,
}

impl<T: Transport> AsyncProcess<T> {
    fn new(command: String, transport: T, streams: ProcessStreams) -> Self {
        Self {
            command,
            shared: Arc::new(Shared {
                transport,
                released: AtomicBool::new(false),
                destroyed: AtomicBool::new(false),
                completion: Completion::new(),
            }),
            streams: Mutex::new(streams),
        }
    }

    /// 派发后立即返回，完成过程在后台线程中跟踪
    pub fn spawn<C: CommandChannel>(
        command: impl Into<String>,
        channel: C,
        transport: T,
        streams: ProcessStreams,
    ) -> Result<Self, CommandError> {
        let process = Self::new(command.into(), transport, streams);
        let shared = Arc::clone(&process.shared);
        let worker_command = process.command.clone();

        let spawned = thread::Builder::new()
            .name("distestor-wait".to_string())
            .spawn(move || complete(&worker_command, channel, &shared));
        if let Err(e) = spawned {
            let e = CommandError::session("could not start completion worker", e);
            error!("[{}] {e}", process.command);
            if process.shared.claim_release() {
                run_teardown(&process.command, process.shared.release_steps());
            }
            process.shared.completion.complete(Err(e.clone()));
            return Err(e);
        }
        Ok(process)
    }

    /// 在当前线程上等待命令结束，返回已完成的进程
    pub fn run<C: CommandChannel>(
        command: impl Into<String>,
        channel: C,
        transport: T,
        streams: ProcessStreams,
    ) -> Self {
        let process = Self::new(command.into(), transport, streams);
        complete(&process.command, channel, &process.shared);
        process
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    fn streams(&self) -> MutexGuard<'_, ProcessStreams> {
        self.streams.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T: Transport> RemoteProcess for AsyncProcess<T> {
    fn take_stdin(&self) -> Option<Box<dyn Write + Send>> {
        self.streams().stdin.take()
    }

    fn take_stdout(&self) -> Option<Box<dyn Read + Send>> {
        self.streams().stdout.take()
    }

    fn take_stderr(&self) -> Option<Box<dyn Read + Send>> {
        self.streams().stderr.take()
    }

    fn destroy(&self) {
        debug!("[{}] destroy()", self.command);
        self.shared.destroyed.store(true, Ordering::Release);
        if self.shared.claim_release() {
            run_teardown(&self.command, self.shared.release_steps());
        }
    }

    fn wait_for(&self) -> Result<i32, CommandError> {
        self.shared.completion.wait()
    }
}
