//! 远程进程执行层
//!
//! 该模块定义了 [`RemoteProcess`] 句柄以及驱动它的两个底层特质：
//! [`CommandChannel`]（一次命令的执行通道）与 [`Transport`]（承载该通道的连接）。
//! SSH 与本地进程都通过 [`AsyncProcess`] 这一通用完成引擎对外暴露。

use std::io::{self, Read, Write};
use std::sync::mpsc::Receiver;

use crate::error::CommandError;

mod process;
pub use process::AsyncProcess;

pub mod local;
pub mod ssh;

/// 一个可能运行在远程主机上的进程句柄
///
/// `wait_for` 可以被多个线程同时调用，所有调用者观察到同一个终止结果；
/// `destroy` 在任何进程状态下调用都是安全的。
pub trait RemoteProcess: Send + Sync {
    /// 取出进程的标准输入（只能取一次）
    fn take_stdin(&self) -> Option<Box<dyn Write + Send>>;

    /// 取出进程的标准输出（只能取一次）
    fn take_stdout(&self) -> Option<Box<dyn Read + Send>>;

    /// 取出进程的标准错误（只能取一次）
    fn take_stderr(&self) -> Option<Box<dyn Read + Send>>;

    /// 强制终止进程并释放其连接
    fn destroy(&self);

    /// 阻塞直到进程结束并返回退出码
    fn wait_for(&self) -> Result<i32, CommandError>;
}

/// 一条已派发命令的执行通道
pub trait CommandChannel: Send + 'static {
    /// 阻塞直到命令结束
    fn join(&mut self) -> Result<(), CommandError>;

    /// 获取退出码，仅在 `join` 成功后有意义
    fn exit_status(&mut self) -> Result<i32, CommandError>;

    /// 关闭通道
    fn close(&mut self) -> Result<(), CommandError>;
}

/// 承载命令通道的连接
pub trait Transport: Send + Sync + 'static {
    /// 关闭会话
    fn close_session(&self) -> Result<(), CommandError>;

    /// 断开底层传输
    ///
    /// 必须能让另一个线程中阻塞的 [`CommandChannel::join`] 返回。
    fn disconnect(&self) -> Result<(), CommandError>;
}

/// 进程的三个字节流，创建进程时提供
#[derive(Default)]
pub struct ProcessStreams {
    pub stdin: Option<Box<dyn Write + Send>>,
    pub stdout: Option<Box<dyn Read + Send>>,
    pub stderr: Option<Box<dyn Read + Send>>,
}

/// 把数据块序列呈现为字节流，发送端全部关闭后返回 EOF
///
/// 输出由转发线程写入无界通道，读取者慢或从不读取都不会阻塞进程。
pub struct ChunkReader {
    chunks: Receiver<Vec<u8>>,
    current: Vec<u8>,
    offset: usize,
}

impl ChunkReader {
    pub fn new(chunks: Receiver<Vec<u8>>) -> Self {
        Self {
            chunks,
            current: Vec::new(),
            offset: 0,
        }
    }
}

impl Read for ChunkReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        while self.offset >= self.current.len() {
            match self.chunks.recv() {
                Ok(chunk) => {
                    self.current = chunk;
                    self.offset = 0;
                }
                Err(_) => return Ok(0),
            }
        }

        let remaining = &self.current[self.offset..];
        let n = remaining.len().min(buf.len());
        buf[..n].copy_from_slice(&remaining[..n]);
        self.offset += n;
        Ok(n)
    }
}
