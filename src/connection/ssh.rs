//! SSH连接管理
//!
//! 该模块实现了基于SSH的远程命令执行与文件传输。
//!
//! ## 连接策略
//!
//! 每条命令使用一条独立的、已认证的连接，不做连接复用。连接由 [`SshConnection`] 持有，
//! 在其被丢弃时关闭；若连接被转为进程（[`SshSession::spawn_process`]），则连接的释放
//! 交由该进程的完成引擎负责。
//!
//! ## 异步命令
//!
//! 命令派发后会话切换为非阻塞模式，工作线程轮询通道，把标准输出和标准错误转发给
//! [`ChunkReader`]，并把调用者写入标准输入的数据送往远端。`destroy()` 通过关闭 TCP 连接
//! 让轮询中的工作线程立即返回。

use std::fs::{self, File, Permissions};
use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::thread;
use std::time::Duration;

use log::{debug, error, trace};
use ssh2::{Channel, CheckResult, ErrorCode, KnownHostFileKind, Session};
use walkdir::WalkDir;

use crate::connection::{
    AsyncProcess, ChunkReader, CommandChannel, ProcessStreams, RemoteProcess, Transport,
};
use crate::error::{CommandError, EnvironmentError};
use crate::utils::{join_relative, shell_quote};

const LIBSSH2_ERROR_EAGAIN: i32 = -37;
const LIBSSH2_FX_NO_SUCH_FILE: i32 = 2;

/// 轮询通道的间隔
const POLL_INTERVAL: Duration = Duration::from_millis(50);
const RETRY_INTERVAL: Duration = Duration::from_millis(10);
/// 关闭步骤在 EAGAIN 上的最大重试次数
const TEARDOWN_RETRIES: usize = 500;
const DIR_MODE: i32 = 0o755;

/// 一台SSH主机的连接参数
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SshTarget {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub private_key_path: PathBuf,
    /// 若设置，则用该 known_hosts 文件校验主机密钥
    pub known_hosts: Option<PathBuf>,
    /// 仅作用于 TCP 连接、握手和认证
    pub connect_timeout: Option<Duration>,
}

impl SshTarget {
    fn label(&self) -> String {
        format!("{}@{}:{}", self.username, self.host, self.port)
    }
}

/// 打开已认证的SSH连接
pub trait SshConnector: Send + Sync {
    fn connect(&self, target: &SshTarget) -> Result<Box<dyn SshSession>, CommandError>;
}

/// 使用 libssh2 直接连接
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultSshConnector;

impl SshConnector for DefaultSshConnector {
    fn connect(&self, target: &SshTarget) -> Result<Box<dyn SshSession>, CommandError> {
        Ok(Box::new(SshConnection::open(target)?))
    }
}

/// 远程路径的类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteKind {
    Missing,
    File,
    Directory,
}

fn is_eagain(e: &ssh2::Error) -> bool {
    matches!(e.code(), ErrorCode::Session(LIBSSH2_ERROR_EAGAIN))
}

/// 在非阻塞会话上重试操作，直到它不再返回 EAGAIN
///
/// `limit` 为 `None` 时不限次数。
fn until_ready<T>(
    limit: Option<usize>,
    mut op: impl FnMut() -> Result<T, ssh2::Error>,
) -> Result<T, ssh2::Error> {
    let mut attempts = 0;
    loop {
        match op() {
            Err(e) if is_eagain(&e) && limit.is_none_or(|limit| attempts < limit) => {
                attempts += 1;
                thread::sleep(RETRY_INTERVAL);
            }
            result => return result,
        }
    }
}

fn connect_tcp(target: &SshTarget) -> io::Result<TcpStream> {
    let Some(timeout) = target.connect_timeout else {
        return TcpStream::connect((target.host.as_str(), target.port));
    };

    let mut last_error = None;
    for addr in (target.host.as_str(), target.port).to_socket_addrs()? {
        match TcpStream::connect_timeout(&addr, timeout) {
            Ok(stream) => return Ok(stream),
            Err(e) => last_error = Some(e),
        }
    }
    Err(last_error.unwrap_or_else(|| {
        io::Error::new(io::ErrorKind::NotFound, "host resolved to no address")
    }))
}

fn timeout_millis(timeout: Duration) -> u32 {
    u32::try_from(timeout.as_millis()).unwrap_or(u32::MAX).max(1)
}

/// 用 known_hosts 文件校验服务器的主机密钥
fn verify_host_key(session: &Session, target: &SshTarget, file: &Path) -> Result<(), CommandError> {
    let host_key_error = |reason: String| CommandError::HostKey {
        host: target.host.clone(),
        reason,
    };

    let mut known_hosts = session
        .known_hosts()
        .map_err(|e| host_key_error(e.to_string()))?;
    known_hosts
        .read_file(file, KnownHostFileKind::OpenSSH)
        .map_err(|e| host_key_error(format!("无法读取 {}: {e}", file.display())))?;
    let (key, _) = session
        .host_key()
        .ok_or_else(|| host_key_error("服务器没有提供主机密钥".to_string()))?;

    match known_hosts.check_port(&target.host, target.port, key) {
        CheckResult::Match => Ok(()),
        CheckResult::NotFound => Err(host_key_error("主机不在 known_hosts 中".to_string())),
        CheckResult::Mismatch => Err(host_key_error("主机密钥不匹配".to_string())),
        CheckResult::Failure => Err(host_key_error("主机密钥检查失败".to_string())),
    }
}

/// 一条已认证的SSH连接
pub struct SshConnection {
    /// 连接被转为进程后为 `None`
    transport: Option<SshTransport>,
    label: String,
}

impl SshConnection {
    /// 连接、握手、校验主机密钥并使用私钥认证
    pub fn open(target: &SshTarget) -> Result<Self, CommandError> {
        let label = target.label();
        debug!("创建SSH连接: {label}");
        let connect_error = |reason: String| CommandError::Connect {
            host: format!("{}:{}", target.host, target.port),
            reason,
        };

        let tcp = connect_tcp(target).map_err(|e| connect_error(e.to_string()))?;
        let tcp_handle = tcp.try_clone().map_err(|e| connect_error(e.to_string()))?;

        let mut session = Session::new().map_err(|e| CommandError::session("无法创建SSH会话", e))?;
        session.set_compress(true);
        session.set_tcp_stream(tcp);
        if let Some(timeout) = target.connect_timeout {
            session.set_timeout(timeout_millis(timeout));
        }
        session
            .handshake()
            .map_err(|e| connect_error(format!("SSH握手失败: {e}")))?;

        if let Some(known_hosts) = &target.known_hosts {
            verify_host_key(&session, target, known_hosts)?;
        }

        let auth_error = |reason: String| CommandError::Authentication {
            host: target.host.clone(),
            username: target.username.clone(),
            reason,
        };
        session
            .userauth_pubkey_file(&target.username, None, &target.private_key_path, None)
            .map_err(|e| auth_error(e.to_string()))?;
        if !session.authenticated() {
            return Err(auth_error("服务器拒绝了公钥".to_string()));
        }
        session.set_timeout(0);

        Ok(Self {
            transport: Some(SshTransport {
                session,
                tcp: tcp_handle,
            }),
            label,
        })
    }

    fn session(&self) -> Result<&Session, CommandError> {
        self.transport
            .as_ref()
            .map(|transport| &transport.session)
            .ok_or_else(|| CommandError::session(self.label.clone(), "连接已被转交给进程"))
    }

    fn sftp(&self) -> Result<ssh2::Sftp, CommandError> {
        self.session()?
            .sftp()
            .map_err(|e| CommandError::session("无法打开SFTP子系统", e))
    }

    fn sftp_path_kind(&self, path: &str) -> Result<RemoteKind, CommandError> {
        match self.sftp()?.stat(Path::new(path)) {
            Ok(stat) if stat.is_dir() => Ok(RemoteKind::Directory),
            Ok(_) => Ok(RemoteKind::File),
            Err(e) if matches!(e.code(), ErrorCode::SFTP(LIBSSH2_FX_NO_SUCH_FILE)) => {
                Ok(RemoteKind::Missing)
            }
            Err(e) => Err(CommandError::session(format!("查询 {path}"), e)),
        }
    }

    fn send_file(&self, local: &Path, remote: &str) -> Result<(), EnvironmentError> {
        trace!("[{}] 上传 {} -> {remote}", self.label, local.display());
        let metadata = fs::metadata(local)?;
        let mode = (metadata.permissions().mode() & 0o777) as i32;
        let mut source = File::open(local)?;

        let mut channel = self
            .session()?
            .scp_send(Path::new(remote), mode, metadata.len(), None)
            .map_err(|e| CommandError::session(format!("无法上传到 {remote}"), e))?;
        io::copy(&mut source, &mut channel)?;
        finish_transfer(channel, remote)?;
        Ok(())
    }

    fn receive_tree(&self, remote: &str, local: &Path) -> Result<(), EnvironmentError> {
        fs::create_dir_all(local)?;
        let entries = self
            .sftp()?
            .readdir(Path::new(remote))
            .map_err(|e| CommandError::session(format!("无法列出 {remote}"), e))?;

        for (path, stat) in entries {
            let Some(name) = path.file_name() else {
                continue;
            };
            let child = join_relative(remote, &name.to_string_lossy());
            if stat.is_dir() {
                self.receive_tree(&child, &local.join(name))?;
            } else {
                self.receive_file(&child, &local.join(name))?;
            }
        }
        Ok(())
    }

    fn receive_file(&self, remote: &str, local: &Path) -> Result<(), EnvironmentError> {
        trace!("[{}] 下载 {remote} -> {}", self.label, local.display());
        let (mut channel, stat) = self
            .session()?
            .scp_recv(Path::new(remote))
            .map_err(|e| CommandError::session(format!("无法下载 {remote}"), e))?;

        let mut out = File::create(local)?;
        io::copy(&mut (&mut channel).take(stat.size()), &mut out)?;
        fs::set_permissions(local, Permissions::from_mode(stat.mode() as u32 & 0o777))?;
        finish_transfer(channel, remote)?;
        Ok(())
    }

    /// 在连接上派发命令；失败时连接随 `self` 一起被释放
    fn dispatch(
        mut self,
        command_line: &str,
    ) -> Result<(SshChannel, SshTransport, ProcessStreams), CommandError> {
        debug!("[{}] 派发: {command_line}", self.label);
        let channel = self
            .session()?
            .channel_session()
            .and_then(|mut channel| channel.exec(command_line).map(|()| channel))
            .map_err(|e| CommandError::session(format!("无法执行远程命令 `{command_line}`"), e))?;

        let transport = self
            .transport
            .take()
            .ok_or_else(|| CommandError::session(self.label.clone(), "连接已被转交给进程"))?;
        transport.session.set_blocking(false);

        let (stdin_tx, stdin_rx) = mpsc::channel();
        let (stdout_tx, stdout_rx) = mpsc::channel();
        let (stderr_tx, stderr_rx) = mpsc::channel();
        let streams = ProcessStreams {
            stdin: Some(Box::new(ChannelWriter { chunks: stdin_tx })),
            stdout: Some(Box::new(ChunkReader::new(stdout_rx))),
            stderr: Some(Box::new(ChunkReader::new(stderr_rx))),
        };
        let channel = SshChannel {
            channel,
            stdin: Some(stdin_rx),
            pending: Vec::new(),
            eof_sent: false,
            stdout: Some(stdout_tx),
            stderr: Some(stderr_tx),
        };
        Ok((channel, transport, streams))
    }
}

/// 一条已认证SSH连接上的操作
///
/// [`SshEnvironment`](crate::test_environment::SshEnvironment) 只通过该特质使用连接，
/// 丢弃实现者即释放连接。
pub trait SshSession {
    /// 执行一条命令并阻塞直到结束，返回退出码
    fn exec(&self, command_line: &str) -> Result<i32, CommandError>;

    /// 执行一条命令，非零退出码视为失败
    fn exec_checked(&self, command_line: &str) -> Result<(), CommandError> {
        match self.exec(command_line)? {
            0 => Ok(()),
            code => Err(CommandError::NonZeroExit {
                command: command_line.to_string(),
                code,
            }),
        }
    }

    /// 通过 SFTP 创建目录及其父目录
    fn sftp_make_dirs(&self, path: &str) -> Result<(), CommandError>;

    /// 创建目录及其父目录
    ///
    /// 先尝试 SFTP，失败时退回到 `mkdir -p`，其非零退出码是错误。
    fn make_dirs(&self, path: &str) -> Result<(), CommandError> {
        match self.sftp_make_dirs(path) {
            Ok(()) => Ok(()),
            Err(e) => {
                debug!("SFTP 创建目录 {path} 失败，改用 mkdir -p: {e}");
                self.exec_checked(&format!("mkdir -p {}", shell_quote(path)))
            }
        }
    }

    /// 查询远程路径的类型
    fn path_kind(&self, path: &str) -> Result<RemoteKind, CommandError>;

    /// 把本地文件或目录上传到远程目录 `remote_dir` 下，保持其名称与结构
    fn upload(&self, local: &Path, remote_dir: &str) -> Result<(), EnvironmentError>;

    /// 把远程文件或目录下载到本地目录 `local_dir` 下，保持其名称与结构
    fn download(&self, remote: &str, local_dir: &Path) -> Result<(), EnvironmentError>;

    /// 派发命令后立即返回，由后台线程跟踪完成
    fn spawn_process(
        self: Box<Self>,
        command_line: &str,
    ) -> Result<Box<dyn RemoteProcess>, CommandError>;

    /// 执行命令并在当前线程上等待其结束
    fn run_process(
        self: Box<Self>,
        command_line: &str,
    ) -> Result<Box<dyn RemoteProcess>, CommandError>;
}

impl SshSession for SshConnection {
    fn exec(&self, command_line: &str) -> Result<i32, CommandError> {
        trace!("[{}] 执行: {command_line}", self.label);
        let session_error = |e: ssh2::Error| CommandError::session(format!("执行 `{command_line}`"), e);
        let session = self.session()?;
        let mut channel = session.channel_session().map_err(session_error)?;
        channel.exec(command_line).map_err(session_error)?;
        channel.send_eof().map_err(session_error)?;

        // 两个输出流必须交替读取，否则远端可能因其中一个窗口写满而停住
        session.set_blocking(false);
        let drained = drain_output(&mut channel).and_then(|output| {
            until_ready(None, || channel.wait_close())
                .map(|()| output)
                .map_err(session_error)
        });
        session.set_blocking(true);
        let (stdout, stderr) = drained?;
        let code = channel.exit_status().map_err(session_error)?;

        trace!(
            "[{}] exit_code={code} stdout={:?} stderr={:?}",
            self.label,
            String::from_utf8_lossy(&stdout),
            String::from_utf8_lossy(&stderr)
        );
        Ok(code)
    }

    fn sftp_make_dirs(&self, path: &str) -> Result<(), CommandError> {
        let sftp = self.sftp()?;
        let mut current = PathBuf::new();
        for component in Path::new(path).components() {
            current.push(component);
            match sftp.stat(&current) {
                Ok(stat) if stat.is_dir() => {}
                Ok(_) => {
                    return Err(CommandError::session(
                        format!("创建目录 {path}"),
                        format!("`{}` 不是目录", current.display()),
                    ));
                }
                Err(_) => sftp
                    .mkdir(&current, DIR_MODE)
                    .map_err(|e| CommandError::session(format!("创建目录 {path}"), e))?,
            }
        }
        Ok(())
    }

    fn path_kind(&self, path: &str) -> Result<RemoteKind, CommandError> {
        match self.sftp_path_kind(path) {
            Ok(kind) => Ok(kind),
            Err(e) => {
                debug!("[{}] SFTP 查询失败，改用 test: {e}", self.label);
                let quoted = shell_quote(path);
                if self.exec(&format!("test -d {quoted}"))? == 0 {
                    Ok(RemoteKind::Directory)
                } else if self.exec(&format!("test -e {quoted}"))? == 0 {
                    Ok(RemoteKind::File)
                } else {
                    Ok(RemoteKind::Missing)
                }
            }
        }
    }

    fn upload(&self, local: &Path, remote_dir: &str) -> Result<(), EnvironmentError> {
        let target = join_relative(remote_dir, &file_name(local)?);
        if !local.is_dir() {
            return self.send_file(local, &target);
        }

        for entry in WalkDir::new(local) {
            let entry = entry.map_err(io::Error::from)?;
            let relative = entry
                .path()
                .strip_prefix(local)
                .map_err(|e| io::Error::other(e.to_string()))?
                .to_string_lossy()
                .into_owned();
            let remote = if relative.is_empty() {
                target.clone()
            } else {
                join_relative(&target, &relative)
            };

            if entry.file_type().is_dir() {
                self.make_dirs(&remote)?;
            } else {
                self.send_file(entry.path(), &remote)?;
            }
        }
        Ok(())
    }

    fn download(&self, remote: &str, local_dir: &Path) -> Result<(), EnvironmentError> {
        let target = local_dir.join(file_name(Path::new(remote))?);
        match self.path_kind(remote)? {
            RemoteKind::Missing => Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("remote path `{remote}` does not exist"),
            )
            .into()),
            RemoteKind::File => self.receive_file(remote, &target),
            RemoteKind::Directory => self.receive_tree(remote, &target),
        }
    }

    fn spawn_process(
        self: Box<Self>,
        command_line: &str,
    ) -> Result<Box<dyn RemoteProcess>, CommandError> {
        let (channel, transport, streams) = (*self).dispatch(command_line)?;
        Ok(Box::new(AsyncProcess::spawn(
            command_line,
            channel,
            transport,
            streams,
        )?))
    }

    fn run_process(
        self: Box<Self>,
        command_line: &str,
    ) -> Result<Box<dyn RemoteProcess>, CommandError> {
        let (channel, transport, streams) = (*self).dispatch(command_line)?;
        Ok(Box::new(AsyncProcess::run(
            command_line,
            channel,
            transport,
            streams,
        )))
    }
}

impl Drop for SshConnection {
    fn drop(&mut self) {
        if let Some(transport) = self.transport.take() {
            if let Err(e) = transport.close_session() {
                error!("[{}] 关闭SSH会话失败: {e}", self.label);
            }
            if let Err(e) = transport.disconnect() {
                error!("[{}] 断开SSH连接失败: {e}", self.label);
            }
        }
    }
}

fn file_name(path: &Path) -> io::Result<String> {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("`{}` has no file name", path.display()),
            )
        })
}

fn finish_transfer(mut channel: Channel, remote: &str) -> Result<(), CommandError> {
    let transfer_error = |e: ssh2::Error| CommandError::session(format!("传输 {remote}"), e);
    channel.send_eof().map_err(transfer_error)?;
    channel.wait_eof().map_err(transfer_error)?;
    channel.close().map_err(transfer_error)?;
    channel.wait_close().map_err(transfer_error)
}

/// 承载一条命令的SSH会话与其 TCP 连接
pub struct SshTransport {
    session: Session,
    /// 与会话共享同一个套接字，用于强制断开
    tcp: TcpStream,
}

impl Transport for SshTransport {
    fn close_session(&self) -> Result<(), CommandError> {
        until_ready(Some(TEARDOWN_RETRIES), || {
            self.session.disconnect(None, "distestor: command finished", None)
        })
        .map_err(|e| CommandError::session("关闭SSH会话失败", e))
    }

    fn disconnect(&self) -> Result<(), CommandError> {
        match self.tcp.shutdown(Shutdown::Both) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotConnected => Ok(()),
            Err(e) => Err(CommandError::session("断开TCP连接失败", e)),
        }
    }
}

/// 非阻塞模式下的命令通道
pub struct SshChannel {
    channel: Channel,
    /// 调用者写入的标准输入，写端被丢弃后为 `None`
    stdin: Option<Receiver<Vec<u8>>>,
    pending: Vec<u8>,
    eof_sent: bool,
    stdout: Option<Sender<Vec<u8>>>,
    stderr: Option<Sender<Vec<u8>>>,
}

/// 非阻塞读取的结果，暂无数据记为 0
fn ready(read: io::Result<usize>, context: &str) -> Result<usize, CommandError> {
    match read {
        Ok(n) => Ok(n),
        Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(0),
        Err(e) => Err(CommandError::session(context, e)),
    }
}

/// 读取一次，把数据转发到 `sink`；返回是否读到了数据
fn forward(
    stream: &mut impl Read,
    buffer: &mut [u8],
    sink: Option<&Sender<Vec<u8>>>,
    context: &str,
) -> Result<bool, CommandError> {
    let n = ready(stream.read(buffer), context)?;
    // 读端已被丢弃时输出直接丢弃
    if let (true, Some(sink)) = (n > 0, sink) {
        sink.send(buffer[..n].to_vec()).ok();
    }
    Ok(n > 0)
}

/// 可分别读取标准输出和标准错误的非阻塞通道
trait OutputStreams {
    fn read_stdout(&mut self, buf: &mut [u8]) -> io::Result<usize>;
    fn read_stderr(&mut self, buf: &mut [u8]) -> io::Result<usize>;
    fn at_eof(&self) -> bool;
}

impl OutputStreams for Channel {
    fn read_stdout(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Read::read(self, buf)
    }

    fn read_stderr(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.stderr().read(buf)
    }

    fn at_eof(&self) -> bool {
        self.eof()
    }
}

/// 交替读取两个输出流直到远端 EOF，返回 `(stdout, stderr)`
fn drain_output(streams: &mut impl OutputStreams) -> Result<(Vec<u8>, Vec<u8>), CommandError> {
    let mut buffer = [0u8; 4096];
    let mut stdout = Vec::new();
    let mut stderr = Vec::new();
    loop {
        let out = ready(streams.read_stdout(&mut buffer), "读取标准输出失败")?;
        stdout.extend_from_slice(&buffer[..out]);
        let err = ready(streams.read_stderr(&mut buffer), "读取标准错误失败")?;
        stderr.extend_from_slice(&buffer[..err]);

        if out == 0 && err == 0 {
            if streams.at_eof() {
                return Ok((stdout, stderr));
            }
            thread::sleep(RETRY_INTERVAL);
        }
    }
}

impl SshChannel {
    /// 把排队的标准输入写往远端；返回是否有进展
    fn pump_stdin(&mut self) -> bool {
        if self.pending.is_empty() {
            if let Some(stdin) = &self.stdin {
                match stdin.try_recv() {
                    Ok(bytes) => self.pending = bytes,
                    Err(TryRecvError::Empty) => return false,
                    Err(TryRecvError::Disconnected) => self.stdin = None,
                }
            }
        }

        if !self.pending.is_empty() {
            return match self.channel.write(&self.pending) {
                Ok(n) => {
                    self.pending.drain(..n);
                    n > 0
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => false,
                Err(e) => {
                    debug!("远端不再接收标准输入: {e}");
                    self.pending.clear();
                    self.stdin = None;
                    self.eof_sent = true;
                    false
                }
            };
        }

        if self.stdin.is_none() && !self.eof_sent {
            match self.channel.send_eof() {
                Ok(()) => self.eof_sent = true,
                Err(e) if is_eagain(&e) => return false,
                Err(e) => {
                    debug!("无法关闭远端标准输入: {e}");
                    self.eof_sent = true;
                }
            }
            return true;
        }
        false
    }

    fn pump(&mut self) -> Result<(), CommandError> {
        let mut buffer = [0u8; 4096];
        loop {
            let mut progressed = self.pump_stdin();
            progressed |= forward(
                &mut self.channel,
                &mut buffer,
                self.stdout.as_ref(),
                "读取标准输出失败",
            )?;
            progressed |= forward(
                &mut self.channel.stderr(),
                &mut buffer,
                self.stderr.as_ref(),
                "读取标准错误失败",
            )?;

            if !progressed {
                if self.channel.eof() {
                    return Ok(());
                }
                thread::sleep(POLL_INTERVAL);
            }
        }
    }
}

impl CommandChannel for SshChannel {
    fn join(&mut self) -> Result<(), CommandError> {
        let pumped = self.pump();
        // 关闭发送端，读取者随之看到 EOF
        self.stdout = None;
        self.stderr = None;
        pumped?;

        until_ready(None, || self.channel.wait_close())
            .map_err(|e| CommandError::session("等待通道关闭失败", e))
    }

    fn exit_status(&mut self) -> Result<i32, CommandError> {
        self.channel
            .exit_status()
            .map_err(|e| CommandError::session("无法获取退出码", e))
    }

    fn close(&mut self) -> Result<(), CommandError> {
        until_ready(Some(TEARDOWN_RETRIES), || self.channel.close())
            .map_err(|e| CommandError::session("关闭通道失败", e))
    }
}

/// 远端标准输入的写端，丢弃后远端收到 EOF
struct ChannelWriter {
    chunks: Sender<Vec<u8>>,
}

impl Write for ChannelWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.chunks
            .send(buf.to_vec())
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "remote process has finished"))?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
