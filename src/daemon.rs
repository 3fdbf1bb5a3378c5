//! 进程守护化
//!
//! 必须在创建 tokio 运行时与任何套接字之前调用：fork 之后只有调用线程
//! 存活，而套接字的创建依赖一个已清空的文件描述符表。

use anyhow::{Context, Result};
use nix::sys::signal::{self, SigHandler, Signal};
use nix::unistd::{self, ForkResult, SysconfVar};
use std::os::unix::io::RawFd;

/// 无法查询上限时使用的描述符数量
const FALLBACK_OPEN_MAX: RawFd = 1024;

/// 转入后台运行
///
/// 依次执行：fork 并让父进程退出、成为会话首进程、忽略 SIGCHLD 与 SIGHUP、
/// 再次 fork、切换工作目录到根目录、关闭所有继承的文件描述符。
/// 返回时调用者已是脱离终端的孙进程。
pub fn daemonize() -> Result<()> {
    fork_and_exit_parent().context("第一次 fork 失败")?;

    unistd::setsid().context("setsid 失败")?;

    // SAFETY: 只是把处理方式设为忽略，不安装自定义处理函数
    unsafe {
        signal::signal(Signal::SIGCHLD, SigHandler::SigIgn).context("忽略 SIGCHLD 失败")?;
        signal::signal(Signal::SIGHUP, SigHandler::SigIgn).context("忽略 SIGHUP 失败")?;
    }

    fork_and_exit_parent().context("第二次 fork 失败")?;

    unistd::chdir("/").context("切换工作目录失败")?;

    close_inherited_fds();

    Ok(())
}

fn fork_and_exit_parent() -> nix::Result<()> {
    // SAFETY: 此时进程只有一个线程，子进程可以继续执行任意代码
    match unsafe { unistd::fork() }? {
        ForkResult::Parent { .. } => std::process::exit(0),
        ForkResult::Child => Ok(()),
    }
}

/// 系统允许的最大文件描述符数
pub fn open_max() -> RawFd {
    unistd::sysconf(SysconfVar::OPEN_MAX)
        .ok()
        .flatten()
        .and_then(|max| RawFd::try_from(max).ok())
        .filter(|max| *max > 0)
        .unwrap_or(FALLBACK_OPEN_MAX)
}

fn close_inherited_fds() {
    for fd in (0..open_max()).rev() {
        // 大部分描述符本来就没有打开
        let _ = unistd::close(fd);
    }
}
