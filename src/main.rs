use anyhow::Result;
use clap::Parser;
use log::{error, info};
use std::fs::OpenOptions;
use std::process::ExitCode;
use sysinfod::{CommandDispatcher, Config, ProcStats, StatusServer, daemon};

/// 守护进程关闭了所有继承的描述符，日志只能写入文件
const LOG_FILE: &str = "/tmp/sysinfod.log";

/// 资源占用查询守护进程，监听 TCP 5001 端口，不接受任何参数
#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about,
    long_about = None,
    disable_help_flag = true,
    disable_version_flag = true
)]
struct Args {}

/// 进程退出码
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ExitStatus {
    Success = 0,
    #[allow(dead_code)] // 内存分配失败由运行时直接中止，保留编号
    OutOfMemory = 1,
    Internal = 2,
    BadArguments = 3,
    Communication = 4,
}

impl From<ExitStatus> for ExitCode {
    #[inline]
    fn from(status: ExitStatus) -> Self {
        ExitCode::from(status as u8)
    }
}

fn main() -> ExitCode {
    if let Err(e) = Args::try_parse() {
        eprintln!("{e}");
        return ExitStatus::BadArguments.into();
    }

    // 运行时的工作线程无法跨越 fork，必须先守护化
    if let Err(e) = daemon::daemonize() {
        eprintln!("守护化失败: {e:#}");
        return ExitStatus::Internal.into();
    }

    init_logger("info");
    info!("资源占用查询守护进程启动中...");

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("创建运行时失败: {e}");
            return ExitStatus::Internal.into();
        }
    };

    match runtime.block_on(serve(Config::default())) {
        Ok(()) => {
            info!("服务器正常关闭");
            ExitStatus::Success.into()
        }
        Err(e) => {
            error!("通信错误，进程退出: {e:#}");
            ExitStatus::Communication.into()
        }
    }
}

async fn serve(config: Config) -> Result<()> {
    info!(
        "配置信息 - 地址: {}, 端口: {}, 监听队列: {}",
        config.bind_address, config.port, config.backlog
    );

    let dispatcher = CommandDispatcher::new(ProcStats::default());
    let server = StatusServer::bind(&config, dispatcher)?;
    info!("服务器实例创建完成");

    server.run().await
}

/// 初始化日志系统
fn init_logger(level: &str) {
    let target = match OpenOptions::new().create(true).append(true).open(LOG_FILE) {
        Ok(file) => env_logger::Target::Pipe(Box::new(file)),
        Err(_) => env_logger::Target::Pipe(Box::new(std::io::sink())),
    };

    // 失败时已无终端可以报告，忽略即可
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .target(target)
        .try_init();
}
