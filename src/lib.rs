//! 资源占用查询守护进程库
//!
//! 通过 TCP 接收单行命令（`cpu\r`、`mem\r`），返回从 procfs 读取的 CPU 与内存占用。

pub mod command;
pub mod daemon;
pub mod sampler;
pub mod server;
pub mod stats;

// 重新导出主要的公共类型
pub use command::{Command, CommandDispatcher};
pub use sampler::{CpuSampler, CpuSamplerState};
pub use server::{Config, StatusServer};
pub use stats::{CpuSample, MemorySample, ProcStats, StatsError, StatsSource};
