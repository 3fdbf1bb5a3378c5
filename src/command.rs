use crate::sampler::CpuSampler;
use crate::stats::StatsSource;
use log::{debug, warn};

/// 查询 CPU 使用率的请求
pub const CPU_TOKEN: &[u8] = b"cpu\r";
/// 查询内存占用的请求
pub const MEMORY_TOKEN: &[u8] = b"mem\r";

pub const INVALID_COMMAND_REPLY: &str = "invalid command\n";
pub const CPU_UNAVAILABLE_REPLY: &str = "error: cpu stats unavailable\n";
pub const MEMORY_UNAVAILABLE_REPLY: &str = "error: memory stats unavailable\n";

/// 客户端命令
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    CpuUsage,
    MemoryUsage,
    Unknown,
}

impl Command {
    /// 按前缀区分大小写地匹配请求行，命令必须以 `\r` 结尾
    pub fn parse(raw: &[u8]) -> Self {
        if raw.starts_with(CPU_TOKEN) {
            Command::CpuUsage
        } else if raw.starts_with(MEMORY_TOKEN) {
            Command::MemoryUsage
        } else {
            Command::Unknown
        }
    }
}

/// 命令分发器
///
/// 持有计数器来源和进程内唯一的 CPU 采样器，所有连接共享同一个实例。
/// 统计读取失败在此转换为固定的诊断回复，不向上传播。
pub struct CommandDispatcher<S> {
    source: S,
    sampler: CpuSampler,
}

impl<S: StatsSource> CommandDispatcher<S> {
    #[inline]
    pub fn new(source: S) -> Self {
        Self::with_sampler(source, CpuSampler::new())
    }

    #[inline]
    pub fn with_sampler(source: S, sampler: CpuSampler) -> Self {
        Self { source, sampler }
    }

    #[inline]
    pub fn sampler(&self) -> &CpuSampler {
        &self.sampler
    }

    /// 处理一行请求并生成回复文本
    pub fn dispatch(&self, raw: &[u8]) -> String {
        match Command::parse(raw) {
            Command::CpuUsage => self.cpu_usage(),
            Command::MemoryUsage => self.memory_usage(),
            Command::Unknown => {
                debug!("未知命令: {:?}", String::from_utf8_lossy(raw));
                INVALID_COMMAND_REPLY.to_string()
            }
        }
    }

    fn cpu_usage(&self) -> String {
        self.sampler
            .sample_usage_percent(&self.source)
            .unwrap_or_else(|e| {
                warn!("获取 CPU 使用率失败: {e}");
                CPU_UNAVAILABLE_REPLY.to_string()
            })
    }

    fn memory_usage(&self) -> String {
        match self.source.read_memory_counters() {
            Ok(mem) => format!("{} kB\n", mem.used()),
            Err(e) => {
                warn!("获取内存信息失败: {e}");
                MEMORY_UNAVAILABLE_REPLY.to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sampler::CpuSamplerState;
    use crate::sampler::tests::{SequenceSource, TickingSource, sample};
    use crate::stats::{CpuSample, MemorySample, Result, StatsError};

    struct FixedMemory(MemorySample);

    impl StatsSource for FixedMemory {
        fn read_cpu_counters(&self) -> Result<CpuSample> {
            Err(StatsError::SourceUnavailable(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "no stat",
            )))
        }

        fn read_memory_counters(&self) -> Result<MemorySample> {
            Ok(self.0)
        }
    }

    #[test]
    fn test_command_parse() {
        assert_eq!(Command::parse(b"cpu\r"), Command::CpuUsage);
        assert_eq!(Command::parse(b"cpu\r\n"), Command::CpuUsage);
        assert_eq!(Command::parse(b"mem\r\0\0\0"), Command::MemoryUsage);
    }

    #[test]
    fn test_command_parse_unknown() {
        assert_eq!(Command::parse(b""), Command::Unknown);
        assert_eq!(Command::parse(b"cpu"), Command::Unknown);
        assert_eq!(Command::parse(b"cpu\n"), Command::Unknown);
        assert_eq!(Command::parse(b"CPU\r"), Command::Unknown);
        assert_eq!(Command::parse(b" mem\r"), Command::Unknown);
        assert_eq!(Command::parse(b"xyz\r"), Command::Unknown);
    }

    #[test]
    fn test_dispatch_memory() {
        let dispatcher = CommandDispatcher::new(FixedMemory(MemorySample {
            total: 1000,
            free: 100,
            available: 600,
            buffered: 50,
            cached: 250,
        }));

        assert_eq!(dispatcher.dispatch(b"mem\r"), "600 kB\n");
    }

    #[test]
    fn test_dispatch_memory_does_not_touch_sampler() {
        let state = CpuSamplerState {
            idle_time: 7,
            non_idle_time: 9,
        };
        let dispatcher =
            CommandDispatcher::with_sampler(TickingSource::new(), CpuSampler::with_state(state));

        dispatcher.dispatch(b"mem\r");
        assert_eq!(dispatcher.sampler().state(), state);

        dispatcher.dispatch(b"cpu\r");
        assert_ne!(dispatcher.sampler().state(), state);
    }

    #[test]
    fn test_dispatch_cpu_repeated() {
        let dispatcher = CommandDispatcher::new(SequenceSource::new([
            sample(100, 100),
            sample(150, 250),
            sample(150, 250),
        ]));

        assert_eq!(dispatcher.dispatch(b"cpu\r"), "0%\n");
        // total 300 -> 550, idle 100 -> 150
        assert_eq!(dispatcher.dispatch(b"cpu\r"), "80%\n");
        assert_eq!(dispatcher.dispatch(b"cpu\r"), "0%\n");
    }

    #[test]
    fn test_dispatch_failures_become_diagnostics() {
        let dispatcher = CommandDispatcher::new(SequenceSource::new([]));
        assert_eq!(dispatcher.dispatch(b"cpu\r"), CPU_UNAVAILABLE_REPLY);
        assert_eq!(dispatcher.dispatch(b"mem\r"), MEMORY_UNAVAILABLE_REPLY);
    }

    #[test]
    fn test_dispatch_unknown() {
        let dispatcher = CommandDispatcher::new(TickingSource::new());
        assert_eq!(dispatcher.dispatch(b"xyz\r"), INVALID_COMMAND_REPLY);
        assert_eq!(dispatcher.dispatch(&[0u8; 16]), INVALID_COMMAND_REPLY);
        assert!(dispatcher.sampler().state().is_initial());
    }
}
